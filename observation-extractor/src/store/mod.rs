//! Locating and retrieving source files from object storage.

mod clients;
mod location;
mod object;

pub use clients::{s3_client_map, ClientMap};
pub use location::{FileLocation, LocationError};
pub use object::{MockObjectStore, ObjectStore, ObjectStream, S3ObjectStore, StoreError};
