pub mod app_context;
pub mod config;
pub mod event;
pub mod observation;
pub mod reporter;
pub mod schema;
pub mod secrets;
pub mod store;
