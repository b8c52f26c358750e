//! Consumption of file notification events and extraction of their files.

mod consumer;
mod handler;
mod source;

pub use consumer::{CloseError, Consumer, StartError};
pub use handler::{CsvHandler, EventHandler, HandlerError};
pub use source::{IncomingMessage, KafkaSource, MessageSource, MockMessageSource, SourceError};
