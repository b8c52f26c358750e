//! Avro wire records exchanged with the rest of the import pipeline.
//!
//! Schemas are held as their JSON definitions and parsed once, the same
//! definitions the upstream and downstream services compile against.

use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value, Schema};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),
}

const FILE_NOTIFICATION_DEF: &str = r#"{
  "type": "record",
  "name": "file_notification",
  "fields": [
    {"name": "file_url", "type": "string"},
    {"name": "instance_id", "type": "string"}
  ]
}"#;

const OBSERVATION_EXTRACTED_DEF: &str = r#"{
  "type": "record",
  "name": "observation_extracted",
  "fields": [
    {"name": "instance_id", "type": "string"},
    {"name": "row", "type": "string"},
    {"name": "row_index", "type": "long"}
  ]
}"#;

const REPORT_EVENT_DEF: &str = r#"{
  "type": "record",
  "name": "report_event",
  "fields": [
    {"name": "instance_id", "type": "string"},
    {"name": "event_type", "type": "string"},
    {"name": "event_message", "type": "string"},
    {"name": "service_name", "type": "string"}
  ]
}"#;

static FILE_NOTIFICATION_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::parse_str(FILE_NOTIFICATION_DEF).expect("file notification schema is valid")
});

static OBSERVATION_EXTRACTED_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::parse_str(OBSERVATION_EXTRACTED_DEF).expect("observation extracted schema is valid")
});

static REPORT_EVENT_SCHEMA: Lazy<Schema> =
    Lazy::new(|| Schema::parse_str(REPORT_EVENT_DEF).expect("report event schema is valid"));

/// The inbound event naming a file to extract observations from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNotification {
    pub file_url: String,
    pub instance_id: String,
}

/// The outbound event published for every extracted observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationExtracted {
    pub instance_id: String,
    pub row: String,
    pub row_index: i64,
}

/// An error report sent to the import reporter when a file cannot be handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub instance_id: String,
    pub event_type: String,
    pub event_message: String,
    pub service_name: String,
}

fn encode<T: Serialize>(schema: &Schema, record: &T) -> Result<Vec<u8>, SchemaError> {
    let value = to_value(record)?;
    Ok(to_avro_datum(schema, value)?)
}

fn decode<T: for<'de> Deserialize<'de>>(schema: &Schema, bytes: &[u8]) -> Result<T, SchemaError> {
    let mut reader = bytes;
    let value = from_avro_datum(schema, &mut reader, None)?;
    Ok(from_value::<T>(&value)?)
}

impl FileNotification {
    pub fn to_avro(&self) -> Result<Vec<u8>, SchemaError> {
        encode(&FILE_NOTIFICATION_SCHEMA, self)
    }

    pub fn from_avro(bytes: &[u8]) -> Result<Self, SchemaError> {
        decode(&FILE_NOTIFICATION_SCHEMA, bytes)
    }
}

impl ObservationExtracted {
    pub fn to_avro(&self) -> Result<Vec<u8>, SchemaError> {
        encode(&OBSERVATION_EXTRACTED_SCHEMA, self)
    }

    pub fn from_avro(bytes: &[u8]) -> Result<Self, SchemaError> {
        decode(&OBSERVATION_EXTRACTED_SCHEMA, bytes)
    }
}

impl ReportEvent {
    pub fn to_avro(&self) -> Result<Vec<u8>, SchemaError> {
        encode(&REPORT_EVENT_SCHEMA, self)
    }

    pub fn from_avro(bytes: &[u8]) -> Result<Self, SchemaError> {
        decode(&REPORT_EVENT_SCHEMA, bytes)
    }
}
