//! Streaming extraction of observations from CSV byte streams.

mod batch;
mod csv_reader;
mod writer;

pub use batch::{Batch, BatchReader};
pub use csv_reader::CsvReader;
pub use writer::MessageWriter;

use async_trait::async_trait;

/// One data row extracted from a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub row: String,
    pub row_index: i64,
}

/// A source of observations, one at a time. `Ok(None)` signals end-of-data;
/// `Err` is a genuine read failure.
#[async_trait]
pub trait ObservationReader: Send {
    async fn next_observation(&mut self) -> std::io::Result<Option<Observation>>;
}

/// Yields a fixed sequence of observations, then an optional read error,
/// then end-of-data. Used by the reader and writer tests.
#[cfg(test)]
pub(crate) struct SequenceReader {
    observations: std::collections::VecDeque<Observation>,
    error: Option<std::io::Error>,
}

#[cfg(test)]
impl SequenceReader {
    pub(crate) fn new(rows: &[&str]) -> Self {
        let observations = rows
            .iter()
            .enumerate()
            .map(|(i, row)| Observation {
                row: (*row).to_string(),
                row_index: i as i64 + 1,
            })
            .collect();
        Self {
            observations,
            error: None,
        }
    }

    pub(crate) fn with_error(mut self, error: std::io::Error) -> Self {
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl ObservationReader for SequenceReader {
    async fn next_observation(&mut self) -> std::io::Result<Option<Observation>> {
        if let Some(observation) = self.observations.pop_front() {
            return Ok(Some(observation));
        }
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}
