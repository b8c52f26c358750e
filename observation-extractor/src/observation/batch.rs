use std::io;

use super::{Observation, ObservationReader};

/// Up to one batch worth of observations, plus whether the source ran out
/// of data while the batch was being filled.
#[derive(Debug)]
pub struct Batch {
    pub observations: Vec<Observation>,
    pub finished: bool,
}

/// Pulls a fixed number of observations at a time from an
/// [`ObservationReader`], for downstream consumers that want batches rather
/// than single rows.
pub struct BatchReader<R> {
    reader: R,
}

impl<R: ObservationReader> BatchReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads up to `batch_size` observations. A partial batch with
    /// `finished` set means the underlying reader was exhausted mid-batch.
    pub async fn read_batch(&mut self, batch_size: usize) -> io::Result<Batch> {
        let mut observations = Vec::with_capacity(batch_size);

        while observations.len() < batch_size {
            match self.reader.next_observation().await? {
                Some(observation) => observations.push(observation),
                None => {
                    return Ok(Batch {
                        observations,
                        finished: true,
                    })
                }
            }
        }

        Ok(Batch {
            observations,
            finished: false,
        })
    }
}
