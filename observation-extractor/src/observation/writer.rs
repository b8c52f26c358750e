use std::io;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::ObservationReader;
use crate::schema::ObservationExtracted;

/// Writes every observation from a reader onto the publish channel as an
/// encoded [`ObservationExtracted`] event.
///
/// The channel is bounded, so a slow downstream broker backpressures the
/// extraction instead of buffering a whole file in memory.
#[derive(Clone)]
pub struct MessageWriter {
    sender: mpsc::Sender<Vec<u8>>,
    shutdown: CancellationToken,
}

impl MessageWriter {
    pub fn new(sender: mpsc::Sender<Vec<u8>>, shutdown: CancellationToken) -> Self {
        Self { sender, shutdown }
    }

    /// Streams observations until end-of-data. A row that fails to encode is
    /// dropped and the stream continues; the row content itself caused the
    /// failure, so retrying cannot help. Encoding a plain string/long record
    /// cannot currently fail, so that branch stays dormant until the outbound
    /// schema grows a fallible field. Read failures are returned to the
    /// caller. Returns early without error once shutdown is signalled.
    pub async fn write_all<R: ObservationReader>(
        &self,
        reader: &mut R,
        instance_id: &str,
    ) -> io::Result<()> {
        loop {
            let observation = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                next = reader.next_observation() => match next? {
                    Some(observation) => observation,
                    None => return Ok(()),
                },
            };

            let event = ObservationExtracted {
                instance_id: instance_id.to_owned(),
                row: observation.row,
                row_index: observation.row_index,
            };

            let payload = match event.to_avro() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(
                        instance_id,
                        row_index = event.row_index,
                        error = ?e,
                        "failed to encode observation, dropping row"
                    );
                    continue;
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                sent = self.sender.send(payload) => {
                    if sent.is_err() {
                        return Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "publish channel closed",
                        ));
                    }
                }
            }
        }
    }
}
