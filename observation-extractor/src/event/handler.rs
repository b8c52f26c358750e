use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::BufReader;
use tracing::{debug, info};

use crate::observation::{CsvReader, MessageWriter};
use crate::schema::FileNotification;
use crate::secrets::{SecretError, SecretStore};
use crate::store::{ClientMap, FileLocation, LocationError, StoreError};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error("failed to read decryption key: {0}")]
    Secret(#[from] SecretError),
    #[error("failed to decode key material: {0}")]
    KeyDecode(#[from] hex::FromHexError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read observations: {0}")]
    Read(#[from] std::io::Error),
}

/// Processing of a single decoded notification.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, notification: &FileNotification) -> Result<(), HandlerError>;
}

/// Extracts observations from the CSV file a notification points at and
/// streams them to the publish channel.
///
/// When a secret store is configured, the per-file key is fetched from
/// `{base_path}/{object key}` as hex text and handed to the object store
/// with the retrieval request.
pub struct CsvHandler {
    clients: Arc<ClientMap>,
    secrets: Option<Arc<dyn SecretStore>>,
    secret_base_path: String,
    writer: MessageWriter,
}

impl CsvHandler {
    pub fn new(
        clients: Arc<ClientMap>,
        secrets: Option<Arc<dyn SecretStore>>,
        secret_base_path: impl Into<String>,
        writer: MessageWriter,
    ) -> Self {
        Self {
            clients,
            secrets,
            secret_base_path: secret_base_path.into(),
            writer,
        }
    }
}

#[async_trait]
impl EventHandler for CsvHandler {
    async fn handle(&self, notification: &FileNotification) -> Result<(), HandlerError> {
        let location = FileLocation::parse(&notification.file_url)?;
        info!(
            instance_id = %notification.instance_id,
            bucket = %location.bucket,
            key = %location.key,
            "getting file"
        );

        let client = self.clients.client_for(&location.bucket);

        let body = match &self.secrets {
            Some(secrets) => {
                let secret_path = format!("{}/{}", self.secret_base_path, location.key);
                let key_hex = secrets.read_key(&secret_path).await?;
                let psk = hex::decode(key_hex)?;
                client.get_with_key(&location.key, &psk).await?
            }
            None => client.get(&location.key).await?,
        };

        // The stream is dropped on every exit path from here on, error or not.
        let mut reader = CsvReader::open(BufReader::new(body)).await?;
        self.writer
            .write_all(&mut reader, &notification.instance_id)
            .await?;

        debug!(instance_id = %notification.instance_id, "observations extracted");
        Ok(())
    }
}
