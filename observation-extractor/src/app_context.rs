use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use health::{HealthHandle, HealthRegistry};
use tracing::{info, warn};

use crate::config::Config;
use crate::secrets::{SecretStore, VaultClient};
use crate::store::{s3_client_map, ClientMap};

/// Shared state assembled once at startup and handed to the worker loops.
pub struct AppContext {
    pub config: Config,
    pub liveness: HealthRegistry,
    pub worker_liveness: HealthHandle,
    pub clients: Arc<ClientMap>,
    pub secrets: Option<Arc<dyn SecretStore>>,
}

impl AppContext {
    pub async fn new(config: Config) -> Self {
        let liveness = HealthRegistry::new("liveness");
        let worker_liveness = liveness.register(
            "extraction",
            config.liveness_deadline() + Duration::from_secs(60),
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;
        let clients = Arc::new(s3_client_map(&sdk_config, &config.buckets()));

        let secrets: Option<Arc<dyn SecretStore>> = if config.encryption_disabled {
            warn!("encryption is disabled, files will be fetched without decryption keys");
            None
        } else {
            info!(address = %config.vault_addr, "using vault for decryption keys");
            Some(Arc::new(VaultClient::new(
                config.vault_addr.clone(),
                config.vault_token.clone(),
            )))
        };

        Self {
            config,
            liveness,
            worker_liveness,
            clients,
            secrets,
        }
    }
}
