use std::time::Duration;

use envconfig::Envconfig;

pub use common_kafka::config::{ConsumerConfig, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "21600")]
    pub port: u16,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(
        from = "OBSERVATION_PRODUCER_TOPIC",
        default = "observation-extracted"
    )]
    pub observation_topic: String,

    #[envconfig(from = "REPORT_PRODUCER_TOPIC", default = "report-events")]
    pub report_topic: String,

    #[envconfig(from = "AWS_REGION", default = "eu-west-1")]
    pub aws_region: String,

    // Comma separated list of buckets to provision object store clients for
    // up front. Notifications for other buckets still work, but the client is
    // built on demand and logged as a configuration anomaly.
    #[envconfig(from = "BUCKET_NAMES", default = "csv-exported")]
    pub bucket_names: String,

    #[envconfig(from = "ENCRYPTION_DISABLED", default = "false")]
    pub encryption_disabled: bool,

    #[envconfig(from = "VAULT_ADDR", default = "http://localhost:8200")]
    pub vault_addr: String,

    #[envconfig(from = "VAULT_TOKEN", default = "")]
    pub vault_token: String,

    // Base path under which per-file decryption keys live; the object key is
    // appended to it per notification.
    #[envconfig(from = "VAULT_PATH", default = "secret/shared/psk")]
    pub vault_path: String,

    #[envconfig(from = "PUBLISH_CHANNEL_CAPACITY", default = "1000")]
    pub publish_channel_capacity: usize,

    #[envconfig(from = "GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS", default = "10")]
    pub graceful_shutdown_timeout_seconds: u64,

    #[envconfig(from = "LIVENESS_DEADLINE_SECONDS", default = "30")]
    pub liveness_deadline_seconds: u64,
}

impl Config {
    /// Applies the service's consumer group/topic defaults before reading
    /// the rest of the configuration from the environment.
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ConsumerConfig::set_defaults("dimensions-inserted", "dimensions-inserted");
        Self::init_from_env()
    }

    pub fn buckets(&self) -> Vec<String> {
        self.bucket_names
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_seconds)
    }

    pub fn liveness_deadline(&self) -> Duration {
        Duration::from_secs(self.liveness_deadline_seconds)
    }
}
