use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::{ObjectStore, S3ObjectStore};

type StoreFactory = Box<dyn Fn(&str) -> Arc<dyn ObjectStore> + Send + Sync>;

/// Per-bucket object store clients, provisioned up front from configuration.
///
/// A notification can still reference a bucket that was never configured;
/// that gets a client built on demand, logged as configuration drift so
/// operators notice the gap.
pub struct ClientMap {
    clients: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    factory: StoreFactory,
}

impl ClientMap {
    pub fn new(
        clients: HashMap<String, Arc<dyn ObjectStore>>,
        factory: impl Fn(&str) -> Arc<dyn ObjectStore> + Send + Sync + 'static,
    ) -> Self {
        Self {
            clients: Mutex::new(clients),
            factory: Box::new(factory),
        }
    }

    pub fn client_for(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        let mut clients = self.clients.lock().expect("poisoned ClientMap lock");

        if let Some(client) = clients.get(bucket) {
            return client.clone();
        }

        warn!(
            bucket,
            "no object store client provisioned for bucket, creating one on demand"
        );
        let client = (self.factory)(bucket);
        clients.insert(bucket.to_string(), client.clone());
        client
    }
}

/// Builds the client map for the given buckets over a shared S3 client.
pub fn s3_client_map(sdk_config: &aws_config::SdkConfig, buckets: &[String]) -> ClientMap {
    let client = aws_sdk_s3::Client::new(sdk_config);

    let clients = buckets
        .iter()
        .map(|bucket| {
            let store: Arc<dyn ObjectStore> =
                Arc::new(S3ObjectStore::new(client.clone(), bucket.clone()));
            (bucket.clone(), store)
        })
        .collect();

    let factory_client = client.clone();
    ClientMap::new(clients, move |bucket| {
        Arc::new(S3ObjectStore::new(factory_client.clone(), bucket))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockObjectStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn provisioned_client_is_reused() {
        let mut clients: HashMap<String, Arc<dyn ObjectStore>> = HashMap::new();
        clients.insert("configured".to_string(), Arc::new(MockObjectStore::new()));

        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let map = ClientMap::new(clients, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(MockObjectStore::new())
        });

        map.client_for("configured");
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn s3_map_provisions_configured_buckets() {
        let sdk_config = aws_config::SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("eu-west-1"))
            .build();

        let map = s3_client_map(&sdk_config, &["csv-exported".to_string()]);

        // Both lookups return without touching the network; the second one
        // takes the on-demand branch.
        map.client_for("csv-exported");
        map.client_for("surprise");
    }

    #[test]
    fn unknown_bucket_gets_a_client_built_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let map = ClientMap::new(HashMap::new(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(MockObjectStore::new())
        });

        map.client_for("surprise");
        map.client_for("surprise");
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
