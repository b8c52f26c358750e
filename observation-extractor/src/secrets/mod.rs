//! Per-file decryption key retrieval from the secret store.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("secret store request failed: {0}")]
    RequestFailed(String),
    #[error("secret at {0} has no 'key' field")]
    MissingKeyField(String),
}

/// Capability contract for the secret store: read the hex-encoded key
/// material stored at a path. Keys are fetched per file and never cached.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read_key(&self, path: &str) -> Result<String, SecretError>;
}

/// Vault KV client. The secret at `{path}` is expected to hold a single
/// `key` field with the hex-encoded bytes.
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: String,
}

impl VaultClient {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            address: address.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn read_key(&self, path: &str) -> Result<String, SecretError> {
        let url = format!("{}/v1/{}", self.address.trim_end_matches('/'), path);

        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| SecretError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::NotFound(path.to_string()));
        }

        let body: serde_json::Value = response
            .error_for_status()
            .map_err(|e| SecretError::RequestFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| SecretError::RequestFailed(e.to_string()))?;

        body.pointer("/data/key")
            .and_then(|key| key.as_str())
            .map(str::to_owned)
            .ok_or_else(|| SecretError::MissingKeyField(path.to_string()))
    }
}

/// In-memory secret store for testing, always available.
#[derive(Default)]
pub struct MockSecretStore {
    secrets: HashMap<String, String>,
}

impl MockSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, path: &str, value: &str) -> Self {
        self.secrets.insert(path.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn read_key(&self, path: &str) -> Result<String, SecretError> {
        self.secrets
            .get(path)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vault_client_reads_key_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/secret/shared/psk/v4-1234.csv")
            .match_header("X-Vault-Token", "token-1")
            .with_status(200)
            .with_body(r#"{"data": {"key": "0a1b2c"}}"#)
            .create_async()
            .await;

        let client = VaultClient::new(server.url(), "token-1");
        let key = client.read_key("secret/shared/psk/v4-1234.csv").await.unwrap();
        assert_eq!(key, "0a1b2c");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn vault_client_maps_missing_secret_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/secret/shared/psk/absent.csv")
            .with_status(404)
            .create_async()
            .await;

        let client = VaultClient::new(server.url(), "token-1");
        let err = client.read_key("secret/shared/psk/absent.csv").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn vault_client_rejects_secret_without_key_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/secret/shared/psk/odd.csv")
            .with_status(200)
            .with_body(r#"{"data": {"other": "value"}}"#)
            .create_async()
            .await;

        let client = VaultClient::new(server.url(), "token-1");
        let err = client.read_key("secret/shared/psk/odd.csv").await.unwrap_err();
        assert!(matches!(err, SecretError::MissingKeyField(_)));
    }

    #[tokio::test]
    async fn mock_store_round_trips() {
        let store = MockSecretStore::new().with_key("secret/shared/psk/file.csv", "abcd");
        assert_eq!(
            store.read_key("secret/shared/psk/file.csv").await.unwrap(),
            "abcd"
        );
        assert!(store.read_key("secret/other").await.is_err());
    }
}
