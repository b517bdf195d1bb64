//! Remote artifact store client.
//!
//! Pure transfer: fetch and push named blobs. No retries; the lifecycle
//! coordinator falls back to local copies when a transfer fails.

use crate::artifacts::{ArtifactKind, ArtifactNames};
use crate::config::StoreConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Named blob storage shared with the offline training pipeline
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    async fn push(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// Object-storage REST client (`/storage/v1/object/{bucket}/{name}`)
pub struct RemoteArtifactStore {
    client: Client,
    base_url: Option<String>,
    service_key: Option<String>,
    bucket: String,
    timeout: Duration,
}

impl RemoteArtifactStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config
                .url
                .as_deref()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            service_key: config.service_key.clone().filter(|k| !k.is_empty()),
            bucket: config.bucket.clone(),
            timeout,
        })
    }

    /// Whether both URL and key are present
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.service_key.is_some()
    }

    fn endpoint(&self, name: &str) -> Result<(String, &str), StoreError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(StoreError::MissingCredentials("store url"))?;
        let key = self
            .service_key
            .as_deref()
            .ok_or(StoreError::MissingCredentials("service key"))?;

        Ok((
            format!("{}/storage/v1/object/{}/{}", base, self.bucket, name),
            key,
        ))
    }

    fn map_send_error(&self, name: &str, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(name.to_string(), self.timeout)
        } else {
            StoreError::Request(err)
        }
    }

    fn check_status(name: &str, status: StatusCode) -> Result<(), StoreError> {
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(StoreError::NotFound(name.to_string()))
        } else {
            Err(StoreError::Status {
                name: name.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl ArtifactStore for RemoteArtifactStore {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let (url, key) = self.endpoint(name)?;
        debug!(artifact = %name, url = %url, "Fetching artifact");

        let response = self
            .client
            .get(&url)
            .bearer_auth(key)
            .header("apikey", key)
            .send()
            .await
            .map_err(|e| self.map_send_error(name, e))?;

        Self::check_status(name, response.status())?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(name, e))?;
        Ok(bytes.to_vec())
    }

    async fn push(&self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let (url, key) = self.endpoint(name)?;
        let size = bytes.len();

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .header("apikey", key)
            .header("x-upsert", "true")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.map_send_error(name, e))?;

        Self::check_status(name, response.status())?;
        debug!(artifact = %name, bytes = size, "Pushed artifact");
        Ok(())
    }
}

/// Outcome of publishing one local artifact
#[derive(Debug)]
pub enum PublishOutcome {
    Uploaded { bytes: usize },
    SkippedMissing,
    Failed(StoreError),
}

/// Upload every artifact present in `dir`, overwriting remote copies.
/// Absent files are skipped; a failure on one file does not stop the rest.
pub async fn publish_local_artifacts(
    store: &dyn ArtifactStore,
    dir: &Path,
    names: &ArtifactNames,
) -> Vec<(ArtifactKind, PublishOutcome)> {
    let mut outcomes = Vec::new();

    for (kind, name) in names.all() {
        let path = dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(artifact = %name, "Skipping artifact not found locally");
                outcomes.push((kind, PublishOutcome::SkippedMissing));
                continue;
            }
            Err(e) => {
                outcomes.push((kind, PublishOutcome::Failed(StoreError::Io(e))));
                continue;
            }
        };

        let size = bytes.len();
        match store.push(name, bytes).await {
            Ok(()) => {
                info!(artifact = %name, bytes = size, "Uploaded artifact");
                outcomes.push((kind, PublishOutcome::Uploaded { bytes: size }));
            }
            Err(e) => {
                warn!(artifact = %name, error = %e, "Artifact upload failed");
                outcomes.push((kind, PublishOutcome::Failed(e)));
            }
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: Option<String>) -> StoreConfig {
        StoreConfig {
            url,
            service_key: Some("service-key".to_string()),
            bucket: "model-registry".to_string(),
            timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/model-registry/model_signature.json"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("apikey", "service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{\"feature_order\": []}".to_vec()))
            .mount(&server)
            .await;

        let store = RemoteArtifactStore::new(&config(Some(server.uri()))).unwrap();
        let bytes = store.fetch("model_signature.json").await.unwrap();
        assert_eq!(bytes, b"{\"feature_order\": []}");
    }

    #[tokio::test]
    async fn test_fetch_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/model-registry/missing.csv"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/model-registry/broken.csv"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = RemoteArtifactStore::new(&config(Some(server.uri()))).unwrap();
        assert!(matches!(store.fetch("missing.csv").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.fetch("broken.csv").await,
            Err(StoreError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let store = RemoteArtifactStore::new(&config(None)).unwrap();
        assert!(!store.is_configured());
        assert!(matches!(
            store.fetch("model.onnx").await,
            Err(StoreError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_uploads_present_files_with_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-upsert", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let names = ArtifactNames::default();
        std::fs::write(dir.path().join(&names.model), b"model").unwrap();
        std::fs::write(dir.path().join(&names.signature), b"{}").unwrap();

        let store = RemoteArtifactStore::new(&config(Some(server.uri()))).unwrap();
        let outcomes = publish_local_artifacts(&store, dir.path(), &names).await;

        assert_eq!(outcomes.len(), 4);
        assert!(matches!(outcomes[0], (ArtifactKind::Model, PublishOutcome::Uploaded { bytes: 5 })));
        assert!(matches!(outcomes[2], (ArtifactKind::Baseline, PublishOutcome::SkippedMissing)));
        assert!(matches!(outcomes[3], (ArtifactKind::Explainer, PublishOutcome::SkippedMissing)));
    }
}
