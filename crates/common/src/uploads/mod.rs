//! Upload store abstraction
//!
//! Persists binary payloads (paper PDFs, profile images) and hands back a
//! stable locator. The externally visible URL is composed at request time
//! from the configured public base address; only the locator is ever
//! persisted, because the deployment host can change between environments.
//!
//! Two backends:
//! - disk: a local or mounted volume directory
//! - remote: a third-party media host reached over HTTP

use crate::config::UploadConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use regex_lite::Regex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for blob storage backends
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Persist a payload under a unique physical name derived from the
    /// user-supplied one. Returns the locator.
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;

    /// Resolve a locator to a retrievable URL, failing if the blob is gone
    async fn resolve(&self, locator: &str) -> Result<String>;

    /// Compose the public URL for a locator without an existence check.
    /// Used when rendering lists, where a per-row probe would be wasteful.
    fn url_for(&self, locator: &str) -> String;

    /// Read a blob back, for the gateway's file-serving route
    async fn open(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Build the configured backend
pub fn from_config(config: &UploadConfig) -> Result<Arc<dyn UploadStore>> {
    match config.backend.as_str() {
        "disk" => Ok(Arc::new(DiskUploadStore::new(
            config.dir.clone(),
            config.public_base_url.clone(),
        ))),
        "remote" => {
            let endpoint = config.remote_endpoint.clone().ok_or_else(|| {
                AppError::Configuration {
                    message: "uploads.remote_endpoint is required for the remote backend".into(),
                }
            })?;
            Ok(Arc::new(RemoteUploadStore::new(
                endpoint,
                config.remote_api_key.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown upload backend: {other}"),
        }),
    }
}

/// Reduce a user-supplied filename to a safe character set
pub fn sanitize_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

    let safe = unsafe_chars.replace_all(name.trim(), "_");
    let safe = safe.trim_matches(['_', '.']).to_string();
    if safe.is_empty() {
        "upload".to_string()
    } else {
        safe
    }
}

/// Disk-backed upload store
pub struct DiskUploadStore {
    dir: PathBuf,
    public_base_url: String,
    /// Tie-breaker for uploads landing in the same millisecond
    counter: AtomicU64,
}

impl DiskUploadStore {
    pub fn new(dir: PathBuf, public_base_url: String) -> Self {
        Self {
            dir,
            public_base_url,
            counter: AtomicU64::new(0),
        }
    }

    fn unique_name(&self, suggested: &str) -> String {
        let safe = sanitize_name(suggested);
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{millis}-{seq}-{safe}")
    }

    fn blob_path(&self, locator: &str) -> Result<PathBuf> {
        // Locators are generated by unique_name and never contain
        // separators; reject anything else outright.
        if locator.is_empty() || locator.contains('/') || locator.contains("..") {
            return Err(AppError::BlobNotFound {
                locator: locator.to_string(),
            });
        }
        Ok(self.dir.join(locator))
    }
}

#[async_trait]
impl UploadStore for DiskUploadStore {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let locator = self.unique_name(suggested_name);
        let path = self.dir.join(&locator);
        tokio::fs::write(&path, bytes).await?;

        debug!(locator = %locator, size = bytes.len(), "Stored upload");
        Ok(locator)
    }

    async fn resolve(&self, locator: &str) -> Result<String> {
        let path = self.blob_path(locator)?;
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(self.url_for(locator)),
            Err(_) => Err(AppError::BlobNotFound {
                locator: locator.to_string(),
            }),
        }
    }

    fn url_for(&self, locator: &str) -> String {
        format!(
            "{}/files/{}",
            self.public_base_url.trim_end_matches('/'),
            locator
        )
    }

    async fn open(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(locator)?;
        tokio::fs::read(&path)
            .await
            .map_err(|_| AppError::BlobNotFound {
                locator: locator.to_string(),
            })
    }
}

/// Remote media host upload store
pub struct RemoteUploadStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
}

#[derive(serde::Deserialize)]
struct RemoteStoreResponse {
    url: String,
}

impl RemoteUploadStore {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint,
            api_key,
            max_retries,
        }
    }

    async fn upload_once(&self, bytes: &[u8], name: &str) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[("name", name)])
            .body(bytes.to_vec());

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: "media-host".into(),
                message: format!("status {status}: {body}"),
            });
        }

        let parsed: RemoteStoreResponse = response.json().await?;
        Ok(parsed.url)
    }
}

#[async_trait]
impl UploadStore for RemoteUploadStore {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        let name = sanitize_name(suggested_name);
        let mut last_error = None;

        for attempt in 0..self.max_retries.max(1) {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.upload_once(bytes, &name).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Remote upload failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Upstream {
            service: "media-host".into(),
            message: "unknown error after retries".into(),
        }))
    }

    async fn resolve(&self, locator: &str) -> Result<String> {
        // The media host owns availability; its locators are already URLs.
        if locator.starts_with("http://") || locator.starts_with("https://") {
            Ok(locator.to_string())
        } else {
            Err(AppError::BlobNotFound {
                locator: locator.to_string(),
            })
        }
    }

    fn url_for(&self, locator: &str) -> String {
        locator.to_string()
    }

    async fn open(&self, locator: &str) -> Result<Vec<u8>> {
        let url = self.resolve(locator).await?;
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::BlobNotFound {
                locator: locator.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("report 2026.pdf"), "report_2026.pdf");
        assert_eq!(sanitize_name("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_name("???"), "upload");
    }

    #[tokio::test]
    async fn test_store_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskUploadStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_string(),
        );

        let locator = store.store(b"pdf bytes", "brief.pdf").await.unwrap();
        assert!(locator.ends_with("brief.pdf"));

        let url = store.resolve(&locator).await.unwrap();
        assert_eq!(url, format!("http://localhost:8080/files/{locator}"));

        let bytes = store.open(&locator).await.unwrap();
        assert_eq!(bytes, b"pdf bytes");
    }

    #[tokio::test]
    async fn test_concurrent_identical_names_get_unique_locators() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskUploadStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_string(),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.store(b"same", "report.pdf").await.unwrap()
            }));
        }

        let mut locators = Vec::new();
        for handle in handles {
            locators.push(handle.await.unwrap());
        }
        locators.sort();
        locators.dedup();
        assert_eq!(locators.len(), 8);
    }

    #[tokio::test]
    async fn test_resolve_missing_blob_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskUploadStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_string(),
        );

        let err = store.resolve("nope.pdf").await.unwrap_err();
        assert!(matches!(err, AppError::BlobNotFound { .. }));
    }

    #[test]
    fn test_base_url_composition_trims_slash() {
        let store = DiskUploadStore::new(PathBuf::from("/tmp"), "https://cdn.example.org/".into());
        assert_eq!(
            store.url_for("1-0-brief.pdf"),
            "https://cdn.example.org/files/1-0-brief.pdf"
        );
    }
}
