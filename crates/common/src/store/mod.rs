//! Flat-file document stores
//!
//! The portal's database is a pair of JSON documents rewritten wholesale on
//! every mutation:
//! - the main document (papers, profiles, access requests)
//! - the chat history document (messages, user snapshots)
//!
//! Callers only see `read`/`mutate` on whole documents, never raw file
//! handles. A per-store async mutex serializes writers, so interleaved
//! mutations cannot silently clobber each other, and writes go through a
//! temp-file rename so the document on disk is always parseable.

mod chat;

pub use chat::{ChatDocument, ChatHistoryStore};

use crate::errors::{AppError, Result};
use crate::models::{AccessRequest, Paper, Profile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// The main portal document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub papers: Vec<Paper>,
    pub profiles: BTreeMap<String, Profile>,
    pub access_requests: Vec<AccessRequest>,
}

/// Store for the main portal document
pub struct FlatFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FlatFileStore {
    /// Create a store backed by the given path. The file is created lazily
    /// on the first mutation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document. An absent file yields the empty document;
    /// unparseable content fails with `CorruptStore` for this request only,
    /// so a later repair of the file gets a fresh chance.
    pub async fn load(&self) -> Result<Document> {
        load_document(&self.path).await
    }

    /// Read through a borrowed view of the document
    pub async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Document) -> T,
    {
        let doc = self.load().await?;
        Ok(f(&doc))
    }

    /// Whole-document read-modify-write. The store mutex is held across
    /// the load and the write, so concurrent mutations are applied one at
    /// a time instead of racing on last-writer-wins.
    pub async fn mutate<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T>,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let out = f(&mut doc)?;
        persist(&self.path, &doc).await?;
        Ok(out)
    }

    /// Round-trip check used by the readiness probe
    pub async fn ping(&self) -> Result<()> {
        self.load().await.map(|_| ())
    }
}

pub(crate) async fn load_document<D>(path: &Path) -> Result<D>
where
    D: Default + for<'de> Deserialize<'de>,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Store file absent, starting empty");
            return Ok(D::default());
        }
        Err(e) => {
            return Err(AppError::Store {
                message: format!("failed to read {}: {}", path.display(), e),
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| AppError::CorruptStore {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Serialize and replace the document on disk. The write lands in a temp
/// file first and is renamed into place, so readers never observe a
/// half-written document.
pub(crate) async fn persist<D: Serialize>(path: &Path, doc: &D) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
