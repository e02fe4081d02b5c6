//! Artifact storage
//!
//! Every pipeline component reaches object storage through the
//! [`ArtifactStore`] trait. The store is built once at startup and shared as
//! an `Arc<dyn ArtifactStore>`; backends are:
//! - local filesystem (one directory per bucket)
//! - Google Cloud Storage JSON API
//! - in-memory map (tests and ephemeral runs)

mod gcs;
mod local;
mod memory;

pub use gcs::{GcsArtifactStore, GcsConfig, DEFAULT_GCS_ENDPOINT};
pub use local::LocalArtifactStore;
pub use memory::{MemoryArtifactStore, StoreOperation};

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Reference to an object located in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Full object name, including the namespace prefix
    pub name: String,
    /// Creation time as reported by the store
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl ArtifactHandle {
    /// Last path component of the object name
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Key/blob store with creation-time metadata and in-bucket copy
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List objects whose name starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactHandle>, StoreError>;

    /// Read an object's bytes
    async fn read(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or replace an object
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Copy an object within the store; the source is left untouched
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError>;

    /// Check whether an object exists
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Remove an object
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// Backend selection for [`create_store`]
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Local { root: PathBuf, bucket: String },
    Gcs(GcsConfig),
    Memory,
}

/// Build the configured store
pub fn create_store(backend: StoreBackend) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    match backend {
        StoreBackend::Local { root, bucket } => {
            tracing::info!(root = %root.display(), bucket = %bucket, "Using local artifact store");
            Ok(Arc::new(LocalArtifactStore::new(root.join(bucket))))
        }
        StoreBackend::Gcs(config) => {
            tracing::info!(bucket = %config.bucket, endpoint = %config.endpoint, "Using GCS artifact store");
            Ok(Arc::new(GcsArtifactStore::new(config)?))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory artifact store, artifacts are lost on restart");
            Ok(Arc::new(MemoryArtifactStore::new()))
        }
    }
}

/// Delete `name` if present, then write it
pub async fn replace(store: &dyn ArtifactStore, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
    if store.exists(name).await? {
        tracing::info!(artifact = %name, "Artifact already exists, deleting old object");
        store.delete(name).await?;
    }
    store.write(name, bytes).await
}

/// Latest object under `prefix` whose name ends with `suffix`, by store creation time
pub async fn latest_with_suffix(
    store: &dyn ArtifactStore,
    prefix: &str,
    suffix: &str,
) -> Result<Option<ArtifactHandle>, StoreError> {
    let mut latest: Option<ArtifactHandle> = None;
    for handle in store.list(prefix).await? {
        if !handle.name.ends_with(suffix) {
            continue;
        }
        // strict comparison keeps the first listed object on ties
        let newer = latest
            .as_ref()
            .map_or(true, |current| handle.created_at > current.created_at);
        if newer {
            latest = Some(handle);
        }
    }
    Ok(latest)
}
