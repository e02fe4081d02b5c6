//! Filesystem-backed artifact store
//!
//! Object names map onto relative paths under the bucket directory. Writes
//! and copies land in a temp file first and are renamed into place.

use super::{async_trait, ArtifactHandle, ArtifactStore};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

const TEMP_SUFFIX: &str = ".tmp";

/// Store rooted at one bucket directory
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name.ends_with('/') {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
                reason: "object names must not be empty or end with '/'",
            });
        }
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
                reason: "object names must be relative and free of '.' or '..'",
            });
        }
        Ok(self.root.join(relative))
    }

    async fn write_via_temp(&self, name: &str, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(name, e))?;
        }
        let temp = temp_path(target);
        fs::write(&temp, bytes)
            .await
            .map_err(|e| StoreError::io(name, e))?;
        fs::rename(&temp, target)
            .await
            .map_err(|e| StoreError::io(name, e))?;
        Ok(())
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_owned();
    os.push(TEMP_SUFFIX);
    PathBuf::from(os)
}

fn not_found_or_io(name: &str, e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NotFound(name.to_string())
    } else {
        StoreError::io(name, e)
    }
}

/// Birth time where the filesystem records it, modification time otherwise
fn creation_time(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactHandle>, StoreError> {
        let mut handles = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // a bucket that was never written to is simply empty
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(prefix, e))?
            {
                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| StoreError::io(prefix, e))?;
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.ends_with(TEMP_SUFFIX) || !name.starts_with(prefix) {
                    continue;
                }

                let Some(created_at) = creation_time(&metadata) else {
                    debug!(artifact = %name, "No timestamp metadata, skipping");
                    continue;
                };
                handles.push(ArtifactHandle {
                    name,
                    created_at,
                    size_bytes: metadata.len(),
                });
            }
        }

        handles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(handles)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        fs::read(&path).await.map_err(|e| not_found_or_io(name, e))
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        self.write_via_temp(name, &path, bytes).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let src_path = self.path_for(src)?;
        let dst_path = self.path_for(dst)?;
        let bytes = fs::read(&src_path)
            .await
            .map_err(|e| not_found_or_io(src, e))?;
        // replace rather than overwrite so the copy gets a fresh creation time
        match fs::remove_file(&dst_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(dst, e)),
        }
        self.write_via_temp(dst, &dst_path, &bytes).await
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.path_for(name)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(name, e))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(name, e))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
