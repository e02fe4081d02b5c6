//! In-memory artifact store

use super::{async_trait, ArtifactHandle, ArtifactStore};
use crate::error::StoreError;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Store operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    List,
    Read,
    Write,
    Copy,
    Exists,
    Delete,
}

impl StoreOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::List => "list",
            StoreOperation::Read => "read",
            StoreOperation::Write => "write",
            StoreOperation::Copy => "copy",
            StoreOperation::Exists => "exists",
            StoreOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: StoreOperation,
    name_fragment: String,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    last_created: Option<DateTime<Utc>>,
}

impl State {
    /// Creation times are strictly increasing, even within one clock tick
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(created);
        created
    }
}

/// Map-backed store with fault injection
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    state: RwLock<State>,
    faults: RwLock<Vec<Fault>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with an explicit creation time
    pub async fn insert_at(&self, name: &str, bytes: Vec<u8>, created_at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.last_created = state.last_created.max(Some(created_at));
        state
            .objects
            .insert(name.to_string(), StoredObject { bytes, created_at });
    }

    /// Make every `operation` touching a name containing `name_fragment` fail
    pub async fn fail_on(&self, operation: StoreOperation, name_fragment: &str) {
        self.faults.write().await.push(Fault {
            operation,
            name_fragment: name_fragment.to_string(),
        });
    }

    /// Remove all injected faults
    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    /// Names of all stored objects, sorted
    pub async fn names(&self) -> Vec<String> {
        self.state.read().await.objects.keys().cloned().collect()
    }

    async fn check_fault(&self, operation: StoreOperation, name: &str) -> Result<(), StoreError> {
        let faults = self.faults.read().await;
        let hit = faults
            .iter()
            .any(|f| f.operation == operation && name.contains(&f.name_fragment));
        if hit {
            return Err(StoreError::Injected {
                operation: operation.as_str(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactHandle>, StoreError> {
        self.check_fault(StoreOperation::List, prefix).await?;
        let state = self.state.read().await;
        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, object)| ArtifactHandle {
                name: name.clone(),
                created_at: object.created_at,
                size_bytes: object.bytes.len() as u64,
            })
            .collect())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.check_fault(StoreOperation::Read, name).await?;
        let state = self.state.read().await;
        state
            .objects
            .get(name)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.check_fault(StoreOperation::Write, name).await?;
        let mut state = self.state.write().await;
        let created_at = state.next_created_at();
        state.objects.insert(
            name.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                created_at,
            },
        );
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        self.check_fault(StoreOperation::Copy, src).await?;
        self.check_fault(StoreOperation::Copy, dst).await?;
        let mut state = self.state.write().await;
        let bytes = state
            .objects
            .get(src)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(src.to_string()))?;
        let created_at = state.next_created_at();
        state
            .objects
            .insert(dst.to_string(), StoredObject { bytes, created_at });
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        self.check_fault(StoreOperation::Exists, name).await?;
        Ok(self.state.read().await.objects.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.check_fault(StoreOperation::Delete, name).await?;
        self.state
            .write()
            .await
            .objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MemoryArtifactStore::new();
        store.write("models/stage/a.csv", b"a").await.unwrap();
        store.write("models/prod/b.csv", b"b").await.unwrap();
        store.write("models/stagex/c.csv", b"c").await.unwrap();

        let names: Vec<_> = store
            .list("models/stage/")
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["models/stage/a.csv"]);
    }

    #[tokio::test]
    async fn test_creation_times_strictly_increase() {
        let store = MemoryArtifactStore::new();
        for i in 0..20 {
            store.write(&format!("p/{i:02}"), b"x").await.unwrap();
        }
        let handles = store.list("p/").await.unwrap();
        for pair in handles.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_write_after_future_insert_is_newer() {
        let store = MemoryArtifactStore::new();
        let future = Utc::now() + Duration::days(365);
        store.insert_at("p/a", b"a".to_vec(), future).await;
        store.write("p/b", b"b").await.unwrap();

        let handles = store.list("p/").await.unwrap();
        assert_eq!(handles[0].created_at, future);
        assert!(handles[1].created_at > future);
    }

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let store = MemoryArtifactStore::new();
        store.write("stage/m", b"model").await.unwrap();
        store.copy("stage/m", "prod/m").await.unwrap();

        assert!(store.exists("stage/m").await.unwrap());
        assert_eq!(store.read("prod/m").await.unwrap(), b"model");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = MemoryArtifactStore::new();
        assert!(matches!(store.read("nope").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.copy("nope", "x").await, Err(StoreError::NotFound(_))));
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let store = MemoryArtifactStore::new();
        store.write("stage/e.csv", b"e").await.unwrap();
        store.fail_on(StoreOperation::Copy, "prod/").await;

        let err = store.copy("stage/e.csv", "prod/e.csv").await.unwrap_err();
        assert!(matches!(err, StoreError::Injected { operation: "copy", .. }));

        store.clear_faults().await;
        assert!(store.copy("stage/e.csv", "prod/e.csv").await.is_ok());
    }
}
