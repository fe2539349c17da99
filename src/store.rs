//! Persistence Boundary
//!
//! Opaque get/put/delete of named session snapshots. The engine never
//! depends on the storage medium; callers pick an implementation.

use crate::error::{EngineError, Result};
use crate::session::SessionState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<SessionState>>;
    async fn put(&self, name: &str, session: &SessionState) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// In-memory store; snapshots live as JSON blobs so restores go through
/// the same serialization path as durable stores.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<SessionState>> {
        let blob = self.inner.lock().unwrap().get(name).cloned();
        match blob {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, name: &str, session: &SessionState) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.inner.lock().unwrap().insert(name.to_string(), json);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.lock().unwrap().remove(name);
        Ok(())
    }
}

/// One JSON file per snapshot under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let safe = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if name.is_empty() || !safe {
            return Err(EngineError::Store(format!(
                "invalid snapshot name '{}'",
                name
            )));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn get(&self, name: &str) -> Result<Option<SessionState>> {
        let path = self.path_for(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, session: &SessionState) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
