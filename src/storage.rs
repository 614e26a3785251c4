//! Timetable persistence.
//!
//! [`TimetableStore`] is keyed by `timetableId`. [`FileStore`] writes one
//! pretty-printed `<id>.json` per timetable.

use std::path::{Path, PathBuf};
#[cfg(test)]
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::schema::Timetable;

#[async_trait]
pub trait TimetableStore: Send + Sync {
    /// Insert or overwrite by id.
    async fn save(&self, timetable: &Timetable) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<Timetable>, StorageError>;
    async fn list(&self) -> Result<Vec<String>, StorageError>;
    /// Returns whether a record existed.
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;
}

fn check_id(id: &str) -> Result<(), StorageError> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// JSON file per timetable under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        check_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if tokio::fs::metadata(&self.dir).await.is_err() {
            info!("Creating storage directory: {:?}", self.dir);
            tokio::fs::create_dir_all(&self.dir).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TimetableStore for FileStore {
    async fn save(&self, timetable: &Timetable) -> Result<(), StorageError> {
        let path = self.path_for(&timetable.timetable_id)?;
        self.ensure_dir().await?;

        let json = serde_json::to_string_pretty(timetable)?;
        tokio::fs::write(&path, json).await?;
        info!("Timetable saved: {}", timetable.timetable_id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Timetable>, StorageError> {
        let path = self.path_for(id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Timetable not found: {}", id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        self.ensure_dir().await?;

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        debug!("Listed {} stored timetables", ids.len());
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Timetable deleted: {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Failed to delete timetable: {} (not found)", id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store for tests. A poisoned lock is recovered.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<String, Timetable>>>,
}

#[cfg(test)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl TimetableStore for InMemoryStore {
    async fn save(&self, timetable: &Timetable) -> Result<(), StorageError> {
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        store.insert(timetable.timetable_id.clone(), timetable.clone());
        debug!("InMemoryStore: stored '{}'", timetable.timetable_id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Timetable>, StorageError> {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(store.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = store.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(store.remove(id).is_some())
    }
}
