// src/storage/mod.rs
use crate::core::ledger::LedgerState;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt state: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Where ledger state lives between desk restarts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<LedgerState>, StoreError>;

    async fn save(&self, state: &LedgerState) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file. Saves go to a temp file in the same directory
/// which is then renamed over the old one, so a crash never leaves half a file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self) -> Result<Option<LedgerState>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, &data))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        Ok(())
    }
}

fn replace_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<LedgerState>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self) -> Result<Option<LedgerState>, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::PositionLedger;
    use crate::types::Side;

    fn sample_state() -> LedgerState {
        let mut ledger = PositionLedger::default();
        let id = ledger.open(Side::Long, 10.0, 1.0).unwrap();
        ledger.close(&id, 1.1).unwrap();
        ledger.open(Side::Short, 2.0, 1.2).unwrap();
        ledger.record_lend(100.0);
        ledger.state().clone()
    }

    #[tokio::test]
    async fn json_store_round_trips_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk_state.json");
        let store = JsonFileStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        let state = sample_state();
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));

        tokio::fs::write(&path, "{ broken").await.unwrap();
        assert!(matches!(store.load().await, Err(StoreError::Serde(_))));
    }

    #[tokio::test]
    async fn save_replaces_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk_state.json");
        let store = JsonFileStore::new(&path);

        store.save(&LedgerState::default()).await.unwrap();
        let state = sample_state();
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails_and_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("missing").join("desk_state.json"));
        assert!(matches!(
            store.save(&sample_state()).await,
            Err(StoreError::Io(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn memory_store_keeps_last_save() {
        let store = MemoryStore::default();
        assert!(store.load().await.unwrap().is_none());
        store.save(&LedgerState::default()).await.unwrap();
        let state = sample_state();
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));
    }
}
