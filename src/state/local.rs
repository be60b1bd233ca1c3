//! Local file-based state storage backend.
//!
//! State lives in `<dir>/state.json`, written through a temporary file and
//! renamed into place. The lock sits next to it in `<dir>/state.lock`.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{NomadReconcileError, Result, StateError};

use super::lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
use super::store::StateStore;
use super::types::{ReconcileState, STATE_VERSION};

/// State file name.
pub const STATE_FILE: &str = "state.json";

/// Lock file name.
pub const LOCK_FILE: &str = "state.lock";

/// Local file-based state store.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    /// Directory holding the state files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Path of the state file.
    #[must_use]
    pub const fn state_path(&self) -> &PathBuf {
        &self.state_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StateError::write(format!("Failed to create state directory: {e}"))
            })?;
        }
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| StateError::corrupted(format!("Failed to read lock file: {e}")))?;

        let lock_info: LockInfo = serde_json::from_str(&content)
            .map_err(|e| StateError::corrupted(format!("Failed to parse lock file: {e}")))?;

        Ok(Some(lock_info))
    }

    async fn write_lock_file(&self, lock_info: &LockInfo) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        let mut file = fs::File::create(&self.lock_path)
            .await
            .map_err(|e| StateError::lock(format!("Failed to create lock file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::lock(format!("Failed to write lock file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::lock(format!("Failed to sync lock file: {e}")))?;

        Ok(())
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)
                .await
                .map_err(|e| StateError::lock(format!("Failed to delete lock file: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<ReconcileState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| StateError::corrupted(format!("Failed to read state file: {e}")))?;

        let state: ReconcileState = serde_json::from_str(&content)
            .map_err(|e| StateError::corrupted(format!("Failed to parse state file: {e}")))?;

        if state.version != STATE_VERSION {
            return Err(NomadReconcileError::State(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }));
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &ReconcileState) -> Result<()> {
        self.ensure_dir().await?;

        info!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create temp state file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("Failed to write state file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename state file: {e}")))?;

        debug!("State saved with {} resources", state.resources.len());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| StateError::write(format!("Failed to delete state file: {e}")))?;
        }

        self.delete_lock_file().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(NomadReconcileError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock held by {} found, taking over", existing.holder);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        self.write_lock_file(&lock_info).await?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{FieldMap, RemoteState, ResourceKind};
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join(".nomad-reconcile"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = ReconcileState::new("http://127.0.0.1:4646");
        let mut fields = FieldMap::new();
        fields.insert("name".into(), "batch".into());
        state.record("batch", &RemoteState::new(ResourceKind::Namespace, "batch", fields));
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.cluster, "http://127.0.0.1:4646");
        assert_eq!(
            loaded
                .get(ResourceKind::Namespace, "batch")
                .map(|r| r.identity.as_str()),
            Some("batch")
        );
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.expect("Load should not fail").is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (store, _temp) = create_test_store();
        let mut state = ReconcileState::new("http://127.0.0.1:4646");
        state.version = String::from("0.1");
        store.save(&state).await.expect("Failed to save state");

        let err = store.load().await.expect_err("old state is rejected");
        assert!(matches!(
            err,
            NomadReconcileError::State(StateError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("test-holder")
            .await
            .expect("Failed to acquire lock");
        assert!(store.get_lock_info().await.expect("lock info").is_some());

        store
            .release_lock(&lock.lock_id)
            .await
            .expect("Failed to release lock");
        assert!(store.get_lock_info().await.expect("lock info").is_none());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let first = store
            .acquire_lock("holder-1")
            .await
            .expect("Failed to acquire first lock");

        let err = store
            .acquire_lock("holder-2")
            .await
            .expect_err("second holder must wait");
        assert!(err.to_string().contains("holder-1"));

        store.release_lock("someone-else").await.expect("mismatch is ignored");
        assert_eq!(
            store.get_lock_info().await.expect("lock info").map(|l| l.lock_id),
            Some(first.lock_id)
        );
    }
}
