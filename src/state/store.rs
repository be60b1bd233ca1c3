//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.

use async_trait::async_trait;

use crate::error::Result;
use super::lock::LockInfo;
use super::types::ReconcileState;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<ReconcileState>>;

    /// Saves the state.
    async fn save(&self, state: &ReconcileState) -> Result<()>;

    /// Deletes the state and any lock.
    async fn delete(&self) -> Result<()>;

    /// Acquires the state lock.
    ///
    /// An empty holder is replaced by a generated one.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases the lock if `lock_id` still owns it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
