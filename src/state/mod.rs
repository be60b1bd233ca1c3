//! State management module.
//!
//! This module persists what the orchestration layer knows about reconciled
//! resources: which identity each manifest entry maps to, the attributes
//! last read back, and a short operation history.

mod store;
mod local;
mod lock;
mod types;

pub use store::StateStore;
pub use local::{LocalStateStore, LOCK_FILE, STATE_FILE};
pub use lock::{LockInfo, LOCK_EXPIRY_SECS, generate_holder_id};
pub use types::{
    HistoryEntry, ReconcileState, ResourceRecord, StateOperation, STATE_VERSION, state_key,
};
