//! State types for tracking reconciled resources.
//!
//! The state maps each manifest entry to the identity Nomad knows it by,
//! together with the attributes last read back. It is the only place a
//! token's server-generated accessor id is remembered between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::{FieldMap, RemoteState, ResourceKind};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete reconciliation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileState {
    /// State format version.
    pub version: String,
    /// Address of the cluster the state belongs to.
    pub cluster: String,
    /// Recorded resources keyed by `<kind>.<handle>`.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// One reconciled resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Manifest handle (the name, or a token's handle).
    pub handle: String,
    /// Identity on the cluster.
    pub identity: String,
    /// Attributes as last read back, computed ones included.
    pub attributes: FieldMap,
    /// When the resource was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StateOperation,
    /// State keys affected.
    pub resources: Vec<String>,
    /// Whether every step succeeded.
    pub success: bool,
    /// First error message, if any.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateOperation {
    /// Manifest applied.
    Apply,
    /// Resources destroyed.
    Destroy,
    /// Existing object adopted.
    Import,
    /// Record dropped without touching the cluster.
    Forget,
}

/// Builds the state key of a resource.
#[must_use]
pub fn state_key(kind: ResourceKind, handle: &str) -> String {
    format!("{kind}.{handle}")
}

impl ReconcileState {
    /// Creates an empty state for a cluster.
    #[must_use]
    pub fn new(cluster: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            cluster: cluster.to_string(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record.
    #[must_use]
    pub fn get(&self, kind: ResourceKind, handle: &str) -> Option<&ResourceRecord> {
        self.resources.get(&state_key(kind, handle))
    }

    /// Records the state read back from the cluster, keeping the original
    /// creation time if the handle was already known.
    pub fn record(&mut self, handle: &str, remote: &RemoteState) {
        let now = Utc::now();
        let key = state_key(remote.kind, handle);
        let created_at = self.resources.get(&key).map_or(now, |r| r.created_at);
        self.resources.insert(
            key,
            ResourceRecord {
                kind: remote.kind,
                handle: handle.to_string(),
                identity: remote.identity.clone(),
                attributes: remote.fields.clone(),
                created_at,
                updated_at: now,
            },
        );
        self.last_updated = now;
    }

    /// Removes a record.
    pub fn remove(&mut self, kind: ResourceKind, handle: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(&state_key(kind, handle));
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Records of one kind, in key order.
    pub fn records_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceRecord> {
        self.resources.values().filter(move |r| r.kind == kind)
    }

    /// Finds the handle recorded for an identity.
    #[must_use]
    pub fn handle_for(&self, kind: ResourceKind, identity: &str) -> Option<&str> {
        self.records_of(kind)
            .find(|r| r.identity == identity)
            .map(|r| r.handle.as_str())
    }

    /// Adds a history entry, dropping the oldest past the cap.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceRecord {
    /// Rebuilds the remote snapshot this record was taken from.
    #[must_use]
    pub fn to_remote(&self) -> RemoteState {
        RemoteState::new(self.kind, self.identity.clone(), self.attributes.clone())
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: StateOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: StateOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for StateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Import => "import",
            Self::Forget => "forget",
        };
        write!(f, "{op}")
    }
}
