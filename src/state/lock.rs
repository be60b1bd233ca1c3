//! State locking for concurrent access protection.
//!
//! A lock stops two runs from writing the same state file at once. Locks
//! expire so that a crashed run does not block the next one forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Information about a state lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lock for a holder.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} held by {} since {}",
            self.lock_id,
            self.holder,
            self.acquired_at.to_rfc3339()
        )?;
        if self.is_expired() {
            write!(f, " (expired)")
        } else {
            write!(f, " ({}s left)", self.remaining_secs())
        }
    }
}

/// Generates a holder identifier for the current process:
/// `<hostname>-<pid>-<uuid prefix>`.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());
    let pid = std::process::id();
    let uuid = Uuid::new_v4().simple().to_string();

    format!("{hostname}-{pid}-{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lock_is_live() {
        let lock = LockInfo::new("ci");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > LOCK_EXPIRY_SECS - 5);
        assert!(lock.to_string().contains("held by ci"));
    }

    #[test]
    fn test_expired_lock() {
        let mut lock = LockInfo::new("ci");
        lock.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(lock.is_expired());
        assert_eq!(lock.remaining_secs(), 0);
        assert!(lock.to_string().ends_with("(expired)"));
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();
        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }
}
