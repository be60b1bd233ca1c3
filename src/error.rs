//! Error types for the Nomad reconciliation system.
//!
//! This module provides the error hierarchy for every layer of the tool:
//! manifest configuration, local state, the Nomad API, and the
//! reconciliation core itself.

use std::path::PathBuf;
use thiserror::Error;

use crate::resource::ResourceKind;

/// The main error type for the Nomad reconciliation system.
#[derive(Debug, Error)]
pub enum NomadReconcileError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Nomad API errors.
    #[error("Nomad API error: {0}")]
    Remote(#[from] RemoteError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest file could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {kind} entry: {name}")]
    DuplicateName {
        /// Kind of resource.
        kind: ResourceKind,
        /// The duplicated name or handle.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State file could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// The lock file could not be written or removed.
    #[error("Failed to manage state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors returned by a remote resource client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The addressed object does not exist (HTTP 404).
    #[error("{kind} '{identity}' not found")]
    NotFound {
        /// What was being looked up.
        kind: String,
        /// Identity that was not found.
        identity: String,
    },

    /// Authentication failed.
    #[error("Nomad authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Nomad API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with Nomad: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from Nomad API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A desired state failed local validation. Never retried.
    #[error("Invalid {kind} field '{field}': {message}")]
    Validation {
        /// Kind of resource.
        kind: ResourceKind,
        /// Offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The server refused the operation for a permanent reason.
    #[error("Nomad rejected {operation} of {kind} '{identity}': {source}")]
    RemoteRejected {
        /// Kind of resource.
        kind: ResourceKind,
        /// Identity of the resource, or the requested name for creates.
        identity: String,
        /// Lifecycle operation that failed.
        operation: Operation,
        /// Attempts made, including conflicting ones before the refusal.
        attempts: u32,
        /// Conflict messages from earlier attempts, in order.
        conflicts: Vec<String>,
        /// Underlying client error.
        #[source]
        source: RemoteError,
    },

    /// A single attempt hit the dependent-entity conflict.
    #[error("Transient conflict on attempt {attempt} for {kind} '{identity}': {message}")]
    TransientConflict {
        /// Kind of resource.
        kind: ResourceKind,
        /// Identity of the resource.
        identity: String,
        /// Attempt number (1-based).
        attempt: u32,
        /// Server message.
        message: String,
    },

    /// The conflict persisted past the retry cap.
    #[error("Too many failures attempting to delete {kind} '{identity}' ({attempts} attempts): {last_message}")]
    RetriesExhausted {
        /// Kind of resource.
        kind: ResourceKind,
        /// Identity of the resource.
        identity: String,
        /// Number of attempts made.
        attempts: u32,
        /// Message from the last conflict.
        last_message: String,
    },

    /// The identity does not exist where it had to.
    #[error("{kind} '{identity}' not found")]
    NotFound {
        /// Kind of resource.
        kind: ResourceKind,
        /// Identity that was not found.
        identity: String,
    },

    /// An update would change an identity field.
    #[error("Changing '{field}' of {kind} '{identity}' requires replacement")]
    RequiresReplacement {
        /// Kind of resource.
        kind: ResourceKind,
        /// Identity of the existing resource.
        identity: String,
        /// Field whose change forces replacement.
        field: String,
    },
}

/// Lifecycle phase an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create (or upsert on create).
    Create,
    /// Read one object.
    Read,
    /// Update an existing object.
    Update,
    /// Delete (or reset) an object.
    Delete,
    /// Import by identity.
    Import,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        f.write_str(s)
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, NomadReconcileError>;

/// Result type of the per-resource lifecycle operations.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

impl NomadReconcileError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error may succeed when tried again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::NetworkError { .. })
                | Self::Reconcile(
                    ReconcileError::RetriesExhausted { .. }
                        | ReconcileError::TransientConflict { .. }
                )
        )
    }

    /// Returns the reconciliation error, if this is one.
    #[must_use]
    pub const fn as_reconcile(&self) -> Option<&ReconcileError> {
        match self {
            Self::Reconcile(e) => Some(e),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a lock error with the given message.
    #[must_use]
    pub fn lock(message: impl Into<String>) -> Self {
        Self::LockFailed {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            identity: identity.into(),
        }
    }

    /// Returns true for the 404-equivalent class.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The server-side message carried by this error.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ApiRequestFailed { message, .. }
            | Self::AuthenticationFailed { message }
            | Self::NetworkError { message }
            | Self::InvalidResponse { message } => message.clone(),
            Self::NotFound { .. } => self.to_string(),
        }
    }
}

impl ReconcileError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(
        kind: ResourceKind,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            kind,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the resource kind this error is about.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Validation { kind, .. }
            | Self::RemoteRejected { kind, .. }
            | Self::TransientConflict { kind, .. }
            | Self::RetriesExhausted { kind, .. }
            | Self::NotFound { kind, .. }
            | Self::RequiresReplacement { kind, .. } => *kind,
        }
    }
}
