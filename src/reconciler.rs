//! Reconciler for a single resource kind.
//!
//! This module implements the per-resource lifecycle (validate, create,
//! read, update, delete, import) over a [`RemoteResourceClient`], including
//! the bounded retry used while the server refuses a delete because
//! dependent state still exists.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Operation, ReconcileError, ReconcileResult, RemoteError};
use crate::nomad::RemoteResourceClient;
use crate::resource::{
    DesiredState, IdentitySource, RemoteState, ResourceDescriptor, ResourceKind,
};

/// Default number of attempts for a conflicting delete.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default wait between conflicting attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Server message Nomad returns while a namespace still has jobs.
pub const DEFAULT_CONFLICT_PATTERN: &str = "has non-terminal jobs";

/// Decides whether a remote error is a transient dependent-entity conflict.
pub trait ConflictMatcher: Send + Sync {
    /// Returns true if the error should be retried.
    fn is_conflict(&self, error: &RemoteError) -> bool;
}

impl<F> ConflictMatcher for F
where
    F: Fn(&RemoteError) -> bool + Send + Sync,
{
    fn is_conflict(&self, error: &RemoteError) -> bool {
        self(error)
    }
}

/// Matches errors whose server message contains a fixed substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringMatcher {
    pattern: String,
}

impl SubstringMatcher {
    /// Creates a matcher for the given substring.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl ConflictMatcher for SubstringMatcher {
    fn is_conflict(&self, error: &RemoteError) -> bool {
        !error.is_not_found() && !self.pattern.is_empty() && error.message().contains(&self.pattern)
    }
}

/// Waits between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the current operation for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded linear retry for conflicting deletes and resets.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub interval: Duration,
    matcher: Arc<dyn ConflictMatcher>,
}

impl RetryPolicy {
    /// Creates a policy with the given cap and interval and the default matcher.
    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            matcher: Arc::new(SubstringMatcher::new(DEFAULT_CONFLICT_PATTERN)),
        }
    }

    /// Replaces the conflict matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: impl ConflictMatcher + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Replaces the conflict matcher with a substring match.
    #[must_use]
    pub fn with_pattern(self, pattern: &str) -> Self {
        self.with_matcher(SubstringMatcher::new(pattern))
    }

    /// Returns true if the error is a transient conflict.
    #[must_use]
    pub fn is_conflict(&self, error: &RemoteError) -> bool {
        self.matcher.is_conflict(error)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// What a delete actually did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    /// Attempts made, the successful one included.
    pub attempts: u32,
    /// The protected instance was reset instead of removed.
    pub reset: bool,
    /// The object was already gone.
    pub already_absent: bool,
    /// Server messages of the conflicting attempts.
    pub conflicts: Vec<String>,
}

/// Drives the lifecycle of one resource kind.
pub struct Reconciler<'a, C: RemoteResourceClient + ?Sized> {
    /// Cluster client.
    client: &'a C,
    /// Field rules of the kind.
    descriptor: &'static ResourceDescriptor,
    /// Retry policy for deletes and resets.
    retry: RetryPolicy,
    /// Wait implementation.
    sleeper: Arc<dyn Sleeper>,
}

impl<'a, C: RemoteResourceClient + ?Sized> Reconciler<'a, C> {
    /// Creates a reconciler for a descriptor.
    #[must_use]
    pub fn new(client: &'a C, descriptor: &'static ResourceDescriptor) -> Self {
        Self {
            client,
            descriptor,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Creates a reconciler for a kind.
    #[must_use]
    pub fn for_kind(client: &'a C, kind: ResourceKind) -> Self {
        Self::new(client, kind.descriptor())
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The kind this reconciler manages.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.descriptor.kind
    }

    /// Validates a desired state without touching the cluster.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for the first offending field.
    pub fn validate(&self, desired: &DesiredState) -> ReconcileResult<()> {
        self.descriptor.validate(desired)
    }

    /// Creates the object and returns its authoritative state.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before any remote call, `RemoteRejected` if the
    /// server refuses, or `NotFound` if the object cannot be read back.
    pub async fn create(&self, desired: &DesiredState) -> ReconcileResult<RemoteState> {
        self.validate(desired)?;

        let kind = self.kind();
        let label = self.label(desired);
        let record = self.descriptor.create_record(desired);

        info!("Creating {kind} '{label}'");
        let echoed = self
            .client
            .create(kind, &record)
            .await
            .map_err(|source| self.rejected(Operation::Create, &label, source))?;

        let identity = match self.descriptor.identity_source {
            IdentitySource::CallerSupplied => label,
            IdentitySource::ServerGenerated => echoed
                .get(self.descriptor.identity_field)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    self.rejected(
                        Operation::Create,
                        &label,
                        RemoteError::InvalidResponse {
                            message: format!(
                                "create response carried no {}",
                                self.descriptor.identity_field
                            ),
                        },
                    )
                })?,
        };

        debug!("Created {kind} '{identity}', reading back");
        self.read_back(&identity).await
    }

    /// Reads the object. Absence is `None`, not an error.
    ///
    /// # Errors
    ///
    /// Returns `RemoteRejected` for any failure other than not-found.
    pub async fn read(&self, identity: &str) -> ReconcileResult<Option<RemoteState>> {
        let kind = self.kind();
        debug!("Reading {kind} '{identity}'");
        match self.client.info(kind, identity).await {
            Ok(fields) => Ok(Some(RemoteState::new(kind, identity, fields))),
            Err(err) if err.is_not_found() => {
                debug!("{kind} '{identity}' does not exist");
                Ok(None)
            }
            Err(err) => Err(self.rejected(Operation::Read, identity, err)),
        }
    }

    /// Updates the object in place and returns its authoritative state.
    ///
    /// # Errors
    ///
    /// Returns `Validation` before any remote call, `RequiresReplacement` if
    /// the desired state names a different identity, `RemoteRejected` if the
    /// server refuses, or `NotFound` if the object cannot be read back.
    pub async fn update(
        &self,
        identity: &str,
        desired: &DesiredState,
    ) -> ReconcileResult<RemoteState> {
        self.validate(desired)?;

        let kind = self.kind();
        if let Some(given) = self.descriptor.identity_of(desired)
            && given != identity
        {
            return Err(ReconcileError::RequiresReplacement {
                kind,
                identity: identity.to_string(),
                field: self.descriptor.identity_field.to_string(),
            });
        }

        let record = self.descriptor.update_record(identity, desired);
        info!("Updating {kind} '{identity}'");
        self.client
            .update(kind, identity, &record)
            .await
            .map_err(|source| self.rejected(Operation::Update, identity, source))?;

        self.read_back(identity).await
    }

    /// Deletes the object, retrying while the server reports a transient
    /// conflict. The protected instance is reset to its baseline instead.
    ///
    /// # Errors
    ///
    /// Returns `RetriesExhausted` once the cap is reached, or
    /// `RemoteRejected` immediately for any non-conflict failure.
    pub async fn delete(&self, identity: &str) -> ReconcileResult<DeleteOutcome> {
        let kind = self.kind();

        if let Some(baseline) = self.descriptor.baseline_state(identity) {
            info!("{kind} '{identity}' cannot be deleted, resetting it to its baseline");
            let record = self.descriptor.update_record(identity, &baseline);
            let (_, attempts, conflicts) = self
                .retrying(identity, || self.client.update(kind, identity, &record))
                .await?;
            return Ok(DeleteOutcome {
                attempts,
                reset: true,
                already_absent: false,
                conflicts,
            });
        }

        info!("Deleting {kind} '{identity}'");
        let (existed, attempts, conflicts) = self
            .retrying(identity, || async {
                match self.client.delete(kind, identity).await {
                    Ok(()) => Ok(true),
                    Err(err) if err.is_not_found() => Ok(false),
                    Err(err) => Err(err),
                }
            })
            .await?;

        if !existed {
            debug!("{kind} '{identity}' was already absent");
        }

        Ok(DeleteOutcome {
            attempts,
            reset: false,
            already_absent: !existed,
            conflicts,
        })
    }

    /// Imports an existing object by identity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing exists under the identity.
    pub async fn import(&self, identity: &str) -> ReconcileResult<DesiredState> {
        info!("Importing {} '{identity}'", self.kind());
        self.read(identity)
            .await?
            .map(|state| state.to_desired())
            .ok_or_else(|| ReconcileError::NotFound {
                kind: self.kind(),
                identity: identity.to_string(),
            })
    }

    async fn read_back(&self, identity: &str) -> ReconcileResult<RemoteState> {
        self.read(identity)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: self.kind(),
                identity: identity.to_string(),
            })
    }

    /// Runs `call` until it succeeds, fails permanently, or the cap is hit.
    async fn retrying<T, F, Fut>(
        &self,
        identity: &str,
        mut call: F,
    ) -> ReconcileResult<(T, u32, Vec<String>)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let kind = self.kind();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut conflicts = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok((value, attempt, conflicts)),
                Err(err) if self.retry.is_conflict(&err) => {
                    let conflict = ReconcileError::TransientConflict {
                        kind,
                        identity: identity.to_string(),
                        attempt,
                        message: err.message(),
                    };
                    warn!("{conflict}");
                    conflicts.push(err.message());

                    if attempt >= max_attempts {
                        return Err(ReconcileError::RetriesExhausted {
                            kind,
                            identity: identity.to_string(),
                            attempts: attempt,
                            last_message: err.message(),
                        });
                    }

                    debug!(
                        "Retrying {kind} '{identity}' in {:?} ({attempt}/{max_attempts})",
                        self.retry.interval
                    );
                    self.sleeper.sleep(self.retry.interval).await;
                }
                Err(source) => {
                    return Err(ReconcileError::RemoteRejected {
                        kind,
                        identity: identity.to_string(),
                        operation: Operation::Delete,
                        attempts: attempt,
                        conflicts,
                        source,
                    });
                }
            }
        }
    }

    fn label(&self, desired: &DesiredState) -> String {
        self.descriptor
            .identity_of(desired)
            .or_else(|| desired.get_str("name"))
            .unwrap_or_default()
            .to_string()
    }

    fn rejected(&self, operation: Operation, identity: &str, source: RemoteError) -> ReconcileError {
        ReconcileError::RemoteRejected {
            kind: self.kind(),
            identity: identity.to_string(),
            operation,
            attempts: 1,
            conflicts: Vec::new(),
            source,
        }
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Info,
    /// The operation succeeded but something needs attention.
    Warning,
    /// The operation failed.
    Error,
}

/// One message attached to a reconciliation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// How serious it is.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Underlying detail, usually the server message.
    pub detail: String,
}

/// Outcome of one reconciliation operation on one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Final identity, if one is known.
    pub identity: Option<String>,
    /// Operation that was run.
    pub operation: Operation,
    /// Remote attempts made.
    pub attempts: u32,
    /// Ordered diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl ReconciliationResult {
    /// A successful outcome.
    #[must_use]
    pub fn succeeded(
        kind: ResourceKind,
        identity: impl Into<String>,
        operation: Operation,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            kind,
            identity: Some(identity.into()),
            operation,
            attempts,
            diagnostics: Vec::new(),
        }
    }

    /// A failed outcome carrying the error as a diagnostic.
    #[must_use]
    pub fn failed(
        kind: ResourceKind,
        identity: Option<String>,
        operation: Operation,
        error: &ReconcileError,
    ) -> Self {
        let attempts = match error {
            ReconcileError::RetriesExhausted { attempts, .. }
            | ReconcileError::RemoteRejected { attempts, .. } => *attempts,
            ReconcileError::Validation { .. } => 0,
            _ => 1,
        };
        let detail = match error {
            ReconcileError::RemoteRejected { source, .. } => source.message(),
            ReconcileError::RetriesExhausted { last_message, .. } => last_message.clone(),
            other => other.to_string(),
        };
        let mut diagnostics = Vec::new();
        if let ReconcileError::RemoteRejected { conflicts, .. } = error {
            for (attempt, message) in conflicts.iter().enumerate() {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    summary: format!("Attempt {} conflicted, retried", attempt + 1),
                    detail: message.clone(),
                });
            }
        }
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            summary: error.to_string(),
            detail,
        });
        Self {
            success: false,
            kind,
            identity,
            operation,
            attempts,
            diagnostics,
        }
    }

    /// Appends a warning.
    #[must_use]
    pub fn with_warning(mut self, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        });
        self
    }

    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "ok" } else { "failed" };
        write!(
            f,
            "{} {} '{}': {status} after {} attempt(s)",
            self.operation,
            self.kind,
            self.identity.as_deref().unwrap_or("?"),
            self.attempts
        )?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {:?}: {}", diagnostic.severity, diagnostic.summary)?;
        }
        Ok(())
    }
}
