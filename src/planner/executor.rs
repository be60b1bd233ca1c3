//! Plan executor.
//!
//! This module runs planned actions through the reconciler one at a time,
//! records what was read back into the state, and turns each outcome into a
//! [`ReconciliationResult`].

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Operation, ReconcileResult, Result};
use crate::nomad::RemoteResourceClient;
use crate::reconciler::{
    DeleteOutcome, Reconciler, ReconciliationResult, RetryPolicy, Sleeper, TokioSleeper,
};
use crate::resource::{DesiredState, RemoteState, ResourceKind};
use crate::state::{state_key, HistoryEntry, ReconcileState, StateOperation};

use super::plan::{ActionType, ApplyPlan, Observed, PlannedAction};

/// Executor for apply and destroy plans.
pub struct PlanExecutor<'a, C: RemoteResourceClient + ?Sized> {
    /// Cluster client.
    client: &'a C,
    /// Retry policy handed to every reconciler.
    retry: RetryPolicy,
    /// Sleeper handed to every reconciler.
    sleeper: Arc<dyn Sleeper>,
    /// Whether to continue after a failed action.
    continue_on_error: bool,
}

/// Result of executing an entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Per-action outcomes, in execution order.
    pub results: Vec<ReconciliationResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of actions not run after a failure.
    pub skipped: usize,
    /// Number of actions that had nothing to do.
    pub unchanged: usize,
    /// Whether every action succeeded.
    pub success: bool,
}

impl<'a, C: RemoteResourceClient + ?Sized> PlanExecutor<'a, C> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            continue_on_error: false,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the sleeper used between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    fn reconciler(&self, kind: ResourceKind) -> Reconciler<'a, C> {
        Reconciler::for_kind(self.client, kind)
            .with_retry(self.retry.clone())
            .with_sleeper(Arc::clone(&self.sleeper))
    }

    /// Reads every recorded resource back from the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails for any reason other than absence.
    pub async fn refresh(&self, state: &ReconcileState) -> Result<Observed> {
        let mut observed = Observed::new();
        for record in state.resources.values() {
            let remote = self.reconciler(record.kind).read(&record.identity).await?;
            if remote.is_none() {
                warn!(
                    "{} '{}' ({}) no longer exists on the cluster",
                    record.kind, record.handle, record.identity
                );
            }
            observed.insert(state_key(record.kind, &record.handle), remote);
        }
        Ok(observed)
    }

    /// Executes a plan, updating `state` after every successful action.
    pub async fn execute(
        &self,
        plan: &ApplyPlan,
        state: &mut ReconcileState,
        operation: StateOperation,
    ) -> ExecutionResult {
        info!("Executing plan with {} actions", plan.actions.len());

        let mut results = Vec::new();
        let mut unchanged = 0;
        let mut skipped = 0;
        let mut stopped = false;

        for action in &plan.actions {
            if action.action_type == ActionType::Noop {
                unchanged += 1;
                if action.desired.is_none() {
                    state.remove(action.kind, &action.handle);
                }
                continue;
            }
            if stopped {
                warn!("Skipping {} after an earlier failure", action.description());
                skipped += 1;
                continue;
            }

            info!("{}", action.description());
            let result = self.execute_action(action, state).await;
            if !result.success {
                error!("{result}");
                stopped = !self.continue_on_error;
            }
            results.push(result);
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;

        let keys = plan
            .changes()
            .map(|a| state_key(a.kind, &a.handle))
            .collect();
        let entry = if failed == 0 {
            HistoryEntry::new(operation, keys)
        } else {
            let first = results
                .iter()
                .find(|r| !r.success)
                .and_then(|r| r.diagnostics.first())
                .map_or_else(String::new, |d| d.summary.clone());
            HistoryEntry::failed(operation, keys, &first)
        };
        state.add_history(entry);

        ExecutionResult {
            successful,
            failed,
            skipped,
            unchanged,
            success: failed == 0 && skipped == 0,
            results,
        }
    }

    async fn execute_action(
        &self,
        action: &PlannedAction,
        state: &mut ReconcileState,
    ) -> ReconciliationResult {
        let operation = match action.action_type {
            ActionType::Create | ActionType::Replace => Operation::Create,
            ActionType::Update => Operation::Update,
            ActionType::Delete | ActionType::Noop => Operation::Delete,
        };

        match self.run_action(action, state).await {
            Ok(result) => result,
            Err(err) => ReconciliationResult::failed(
                action.kind,
                action.identity.clone(),
                operation,
                &err,
            ),
        }
    }

    async fn run_action(
        &self,
        action: &PlannedAction,
        state: &mut ReconcileState,
    ) -> ReconcileResult<ReconciliationResult> {
        let reconciler = self.reconciler(action.kind);
        let empty = DesiredState::new();
        let desired = action.desired.as_ref().unwrap_or(&empty);

        match (action.action_type, action.identity.as_deref()) {
            (ActionType::Update, Some(identity)) => {
                let remote = reconciler.update(identity, desired).await?;
                state.record(&action.handle, &remote);
                Ok(Self::applied(&remote, Operation::Update))
            }
            (ActionType::Replace, Some(identity)) => {
                reconciler.validate(desired)?;
                let outcome = reconciler.delete(identity).await?;
                state.remove(action.kind, &action.handle);
                let remote = reconciler.create(desired).await?;
                state.record(&action.handle, &remote);
                Ok(Self::with_conflicts(
                    Self::applied(&remote, Operation::Create)
                        .with_warning(format!("Replaced {identity}"), action.reason.clone()),
                    &outcome,
                ))
            }
            (ActionType::Delete, Some(identity)) => {
                let outcome = reconciler.delete(identity).await?;
                state.remove(action.kind, &action.handle);
                let mut result = ReconciliationResult::succeeded(
                    action.kind,
                    identity,
                    Operation::Delete,
                    outcome.attempts,
                );
                if outcome.reset {
                    result = result.with_warning(
                        format!("{} '{identity}' was reset to its defaults", action.kind),
                        "this object cannot be deleted",
                    );
                }
                if outcome.already_absent {
                    result = result.with_warning(
                        format!("{} '{identity}' was already gone", action.kind),
                        "",
                    );
                }
                Ok(Self::with_conflicts(result, &outcome))
            }
            (ActionType::Create | ActionType::Replace | ActionType::Update, _) => {
                let remote = reconciler.create(desired).await?;
                state.record(&action.handle, &remote);
                Ok(Self::applied(&remote, Operation::Create))
            }
            (ActionType::Delete | ActionType::Noop, _) => {
                state.remove(action.kind, &action.handle);
                Ok(ReconciliationResult::succeeded(
                    action.kind,
                    action.handle.clone(),
                    Operation::Delete,
                    0,
                ))
            }
        }
    }

    /// Adopts an existing object under `handle`, returning its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing exists under `identity`.
    pub async fn import(
        &self,
        kind: ResourceKind,
        handle: &str,
        identity: &str,
        state: &mut ReconcileState,
    ) -> ReconcileResult<DesiredState> {
        let snapshot = self.reconciler(kind).import(identity).await?;
        state.record(
            handle,
            &RemoteState::new(kind, identity, snapshot.fields().clone()),
        );
        state.add_history(HistoryEntry::new(
            StateOperation::Import,
            vec![state_key(kind, handle)],
        ));
        Ok(snapshot)
    }

    fn applied(remote: &RemoteState, operation: Operation) -> ReconciliationResult {
        ReconciliationResult::succeeded(remote.kind, remote.identity.clone(), operation, 1)
    }

    fn with_conflicts(
        mut result: ReconciliationResult,
        outcome: &DeleteOutcome,
    ) -> ReconciliationResult {
        for (attempt, message) in outcome.conflicts.iter().enumerate() {
            result = result.with_warning(
                format!("Attempt {} conflicted, retried", attempt + 1),
                message.clone(),
            );
        }
        result
    }
}

impl ExecutionResult {
    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }

    /// The first failure, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&ReconciliationResult> {
        self.results.iter().find(|r| !r.success)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped, {} unchanged",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped,
            self.unchanged
        )
    }
}
