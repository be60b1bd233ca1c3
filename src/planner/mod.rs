//! Planning module for apply and destroy runs.
//!
//! This module maps a manifest and the recorded state onto reconciler
//! calls, and executes the resulting plan.

mod plan;
mod executor;

pub use plan::{ActionType, ApplyPlan, Observed, PlannedAction};
pub use executor::{ExecutionResult, PlanExecutor};
