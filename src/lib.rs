// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # nomad-reconcile
//!
//! Declarative, idempotent reconciliation of HashiCorp Nomad configuration
//! resources: ACL policies, ACL tokens, namespaces and Sentinel policies.
//!
//! ## Overview
//!
//! A manifest declares the desired resources. Each run converges the
//! cluster onto it, and running it again changes nothing. Objects that
//! cannot be deleted yet (a namespace that still has jobs) are retried on a
//! bounded schedule, and the built-in `default` namespace is reset instead
//! of deleted.
//!
//! ## Architecture
//!
//! 1. **Descriptors** ([`resource`]): one static declaration per kind.
//! 2. **Remote client** ([`nomad`]): the Nomad HTTP API behind a trait.
//! 3. **Reconciler** ([`reconciler`]): generic create / read / update /
//!    delete / import with the retry policy.
//! 4. **Orchestration** ([`config`], [`state`], [`planner`], [`cli`]):
//!    manifest, recorded identities, plans and the command line.
//! 5. **Listings** ([`listing`]): read-only regions, namespaces and
//!    deployments.
//!
//! ## Example
//!
//! ```yaml
//! cluster:
//!   address: "http://127.0.0.1:4646"
//!
//! namespaces:
//!   - name: batch
//!     description: Batch workloads
//!
//! acl_policies:
//!   - name: readonly
//!     rules_hcl: 'namespace "*" { policy = "read" }'
//!
//! acl_tokens:
//!   - handle: ci
//!     type: client
//!     policies: [readonly]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod listing;
pub mod nomad;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ManifestConfig};
pub use error::{NomadReconcileError, ReconcileError, RemoteError, Result};
pub use listing::{Listing, ListingKind, ListingProjector};
pub use nomad::{NomadClient, RemoteResourceClient};
pub use planner::{ApplyPlan, ExecutionResult, PlanExecutor};
pub use reconciler::{ReconciliationResult, Reconciler, RetryPolicy, Sleeper};
pub use resource::{DesiredState, RemoteState, ResourceDescriptor, ResourceKind};
pub use state::{LocalStateStore, ReconcileState, StateStore};
