//! Nomad API integration module.
//!
//! This module provides the capability interface the reconciler drives,
//! the HTTP client implementing it, and the wire types of the Nomad API.

mod client;
mod types;
mod records;
mod remote;

pub use client::{NomadClient, DEFAULT_TIMEOUT_SECS};
pub use types::{AclPolicy, AclToken, Deployment, Namespace, SentinelPolicy};
pub use records::format_create_time;
pub use remote::RemoteResourceClient;
