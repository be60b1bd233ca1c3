//! Manifest specification types.
//!
//! This module defines the structs that map to `nomad-reconcile.yaml`.
//! Resource entries are converted into [`DesiredState`] snapshots that the
//! reconciler validates and transmits.

use serde::{Deserialize, Serialize};

use crate::reconciler::{RetryPolicy, DEFAULT_CONFLICT_PATTERN};
use crate::resource::{DesiredState, ResourceKind};

/// Default Nomad agent address.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:4646";

/// Default directory for local state.
pub const DEFAULT_STATE_DIR: &str = ".nomad-reconcile";

/// The root manifest structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestConfig {
    /// Cluster connection settings.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Retry policy for conflicting deletes.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Local state settings.
    #[serde(default)]
    pub state: StateConfig,
    /// ACL policies.
    #[serde(default)]
    pub acl_policies: Vec<AclPolicyConfig>,
    /// ACL tokens.
    #[serde(default)]
    pub acl_tokens: Vec<AclTokenConfig>,
    /// Namespaces.
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
    /// Sentinel policies.
    #[serde(default)]
    pub sentinel_policies: Vec<SentinelPolicyConfig>,
}

/// Cluster connection settings. The ACL token is only read from the
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Nomad agent address.
    #[serde(default = "default_address")]
    pub address: String,
    /// Region to target.
    #[serde(default)]
    pub region: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per delete.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds between attempts.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Server message substring that marks a transient conflict.
    #[serde(default = "default_conflict_pattern")]
    pub conflict_pattern: String,
}

/// Local state settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Directory holding `state.json` and `state.lock`.
    #[serde(default = "default_state_path")]
    pub path: String,
}

/// An ACL policy entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AclPolicyConfig {
    /// Unique policy name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Policy rules in HCL or JSON.
    #[serde(default)]
    pub rules_hcl: String,
}

/// An ACL token entry. Tokens are addressed by a manifest-local handle
/// because Nomad generates their identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AclTokenConfig {
    /// Manifest-local handle.
    pub handle: String,
    /// Human-readable token name.
    #[serde(default)]
    pub name: String,
    /// `client` or `management`.
    #[serde(rename = "type", default)]
    pub token_type: String,
    /// Attached policy names.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Replicate to all regions. Changing it replaces the token.
    #[serde(default)]
    pub global: bool,
}

/// A namespace entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    /// Unique namespace name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Quota specification to attach.
    #[serde(default)]
    pub quota: String,
}

/// A Sentinel policy entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SentinelPolicyConfig {
    /// Unique policy name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Scope, currently only `submit-job`.
    #[serde(default)]
    pub scope: String,
    /// Enforcement level.
    #[serde(default)]
    pub enforcement_level: String,
    /// Sentinel source.
    #[serde(default)]
    pub policy: String,
}

/// One declared resource, ready for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Name for caller-identified kinds, handle for tokens.
    pub handle: String,
    /// Desired state.
    pub desired: DesiredState,
}

fn default_address() -> String {
    String::from(DEFAULT_ADDRESS)
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_interval_secs() -> u64 {
    5
}

fn default_conflict_pattern() -> String {
    String::from(DEFAULT_CONFLICT_PATTERN)
}

fn default_state_path() -> String {
    String::from(DEFAULT_STATE_DIR)
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            region: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_secs: default_interval_secs(),
            conflict_pattern: default_conflict_pattern(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl RetryConfig {
    /// Builds the retry policy these settings describe.
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            std::time::Duration::from_secs(self.interval_secs),
        )
        .with_pattern(&self.conflict_pattern)
    }
}

impl AclPolicyConfig {
    /// Converts the entry into a desired state.
    #[must_use]
    pub fn to_desired(&self) -> DesiredState {
        DesiredState::new()
            .with("name", self.name.as_str())
            .with("description", self.description.as_str())
            .with("rules_hcl", self.rules_hcl.as_str())
    }
}

impl AclTokenConfig {
    /// Converts the entry into a desired state. The handle is not sent.
    #[must_use]
    pub fn to_desired(&self) -> DesiredState {
        DesiredState::new()
            .with("name", self.name.as_str())
            .with("type", self.token_type.as_str())
            .with("policies", self.policies.clone())
            .with("global", self.global)
    }
}

impl NamespaceConfig {
    /// Converts the entry into a desired state.
    #[must_use]
    pub fn to_desired(&self) -> DesiredState {
        DesiredState::new()
            .with("name", self.name.as_str())
            .with("description", self.description.as_str())
            .with("quota", self.quota.as_str())
    }
}

impl SentinelPolicyConfig {
    /// Converts the entry into a desired state.
    #[must_use]
    pub fn to_desired(&self) -> DesiredState {
        DesiredState::new()
            .with("name", self.name.as_str())
            .with("description", self.description.as_str())
            .with("scope", self.scope.as_str())
            .with("enforcement_level", self.enforcement_level.as_str())
            .with("policy", self.policy.as_str())
    }
}

impl ManifestConfig {
    /// All declared resources, namespaces first and tokens last.
    #[must_use]
    pub fn entries(&self) -> Vec<ManifestEntry> {
        let mut entries = Vec::with_capacity(self.resource_count());
        for kind in ResourceKind::ALL {
            match kind {
                ResourceKind::Namespace => entries.extend(self.namespaces.iter().map(|n| {
                    ManifestEntry {
                        kind,
                        handle: n.name.clone(),
                        desired: n.to_desired(),
                    }
                })),
                ResourceKind::AclPolicy => entries.extend(self.acl_policies.iter().map(|p| {
                    ManifestEntry {
                        kind,
                        handle: p.name.clone(),
                        desired: p.to_desired(),
                    }
                })),
                ResourceKind::SentinelPolicy => {
                    entries.extend(self.sentinel_policies.iter().map(|p| ManifestEntry {
                        kind,
                        handle: p.name.clone(),
                        desired: p.to_desired(),
                    }));
                }
                ResourceKind::AclToken => entries.extend(self.acl_tokens.iter().map(|t| {
                    ManifestEntry {
                        kind,
                        handle: t.handle.clone(),
                        desired: t.to_desired(),
                    }
                })),
            }
        }
        entries
    }

    /// Total number of declared resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.acl_policies.len()
            + self.acl_tokens.len()
            + self.namespaces.len()
            + self.sentinel_policies.len()
    }

    /// Handles declared for a kind, in manifest order.
    #[must_use]
    pub fn handles(&self, kind: ResourceKind) -> Vec<&str> {
        match kind {
            ResourceKind::AclPolicy => self.acl_policies.iter().map(|p| p.name.as_str()).collect(),
            ResourceKind::AclToken => self.acl_tokens.iter().map(|t| t.handle.as_str()).collect(),
            ResourceKind::Namespace => self.namespaces.iter().map(|n| n.name.as_str()).collect(),
            ResourceKind::SentinelPolicy => self
                .sentinel_policies
                .iter()
                .map(|p| p.name.as_str())
                .collect(),
        }
    }
}
