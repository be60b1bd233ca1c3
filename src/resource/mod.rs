//! Resource kinds and their static descriptors.
//!
//! Per-kind field rules live here as data; the reconciler is generic over
//! them.

mod descriptor;
mod kinds;
mod state;

use serde::{Deserialize, Serialize};

pub use descriptor::{
    FieldRole, FieldSpec, FieldType, IdentitySource, ProtectedInstance, ResourceDescriptor,
    WriteMode,
};
pub use kinds::{
    ACL_POLICY, ACL_TOKEN, DEFAULT_NAMESPACE, DEFAULT_NAMESPACE_DESCRIPTION, ENFORCEMENT_LEVELS,
    NAMESPACE, SENTINEL_POLICY, SENTINEL_SCOPES, TOKEN_TYPES,
};
pub use state::{DesiredState, FieldMap, FieldValue, RemoteState, SENSITIVE_PLACEHOLDER};

/// A category of remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// ACL policy.
    AclPolicy,
    /// ACL token.
    AclToken,
    /// Namespace.
    Namespace,
    /// Sentinel policy.
    SentinelPolicy,
}

impl ResourceKind {
    /// Every kind, in the order they are applied.
    pub const ALL: [Self; 4] = [
        Self::Namespace,
        Self::AclPolicy,
        Self::SentinelPolicy,
        Self::AclToken,
    ];

    /// Returns the static descriptor for this kind.
    #[must_use]
    pub fn descriptor(self) -> &'static ResourceDescriptor {
        match self {
            Self::AclPolicy => &ACL_POLICY,
            Self::AclToken => &ACL_TOKEN,
            Self::Namespace => &NAMESPACE,
            Self::SentinelPolicy => &SENTINEL_POLICY,
        }
    }

    /// Snake-case name used in manifests, state keys, and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AclPolicy => "acl_policy",
            Self::AclToken => "acl_token",
            Self::Namespace => "namespace",
            Self::SentinelPolicy => "sentinel_policy",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown resource kind '{s}'; expected one of: acl_policy, acl_token, namespace, sentinel_policy"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
            assert_eq!(kind.descriptor().kind, kind);
        }
        assert!("job".parse::<ResourceKind>().is_err());
    }
}
