//! Descriptors for the four reconciled Nomad resource kinds.

use super::descriptor::{
    FieldRole, FieldSpec, FieldType, IdentitySource, ProtectedInstance, ResourceDescriptor,
    WriteMode,
};
use super::ResourceKind;

/// Name of the namespace Nomad refuses to delete.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Description the default namespace is reset to.
pub const DEFAULT_NAMESPACE_DESCRIPTION: &str = "Default shared namespace";

/// Token types accepted by Nomad.
pub const TOKEN_TYPES: &[&str] = &["client", "management"];

/// Sentinel policy scopes. Only `submit-job` is currently supported.
pub const SENTINEL_SCOPES: &[&str] = &["submit-job"];

/// Sentinel enforcement levels.
pub const ENFORCEMENT_LEVELS: &[&str] = &["advisory", "hard-mandatory", "soft-mandatory"];

/// ACL policy.
pub static ACL_POLICY: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::AclPolicy,
    identity_field: "name",
    identity_source: IdentitySource::CallerSupplied,
    write_mode: WriteMode::FullUpsert,
    protected: None,
    fields: &[
        FieldSpec {
            name: "name",
            role: FieldRole::Identity,
            ty: FieldType::String,
            required: true,
            sensitive: false,
            description: "Unique name for this policy.",
        },
        FieldSpec {
            name: "description",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "Description for this policy.",
        },
        FieldSpec {
            name: "rules_hcl",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: true,
            sensitive: false,
            description: "HCL or JSON representation of the rules to enforce.",
        },
    ],
};

/// ACL token. Identified by the accessor id Nomad generates on create.
pub static ACL_TOKEN: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::AclToken,
    identity_field: "accessor_id",
    identity_source: IdentitySource::ServerGenerated,
    write_mode: WriteMode::PartialPatch,
    protected: None,
    fields: &[
        FieldSpec {
            name: "accessor_id",
            role: FieldRole::Computed,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "Nomad-generated ID for this token.",
        },
        FieldSpec {
            name: "secret_id",
            role: FieldRole::Computed,
            ty: FieldType::String,
            required: false,
            sensitive: true,
            description: "The value that grants access to Nomad.",
        },
        FieldSpec {
            name: "name",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "Human-readable name for this token.",
        },
        FieldSpec {
            name: "type",
            role: FieldRole::Mutable,
            ty: FieldType::Enum(TOKEN_TYPES),
            required: true,
            sensitive: false,
            description: "The type of token to create, 'client' or 'management'.",
        },
        FieldSpec {
            name: "policies",
            role: FieldRole::Mutable,
            ty: FieldType::StringSet,
            required: false,
            sensitive: false,
            description: "The ACL policies to associate with a 'client' token.",
        },
        FieldSpec {
            name: "global",
            role: FieldRole::Immutable,
            ty: FieldType::Bool,
            required: false,
            sensitive: false,
            description: "Whether the token is replicated to all regions.",
        },
        FieldSpec {
            name: "create_time",
            role: FieldRole::Computed,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "The timestamp the token was created.",
        },
    ],
};

/// Namespace. The default namespace can only be reset, never deleted.
pub static NAMESPACE: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::Namespace,
    identity_field: "name",
    identity_source: IdentitySource::CallerSupplied,
    write_mode: WriteMode::FullUpsert,
    protected: Some(ProtectedInstance {
        identity: DEFAULT_NAMESPACE,
        baseline: &[("description", DEFAULT_NAMESPACE_DESCRIPTION), ("quota", "")],
    }),
    fields: &[
        FieldSpec {
            name: "name",
            role: FieldRole::Identity,
            ty: FieldType::String,
            required: true,
            sensitive: false,
            description: "Unique name for this namespace.",
        },
        FieldSpec {
            name: "description",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "Description for this namespace.",
        },
        FieldSpec {
            name: "quota",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "Quota to set for this namespace.",
        },
    ],
};

/// Sentinel (governance) policy.
pub static SENTINEL_POLICY: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::SentinelPolicy,
    identity_field: "name",
    identity_source: IdentitySource::CallerSupplied,
    write_mode: WriteMode::FullUpsert,
    protected: None,
    fields: &[
        FieldSpec {
            name: "name",
            role: FieldRole::Identity,
            ty: FieldType::String,
            required: true,
            sensitive: false,
            description: "Unique name for this policy.",
        },
        FieldSpec {
            name: "description",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: false,
            sensitive: false,
            description: "Description for this policy.",
        },
        FieldSpec {
            name: "scope",
            role: FieldRole::Mutable,
            ty: FieldType::Enum(SENTINEL_SCOPES),
            required: true,
            sensitive: false,
            description: "Scope for this policy.",
        },
        FieldSpec {
            name: "enforcement_level",
            role: FieldRole::Mutable,
            ty: FieldType::Enum(ENFORCEMENT_LEVELS),
            required: true,
            sensitive: false,
            description: "Enforcement level of the policy.",
        },
        FieldSpec {
            name: "policy",
            role: FieldRole::Mutable,
            ty: FieldType::String,
            required: true,
            sensitive: false,
            description: "The Sentinel policy source.",
        },
    ],
};
