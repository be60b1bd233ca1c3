//! Manifest configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `nomad-reconcile.yaml`
//! - Applying `NOMAD_*` environment overrides
//! - Validating entries against the resource descriptors

mod spec;
mod parser;
mod validator;

pub use spec::{
    AclPolicyConfig, AclTokenConfig, ClusterConfig, ManifestConfig, ManifestEntry,
    NamespaceConfig, RetryConfig, SentinelPolicyConfig, StateConfig, DEFAULT_ADDRESS,
    DEFAULT_STATE_DIR,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_ADDRESS, ENV_REGION, ENV_TOKEN, find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
