//! Manifest validation.
//!
//! Field-level rules come from the resource descriptors; this module adds
//! the manifest-wide checks (naming, duplicates, cluster and retry settings)
//! and reports every problem with its path in the manifest.

use crate::error::{ConfigError, NomadReconcileError, ReconcileError, Result};
use crate::resource::{ResourceKind, DEFAULT_NAMESPACE};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{ManifestConfig, ManifestEntry};

/// Longest name Nomad accepts for policies and namespaces.
const MAX_NAME_LEN: usize = 128;

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The manifest path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest, returning all problems found.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, manifest: &ManifestConfig) -> Result<ValidationResult> {
        let result = self.check(manifest);

        if let Some(first_error) = result.errors.first() {
            return Err(NomadReconcileError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Manifest validation passed");
        Ok(result)
    }

    /// Runs every check without failing on the first error.
    #[must_use]
    pub fn check(&self, manifest: &ManifestConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_cluster(manifest, &mut result);
        Self::validate_retry(manifest, &mut result);
        Self::validate_state(manifest, &mut result);
        Self::validate_entries(&manifest.entries(), &mut result);

        result
    }

    fn validate_cluster(manifest: &ManifestConfig, result: &mut ValidationResult) {
        let address = &manifest.cluster.address;
        if address.is_empty() {
            result.push_error("cluster.address", "Cluster address cannot be empty");
        } else if !address.starts_with("http://") && !address.starts_with("https://") {
            result.push_error(
                "cluster.address",
                format!("Cluster address '{address}' must start with http:// or https://"),
            );
        }

        if manifest.cluster.timeout_secs == 0 {
            result.push_error("cluster.timeout_secs", "Timeout must be at least 1 second");
        }
    }

    fn validate_retry(manifest: &ManifestConfig, result: &mut ValidationResult) {
        let retry = &manifest.retry;
        if retry.max_attempts == 0 {
            result.push_error("retry.max_attempts", "At least one attempt is required");
        }
        if retry.conflict_pattern.is_empty() {
            result.warnings.push(String::from(
                "retry.conflict_pattern is empty; conflicting deletes will not be retried",
            ));
        }
        if retry.interval_secs == 0 && retry.max_attempts > 1 {
            result.warnings.push(String::from(
                "retry.interval_secs is 0; retries will not wait for the cluster",
            ));
        }
    }

    fn validate_state(manifest: &ManifestConfig, result: &mut ValidationResult) {
        if manifest.state.path.trim().is_empty() {
            result.push_error("state.path", "State path cannot be empty");
        }
    }

    fn validate_entries(entries: &[ManifestEntry], result: &mut ValidationResult) {
        let mut seen: HashSet<(ResourceKind, &str)> = HashSet::new();
        let mut index_in_kind = 0;
        let mut previous_kind = None;

        for entry in entries {
            if previous_kind != Some(entry.kind) {
                index_in_kind = 0;
                previous_kind = Some(entry.kind);
            }
            let path = format!("{}[{index_in_kind}]", section(entry.kind));
            index_in_kind += 1;

            Self::validate_handle(entry, &path, result);

            if !entry.handle.is_empty() && !seen.insert((entry.kind, entry.handle.as_str())) {
                let duplicate = ConfigError::DuplicateName {
                    kind: entry.kind,
                    name: entry.handle.clone(),
                };
                result.push_error(format!("{path}.{}", handle_field(entry.kind)), duplicate.to_string());
            }

            for error in entry.kind.descriptor().validation_errors(&entry.desired) {
                if let ReconcileError::Validation { field, message, .. } = error {
                    result.push_error(format!("{path}.{field}"), message);
                }
            }

            Self::collect_warnings(entry, &path, result);
        }
    }

    fn validate_handle(entry: &ManifestEntry, path: &str, result: &mut ValidationResult) {
        let field = format!("{path}.{}", handle_field(entry.kind));
        let handle = entry.handle.as_str();

        if handle.is_empty() {
            result.push_error(field, "Name cannot be empty");
            return;
        }

        let valid = match entry.kind {
            ResourceKind::AclToken => is_valid_handle(handle),
            _ => is_valid_name(handle),
        };
        if !valid {
            let rule = match entry.kind {
                ResourceKind::AclToken => "letters, digits, hyphens and underscores",
                _ => "at most 128 letters, digits and hyphens",
            };
            result.push_error(field, format!("'{handle}' is invalid; use {rule}"));
        }
    }

    fn collect_warnings(entry: &ManifestEntry, path: &str, result: &mut ValidationResult) {
        match entry.kind {
            ResourceKind::Namespace if entry.handle == DEFAULT_NAMESPACE => {
                result.warnings.push(format!(
                    "{path}: the '{DEFAULT_NAMESPACE}' namespace is reset rather than deleted on destroy"
                ));
            }
            ResourceKind::AclToken => {
                let no_policies = entry.desired.get_set("policies").is_none_or(|p| p.is_empty());
                if entry.desired.get_str("type") == Some("client") && no_policies {
                    result
                        .warnings
                        .push(format!("{path}: client token has no policies attached"));
                }
                if entry.desired.get_str("type") == Some("management") && !no_policies {
                    result.warnings.push(format!(
                        "{path}: policies are ignored on management tokens"
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Manifest section holding a kind.
const fn section(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::AclPolicy => "acl_policies",
        ResourceKind::AclToken => "acl_tokens",
        ResourceKind::Namespace => "namespaces",
        ResourceKind::SentinelPolicy => "sentinel_policies",
    }
}

const fn handle_field(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::AclToken => "handle",
        _ => "name",
    }
}

/// Policy and namespace names: 1 to 128 ASCII letters, digits or hyphens.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Token handles are local to the manifest and may also use underscores.
fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ValidationResult {
    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
