//! Manifest parser for loading configuration files.
//!
//! This module handles loading the manifest from YAML files and applying
//! the standard Nomad environment variables on top of it.

use crate::error::{ConfigError, NomadReconcileError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ManifestConfig;

/// Environment variable overriding `cluster.address`.
pub const ENV_ADDRESS: &str = "NOMAD_ADDR";

/// Environment variable overriding `cluster.region`.
pub const ENV_REGION: &str = "NOMAD_REGION";

/// Environment variable holding the ACL token secret.
pub const ENV_TOKEN: &str = "NOMAD_TOKEN";

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path used to look for `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ManifestConfig> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(NomadReconcileError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            NomadReconcileError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ManifestConfig> {
        debug!("Parsing YAML manifest");

        let manifest: ManifestConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!("line {}, column {}", l.line(), l.column()));
            let location = match (source, location) {
                (Some(p), Some(l)) => Some(format!("{}:{l}", p.display())),
                (Some(p), None) => Some(p.display().to_string()),
                (None, l) => l,
            };
            NomadReconcileError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed manifest with {} resources",
            manifest.resource_count()
        );
        Ok(manifest)
    }

    /// Loads a manifest and applies `NOMAD_ADDR` and `NOMAD_REGION`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ManifestConfig> {
        let mut manifest = self.load_file(path)?;
        Self::apply_overrides(&mut manifest, |name| std::env::var(name).ok());
        Ok(manifest)
    }

    /// Applies overrides from a variable lookup.
    pub fn apply_overrides(manifest: &mut ManifestConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup(ENV_ADDRESS).filter(|v| !v.is_empty()) {
            debug!("Overriding cluster.address from environment");
            manifest.cluster.address = address;
        }

        if let Some(region) = lookup(ENV_REGION).filter(|v| !v.is_empty()) {
            debug!("Overriding cluster.region from environment");
            manifest.cluster.region = Some(region);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                NomadReconcileError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the ACL token from the environment, if set.
    #[must_use]
    pub fn nomad_token() -> Option<String> {
        std::env::var(ENV_TOKEN).ok().filter(|t| !t.is_empty())
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["nomad-reconcile.yaml", "nomad-reconcile.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(NomadReconcileError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn test_parse_minimal_manifest() {
        let parser = ConfigParser::new();
        let manifest = parser.parse_yaml("{}", None).expect("empty manifest is valid");

        assert_eq!(manifest.cluster.address, "http://127.0.0.1:4646");
        assert_eq!(manifest.cluster.timeout_secs, 30);
        assert_eq!(manifest.retry.max_attempts, 10);
        assert_eq!(manifest.retry.interval_secs, 5);
        assert_eq!(manifest.state.path, ".nomad-reconcile");
        assert_eq!(manifest.resource_count(), 0);
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
cluster:
  address: https://nomad.example.com:4646
  region: eu
retry:
  max_attempts: 4
  interval_secs: 2
acl_policies:
  - name: readonly
    description: Read-only access
    rules_hcl: |
      namespace "default" {
        policy = "read"
      }
acl_tokens:
  - handle: ci
    name: CI runner
    type: client
    policies: [readonly]
namespaces:
  - name: batch
    description: Batch jobs
sentinel_policies:
  - name: readonly
    scope: submit-job
    enforcement_level: soft-mandatory
    policy: main = rule { true }
"#;
        let manifest = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("manifest should parse");

        assert_eq!(manifest.cluster.region.as_deref(), Some("eu"));
        assert_eq!(manifest.retry.max_attempts, 4);
        assert_eq!(manifest.retry.conflict_pattern, "has non-terminal jobs");
        assert_eq!(manifest.acl_tokens[0].token_type, "client");
        assert!(manifest.acl_policies[0].rules_hcl.contains("policy = \"read\""));
        assert_eq!(manifest.handles(ResourceKind::SentinelPolicy), vec!["readonly"]);
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let yaml = "namespaces:\n  - name: batch\n    owner: ops\n";
        let err = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect_err("owner is not a namespace field");
        assert!(matches!(
            err,
            NomadReconcileError::Config(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = ManifestConfig::default();
        ConfigParser::apply_overrides(&mut manifest, |name| match name {
            ENV_ADDRESS => Some(String::from("http://10.0.0.5:4646")),
            ENV_REGION => Some(String::new()),
            _ => None,
        });
        assert_eq!(manifest.cluster.address, "http://10.0.0.5:4646");
        assert!(manifest.cluster.region.is_none());
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("create nested dirs");
        std::fs::write(dir.path().join("nomad-reconcile.yaml"), "{}").expect("write manifest");

        let found = find_config_file(&nested).expect("manifest should be found");
        assert_eq!(found, dir.path().join("nomad-reconcile.yaml"));
    }
}
