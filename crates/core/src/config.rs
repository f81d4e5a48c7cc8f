//! TOML-based project configuration for forgesync.
//!
//! Each managed project carries a `forgesync.toml` next to its metadata
//! file. The `[sync]` section configures the PR-gating policy and the
//! blacklist of file globs excluded from sync commits. Both are required:
//! a missing or malformed section is a fatal configuration error, never
//! replaced by a default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::policy::{Blacklist, SyncPolicy};

/// File name of the per-project configuration file.
pub const CONFIG_FILE: &str = "forgesync.toml";

/// Top-level project configuration loaded from `forgesync.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Sync behaviour settings.
    pub sync: SyncSection,
}

/// The `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Minimum update significance that produces a pull request.
    pub policy: SyncPolicy,

    /// Ordered glob patterns excluded from sync commits. Matching files are
    /// still generated into new projects.
    pub blacklisted_files: Vec<String>,
}

impl ProjectConfig {
    /// Load the configuration file from a project directory.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = project_dir.join(CONFIG_FILE);
        info!(path = %path.display(), "loading project configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: ProjectConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(policy = %config.sync.policy, globs = config.sync.blacklisted_files.len(),
               "project configuration parsed");
        Ok(config)
    }

    /// Compile the blacklist glob set. Malformed patterns are fatal.
    pub fn blacklist(&self) -> Result<Blacklist, ConfigError> {
        Blacklist::new(&self.sync.blacklisted_files)
    }

    /// Load and fully validate (including glob compilation) in one call.
    pub fn load_and_validate(project_dir: &Path) -> Result<(Self, Blacklist), ConfigError> {
        let config = Self::load(project_dir)?;
        let blacklist = config.blacklist()?;
        Ok((config, blacklist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::UpdateTier;

    fn sample_toml() -> &'static str {
        r#"
[sync]
policy = "minor"
blacklisted_files = ["*.md", "docs/**"]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: ProjectConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.sync.policy, SyncPolicy::Minor);
        assert_eq!(config.sync.blacklisted_files, vec!["*.md", "docs/**"]);
        assert!(config.sync.policy.allows(UpdateTier::Minor));
    }

    #[test]
    fn test_load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), sample_toml()).unwrap();

        let config = ProjectConfig::load(dir.path()).expect("load failed");
        assert_eq!(config.sync.policy, SyncPolicy::Minor);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProjectConfig::load(dir.path());
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_policy_is_fatal_not_defaulted() {
        let toml_str = r#"
[sync]
blacklisted_files = []
"#;
        let result: Result<ProjectConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_unrecognized_policy_is_fatal() {
        let toml_str = r#"
[sync]
policy = "always"
blacklisted_files = []
"#;
        let result: Result<ProjectConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_blacklist_section_is_fatal() {
        let toml_str = r#"
[sync]
policy = "patch"
"#;
        let result: Result<ProjectConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_and_validate_compiles_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[sync]
policy = "patch"
blacklisted_files = ["a{b"]
"#,
        )
        .unwrap();

        let result = ProjectConfig::load_and_validate(dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
