//! Per-project metadata file handling.
//!
//! Every generated project carries a `.forgesync.toml` at its root recording
//! which template it was generated from, the answers given at generation
//! time, and the template version as of the last successful sync. The file
//! is read once at session start and treated as immutable for the rest of
//! the workflow; regeneration may rewrite it on disk, but the session never
//! merges the two.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::MetadataError;

/// File name of the per-project metadata file.
pub const METADATA_FILE: &str = ".forgesync.toml";

/// Metadata recorded in a generated project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Identifier of the template the project was generated from.
    pub template_handle: String,

    /// Directory name of the generated project inside the generator output.
    pub project_slug: String,

    /// Template version as of the last successful sync (or initial
    /// generation, if never synced).
    pub template_version: String,

    /// GitHub organization owning the repository. When absent the
    /// authenticating user is the owner.
    #[serde(default)]
    pub github_organization: Option<String>,

    /// The original generation answers, passed back to the generator
    /// verbatim on regeneration.
    #[serde(default)]
    pub parameters: toml::Table,
}

impl ProjectMetadata {
    /// Load the metadata file from a project directory.
    ///
    /// A missing file means the directory is not a managed project and the
    /// sync must abort before touching anything.
    pub fn load(project_dir: &Path) -> Result<Self, MetadataError> {
        let path = project_dir.join(METADATA_FILE);
        if !path.exists() {
            return Err(MetadataError::Missing(project_dir.display().to_string()));
        }
        info!(path = %path.display(), "loading project metadata");

        let contents = std::fs::read_to_string(&path)?;
        let metadata: ProjectMetadata =
            toml::from_str(&contents).map_err(|e| MetadataError::ParseError(e.to_string()))?;

        if metadata.project_slug.is_empty() {
            return Err(MetadataError::InvalidValue {
                field: "project_slug".into(),
                detail: "must not be empty".into(),
            });
        }
        if metadata.template_handle.is_empty() {
            return Err(MetadataError::InvalidValue {
                field: "template_handle".into(),
                detail: "must not be empty".into(),
            });
        }

        debug!(handle = %metadata.template_handle, version = %metadata.template_version,
               "project metadata parsed");
        Ok(metadata)
    }

    /// The repository owner for hosting-service calls: the recorded
    /// organization when present, otherwise the authenticating user.
    pub fn repo_owner<'a>(&'a self, username: &'a str) -> &'a str {
        self.github_organization.as_deref().unwrap_or(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
template_handle = "cli-python"
project_slug = "exploding-springfield"
template_version = "1.2.3"

[parameters]
full_name = "Homer Simpson"
license = "MIT"
use_docker = true
"#
    }

    fn write_metadata(dir: &Path, contents: &str) {
        std::fs::write(dir.join(METADATA_FILE), contents).unwrap();
    }

    #[test]
    fn test_load_full_metadata() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), sample_toml());

        let metadata = ProjectMetadata::load(dir.path()).expect("load failed");
        assert_eq!(metadata.template_handle, "cli-python");
        assert_eq!(metadata.project_slug, "exploding-springfield");
        assert_eq!(metadata.template_version, "1.2.3");
        assert!(metadata.github_organization.is_none());
        assert_eq!(
            metadata.parameters.get("license").and_then(|v| v.as_str()),
            Some("MIT")
        );
    }

    #[test]
    fn test_missing_file_means_unmanaged_project() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProjectMetadata::load(dir.path());
        assert!(matches!(result, Err(MetadataError::Missing(_))));
    }

    #[test]
    fn test_malformed_metadata_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), "template_handle = [not toml");
        assert!(matches!(
            ProjectMetadata::load(dir.path()),
            Err(MetadataError::ParseError(_))
        ));
    }

    #[test]
    fn test_empty_slug_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(
            dir.path(),
            r#"
template_handle = "cli-python"
project_slug = ""
template_version = "1.0.0"
"#,
        );
        assert!(matches!(
            ProjectMetadata::load(dir.path()),
            Err(MetadataError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_repo_owner_prefers_organization() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(
            dir.path(),
            r#"
template_handle = "cli-python"
project_slug = "proj"
template_version = "1.0.0"
github_organization = "acme-labs"
"#,
        );
        let metadata = ProjectMetadata::load(dir.path()).unwrap();
        assert_eq!(metadata.repo_owner("homer"), "acme-labs");

        let metadata2: ProjectMetadata = toml::from_str(
            r#"
template_handle = "cli-python"
project_slug = "proj"
template_version = "1.0.0"
"#,
        )
        .unwrap();
        assert_eq!(metadata2.repo_owner("homer"), "homer");
    }
}
