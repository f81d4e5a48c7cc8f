//! Error types for the forgesync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading and validating the project configuration file.
///
/// A missing or malformed policy or blacklist section is always fatal; the
/// sync workflow never proceeds with an assumed default.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error (including missing required sections or fields).
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is present but invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Project metadata errors
// ---------------------------------------------------------------------------

/// Errors from the per-project metadata file.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The metadata file is missing - the directory is not a managed project.
    #[error("'{0}' does not appear to contain a .forgesync.toml file - is this a forgesync project?")]
    Missing(String),

    /// TOML parse error.
    #[error("metadata parse error: {0}")]
    ParseError(String),

    /// A metadata value is present but invalid.
    #[error("invalid metadata value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the metadata file.
    #[error("metadata I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Version errors
// ---------------------------------------------------------------------------

/// Errors from parsing semantic version strings.
#[derive(Debug, Error)]
pub enum VersionError {
    /// The string is not a `major.minor.micro` triple.
    #[error("malformed version string '{input}': {detail}")]
    Parse { input: String, detail: String },
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The project path does not contain a git repository.
    #[error("'{0}' does not appear to be a git repository")]
    RepositoryNotFound(String),

    /// Uncommitted or untracked changes in the working copy.
    #[error("uncommitted changes found in '{0}' - commit them before syncing")]
    DirtyWorkingCopy(String),

    /// HEAD is not on a branch, so there is nothing to restore to.
    #[error("repository HEAD is detached - check out a branch before syncing")]
    DetachedHead,

    /// Neither a remote-tracked nor a local sync branch exists.
    #[error("could not check out branch 'origin/{branch}' or '{branch}'")]
    SyncBranchNotFound { branch: String },

    /// Push was rejected by the remote.
    #[error("git push rejected for branch '{branch}': {detail}")]
    PushRejected { branch: String, detail: String },

    /// A `git2` library error.
    #[error("git error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned an unexpected status code.
    #[error("GitHub API returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    /// Credentials were rejected.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),
}

// ---------------------------------------------------------------------------
// Scaffold engine errors
// ---------------------------------------------------------------------------

/// Errors from invoking the external scaffold-generation engine.
#[derive(Debug, Error)]
pub enum ScaffoldError {
    /// The generator binary was not found on `$PATH`.
    #[error("scaffold generator not found: {0}")]
    BinaryNotFound(String),

    /// The generator exited with a non-zero status.
    #[error("scaffold generator failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The generator finished but did not produce the expected project tree.
    #[error("scaffold generator produced no output at '{0}'")]
    OutputMissing(String),

    /// The generator's version query returned nothing usable.
    #[error("could not read template version from generator output: {0}")]
    VersionUnparseable(String),

    /// Generic I/O wrapper.
    #[error("scaffold I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync workflow errors
// ---------------------------------------------------------------------------

/// Errors from the template-sync orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration error during the inspection step.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Metadata error during the inspection step.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Malformed version string in metadata or session input.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Underlying Git error.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Underlying scaffold engine error.
    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    /// Underlying GitHub error.
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// The sync branch was pushed, but the pull request could not be
    /// created. The partial success must be visible to the operator.
    #[error("template changes were pushed, but the pull request could not be created: {0}")]
    PullRequestAfterPush(#[source] GitHubError),

    /// Copying the regenerated template over the project root failed.
    #[error("failed to copy regenerated template: {0}")]
    CopyFailed(String),

    /// Generic I/O error during regeneration.
    #[error("sync I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::SyncBranchNotFound {
            branch: "TEMPLATE".into(),
        };
        assert_eq!(
            err.to_string(),
            "could not check out branch 'origin/TEMPLATE' or 'TEMPLATE'"
        );

        let err = ScaffoldError::CommandFailed {
            exit_code: 2,
            stderr: "no such template".into(),
        };
        assert!(err.to_string().contains("exit 2"));

        let err = VersionError::Parse {
            input: "1.2".into(),
            detail: "expected three components".into(),
        };
        assert!(err.to_string().contains("1.2"));
    }

    #[test]
    fn test_pushed_but_no_pr_is_visible() {
        let err = SyncError::PullRequestAfterPush(GitHubError::ApiError {
            status: 422,
            body: "validation failed".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("pushed"));
        assert!(msg.contains("pull request"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let git_err = GitError::DetachedHead;
        let core_err: CoreError = git_err.into();
        assert!(matches!(core_err, CoreError::Git(_)));

        let sync_err: SyncError = GitError::DetachedHead.into();
        assert!(matches!(sync_err, SyncError::Git(_)));
    }
}
