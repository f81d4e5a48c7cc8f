//! Sync-policy enforcement: PR gating and blacklist partitioning.
//!
//! Two concerns live here:
//!
//! 1. [`SyncPolicy`] - the per-project strictness setting. It is a *lower
//!    significance bound*: a pull request is created iff the classified
//!    update tier is at least as significant as the policy, with ordering
//!    patch < minor < major. Consequently `patch` is the most permissive
//!    setting and a major update always produces a PR.
//! 2. [`Blacklist`] - the ordered glob set from project configuration.
//!    Changed files matching any pattern are excluded from the sync commit
//!    but stay on disk, so freshly generated projects still receive them.

use std::fmt;
use std::str::FromStr;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;
use crate::version::UpdateTier;

// ---------------------------------------------------------------------------
// SyncPolicy
// ---------------------------------------------------------------------------

/// The configured sync strictness level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Any update produces a pull request.
    Patch,
    /// Minor and major updates produce a pull request.
    Minor,
    /// Only major updates produce a pull request.
    Major,
}

impl SyncPolicy {
    fn significance(self) -> u8 {
        match self {
            Self::Patch => 0,
            Self::Minor => 1,
            Self::Major => 2,
        }
    }

    /// Whether an update of the given tier should produce a pull request.
    ///
    /// [`UpdateTier::None`] never does; major updates always do.
    pub fn allows(self, tier: UpdateTier) -> bool {
        let tier_significance = match tier {
            UpdateTier::None => return false,
            UpdateTier::Patch => 0,
            UpdateTier::Minor => 1,
            UpdateTier::Major => 2,
        };
        tier_significance >= self.significance()
    }
}

impl FromStr for SyncPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            other => Err(ConfigError::InvalidValue {
                field: "sync.policy".into(),
                detail: format!("'{}' is not one of patch, minor, major", other),
            }),
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

// ---------------------------------------------------------------------------
// Blacklist
// ---------------------------------------------------------------------------

/// Compiled blacklist glob set.
///
/// Globs use fnmatch-style semantics: `*` matches across path separators, so
/// `*.md` excludes `docs/changes.md` as well as `README.md`. Matching is
/// order-independent; a path is excluded when any pattern matches.
#[derive(Debug, Clone)]
pub struct Blacklist {
    patterns: Vec<String>,
    set: GlobSet,
}

impl Blacklist {
    /// Compile the configured patterns. A malformed pattern is a fatal
    /// configuration error.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: "sync.blacklisted_files".into(),
                detail: format!("invalid glob '{}': {}", pattern, e),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ConfigError::InvalidValue {
            field: "sync.blacklisted_files".into(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a relative path matches any blacklist pattern.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }

    /// Partition changed paths into `(included, excluded)` sets.
    ///
    /// Excluded files are never staged into the sync commit; they remain in
    /// the working copy for the stash step to collect.
    pub fn partition(&self, changed: &[String]) -> (Vec<String>, Vec<String>) {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for path in changed {
            if self.matches(path) {
                excluded.push(path.clone());
            } else {
                included.push(path.clone());
            }
        }
        debug!(
            included = included.len(),
            excluded = excluded.len(),
            "partitioned changed files against blacklist"
        );
        (included, excluded)
    }
}
