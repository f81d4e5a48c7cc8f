//! Semantic version parsing and update-tier classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::VersionError;

/// A `major.minor.micro` version triple.
///
/// Ordering is lexicographic by component, most significant first, which the
/// derived `Ord` provides thanks to field declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
}

impl VersionTriple {
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }
}

impl FromStr for VersionTriple {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::Parse {
                input: s.to_string(),
                detail: format!("expected three dot-separated components, got {}", parts.len()),
            });
        }
        let mut components = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part.parse::<u64>().map_err(|e| VersionError::Parse {
                input: s.to_string(),
                detail: format!("component '{}' is not a number: {}", part, e),
            })?;
        }
        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Classification of a template version transition.
///
/// Exactly one tier applies to any pair of versions; equal triples classify
/// as [`UpdateTier::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateTier {
    None,
    Patch,
    Minor,
    Major,
}

impl UpdateTier {
    /// Classify the transition from `last_synced` to `current`.
    ///
    /// The first differing component, most significant first, selects the
    /// tier: majors differ ⇒ `Major`, else minors differ ⇒ `Minor`, else
    /// micros differ ⇒ `Patch`, else `None`.
    pub fn classify(last_synced: &VersionTriple, current: &VersionTriple) -> Self {
        let tier = if last_synced.major != current.major {
            Self::Major
        } else if last_synced.minor != current.minor {
            Self::Minor
        } else if last_synced.micro != current.micro {
            Self::Patch
        } else {
            Self::None
        };
        debug!(last = %last_synced, current = %current, tier = %tier, "classified template update");
        tier
    }

    /// `true` if the versions differ at all.
    pub fn is_update(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for UpdateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}
