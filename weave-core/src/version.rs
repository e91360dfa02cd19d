//! Semantic-version wrapper used by hook descriptors and facets.

use crate::error::WeaveError;

/// A parsed, validated semantic version.
///
/// Thin wrapper over [`semver::Version`] so the rest of the crate has a single,
/// stable type to carry around without re-exporting the whole `semver` surface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(semver::Version);

impl Version {
    /// Parse a version string, producing [`WeaveError::InvalidVersion`] on failure.
    pub fn parse(value: &str) -> Result<Self, WeaveError> {
        semver::Version::parse(value)
            .map(Version)
            .map_err(|e| WeaveError::InvalidVersion {
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    /// The default version assigned to a hook or facet that doesn't specify one.
    pub fn unspecified() -> Self {
        Version(semver::Version::new(0, 0, 0))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::unspecified()
    }
}
