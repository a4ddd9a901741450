use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ResolveError, Result};

/// A Maven coordinate in `group:artifact:version` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Coordinate {
    pub fn parse(field: &str, text: &str) -> Result<Self> {
        let invalid = |reason: &str| ResolveError::InvalidDependency {
            field: field.to_string(),
            coordinate: text.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = text.trim().split(':').collect();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(invalid("expected group:artifact:version"));
        };

        for (label, part) in [("group", group), ("artifact", artifact), ("version", version)] {
            if part.is_empty() {
                return Err(invalid(&format!("empty {}", label)));
            }
            if part.chars().any(char::is_whitespace) {
                return Err(invalid(&format!("whitespace in {}", label)));
            }
        }

        if version.contains('+') || version.starts_with('[') || version.starts_with('(') {
            return Err(invalid("dynamic versions are not reproducible"));
        }

        Ok(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
        })
    }

    /// `group:artifact` without the version, used for duplicate detection.
    pub fn module(&self) -> String {
        format!("{}:{}", self.group, self.artifact)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// Repositories may be one of the well-known shorthands or an https URL.
pub fn validate_repository(field: &str, repository: &str) -> Result<()> {
    const SHORTHANDS: &[&str] = &["google", "mavenCentral", "mavenLocal", "gradlePluginPortal"];

    if SHORTHANDS.contains(&repository) || repository.starts_with("https://") {
        return Ok(());
    }

    Err(ResolveError::invalid_value(
        field,
        repository,
        format!("expected one of {} or an https:// URL", SHORTHANDS.join(", ")),
    ))
}
