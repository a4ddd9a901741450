use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or resolving configuration layers.
///
/// Every validation variant names the dotted field path that was rejected,
/// e.g. `android.min_sdk` or `build_types.release.signing`.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("missing required field `{field}`")]
    Missing { field: String },

    #[error("`{lower_field}` ({lower}) must not exceed `{upper_field}` ({upper})")]
    VersionOrder {
        lower_field: String,
        lower: u32,
        upper_field: String,
        upper: u32,
    },

    #[error("`{field}`: unsupported ABI '{abi}' (known: {known})")]
    UnsupportedAbi {
        field: String,
        abi: String,
        known: String,
    },

    #[error("`{field}`: undefined profile '{profile}'")]
    UndefinedProfile { field: String, profile: String },

    #[error("`{field}`: invalid package '{name}': {reason}")]
    InvalidPackage {
        field: String,
        name: String,
        reason: String,
    },

    #[error("`{field}`: invalid dependency '{coordinate}': {reason}")]
    InvalidDependency {
        field: String,
        coordinate: String,
        reason: String,
    },

    #[error("`{field}`: unresolved property '{property}'")]
    UnresolvedProperty { field: String, property: String },

    #[error("`{field}`: invalid value '{value}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("`{field}`: '{name}' is declared more than once")]
    DuplicateEntry { field: String, name: String },

    #[error("`{field}`: plugin '{plugin}' is required by {required_by}")]
    MissingPlugin {
        field: String,
        plugin: String,
        required_by: String,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    pub fn missing(field: impl Into<String>) -> Self {
        ResolveError::Missing {
            field: field.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ResolveError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The offending field, if the error is a validation failure.
    pub fn field(&self) -> Option<&str> {
        match self {
            ResolveError::Missing { field }
            | ResolveError::UnsupportedAbi { field, .. }
            | ResolveError::UndefinedProfile { field, .. }
            | ResolveError::InvalidPackage { field, .. }
            | ResolveError::InvalidDependency { field, .. }
            | ResolveError::UnresolvedProperty { field, .. }
            | ResolveError::InvalidValue { field, .. }
            | ResolveError::DuplicateEntry { field, .. }
            | ResolveError::MissingPlugin { field, .. } => Some(field),
            ResolveError::VersionOrder { lower_field, .. } => Some(lower_field),
            ResolveError::Parse { .. } | ResolveError::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_reporting() {
        let err = ResolveError::missing("android.application_id");
        assert_eq!(err.field(), Some("android.application_id"));
        assert_eq!(
            err.to_string(),
            "missing required field `android.application_id`"
        );

        let err = ResolveError::UndefinedProfile {
            field: "build_types.release.signing".to_string(),
            profile: "upload".to_string(),
        };
        assert_eq!(err.field(), Some("build_types.release.signing"));
        assert!(err.to_string().contains("undefined profile 'upload'"));
    }

    #[test]
    fn test_version_order_names_lower_field() {
        let err = ResolveError::VersionOrder {
            lower_field: "android.min_sdk".to_string(),
            lower: 30,
            upper_field: "android.target_sdk".to_string(),
            upper: 24,
        };
        assert_eq!(err.field(), Some("android.min_sdk"));
        assert_eq!(
            err.to_string(),
            "`android.min_sdk` (30) must not exceed `android.target_sdk` (24)"
        );
    }
}
