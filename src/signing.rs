use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ResolveError, Result};

pub const DEBUG_PROFILE: &str = "debug";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningProfileDecl {
    pub store_file: Option<PathBuf>,
    pub key_alias: Option<String>,
    pub store_password_env: Option<String>,
    pub key_password_env: Option<String>,
}

impl SigningProfileDecl {
    pub fn merge(&mut self, other: &SigningProfileDecl) {
        if other.store_file.is_some() {
            self.store_file = other.store_file.clone();
        }
        if other.key_alias.is_some() {
            self.key_alias = other.key_alias.clone();
        }
        if other.store_password_env.is_some() {
            self.store_password_env = other.store_password_env.clone();
        }
        if other.key_password_env.is_some() {
            self.key_password_env = other.key_password_env.clone();
        }
    }
}

/// A signing profile as it appears in the resolved plan.
///
/// Only environment variable names are carried for passwords; the secrets
/// themselves never enter the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_password_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password_env: Option<String>,
}

impl SigningProfile {
    /// The debug keystore the Android Gradle plugin generates on demand.
    pub fn debug() -> Self {
        Self {
            name: DEBUG_PROFILE.to_string(),
            store_file: None,
            key_alias: None,
            store_password_env: None,
            key_password_env: None,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.name == DEBUG_PROFILE
    }
}

#[derive(Debug, Clone)]
pub struct SigningRegistry {
    profiles: BTreeMap<String, SigningProfile>,
}

impl SigningRegistry {
    /// Builds the registry from declared profiles. The `debug` profile is
    /// always present; declaring it again only overrides its fields.
    pub fn from_decls(decls: &BTreeMap<String, SigningProfileDecl>) -> Result<Self> {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEBUG_PROFILE.to_string(), SigningProfile::debug());

        for (name, decl) in decls {
            let field = format!("signing.{}", name);

            if name != DEBUG_PROFILE {
                if decl.store_file.is_none() {
                    return Err(ResolveError::missing(format!("{}.store_file", field)));
                }
                if decl.key_alias.is_none() {
                    return Err(ResolveError::missing(format!("{}.key_alias", field)));
                }
            }

            for (suffix, value) in [
                ("store_password_env", &decl.store_password_env),
                ("key_password_env", &decl.key_password_env),
            ] {
                if let Some(var) = value {
                    if !is_env_var_name(var) {
                        return Err(ResolveError::invalid_value(
                            format!("{}.{}", field, suffix),
                            var,
                            "not a valid environment variable name",
                        ));
                    }
                }
            }

            profiles.insert(
                name.clone(),
                SigningProfile {
                    name: name.clone(),
                    store_file: decl.store_file.clone(),
                    key_alias: decl.key_alias.clone(),
                    store_password_env: decl.store_password_env.clone(),
                    key_password_env: decl.key_password_env.clone(),
                },
            );
        }

        Ok(Self { profiles })
    }

    /// Looks up a profile by name. Unknown names are an error rather than a
    /// fallback to `debug`.
    pub fn lookup(&self, field: &str, name: &str) -> Result<&SigningProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ResolveError::UndefinedProfile {
                field: field.to_string(),
                profile: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(|s| s.as_str()).collect()
    }
}

fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_decl() -> SigningProfileDecl {
        SigningProfileDecl {
            store_file: Some(PathBuf::from("keys/upload.jks")),
            key_alias: Some("upload".to_string()),
            store_password_env: Some("UPLOAD_STORE_PASSWORD".to_string()),
            key_password_env: None,
        }
    }

    #[test]
    fn test_debug_profile_always_defined() {
        let registry = SigningRegistry::from_decls(&BTreeMap::new()).unwrap();
        let profile = registry.lookup("build_types.release.signing", "debug").unwrap();
        assert!(profile.is_debug());
        assert_eq!(registry.names(), vec!["debug"]);
    }

    #[test]
    fn test_undefined_profile() {
        let registry = SigningRegistry::from_decls(&BTreeMap::new()).unwrap();
        let err = registry
            .lookup("build_types.release.signing", "release")
            .unwrap_err();

        assert!(matches!(err, ResolveError::UndefinedProfile { .. }));
        assert_eq!(err.field(), Some("build_types.release.signing"));
        assert!(err.to_string().contains("undefined profile 'release'"));
    }

    #[test]
    fn test_declared_profile() {
        let mut decls = BTreeMap::new();
        decls.insert("release".to_string(), release_decl());

        let registry = SigningRegistry::from_decls(&decls).unwrap();
        let profile = registry.lookup("build_types.release.signing", "release").unwrap();
        assert_eq!(profile.key_alias.as_deref(), Some("upload"));
        assert_eq!(registry.names(), vec!["debug", "release"]);
    }

    #[test]
    fn test_declared_profile_requires_keystore() {
        let mut decl = release_decl();
        decl.store_file = None;
        let mut decls = BTreeMap::new();
        decls.insert("release".to_string(), decl);

        let err = SigningRegistry::from_decls(&decls).unwrap_err();
        assert_eq!(err.field(), Some("signing.release.store_file"));
    }

    #[test]
    fn test_password_env_name_validated() {
        let mut decl = release_decl();
        decl.key_password_env = Some("1-bad".to_string());
        let mut decls = BTreeMap::new();
        decls.insert("release".to_string(), decl);

        let err = SigningRegistry::from_decls(&decls).unwrap_err();
        assert_eq!(err.field(), Some("signing.release.key_password_env"));
    }

    #[test]
    fn test_merge_overrides_present_fields() {
        let mut base = release_decl();
        base.merge(&SigningProfileDecl {
            key_alias: Some("release".to_string()),
            ..Default::default()
        });
        assert_eq!(base.key_alias.as_deref(), Some("release"));
        assert_eq!(base.store_file, Some(PathBuf::from("keys/upload.jks")));
    }
}
