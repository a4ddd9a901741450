//! Requirements for the bundled Python interpreter.
//!
//! A requirement is written either as a pip requirement string
//! (`"reportlab>=3.6.0"`) or as a table (`{ name = "reportlab", version = ">=3.6.0" }`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ResolveError, Result};

const OPERATORS: &[&str] = &["===", "~=", "==", "!=", "<=", ">=", "<", ">"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageDecl {
    Requirement(String),
    Detailed {
        name: String,
        #[serde(default)]
        version: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRequirement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl PackageRequirement {
    pub fn from_decl(field: &str, decl: &PackageDecl) -> Result<Self> {
        match decl {
            PackageDecl::Requirement(text) => Self::parse(field, text),
            PackageDecl::Detailed { name, version } => {
                validate_name(field, name)?;
                let constraint = match version.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(version) => {
                        let constraint = if starts_with_operator(version) {
                            version.to_string()
                        } else {
                            format!("=={}", version)
                        };
                        validate_constraint(field, name, &constraint)?;
                        Some(compact(&constraint))
                    }
                };
                Ok(Self {
                    name: name.clone(),
                    constraint,
                })
            }
        }
    }

    /// Splits a requirement string at the first comparison operator.
    pub fn parse(field: &str, text: &str) -> Result<Self> {
        let text = text.trim();
        let split_at = text.find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~'));

        let (name, constraint) = match split_at {
            Some(index) => (text[..index].trim(), Some(text[index..].trim())),
            None => (text, None),
        };

        validate_name(field, name)?;
        if let Some(constraint) = constraint {
            validate_constraint(field, name, constraint)?;
        }

        Ok(Self {
            name: name.to_string(),
            constraint: constraint.map(compact),
        })
    }

    /// Name normalised the way pip compares distributions.
    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }
}

impl fmt::Display for PackageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{}{}", self.name, constraint),
            None => write!(f, "{}", self.name),
        }
    }
}

pub fn normalize(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_was_separator = false;

    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_was_separator {
                normalized.push('-');
            }
            last_was_separator = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            last_was_separator = false;
        }
    }

    normalized
}

fn validate_name(field: &str, name: &str) -> Result<()> {
    let invalid = |reason: &str| ResolveError::InvalidPackage {
        field: field.to_string(),
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let first = name.chars().next().ok_or_else(|| invalid("empty name"))?;
    let last = name.chars().last().unwrap_or(first);

    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid("must start and end with a letter or digit"));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("unexpected character '{}'", c)));
    }

    Ok(())
}

fn validate_constraint(field: &str, name: &str, constraint: &str) -> Result<()> {
    for clause in constraint.split(',') {
        let clause = clause.trim();
        let operator = OPERATORS
            .iter()
            .find(|op| clause.starts_with(**op))
            .ok_or_else(|| ResolveError::InvalidPackage {
                field: field.to_string(),
                name: name.to_string(),
                reason: format!("unknown version operator in '{}'", clause),
            })?;

        let version = clause[operator.len()..].trim();
        let valid = !version.is_empty()
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '*' | '+' | '!' | '-' | '_'));

        if !valid {
            return Err(ResolveError::InvalidPackage {
                field: field.to_string(),
                name: name.to_string(),
                reason: format!("invalid version in '{}'", clause),
            });
        }
    }

    Ok(())
}

// Whitespace carries no meaning inside a constraint.
fn compact(constraint: &str) -> String {
    constraint.chars().filter(|c| !c.is_whitespace()).collect()
}

fn starts_with_operator(version: &str) -> bool {
    OPERATORS.iter().any(|op| version.starts_with(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: &str = "python.packages";

    #[test]
    fn test_plain_names() {
        let pandas = PackageRequirement::parse(FIELD, "pandas").unwrap();
        assert_eq!(pandas.name, "pandas");
        assert_eq!(pandas.constraint, None);
        assert_eq!(pandas.to_string(), "pandas");
    }

    #[test]
    fn test_constraint_split() {
        let reportlab = PackageRequirement::parse(FIELD, "reportlab>=3.6.0").unwrap();
        assert_eq!(reportlab.name, "reportlab");
        assert_eq!(reportlab.constraint.as_deref(), Some(">=3.6.0"));
        assert_eq!(reportlab.to_string(), "reportlab>=3.6.0");

        let ranged = PackageRequirement::parse(FIELD, "numpy >= 1.19, < 2").unwrap();
        assert_eq!(ranged.name, "numpy");
        assert_eq!(ranged.constraint.as_deref(), Some(">=1.19,<2"));
    }

    #[test]
    fn test_detailed_declaration() {
        let decl = PackageDecl::Detailed {
            name: "openpyxl".to_string(),
            version: Some("3.1.2".to_string()),
        };
        let req = PackageRequirement::from_decl(FIELD, &decl).unwrap();
        assert_eq!(req.to_string(), "openpyxl==3.1.2");

        let decl = PackageDecl::Detailed {
            name: "openpyxl".to_string(),
            version: Some("~=3.1".to_string()),
        };
        let req = PackageRequirement::from_decl(FIELD, &decl).unwrap();
        assert_eq!(req.constraint.as_deref(), Some("~=3.1"));
    }

    #[test]
    fn test_string_and_table_forms_agree() {
        let from_string = PackageRequirement::parse(FIELD, "numpy >= 1.19, < 2").unwrap();
        let decl = PackageDecl::Detailed {
            name: "numpy".to_string(),
            version: Some(">= 1.19, < 2".to_string()),
        };
        let from_table = PackageRequirement::from_decl(FIELD, &decl).unwrap();

        assert_eq!(from_string, from_table);
        assert_eq!(from_table.to_string(), "numpy>=1.19,<2");
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["", "-pandas", "pan das", "pandas;", "pandas."] {
            let err = PackageRequirement::parse(FIELD, bad).unwrap_err();
            assert!(
                matches!(err, ResolveError::InvalidPackage { .. }),
                "expected rejection for {:?}",
                bad
            );
            assert_eq!(err.field(), Some(FIELD));
        }
    }

    #[test]
    fn test_invalid_constraints() {
        assert!(PackageRequirement::parse(FIELD, "pandas=>1.0").is_err());
        assert!(PackageRequirement::parse(FIELD, "pandas>=").is_err());
        assert!(PackageRequirement::parse(FIELD, "pandas==1.0,").is_err());
    }

    #[test]
    fn test_normalized_name() {
        assert_eq!(normalize("Open_PyXL"), "open-pyxl");
        assert_eq!(normalize("zope..interface"), "zope-interface");
        let req = PackageRequirement::parse(FIELD, "Python_Dateutil").unwrap();
        assert_eq!(req.normalized_name(), "python-dateutil");
    }
}
