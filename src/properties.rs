use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ResolveError, Result};

/// A configuration value that is either written inline or taken from the
/// property table through a `${key}` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
    Number(u32),
    Text(String),
}

impl Setting {
    pub fn reference(&self) -> Option<&str> {
        match self {
            Setting::Text(text) => text
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
                .map(str::trim),
            Setting::Number(_) => None,
        }
    }
}

impl From<u32> for Setting {
    fn from(value: u32) -> Self {
        Setting::Number(value)
    }
}

impl From<&str> for Setting {
    fn from(value: &str) -> Self {
        Setting::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn extend(&mut self, other: &BTreeMap<String, String>) {
        for (key, value) in other {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn merge(&mut self, other: &Properties) {
        self.extend(&other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parses `key=value` lines in the `local.properties` style.
    ///
    /// Blank lines and lines starting with `#` or `!` are ignored. The key ends
    /// at the first unescaped `=` or `:`, and backslash escapes (`\:`, `\=`,
    /// `\\`, `\t`, `\n`) are decoded in both key and value. Line
    /// continuations and `\uXXXX` escapes are not supported.
    pub fn parse(content: &str) -> Result<Self> {
        let mut properties = Self::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some((key, value)) = split_entry(line) else {
                return Err(ResolveError::invalid_value(
                    format!("properties:{}", index + 1),
                    line,
                    "expected key=value",
                ));
            };

            let key = unescape(key.trim());
            if key.is_empty() {
                return Err(ResolveError::invalid_value(
                    format!("properties:{}", index + 1),
                    line,
                    "empty key",
                ));
            }
            properties.set(key, unescape(value.trim()));
        }

        Ok(properties)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses a single `key=value` override as given on the command line.
    pub fn parse_override(raw: &str) -> Result<(String, String)> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ResolveError::invalid_value(
                "--property",
                raw,
                "expected key=value",
            )),
        }
    }

    pub fn resolve_text(&self, field: &str, setting: &Setting) -> Result<String> {
        match setting {
            Setting::Number(value) => Ok(value.to_string()),
            Setting::Text(text) => match setting.reference() {
                Some(key) => self.lookup(field, key).map(str::to_string),
                None => Ok(text.clone()),
            },
        }
    }

    pub fn resolve_number(&self, field: &str, setting: &Setting) -> Result<u32> {
        let text = match setting {
            Setting::Number(value) => return Ok(*value),
            Setting::Text(text) => match setting.reference() {
                Some(key) => self.lookup(field, key)?,
                None => text.as_str(),
            },
        };

        text.trim().parse::<u32>().map_err(|_| {
            ResolveError::invalid_value(field, text, "expected a non-negative integer")
        })
    }

    fn lookup(&self, field: &str, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| ResolveError::UnresolvedProperty {
            field: field.to_string(),
            property: key.to_string(),
        })
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;

    for (index, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some((&line[..index], &line[index + 1..])),
            _ => {}
        }
    }

    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flutter_properties() -> Properties {
        let mut properties = Properties::new();
        properties.set("flutter.targetSdkVersion", "34");
        properties.set("flutter.versionName", "1.2.0");
        properties
    }

    #[test]
    fn test_reference_detection() {
        assert_eq!(
            Setting::from("${flutter.compileSdkVersion}").reference(),
            Some("flutter.compileSdkVersion")
        );
        assert_eq!(Setting::from("34").reference(), None);
        assert_eq!(Setting::Number(34).reference(), None);
    }

    #[test]
    fn test_resolve_number() {
        let properties = flutter_properties();

        assert_eq!(
            properties
                .resolve_number("android.target_sdk", &Setting::from("${flutter.targetSdkVersion}"))
                .unwrap(),
            34
        );
        assert_eq!(
            properties
                .resolve_number("android.min_sdk", &Setting::Number(24))
                .unwrap(),
            24
        );
        assert_eq!(
            properties
                .resolve_number("android.min_sdk", &Setting::from("21"))
                .unwrap(),
            21
        );
    }

    #[test]
    fn test_unresolved_reference() {
        let properties = flutter_properties();
        let err = properties
            .resolve_number("android.compile_sdk", &Setting::from("${flutter.compileSdkVersion}"))
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::UnresolvedProperty { ref property, .. } if property == "flutter.compileSdkVersion"
        ));
        assert_eq!(err.field(), Some("android.compile_sdk"));
    }

    #[test]
    fn test_non_numeric_value() {
        let properties = flutter_properties();
        let err = properties
            .resolve_number("android.version_code", &Setting::from("${flutter.versionName}"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidValue { .. }));
    }

    #[test]
    fn test_parse_properties_file() {
        let content = "\
# generated by flutter
sdk.dir=/opt/android-sdk
flutter.versionCode = 7
! legacy comment
flutter.versionName:1.0.3
";
        let properties = Properties::parse(content).unwrap();
        assert_eq!(properties.len(), 3);
        assert_eq!(properties.get("sdk.dir"), Some("/opt/android-sdk"));
        assert_eq!(properties.get("flutter.versionCode"), Some("7"));
        assert_eq!(properties.get("flutter.versionName"), Some("1.0.3"));
    }

    #[test]
    fn test_parse_escaped_separators() {
        let content = r"
sdk.dir=C\:\\Users\\dev\\AppData\\Local\\Android\\Sdk
a:b=c
key\:with\=separators = value
";
        let properties = Properties::parse(content).unwrap();
        assert_eq!(
            properties.get("sdk.dir"),
            Some(r"C:\Users\dev\AppData\Local\Android\Sdk")
        );
        assert_eq!(properties.get("a"), Some("b=c"));
        assert_eq!(properties.get("key:with=separators"), Some("value"));
    }

    #[test]
    fn test_parse_rejects_bare_key() {
        assert!(Properties::parse("just-a-key").is_err());
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(
            Properties::parse_override("flutter.versionCode=9").unwrap(),
            ("flutter.versionCode".to_string(), "9".to_string())
        );
        assert!(Properties::parse_override("=9").is_err());
        assert!(Properties::parse_override("novalue").is_err());
    }
}
