//! Declarative configuration layers.
//!
//! A project is described by one or more TOML files. Each file is a
//! [`ConfigLayer`] tagged with a [`LayerKind`]; the resolver merges them from
//! the project root down to the app module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResolveError, Result};
use crate::packages::PackageDecl;
use crate::properties::Setting;
use crate::signing::SigningProfileDecl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Root,
    Subproject,
    App,
}

impl LayerKind {
    pub fn as_str(&self) -> &str {
        match self {
            LayerKind::Root => "root",
            LayerKind::Subproject => "subproject",
            LayerKind::App => "app",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(skip)]
    pub kind: Option<LayerKind>,
    #[serde(skip)]
    pub source: Option<PathBuf>,

    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub classpath: Vec<String>,
    pub build_dir: Option<PathBuf>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub android: AndroidDecl,
    #[serde(default)]
    pub signing: BTreeMap<String, SigningProfileDecl>,
    #[serde(default)]
    pub build_types: BTreeMap<String, BuildTypeDecl>,
    pub python: Option<PythonDecl>,
    pub flutter: Option<FlutterDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AndroidDecl {
    pub namespace: Option<String>,
    pub application_id: Option<String>,
    pub compile_sdk: Option<Setting>,
    pub min_sdk: Option<Setting>,
    pub target_sdk: Option<Setting>,
    pub version_code: Option<Setting>,
    pub version_name: Option<Setting>,
    pub ndk_version: Option<String>,
    pub java_version: Option<u32>,
    pub multidex: Option<bool>,
    #[serde(default)]
    pub abi_filters: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildTypeDecl {
    pub signing: Option<String>,
    pub minify: Option<bool>,
    pub shrink_resources: Option<bool>,
    pub proguard_files: Option<Vec<PathBuf>>,
}

impl BuildTypeDecl {
    pub fn merge(&mut self, other: &BuildTypeDecl) {
        if other.signing.is_some() {
            self.signing = other.signing.clone();
        }
        if other.minify.is_some() {
            self.minify = other.minify;
        }
        if other.shrink_resources.is_some() {
            self.shrink_resources = other.shrink_resources;
        }
        if other.proguard_files.is_some() {
            self.proguard_files = other.proguard_files.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonDecl {
    pub version: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageDecl>,
    #[serde(default)]
    pub bindings: Vec<ChannelBinding>,
}

/// A platform channel method forwarded to a function in the bundled
/// interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelBinding {
    pub channel: String,
    pub method: String,
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlutterDecl {
    pub source: Option<PathBuf>,
}

impl ConfigLayer {
    pub fn parse(content: &str, kind: LayerKind) -> std::result::Result<Self, toml::de::Error> {
        let mut layer: ConfigLayer = toml::from_str(content)?;
        layer.kind = Some(kind);
        Ok(layer)
    }

    pub fn from_path(path: &Path, kind: LayerKind) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut layer = Self::parse(&content, kind).map_err(|source| ResolveError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        layer.source = Some(path.to_path_buf());

        Ok(layer)
    }

    pub fn kind(&self) -> LayerKind {
        self.kind.unwrap_or(LayerKind::App)
    }

    pub fn describe(&self) -> String {
        match &self.source {
            Some(path) => format!("{} layer ({})", self.kind(), path.display()),
            None => format!("{} layer", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const APP_LAYER: &str = r#"
plugins = ["com.android.application", "com.chaquo.python"]

[android]
namespace = "com.example.mobile"
application_id = "com.example.billgenerator"
min_sdk = 24
target_sdk = "${flutter.targetSdkVersion}"
abi_filters = ["arm64-v8a", "x86_64"]
dependencies = ["androidx.multidex:multidex:2.0.1"]

[build_types.release]
signing = "debug"
minify = true

[python]
packages = ["pandas", { name = "openpyxl" }, "reportlab>=3.6.0"]

[[python.bindings]]
channel = "chaquopy"
method = "generateBill"
module = "bill_generator"
function = "generate_bill"
arguments = ["data", "place"]
"#;

    #[test]
    fn test_parse_app_layer() {
        let layer = ConfigLayer::parse(APP_LAYER, LayerKind::App).unwrap();

        assert_eq!(layer.kind(), LayerKind::App);
        assert_eq!(layer.plugins.len(), 2);
        assert_eq!(layer.android.min_sdk, Some(Setting::Number(24)));
        assert_eq!(
            layer.android.target_sdk,
            Some(Setting::Text("${flutter.targetSdkVersion}".to_string()))
        );
        assert_eq!(layer.android.abi_filters, vec!["arm64-v8a", "x86_64"]);
        assert_eq!(
            layer.build_types["release"].signing.as_deref(),
            Some("debug")
        );

        let python = layer.python.unwrap();
        assert_eq!(python.packages.len(), 3);
        assert_eq!(
            python.packages[1],
            PackageDecl::Detailed {
                name: "openpyxl".to_string(),
                version: None
            }
        );
        assert_eq!(python.bindings[0].arguments, vec!["data", "place"]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = ConfigLayer::parse("[android]\nmin_sdkk = 24\n", LayerKind::App).unwrap_err();
        assert!(err.to_string().contains("min_sdkk"));
    }

    #[test]
    fn test_from_path_records_source() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "repositories = [\"google\", \"mavenCentral\"]").unwrap();

        let layer = ConfigLayer::from_path(file.path(), LayerKind::Root).unwrap();
        assert_eq!(layer.kind(), LayerKind::Root);
        assert_eq!(layer.source.as_deref(), Some(file.path()));
        assert!(layer.describe().starts_with("root layer"));
    }

    #[test]
    fn test_from_path_parse_error_carries_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "plugins = [").unwrap();

        let err = ConfigLayer::from_path(file.path(), LayerKind::App).unwrap_err();
        assert!(matches!(err, ResolveError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_layer_order() {
        assert!(LayerKind::Root < LayerKind::Subproject);
        assert!(LayerKind::Subproject < LayerKind::App);
    }
}
