use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ChannelBinding;
use crate::dependencies::Coordinate;
use crate::packages::PackageRequirement;
use crate::signing::SigningProfile;

pub const PLAN_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CACHE_DIR: &str = ".buildplan";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub schema_version: u32,
    pub application: Application,
    pub sdk: SdkLevels,
    pub java_version: u32,
    pub multidex: bool,
    pub plugins: Vec<String>,
    pub repositories: Vec<String>,
    pub classpath: Vec<Coordinate>,
    pub dependencies: Vec<Coordinate>,
    pub abis: Vec<AbiTarget>,
    pub build_types: BTreeMap<String, ResolvedBuildType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<InterpreterPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flutter_source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub namespace: String,
    pub version_code: u32,
    pub version_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkLevels {
    pub min: u32,
    pub target: u32,
    pub compile: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndk_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiTarget {
    pub abi: String,
    pub toolchain_triple: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBuildType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningProfile>,
    pub minify: bool,
    pub shrink_resources: bool,
    pub proguard_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub packages: Vec<PackageRequirement>,
    pub bindings: Vec<ChannelBinding>,
}

impl BuildPlan {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// SHA-256 of the compact JSON encoding. Field order is fixed by the
    /// struct layout and maps are sorted, so equal plans hash equally.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn abi_names(&self) -> Vec<&str> {
        self.abis.iter().map(|a| a.abi.as_str()).collect()
    }

    /// pip requirement strings in declaration order.
    pub fn pip_requirements(&self) -> Vec<String> {
        self.interpreter
            .as_ref()
            .map(|i| i.packages.iter().map(|p| p.to_string()).collect())
            .unwrap_or_default()
    }
}

pub struct PlanWriter {
    cache_dir: PathBuf,
}

impl PlanWriter {
    pub fn new() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }

    pub fn with_cache_dir(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    pub fn write_plan(&self, plan: &BuildPlan) -> Result<PathBuf> {
        let plan_path = self.plan_path(&plan.application.id);

        if let Some(plan_parent) = plan_path.parent() {
            fs::create_dir_all(plan_parent)
                .with_context(|| format!("Failed to create plan directory: {}", plan_parent.display()))?;
        }

        let plan_json = plan.to_json()
            .context("Failed to serialize plan to JSON")?;

        fs::write(&plan_path, plan_json)
            .with_context(|| format!("Failed to write plan to {}", plan_path.display()))?;

        tracing::debug!(path = %plan_path.display(), "wrote build plan");

        Ok(plan_path)
    }

    pub fn plan_path(&self, application_id: &str) -> PathBuf {
        self.cache_dir.join(application_id).join("plan.json")
    }

    pub fn read_plan(&self, plan_path: &Path) -> Result<BuildPlan> {
        let plan_content = fs::read_to_string(plan_path)
            .with_context(|| format!("Failed to read plan from {}", plan_path.display()))?;

        let plan: BuildPlan = serde_json::from_str(&plan_content)
            .with_context(|| format!("Failed to parse plan JSON from {}", plan_path.display()))?;

        if plan.schema_version != PLAN_SCHEMA_VERSION {
            return Err(anyhow::anyhow!(
                "Unsupported plan schema version {} in {} (expected {})",
                plan.schema_version,
                plan_path.display(),
                PLAN_SCHEMA_VERSION
            ));
        }

        Ok(plan)
    }

    /// Checks that the files a plan points at exist relative to the app
    /// module directory.
    pub fn verify_inputs(&self, plan: &BuildPlan, module_dir: &Path) -> Result<()> {
        for (name, build_type) in &plan.build_types {
            for proguard in &build_type.proguard_files {
                if is_sdk_proguard_file(proguard) {
                    continue;
                }
                let path = module_dir.join(proguard);
                if !path.exists() {
                    return Err(anyhow::anyhow!(
                        "Proguard file for build type '{}' does not exist: {}",
                        name,
                        path.display()
                    ));
                }
            }

            if let Some(store_file) = build_type.signing.as_ref().and_then(|s| s.store_file.as_ref()) {
                let path = module_dir.join(store_file);
                if !path.exists() {
                    return Err(anyhow::anyhow!(
                        "Keystore for build type '{}' does not exist: {}",
                        name,
                        path.display()
                    ));
                }
            }
        }

        if let Some(source) = &plan.flutter_source {
            let path = module_dir.join(source);
            if !path.is_dir() {
                return Err(anyhow::anyhow!(
                    "Flutter source directory does not exist: {}",
                    path.display()
                ));
            }
        }

        Ok(())
    }
}

impl Default for PlanWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_sdk_proguard_file(path: &Path) -> bool {
    path.components().count() == 1
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("proguard-android"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn sample_plan() -> BuildPlan {
        let mut build_types = BTreeMap::new();
        build_types.insert(
            "release".to_string(),
            ResolvedBuildType {
                signing: Some(SigningProfile::debug()),
                minify: true,
                shrink_resources: true,
                proguard_files: vec![
                    PathBuf::from("proguard-android-optimize.txt"),
                    PathBuf::from("proguard-rules.pro"),
                ],
            },
        );

        BuildPlan {
            schema_version: PLAN_SCHEMA_VERSION,
            application: Application {
                id: "com.example.billgenerator".to_string(),
                namespace: "com.example.mobile".to_string(),
                version_code: 1,
                version_name: "1.0.0".to_string(),
            },
            sdk: SdkLevels {
                min: 24,
                target: 34,
                compile: 34,
                ndk_version: Some("27.2.12479018".to_string()),
            },
            java_version: 11,
            multidex: true,
            plugins: vec!["com.android.application".to_string()],
            repositories: vec!["google".to_string()],
            classpath: Vec::new(),
            dependencies: Vec::new(),
            abis: vec![AbiTarget {
                abi: "arm64-v8a".to_string(),
                toolchain_triple: "aarch64-linux-android".to_string(),
            }],
            build_types,
            interpreter: Some(InterpreterPlan {
                version: None,
                packages: vec![
                    PackageRequirement {
                        name: "pandas".to_string(),
                        constraint: None,
                    },
                    PackageRequirement {
                        name: "reportlab".to_string(),
                        constraint: Some(">=3.6.0".to_string()),
                    },
                ],
                bindings: Vec::new(),
            }),
            flutter_source: Some(PathBuf::from("../..")),
            build_dir: None,
        }
    }

    #[test]
    fn test_write_and_read_plan() {
        let temp = TempDir::new().unwrap();
        let writer = PlanWriter::with_cache_dir(temp.path());
        let plan = sample_plan();

        let path = writer.write_plan(&plan).unwrap();
        assert_eq!(
            path,
            temp.path().join("com.example.billgenerator").join("plan.json")
        );

        let read_back = writer.read_plan(&path).unwrap();
        assert_eq!(read_back, plan);
    }

    #[test]
    fn test_read_rejects_other_schema() {
        let temp = TempDir::new().unwrap();
        let writer = PlanWriter::with_cache_dir(temp.path());
        let mut plan = sample_plan();
        plan.schema_version = 99;

        let path = writer.write_plan(&plan).unwrap();
        let err = writer.read_plan(&path).unwrap_err();
        assert!(err.to_string().contains("schema version 99"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let plan = sample_plan();
        let same = sample_plan();
        assert_eq!(plan.fingerprint().unwrap(), same.fingerprint().unwrap());
        assert_eq!(plan.fingerprint().unwrap().len(), 64);

        let mut changed = sample_plan();
        changed.sdk.min = 26;
        assert_ne!(plan.fingerprint().unwrap(), changed.fingerprint().unwrap());
    }

    #[test]
    fn test_pip_requirements() {
        let plan = sample_plan();
        assert_eq!(plan.pip_requirements(), vec!["pandas", "reportlab>=3.6.0"]);
        assert_eq!(plan.abi_names(), vec!["arm64-v8a"]);
    }

    #[test]
    fn test_verify_inputs() {
        let temp = TempDir::new().unwrap();
        let module_dir = temp.path().join("android").join("app");
        fs::create_dir_all(&module_dir).unwrap();

        let writer = PlanWriter::new();
        let plan = sample_plan();

        let err = writer.verify_inputs(&plan, &module_dir).unwrap_err();
        assert!(err.to_string().contains("proguard-rules.pro"));

        fs::write(module_dir.join("proguard-rules.pro"), "-keep class com.chaquo.** { *; }").unwrap();
        writer.verify_inputs(&plan, &module_dir).unwrap();
    }

    #[test]
    fn test_sdk_proguard_detection() {
        assert!(is_sdk_proguard_file(Path::new("proguard-android-optimize.txt")));
        assert!(!is_sdk_proguard_file(Path::new("proguard-rules.pro")));
        assert!(!is_sdk_proguard_file(Path::new("config/proguard-android.txt")));
    }
}
