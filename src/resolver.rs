use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::abi::AbiMapping;
use crate::config::{AndroidDecl, BuildTypeDecl, ChannelBinding, ConfigLayer};
use crate::dependencies::{validate_repository, Coordinate};
use crate::error::{ResolveError, Result};
use crate::packages::{PackageDecl, PackageRequirement};
use crate::plan::{
    AbiTarget, Application, BuildPlan, InterpreterPlan, ResolvedBuildType, SdkLevels,
    PLAN_SCHEMA_VERSION,
};
use crate::properties::{Properties, Setting};
use crate::signing::{SigningProfileDecl, SigningRegistry, DEBUG_PROFILE};

pub const ANDROID_APPLICATION_PLUGIN: &str = "com.android.application";
pub const PYTHON_PLUGIN: &str = "com.chaquo.python";
pub const FLUTTER_PLUGIN: &str = "dev.flutter.flutter-gradle-plugin";

pub const SUPPORTED_JAVA_VERSIONS: &[u32] = &[8, 11, 17, 21];
pub const DEFAULT_JAVA_VERSION: u32 = 11;
pub const DEFAULT_VERSION_CODE: u32 = 1;
pub const DEFAULT_VERSION_NAME: &str = "1.0";
// Largest versionCode Google Play accepts.
const MAX_VERSION_CODE: u32 = 2_100_000_000;

/// Layers folded together, before any field is validated.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
    pub plugins: Vec<String>,
    pub repositories: Vec<String>,
    pub classpath: Vec<String>,
    pub build_dir: Option<PathBuf>,
    pub properties: Properties,
    pub android: AndroidDecl,
    pub signing: BTreeMap<String, SigningProfileDecl>,
    pub build_types: BTreeMap<String, BuildTypeDecl>,
    pub python: Option<MergedPython>,
    pub flutter_source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct MergedPython {
    pub version: Option<String>,
    pub packages: Vec<PackageRequirement>,
    pub bindings: Vec<ChannelBinding>,
}

pub struct ManifestResolver {
    layers: Vec<ConfigLayer>,
    overrides: Properties,
    abi_mapping: AbiMapping,
}

impl ManifestResolver {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            overrides: Properties::new(),
            abi_mapping: AbiMapping::new(),
        }
    }

    pub fn with_layer(mut self, layer: ConfigLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_layers(mut self, layers: impl IntoIterator<Item = ConfigLayer>) -> Self {
        self.layers.extend(layers);
        self
    }

    /// Properties applied after every layer's `[properties]` table.
    pub fn with_properties(mut self, properties: &Properties) -> Self {
        self.overrides.merge(properties);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.set(key, value);
        self
    }

    /// Folds the layers from root to app. Later layers override scalars;
    /// lists are concatenated keeping the first occurrence.
    pub fn merge(&self) -> Result<MergedConfig> {
        let mut ordered: Vec<&ConfigLayer> = self.layers.iter().collect();
        ordered.sort_by_key(|layer| layer.kind());

        let mut merged = MergedConfig::default();

        for layer in ordered {
            tracing::debug!(layer = %layer.describe(), "merging configuration layer");

            extend_unique(&mut merged.plugins, &layer.plugins);
            extend_unique(&mut merged.repositories, &layer.repositories);
            extend_unique(&mut merged.classpath, &layer.classpath);
            merge_option(&mut merged.build_dir, &layer.build_dir);
            merged.properties.extend(&layer.properties);

            merge_android(&mut merged.android, &layer.android);

            for (name, decl) in &layer.signing {
                merged
                    .signing
                    .entry(name.clone())
                    .or_default()
                    .merge(decl);
            }

            for (name, decl) in &layer.build_types {
                merged
                    .build_types
                    .entry(name.clone())
                    .or_default()
                    .merge(decl);
            }

            if let Some(python) = &layer.python {
                let target = merged.python.get_or_insert_with(MergedPython::default);
                merge_option(&mut target.version, &python.version);
                merge_packages(&mut target.packages, &python.packages)?;
                merge_bindings(&mut target.bindings, &python.bindings)?;
            }

            if let Some(flutter) = &layer.flutter {
                merge_option(&mut merged.flutter_source, &flutter.source);
            }
        }

        merged.properties.merge(&self.overrides);

        Ok(merged)
    }

    /// Merges and validates every layer, stopping at the first invalid field.
    pub fn resolve(&self) -> Result<BuildPlan> {
        if self.layers.is_empty() {
            return Err(ResolveError::missing("layers"));
        }

        let merged = self.merge()?;
        let plan = self.build_plan(&merged)?;

        tracing::info!(
            application = %plan.application.id,
            abis = plan.abis.len(),
            packages = plan.interpreter.as_ref().map_or(0, |i| i.packages.len()),
            "resolved build plan"
        );

        Ok(plan)
    }

    fn build_plan(&self, merged: &MergedConfig) -> Result<BuildPlan> {
        let properties = &merged.properties;
        let android = &merged.android;

        let application = resolve_application(android, properties)?;
        let sdk = resolve_sdk(android, properties)?;

        let java_version = android.java_version.unwrap_or(DEFAULT_JAVA_VERSION);
        if !SUPPORTED_JAVA_VERSIONS.contains(&java_version) {
            return Err(ResolveError::invalid_value(
                "android.java_version",
                java_version.to_string(),
                format!("expected one of {:?}", SUPPORTED_JAVA_VERSIONS),
            ));
        }

        validate_plugins(merged)?;
        let abis = self.resolve_abis(&android.abi_filters)?;

        for repository in &merged.repositories {
            validate_repository("repositories", repository)?;
        }
        let classpath = parse_coordinates("classpath", &merged.classpath)?;
        let dependencies = parse_coordinates("android.dependencies", &android.dependencies)?;

        let build_types = resolve_build_types(merged)?;
        let interpreter = merged
            .python
            .as_ref()
            .map(resolve_interpreter)
            .transpose()?;

        Ok(BuildPlan {
            schema_version: PLAN_SCHEMA_VERSION,
            application,
            sdk,
            java_version,
            multidex: android.multidex.unwrap_or(false),
            plugins: merged.plugins.clone(),
            repositories: merged.repositories.clone(),
            classpath,
            dependencies,
            abis,
            build_types,
            interpreter,
            flutter_source: merged.flutter_source.clone(),
            build_dir: merged.build_dir.clone(),
        })
    }

    fn resolve_abis(&self, filters: &[String]) -> Result<Vec<AbiTarget>> {
        if filters.is_empty() {
            return Err(ResolveError::missing("android.abi_filters"));
        }

        filters
            .iter()
            .map(|abi| match self.abi_mapping.toolchain_triple(abi) {
                Some(triple) => Ok(AbiTarget {
                    abi: abi.clone(),
                    toolchain_triple: triple.to_string(),
                }),
                None => Err(ResolveError::UnsupportedAbi {
                    field: "android.abi_filters".to_string(),
                    abi: abi.clone(),
                    known: self.abi_mapping.supported_abis().join(", "),
                }),
            })
            .collect()
    }
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_application(android: &AndroidDecl, properties: &Properties) -> Result<Application> {
    let id = android
        .application_id
        .clone()
        .ok_or_else(|| ResolveError::missing("android.application_id"))?;
    validate_package_name("android.application_id", &id)?;

    let namespace = android.namespace.clone().unwrap_or_else(|| id.clone());
    validate_package_name("android.namespace", &namespace)?;

    let version_code = match &android.version_code {
        Some(setting) => properties.resolve_number("android.version_code", setting)?,
        None => DEFAULT_VERSION_CODE,
    };
    if version_code == 0 || version_code > MAX_VERSION_CODE {
        return Err(ResolveError::invalid_value(
            "android.version_code",
            version_code.to_string(),
            format!("must be between 1 and {}", MAX_VERSION_CODE),
        ));
    }

    let version_name = match &android.version_name {
        Some(setting) => properties.resolve_text("android.version_name", setting)?,
        None => DEFAULT_VERSION_NAME.to_string(),
    };
    if version_name.trim().is_empty() {
        return Err(ResolveError::invalid_value(
            "android.version_name",
            version_name,
            "must not be empty",
        ));
    }

    Ok(Application {
        id,
        namespace,
        version_code,
        version_name,
    })
}

fn resolve_sdk(android: &AndroidDecl, properties: &Properties) -> Result<SdkLevels> {
    let required = |field: &str, setting: &Option<Setting>| -> Result<u32> {
        let setting = setting
            .as_ref()
            .ok_or_else(|| ResolveError::missing(field))?;
        properties.resolve_number(field, setting)
    };

    let min = required("android.min_sdk", &android.min_sdk)?;
    let target = required("android.target_sdk", &android.target_sdk)?;
    let compile = match &android.compile_sdk {
        Some(setting) => properties.resolve_number("android.compile_sdk", setting)?,
        None => target,
    };

    if min == 0 {
        return Err(ResolveError::invalid_value(
            "android.min_sdk",
            "0",
            "API levels start at 1",
        ));
    }

    ensure_order("android.min_sdk", min, "android.target_sdk", target)?;
    ensure_order("android.min_sdk", min, "android.compile_sdk", compile)?;

    if target > compile {
        tracing::warn!(
            target_sdk = target,
            compile_sdk = compile,
            "target SDK is newer than compile SDK"
        );
    }

    if let Some(ndk) = &android.ndk_version {
        let well_formed = !ndk.is_empty()
            && ndk.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if !well_formed {
            return Err(ResolveError::invalid_value(
                "android.ndk_version",
                ndk,
                "expected a dotted numeric version",
            ));
        }
    }

    Ok(SdkLevels {
        min,
        target,
        compile,
        ndk_version: android.ndk_version.clone(),
    })
}

fn ensure_order(lower_field: &str, lower: u32, upper_field: &str, upper: u32) -> Result<()> {
    if lower > upper {
        return Err(ResolveError::VersionOrder {
            lower_field: lower_field.to_string(),
            lower,
            upper_field: upper_field.to_string(),
            upper,
        });
    }
    Ok(())
}

fn validate_plugins(merged: &MergedConfig) -> Result<()> {
    if merged.plugins.is_empty() {
        return Err(ResolveError::missing("plugins"));
    }

    for plugin in &merged.plugins {
        let valid = !plugin.is_empty()
            && plugin
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(ResolveError::invalid_value(
                "plugins",
                plugin,
                "plugin ids may contain letters, digits, '.', '-' and '_'",
            ));
        }
    }

    let require = |plugin: &str, required_by: &str| -> Result<()> {
        if merged.plugins.iter().any(|p| p == plugin) {
            Ok(())
        } else {
            Err(ResolveError::MissingPlugin {
                field: "plugins".to_string(),
                plugin: plugin.to_string(),
                required_by: required_by.to_string(),
            })
        }
    };

    require(ANDROID_APPLICATION_PLUGIN, "android")?;
    if let Some(python) = &merged.python {
        if !python.packages.is_empty() || !python.bindings.is_empty() {
            require(PYTHON_PLUGIN, "python")?;
        }
    }
    if merged.flutter_source.is_some() {
        require(FLUTTER_PLUGIN, "flutter.source")?;
    }

    Ok(())
}

fn parse_coordinates(field: &str, raw: &[String]) -> Result<Vec<Coordinate>> {
    let mut coordinates: Vec<Coordinate> = Vec::with_capacity(raw.len());

    for text in raw {
        let coordinate = Coordinate::parse(field, text)?;
        if let Some(existing) = coordinates.iter().find(|c| c.module() == coordinate.module()) {
            return Err(ResolveError::InvalidDependency {
                field: field.to_string(),
                coordinate: coordinate.to_string(),
                reason: format!("conflicts with {}", existing),
            });
        }
        coordinates.push(coordinate);
    }

    Ok(coordinates)
}

fn resolve_build_types(merged: &MergedConfig) -> Result<BTreeMap<String, ResolvedBuildType>> {
    let registry = SigningRegistry::from_decls(&merged.signing)?;

    // The Android plugin always defines `debug` and `release`.
    let mut decls: BTreeMap<String, BuildTypeDecl> = BTreeMap::new();
    decls.insert(
        "debug".to_string(),
        BuildTypeDecl {
            signing: Some(DEBUG_PROFILE.to_string()),
            ..Default::default()
        },
    );
    decls.insert("release".to_string(), BuildTypeDecl::default());
    for (name, decl) in &merged.build_types {
        decls.entry(name.clone()).or_default().merge(decl);
    }

    let mut resolved = BTreeMap::new();
    for (name, decl) in &decls {
        let field = format!("build_types.{}", name);
        if !is_identifier(name) {
            return Err(ResolveError::invalid_value(
                field,
                name,
                "build type names must be identifiers",
            ));
        }

        let signing = match &decl.signing {
            Some(profile) => Some(
                registry
                    .lookup(&format!("{}.signing", field), profile)?
                    .clone(),
            ),
            None => None,
        };

        let minify = decl.minify.unwrap_or(false);
        let shrink_resources = decl.shrink_resources.unwrap_or(false);
        if shrink_resources && !minify {
            return Err(ResolveError::invalid_value(
                format!("{}.shrink_resources", field),
                "true",
                "resource shrinking requires minify",
            ));
        }

        resolved.insert(
            name.clone(),
            ResolvedBuildType {
                signing,
                minify,
                shrink_resources,
                proguard_files: decl.proguard_files.clone().unwrap_or_default(),
            },
        );
    }

    Ok(resolved)
}

fn resolve_interpreter(python: &MergedPython) -> Result<InterpreterPlan> {
    if let Some(version) = &python.version {
        let parts: Vec<&str> = version.split('.').collect();
        let well_formed = (2..=3).contains(&parts.len())
            && parts[0] == "3"
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        if !well_formed {
            return Err(ResolveError::invalid_value(
                "python.version",
                version,
                "expected a Python 3 version such as 3.11",
            ));
        }
    }

    for binding in &python.bindings {
        let field = format!("python.bindings.{}.{}", binding.channel, binding.method);

        if binding.channel.trim().is_empty() {
            return Err(ResolveError::missing("python.bindings.channel"));
        }
        if binding.method.trim().is_empty() {
            return Err(ResolveError::missing(format!(
                "python.bindings.{}.method",
                binding.channel
            )));
        }
        if !binding.module.split('.').all(is_identifier) {
            return Err(ResolveError::invalid_value(
                format!("{}.module", field),
                &binding.module,
                "expected a dotted Python module path",
            ));
        }
        if !is_identifier(&binding.function) {
            return Err(ResolveError::invalid_value(
                format!("{}.function", field),
                &binding.function,
                "expected a Python identifier",
            ));
        }

        let mut seen = HashSet::new();
        for argument in &binding.arguments {
            if argument.trim().is_empty() {
                return Err(ResolveError::invalid_value(
                    format!("{}.arguments", field),
                    argument,
                    "argument names must not be empty",
                ));
            }
            if !seen.insert(argument.as_str()) {
                return Err(ResolveError::DuplicateEntry {
                    field: format!("{}.arguments", field),
                    name: argument.clone(),
                });
            }
        }
    }

    Ok(InterpreterPlan {
        version: python.version.clone(),
        packages: python.packages.clone(),
        bindings: python.bindings.clone(),
    })
}

fn merge_android(base: &mut AndroidDecl, over: &AndroidDecl) {
    merge_option(&mut base.namespace, &over.namespace);
    merge_option(&mut base.application_id, &over.application_id);
    merge_option(&mut base.compile_sdk, &over.compile_sdk);
    merge_option(&mut base.min_sdk, &over.min_sdk);
    merge_option(&mut base.target_sdk, &over.target_sdk);
    merge_option(&mut base.version_code, &over.version_code);
    merge_option(&mut base.version_name, &over.version_name);
    merge_option(&mut base.ndk_version, &over.ndk_version);
    merge_option(&mut base.java_version, &over.java_version);
    merge_option(&mut base.multidex, &over.multidex);
    extend_unique(&mut base.abi_filters, &over.abi_filters);
    extend_unique(&mut base.dependencies, &over.dependencies);
}

/// Packages from a later layer replace an earlier entry of the same name in
/// place; the same name twice within one layer is rejected.
fn merge_packages(
    target: &mut Vec<PackageRequirement>,
    decls: &[PackageDecl],
) -> Result<()> {
    let mut seen_in_layer = HashSet::new();

    for decl in decls {
        let requirement = PackageRequirement::from_decl("python.packages", decl)?;
        let key = requirement.normalized_name();

        if !seen_in_layer.insert(key.clone()) {
            return Err(ResolveError::DuplicateEntry {
                field: "python.packages".to_string(),
                name: requirement.name,
            });
        }

        match target.iter_mut().find(|p| p.normalized_name() == key) {
            Some(existing) => *existing = requirement,
            None => target.push(requirement),
        }
    }

    Ok(())
}

fn merge_bindings(target: &mut Vec<ChannelBinding>, bindings: &[ChannelBinding]) -> Result<()> {
    let mut seen_in_layer = HashSet::new();

    for binding in bindings {
        let key = (binding.channel.clone(), binding.method.clone());
        if !seen_in_layer.insert(key.clone()) {
            return Err(ResolveError::DuplicateEntry {
                field: "python.bindings".to_string(),
                name: format!("{}/{}", key.0, key.1),
            });
        }

        match target
            .iter_mut()
            .find(|b| b.channel == key.0 && b.method == key.1)
        {
            Some(existing) => *existing = binding.clone(),
            None => target.push(binding.clone()),
        }
    }

    Ok(())
}

fn merge_option<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn validate_package_name(field: &str, name: &str) -> Result<()> {
    let segments: Vec<&str> = name.split('.').collect();
    let valid = segments.len() >= 2
        && segments.iter().all(|segment| {
            segment.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if !valid {
        return Err(ResolveError::invalid_value(
            field,
            name,
            "expected a dotted package name such as com.example.app",
        ));
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
