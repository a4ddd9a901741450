use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::abi::AbiMapping;
use crate::config::{ConfigLayer, LayerKind};
use crate::drift::diff_plans;
use crate::gradle::GradleInvoker;
use crate::plan::{BuildPlan, PlanWriter, DEFAULT_CACHE_DIR};
use crate::properties::Properties;
use crate::resolver::ManifestResolver;

pub const DEFAULT_APP_LAYER: &str = "buildplan.toml";

#[derive(Parser)]
#[command(name = "buildplan")]
#[command(about = "Resolve layered Android build configuration into a deterministic build plan")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LayerArgs {
    /// Project-wide layer, applied first
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Subproject layers, applied after the root layer
    #[arg(long)]
    pub subproject: Vec<PathBuf>,

    /// App module layer, applied last (default: buildplan.toml)
    #[arg(long)]
    pub app: Option<PathBuf>,

    /// key=value properties files (e.g. local.properties)
    #[arg(long = "properties")]
    pub properties_files: Vec<PathBuf>,

    /// Property override in key=value form
    #[arg(short = 'P', long = "property")]
    pub property: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the layers and write the build plan
    Resolve {
        #[command(flatten)]
        layers: LayerArgs,

        /// Directory plans are written under
        #[arg(long, env = "BUILDPLAN_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        /// Print the plan JSON instead of writing it
        #[arg(long)]
        stdout: bool,
    },

    /// Validate the layers without writing anything
    Check {
        #[command(flatten)]
        layers: LayerArgs,

        /// Also check that referenced files exist relative to this module directory
        #[arg(long)]
        verify_inputs: Option<PathBuf>,
    },

    /// Summarise a written plan
    Show {
        /// Path to plan.json
        plan: PathBuf,

        /// Print the raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two plans or two app layers and report drift
    Diff {
        /// Plan JSON or app layer TOML
        left: PathBuf,

        /// Plan JSON or app layer TOML
        right: PathBuf,

        /// Shared project-wide layer for TOML inputs
        #[arg(long)]
        root: Option<PathBuf>,

        /// Property override in key=value form
        #[arg(short = 'P', long = "property")]
        property: Vec<String>,
    },

    /// Resolve, write the plan, and run the Gradle build
    Build {
        #[command(flatten)]
        layers: LayerArgs,

        /// Gradle project directory
        #[arg(long, default_value = "android")]
        project_dir: PathBuf,

        /// Build type to assemble
        #[arg(long, default_value = "release")]
        build_type: String,

        /// Directory plans are written under
        #[arg(long, env = "BUILDPLAN_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        /// Pass --offline to Gradle
        #[arg(long)]
        offline: bool,
    },

    /// Check for the external tools a build needs
    Doctor,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Resolve {
            layers,
            cache_dir,
            stdout,
        } => resolve_command(&layers, &cache_dir, stdout),
        Commands::Check {
            layers,
            verify_inputs,
        } => check_command(&layers, verify_inputs.as_deref()),
        Commands::Show { plan, json } => show_command(&plan, json),
        Commands::Diff {
            left,
            right,
            root,
            property,
        } => diff_command(&left, &right, root, property),
        Commands::Build {
            layers,
            project_dir,
            build_type,
            cache_dir,
            offline,
        } => build_command(&layers, &project_dir, build_type, &cache_dir, offline),
        Commands::Doctor => doctor_command(),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

impl LayerArgs {
    pub fn load_layers(&self) -> Result<Vec<ConfigLayer>> {
        let mut layers = Vec::new();

        if let Some(root) = &self.root {
            layers.push(ConfigLayer::from_path(root, LayerKind::Root)?);
        }
        for subproject in &self.subproject {
            layers.push(ConfigLayer::from_path(subproject, LayerKind::Subproject)?);
        }

        let app = match &self.app {
            Some(app) => Some(app.clone()),
            None if layers.is_empty() => Some(PathBuf::from(DEFAULT_APP_LAYER)),
            None => None,
        };
        if let Some(app) = app {
            layers.push(ConfigLayer::from_path(&app, LayerKind::App)?);
        }

        Ok(layers)
    }

    pub fn load_properties(&self) -> Result<Properties> {
        let mut properties = Properties::new();

        for path in &self.properties_files {
            let loaded = Properties::load(path)?;
            tracing::debug!(path = %path.display(), count = loaded.len(), "loaded properties");
            properties.merge(&loaded);
        }
        for raw in &self.property {
            let (key, value) = Properties::parse_override(raw)?;
            properties.set(key, value);
        }

        Ok(properties)
    }

    pub fn resolver(&self) -> Result<ManifestResolver> {
        let layers = self.load_layers()?;
        let properties = self.load_properties()?;

        Ok(ManifestResolver::new()
            .with_layers(layers)
            .with_properties(&properties))
    }

    pub fn resolve(&self) -> Result<BuildPlan> {
        let plan = self.resolver()?.resolve()?;
        Ok(plan)
    }
}

fn resolve_command(layers: &LayerArgs, cache_dir: &Path, stdout: bool) -> Result<()> {
    let plan = layers.resolve()?;

    if stdout {
        println!("{}", plan.to_json().context("Failed to serialize plan to JSON")?);
        return Ok(());
    }

    let writer = PlanWriter::with_cache_dir(cache_dir);
    let plan_path = writer.write_plan(&plan)
        .context("Failed to write plan")?;

    println!("Resolved {} ({})", plan.application.id, plan.application.version_name);
    println!("Fingerprint: {}", plan.fingerprint()?);
    println!("\nPlan path: {}", plan_path.display());

    Ok(())
}

fn check_command(layers: &LayerArgs, verify_inputs: Option<&Path>) -> Result<()> {
    let plan = layers.resolve()?;

    if let Some(module_dir) = verify_inputs {
        PlanWriter::new().verify_inputs(&plan, module_dir)?;
    }

    println!(
        "✓ {} is valid (min SDK {}, target SDK {}, ABIs: {})",
        plan.application.id,
        plan.sdk.min,
        plan.sdk.target,
        plan.abi_names().join(", ")
    );

    Ok(())
}

fn show_command(plan_path: &Path, json: bool) -> Result<()> {
    let plan = PlanWriter::new().read_plan(plan_path)?;

    if json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    println!("Application: {} (namespace {})", plan.application.id, plan.application.namespace);
    println!("Version: {} ({})", plan.application.version_name, plan.application.version_code);
    println!(
        "SDK: min {}, target {}, compile {}",
        plan.sdk.min, plan.sdk.target, plan.sdk.compile
    );
    if let Some(ndk) = &plan.sdk.ndk_version {
        println!("NDK: {}", ndk);
    }
    println!("Java: {}", plan.java_version);
    println!("Plugins: {}", plan.plugins.join(", "));

    println!("ABIs:");
    for abi in &plan.abis {
        println!("  {} -> {}", abi.abi, abi.toolchain_triple);
    }

    println!("Build types:");
    for (name, build_type) in &plan.build_types {
        let signing = build_type
            .signing
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("unsigned");
        println!(
            "  {}: signing {}, minify {}, shrink resources {}",
            name, signing, build_type.minify, build_type.shrink_resources
        );
    }

    if let Some(interpreter) = &plan.interpreter {
        println!("Python packages:");
        for requirement in plan.pip_requirements() {
            println!("  {}", requirement);
        }
        for binding in &interpreter.bindings {
            println!(
                "  channel {}/{} -> {}.{}({})",
                binding.channel,
                binding.method,
                binding.module,
                binding.function,
                binding.arguments.join(", ")
            );
        }
    }

    println!("\nFingerprint: {}", plan.fingerprint()?);

    Ok(())
}

fn diff_command(
    left: &Path,
    right: &Path,
    root: Option<PathBuf>,
    property: Vec<String>,
) -> Result<()> {
    let load = |path: &Path| -> Result<BuildPlan> {
        if path.extension().is_some_and(|ext| ext == "json") {
            return PlanWriter::new().read_plan(path);
        }
        let layers = LayerArgs {
            root: root.clone(),
            app: Some(path.to_path_buf()),
            property: property.clone(),
            ..Default::default()
        };
        layers
            .resolve()
            .with_context(|| format!("Failed to resolve {}", path.display()))
    };

    let left_plan = load(left)?;
    let right_plan = load(right)?;

    let drifts = diff_plans(&left_plan, &right_plan)
        .context("Failed to compare plans")?;

    if drifts.is_empty() {
        println!("✓ No drift between {} and {}", left.display(), right.display());
        return Ok(());
    }

    println!("Drift between {} and {}:", left.display(), right.display());
    for drift in &drifts {
        println!("  {}", drift);
    }

    Err(anyhow::anyhow!("Plans differ at {} path(s)", drifts.len()))
}

fn build_command(
    layers: &LayerArgs,
    project_dir: &Path,
    build_type: String,
    cache_dir: &Path,
    offline: bool,
) -> Result<()> {
    let plan = layers.resolve()?;

    let writer = PlanWriter::with_cache_dir(cache_dir);
    let plan_path = writer.plan_path(&plan.application.id);
    let plan_path = std::path::absolute(&plan_path)
        .with_context(|| format!("Failed to make plan path absolute: {}", plan_path.display()))?;

    let invoker = GradleInvoker::new(project_dir, &plan_path)
        .build_type(build_type.clone())
        .offline(offline);
    invoker.check_plan(&plan)?;

    writer.write_plan(&plan)
        .context("Failed to write plan")?;

    println!("Building {} ({}) with plan {}", plan.application.id, build_type, plan_path.display());

    invoker.build(&plan)
        .context("Failed to run Gradle build")?;

    println!("✓ Build finished");

    Ok(())
}

fn doctor_command() -> Result<()> {
    println!("buildplan doctor - checking external tools...\n");

    let mut missing = Vec::new();
    for (command, description) in [
        ("java", "Java runtime"),
        ("gradle", "Gradle (optional when the project has a wrapper)"),
        ("flutter", "Flutter SDK"),
        ("python3", "Python 3 (used to pre-compile bundled packages)"),
    ] {
        if !check_command_available(command, description) && command == "java" {
            missing.push(command);
        }
    }

    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        match std::env::var(var) {
            Ok(value) => println!("✓ {} = {}", var, value),
            Err(_) => println!("✗ {} not set", var),
        }
    }

    println!("\nKnown ABIs:");
    let mapping = AbiMapping::new();
    for abi in mapping.supported_abis() {
        if let Some(triple) = mapping.toolchain_triple(abi) {
            println!("    {} -> {}", abi, triple);
        }
    }

    if !missing.is_empty() {
        return Err(anyhow::anyhow!("Required tools missing: {}", missing.join(", ")));
    }

    println!("\n✓ buildplan doctor check complete");

    Ok(())
}

fn check_command_available(command: &str, description: &str) -> bool {
    match which::which(command) {
        Ok(path) => {
            println!("✓ {} found at: {}", description, path.display());
            true
        }
        Err(_) => {
            println!("✗ {} not found ({})", description, command);
            false
        }
    }
}
