use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::plan::BuildPlan;

pub const PLAN_PROPERTY: &str = "buildplan.path";

/// Runs the Gradle build for one build type of a resolved plan.
pub struct GradleInvoker {
    project_dir: PathBuf,
    plan_path: PathBuf,
    build_type: String,
    offline: bool,
    extra_args: Vec<String>,
}

impl GradleInvoker {
    pub fn new(project_dir: impl AsRef<Path>, plan_path: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            plan_path: plan_path.as_ref().to_path_buf(),
            build_type: "release".to_string(),
            offline: false,
            extra_args: Vec::new(),
        }
    }

    pub fn build_type(mut self, build_type: impl Into<String>) -> Self {
        self.build_type = build_type.into();
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// `assemble` followed by the capitalised build type, e.g. `assembleRelease`.
    pub fn task_name(&self) -> String {
        let mut chars = self.build_type.chars();
        match chars.next() {
            Some(first) => format!("assemble{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "assemble".to_string(),
        }
    }

    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            self.task_name(),
            format!("-P{}={}", PLAN_PROPERTY, self.plan_path.display()),
        ];

        if self.offline {
            args.push("--offline".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Prefers the project's wrapper script and falls back to `gradle` on PATH.
    pub fn executable(&self) -> Result<PathBuf> {
        let wrapper = if cfg!(target_os = "windows") {
            self.project_dir.join("gradlew.bat")
        } else {
            self.project_dir.join("gradlew")
        };

        if wrapper.exists() {
            return Ok(wrapper);
        }

        which::which("gradle").map_err(|_| {
            anyhow!(
                "No Gradle wrapper in {} and `gradle` is not on PATH",
                self.project_dir.display()
            )
        })
    }

    pub fn check_plan(&self, plan: &BuildPlan) -> Result<()> {
        if !plan.build_types.contains_key(&self.build_type) {
            let known: Vec<&str> = plan.build_types.keys().map(|s| s.as_str()).collect();
            return Err(anyhow!(
                "Build type '{}' is not defined in the plan (defined: {})",
                self.build_type,
                known.join(", ")
            ));
        }
        Ok(())
    }

    pub fn build(&self, plan: &BuildPlan) -> Result<()> {
        self.check_plan(plan)?;

        let executable = self.executable()?;
        let args = self.command_args();

        tracing::info!(
            executable = %executable.display(),
            task = %self.task_name(),
            "invoking gradle"
        );

        let output = Command::new(&executable)
            .args(&args)
            .current_dir(&self.project_dir)
            .output()
            .with_context(|| format!("Failed to execute {}", executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Gradle build failed: {}", stderr));
        }

        Ok(())
    }
}
