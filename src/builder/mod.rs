//! Per-platform build execution.
//!
//! A [`BuildJob`] binds one matrix row to the run's [`VersionDescriptor`] and
//! an isolated job directory. A [`BuildBackend`] turns the job into exactly one
//! binary or a [`BuildFailure`]; jobs are never retried.

pub mod process;
pub mod strategy;
pub mod tool_detection;

pub use strategy::BuildStrategy;

use crate::matrix::PlatformTarget;
use crate::metadata::VersionDescriptor;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Where in a job a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    /// Host or tool preparation (`rustup`, `cross`, Docker)
    Toolchain,
    /// The compiler run, or a missing binary afterwards
    Compile,
    /// Staging, archiving or hashing
    Package,
    /// The job task itself died
    Panicked,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toolchain => f.write_str("toolchain"),
            Self::Compile => f.write_str("compile"),
            Self::Package => f.write_str("package"),
            Self::Panicked => f.write_str("panicked"),
        }
    }
}

/// Terminal failure of one platform's job.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{platform} failed during {stage}: {reason}")]
pub struct BuildFailure {
    pub platform: PlatformTarget,
    pub stage: JobStage,
    pub reason: String,
}

impl BuildFailure {
    pub fn new(platform: PlatformTarget, stage: JobStage, reason: impl Into<String>) -> Self {
        Self {
            platform,
            stage,
            reason: reason.into(),
        }
    }
}

/// One platform build, isolated in its own directory.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub target: PlatformTarget,
    pub version: Arc<VersionDescriptor>,
    pub source_dir: PathBuf,
    /// `<jobs root>/<triple>-<uuid>`; nothing else writes here
    pub job_dir: PathBuf,
}

impl BuildJob {
    /// Creates a job with a fresh, unique directory under `jobs_root`.
    pub fn new(
        target: PlatformTarget,
        version: Arc<VersionDescriptor>,
        source_dir: &Path,
        jobs_root: &Path,
    ) -> Self {
        let job_dir = jobs_root.join(format!(
            "{}-{}",
            target.target_triple(),
            uuid::Uuid::new_v4().simple()
        ));
        Self {
            target,
            version,
            source_dir: source_dir.to_path_buf(),
            job_dir,
        }
    }

    /// Cargo target dir private to this job.
    pub fn target_dir(&self) -> PathBuf {
        self.job_dir.join("target")
    }

    /// `reson` or `reson.exe`
    pub fn binary_file_name(&self) -> String {
        format!(
            "{}{}",
            self.version.binary_name(),
            self.target.file_extension()
        )
    }

    /// Where a successful compile leaves the binary.
    pub fn binary_path(&self) -> PathBuf {
        self.target_dir()
            .join(self.target.target_triple())
            .join("release")
            .join(self.binary_file_name())
    }
}

/// Produces one binary for a job.
pub trait BuildBackend: Send + Sync + 'static {
    /// Host checks shared by every job, run once before the fan-out.
    fn warm_up(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn build(&self, job: &BuildJob) -> impl Future<Output = Result<PathBuf, BuildFailure>> + Send;
}

/// [`BuildBackend`] driving `cargo` / `cross`.
#[derive(Debug, Clone)]
pub struct CargoBackend {
    timeout: Duration,
}

impl CargoBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BuildBackend for CargoBackend {
    async fn warm_up(&self) {
        tool_detection::warm_up().await;
    }

    async fn build(&self, job: &BuildJob) -> Result<PathBuf, BuildFailure> {
        let target = job.target;
        let label = target.platform_label();
        let strategy = BuildStrategy::for_target(target);

        log::info!(
            "[{label}] preparing {} build for {}",
            target.runner_kind(),
            target.target_triple()
        );
        strategy.prepare(job).await?;

        tokio::fs::create_dir_all(job.target_dir())
            .await
            .map_err(|e| {
                BuildFailure::new(
                    target,
                    JobStage::Compile,
                    format!("cannot create {}: {e}", job.target_dir().display()),
                )
            })?;

        let command = strategy.build_command(job);
        log::info!("[{label}] {}", command.display());

        let output = process::run_streaming(&command, &job.source_dir, self.timeout, label)
            .await
            .map_err(|e| BuildFailure::new(target, JobStage::Compile, e.to_string()))?;

        if !output.status.success() {
            return Err(BuildFailure::new(
                target,
                JobStage::Compile,
                format!("{} exited with {}:\n{}", command.program, output.status, output.tail()),
            ));
        }

        let binary = job.binary_path();
        if !binary.is_file() {
            return Err(BuildFailure::new(
                target,
                JobStage::Compile,
                format!("build succeeded but no binary at {}", binary.display()),
            ));
        }

        log::info!("[{label}] built {}", binary.display());
        Ok(binary)
    }
}
