//! Command line argument parsing and validation.
//!
//! This module provides the CLI surface using clap derive, with the CI
//! host's environment variables as fallbacks for the release inputs.

use crate::config::{DEFAULT_API_URL, DEFAULT_BRANCH};
use crate::matrix::PlatformTarget;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Release pipeline for Rust binaries
#[derive(Parser, Debug)]
#[command(
    name = "release_pipeline",
    version,
    about = "Builds, packages and publishes a release for every platform in the matrix",
    long_about = "Reads the version from Cargo.toml, tags the repository if that version has
not been released yet, builds the binary for six platforms in parallel,
packages each into a zip or tar.gz archive, writes checksums.txt and
publishes everything as one GitHub release.

Usage:
  release_pipeline run --source .
  release_pipeline run --dry-run
  release_pipeline gate
  release_pipeline build --platform Darwin_arm64 --out shared
  release_pipeline publish --dir shared
  release_pipeline matrix --json
  release_pipeline verify --dir target/release-pipeline/dist

Exit code 0 = released, or nothing to release. Anything else = failure."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Show extra detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline on this host: gate, build, package, publish
    Run(RunArgs),
    /// Claim the version tag if it is unreleased (first stage of a split run)
    Gate(GateArgs),
    /// Build and package one platform into a shared directory
    Build(BuildArgs),
    /// Check that every platform's archive is present, then publish them
    Publish(PublishArgs),
    /// Print the platform matrix
    Matrix(MatrixArgs),
    /// Re-hash the archives listed in a checksums.txt
    Verify(VerifyArgs),
}

/// Source tree and scratch space, shared by every pipeline stage.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source tree containing Cargo.toml
    #[arg(short = 's', long, value_name = "DIR", default_value = ".")]
    pub source: PathBuf,

    /// Scratch directory for jobs and dist/ (default: <source>/target/release-pipeline)
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

/// Inputs for the stages that touch the tag or the release host.
#[derive(clap::Args, Debug, Clone)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// GitHub repository (owner/repo)
    #[arg(long, value_name = "OWNER/REPO", env = "GITHUB_REPOSITORY")]
    pub repo: Option<String>,

    /// Token used for the release API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub API root
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Create no tag and publish nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Check and create the tag locally only
    #[arg(long)]
    pub no_push: bool,

    /// Publish attempts before giving up
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub publish_attempts: u32,

    /// Branch releases are cut from
    #[arg(long, default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Triggering event name (e.g. push)
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    pub event: Option<String>,

    /// Triggering ref (e.g. refs/heads/main)
    #[arg(long = "ref", value_name = "REF", env = "GITHUB_REF")]
    pub git_ref: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,

    /// Max platforms building at once (default: all)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Per-platform build timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    pub build_timeout: u64,
}

#[derive(clap::Args, Debug)]
pub struct GateArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Platform label (e.g. Linux_armv7) or target triple
    #[arg(short, long, value_parser = parse_platform)]
    pub platform: PlatformTarget,

    /// Shared directory the archive and its .sha256 are written to
    #[arg(short, long, value_name = "DIR")]
    pub out: PathBuf,

    /// Build timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    pub build_timeout: u64,
}

#[derive(clap::Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,

    /// Directory every `build` wrote its archive to
    #[arg(long, value_name = "DIR")]
    pub dir: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct MatrixArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Directory containing checksums.txt and the archives
    #[arg(long, value_name = "DIR")]
    pub dir: PathBuf,
}

/// Accepts a platform label or its target triple.
fn parse_platform(value: &str) -> Result<PlatformTarget, String> {
    PlatformTarget::from_label(value)
        .or_else(|| {
            PlatformTarget::ALL
                .into_iter()
                .find(|t| t.target_triple() == value)
        })
        .ok_or_else(|| {
            let labels: Vec<_> = PlatformTarget::ALL
                .iter()
                .map(|t| t.platform_label())
                .collect();
            format!("unknown platform '{value}'; expected one of {}", labels.join(", "))
        })
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        let (release, build_timeout) = match &self.command {
            Command::Run(run) => {
                if run.jobs == Some(0) {
                    return Err("--jobs must be at least 1".to_string());
                }
                (Some(&run.release), Some(run.build_timeout))
            }
            Command::Gate(gate) => (Some(&gate.release), None),
            Command::Publish(publish) => (Some(&publish.release), None),
            Command::Build(build) => (None, Some(build.build_timeout)),
            Command::Matrix(_) | Command::Verify(_) => (None, None),
        };

        if build_timeout == Some(0) {
            return Err("--build-timeout must be greater than 0".to_string());
        }
        if let Some(release) = release {
            release.validate()?;
        }

        Ok(())
    }
}

impl ReleaseArgs {
    fn validate(&self) -> Result<(), String> {
        if self.publish_attempts == 0 {
            return Err("--publish-attempts must be at least 1".to_string());
        }
        if self.branch.trim().is_empty() {
            return Err("--branch cannot be empty".to_string());
        }
        if let Some(repo) = &self.repo
            && crate::metadata::github_slug(repo).is_none()
        {
            return Err(format!("Invalid repository: {repo}. Expected OWNER/REPO"));
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    pub fn error(&self, message: &str) -> std::io::Result<()> {
        self.output.error(message)
    }

    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn run_defaults() {
        let args = parse(&[
            "release_pipeline",
            "run",
            "--dry-run",
            "--branch",
            "main",
            "--publish-attempts",
            "3",
        ]);
        let Command::Run(run) = &args.command else {
            panic!("expected run");
        };
        assert!(run.release.dry_run);
        assert_eq!(run.build_timeout, 3600);
        assert_eq!(run.release.source.source, PathBuf::from("."));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn rejects_zero_jobs() {
        let args = parse(&["release_pipeline", "run", "--jobs", "0"]);
        assert!(args.validate().unwrap_err().contains("--jobs"));
    }

    #[test]
    fn rejects_bad_repository() {
        let args = parse(&["release_pipeline", "run", "--repo", "just-a-name"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn verify_requires_dir() {
        assert!(Args::try_parse_from(["release_pipeline", "verify"]).is_err());
        let args = parse(&["release_pipeline", "verify", "--dir", "dist"]);
        assert!(matches!(args.command, Command::Verify(_)));
    }

    #[test]
    fn build_accepts_label_or_triple() {
        for platform in ["Linux_armv7", "armv7-unknown-linux-musleabihf"] {
            let args = parse(&["release_pipeline", "build", "-p", platform, "--out", "shared"]);
            let Command::Build(build) = &args.command else {
                panic!("expected build");
            };
            assert_eq!(build.platform, PlatformTarget::LinuxArmv7);
            assert_eq!(build.out, PathBuf::from("shared"));
        }
    }

    #[test]
    fn build_rejects_unknown_platform() {
        let err = Args::try_parse_from([
            "release_pipeline",
            "build",
            "--platform",
            "Plan9_mips",
            "--out",
            "shared",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("Linux_x86_64"));
    }

    #[test]
    fn publish_checks_release_inputs() {
        let args = parse(&[
            "release_pipeline",
            "publish",
            "--dir",
            "shared",
            "--publish-attempts",
            "0",
        ]);
        assert!(args.validate().unwrap_err().contains("--publish-attempts"));
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["release_pipeline", "-v", "-q", "matrix"]).is_err());
    }
}
