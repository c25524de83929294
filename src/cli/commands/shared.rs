//! Pieces shared by the pipeline subcommands.

use crate::cli::RuntimeConfig;
use crate::cli::args::{ReleaseArgs, SourceArgs};
use crate::config::{ReleaseConfig, Trigger};
use crate::error::{CliError, ReleaseError, Result};
use crate::git::SystemGit;
use crate::metadata;
use crate::pipeline::PipelineReport;
use crate::publisher::GitHubClient;
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

/// Source and work directories only; enough for a single-platform build.
pub fn resolve_source(args: &SourceArgs) -> Result<ReleaseConfig> {
    let source_dir = absolute(&args.source)?;
    let mut config = ReleaseConfig::for_source(&source_dir);
    if let Some(work_dir) = &args.work_dir {
        config.work_dir = absolute(work_dir)?;
    }
    Ok(config)
}

/// Builds the run configuration from arguments, environment and manifest.
pub fn resolve_config(args: &ReleaseArgs) -> Result<ReleaseConfig> {
    let mut config = resolve_source(&args.source)?;

    config.repository = match &args.repo {
        Some(repo) => metadata::github_slug(repo),
        None if args.dry_run => None,
        None => repository_from_manifest(&config.manifest_path())?,
    };
    config.api_url = args.api_url.clone();
    config.branch = args.branch.clone();
    config.trigger = Trigger::new(args.event.clone(), args.git_ref.clone());
    config.dry_run = args.dry_run;
    config.no_push = args.no_push;
    config.publish_attempts = args.publish_attempts;

    Ok(config)
}

/// `[package.metadata.release] repository`, else `package.repository`.
fn repository_from_manifest(manifest_path: &Path) -> Result<Option<String>> {
    let manifest = metadata::load_manifest(manifest_path)?;
    Ok(manifest
        .release_settings
        .repository
        .as_deref()
        .or(manifest.metadata.repository.as_deref())
        .and_then(metadata::github_slug))
}

pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path.absolutize()?.into_owned())
}

pub fn version_control(config: &ReleaseConfig) -> SystemGit {
    if config.no_push {
        SystemGit::new(&config.source_dir).local_only()
    } else {
        SystemGit::new(&config.source_dir)
    }
}

/// The GitHub client, or `None` for a dry run.
pub fn release_host(
    config: &ReleaseConfig,
    token: Option<&str>,
    runtime_config: &RuntimeConfig,
) -> Result<Option<GitHubClient>> {
    if config.dry_run {
        return Ok(None);
    }
    let repository = config
        .repository
        .as_deref()
        .ok_or_else(|| CliError::MissingArgument {
            argument: "--repo (or GITHUB_REPOSITORY, or repository in Cargo.toml)".to_string(),
        })?;
    let token = token.ok_or_else(|| CliError::MissingArgument {
        argument: "GITHUB_TOKEN".to_string(),
    })?;
    runtime_config.verbose_println(&format!("Publishing to {repository} via {}", config.api_url))?;
    Ok(Some(GitHubClient::new(&config.api_url, repository, token)?))
}

/// Prints a finished run; an incomplete matrix is exit code 1.
pub fn finish(result: Result<PipelineReport>, runtime_config: &RuntimeConfig) -> Result<i32> {
    match result {
        Ok(report) => {
            print_report(&report, runtime_config)?;
            Ok(0)
        }
        Err(ReleaseError::IncompleteRelease(incomplete)) => {
            runtime_config.error(&format!(
                "Release blocked: {}/{} platforms produced artifacts",
                incomplete.succeeded.len(),
                incomplete.expected
            ))?;
            for failure in &incomplete.failures {
                runtime_config.indent(&format!(
                    "✗ {} [{}]: {}",
                    failure.platform, failure.stage, failure.reason
                ))?;
            }
            for platform in &incomplete.missing {
                runtime_config.indent(&format!("✗ {platform}: no result"))?;
            }
            for platform in &incomplete.succeeded {
                runtime_config.indent(&format!("✓ {platform}"))?;
            }
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

fn print_report(report: &PipelineReport, runtime_config: &RuntimeConfig) -> Result<()> {
    match report {
        PipelineReport::Skipped { reason } => {
            runtime_config.success(&format!("Nothing to release: {reason}"))?;
        }
        PipelineReport::DryRun {
            tag,
            artifacts,
            checksums,
            body,
        } => {
            runtime_config.success(&format!("Dry run for {tag} complete"))?;
            runtime_config.section("Artifacts")?;
            for artifact in artifacts {
                runtime_config.indent(&artifact.archive_path.display().to_string())?;
            }
            print_checksums(checksums, runtime_config)?;
            runtime_config.verbose_println("")?;
            runtime_config.verbose_println(body)?;
        }
        PipelineReport::Released {
            tag,
            release_url,
            checksums,
            reused,
            ..
        } => {
            if *reused {
                runtime_config.success(&format!("{tag} was already published: {release_url}"))?;
            } else {
                runtime_config.success(&format!("Published {tag}: {release_url}"))?;
            }
            print_checksums(checksums, runtime_config)?;
        }
    }
    Ok(())
}

fn print_checksums(checksums: &str, runtime_config: &RuntimeConfig) -> Result<()> {
    runtime_config.section("Checksums (SHA-256)")?;
    for line in checksums.lines() {
        runtime_config.indent(line)?;
    }
    Ok(())
}
