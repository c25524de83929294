//! The release run: trigger, gate, fan-out, barrier, publish.
//!
//! [`Pipeline::run`] performs every stage on one host. When each platform
//! builds on its own runner, the stages are driven separately:
//! [`Pipeline::admit`], then [`build_platform`] once per platform into a
//! shared directory, then [`Pipeline::publish_from`].

mod fanout;
pub mod handoff;

pub use fanout::{JobOutcome, MatrixRun, run_platform};

use crate::builder::{BuildBackend, BuildJob};
use crate::config::ReleaseConfig;
use crate::error::{ErrorExt, Result};
use crate::gate::{GateDecision, GateStatus, VersionGate};
use crate::git::VersionControl;
use crate::matrix::PlatformTarget;
use crate::metadata::{self, VersionDescriptor};
use crate::packager::{Artifact, ArtifactPackager};
use crate::publisher::{
    CompleteArtifacts, PublishError, ReleaseHost, ReleaseManifest, ReleasePublisher, changelog,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// How a run ended, when it didn't fail.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineReport {
    /// Nothing to do: wrong trigger, or the version is already released
    Skipped { reason: String },
    /// Everything up to publishing ran; the host was not contacted
    DryRun {
        tag: String,
        artifacts: Vec<Artifact>,
        checksums: String,
        body: String,
    },
    /// The release is live with every artifact attached
    Released {
        tag: String,
        release_url: String,
        artifacts: Vec<Artifact>,
        checksums: String,
        reused: bool,
    },
}

/// Outcome of [`Pipeline::admit`].
#[derive(Debug, Clone)]
pub enum Admission {
    /// The tag is claimed (or free, in a dry run); build and publish.
    Open(GateDecision),
    /// Wrong trigger, or the version is already released
    Closed { reason: String },
}

/// One pipeline run over a source tree.
pub struct Pipeline<V, B, H> {
    config: ReleaseConfig,
    vcs: V,
    backend: Arc<B>,
    host: Option<H>,
}

impl<V, B, H> Pipeline<V, B, H>
where
    V: VersionControl,
    B: BuildBackend,
    H: ReleaseHost,
{
    /// `host` may be `None` only for dry runs.
    pub fn new(config: ReleaseConfig, vcs: V, backend: B, host: Option<H>) -> Self {
        Self {
            config,
            vcs,
            backend: Arc::new(backend),
            host,
        }
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    /// Admission stage: trigger check, then the version gate.
    ///
    /// Outside a dry run the release host must be configured before the gate
    /// may claim a tag.
    pub async fn admit(&self) -> Result<Admission> {
        let config = &self.config;

        if !config.trigger.is_release_push(&config.branch) {
            let reason = config.trigger.skip_reason(&config.branch);
            log::info!("Skipping: {reason}");
            return Ok(Admission::Closed { reason });
        }

        self.require_host()?;

        let decision = VersionGate::new(&self.vcs)
            .dry_run(config.dry_run)
            .decide(&config.source_dir)
            .await?;
        if !decision.should_release {
            let reason = decision.describe();
            log::info!("Skipping: {reason}");
            return Ok(Admission::Closed { reason });
        }

        Ok(Admission::Open(decision))
    }

    /// Runs the whole sequence on this host.
    ///
    /// A closed gate or a non-release trigger is a successful
    /// [`PipelineReport::Skipped`]. Any failed platform fails the run with
    /// [`IncompleteRelease`](crate::publisher::IncompleteRelease) before the
    /// host is contacted.
    pub async fn run(&self) -> Result<PipelineReport> {
        let config = &self.config;

        let decision = match self.admit().await? {
            Admission::Open(decision) => decision,
            Admission::Closed { reason } => return Ok(PipelineReport::Skipped { reason }),
        };
        let descriptor = Arc::clone(&decision.descriptor);
        log::info!("Releasing {descriptor}");

        for dir in [config.dist_dir(), config.jobs_dir(), config.staging_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .fs_context("creating work directory", &dir)?;
        }

        // Fan-out and barrier
        let packager = ArtifactPackager::new(
            &config.source_dir,
            config.dist_dir(),
            config.staging_dir(),
        )
        .with_include(decision.settings.include.clone());

        let outcomes = MatrixRun {
            backend: Arc::clone(&self.backend),
            packager: Arc::new(packager),
            version: Arc::clone(&descriptor),
            source_dir: config.source_dir.clone(),
            jobs_root: config.jobs_dir(),
            max_parallel: config.jobs,
        }
        .run()
        .await;

        let to_ref = match decision.status {
            GateStatus::Tagged => descriptor.tag(),
            _ => "HEAD",
        };
        self.release(&descriptor, outcomes, &config.dist_dir(), to_ref)
            .await
    }

    /// Publishing stage for archives built on separate runners.
    ///
    /// Reloads every platform's archive from `dir` (see
    /// [`handoff::collect_from_dir`]) and continues exactly as [`run`](Self::run)
    /// does after its fan-out. Outside a dry run the tag must already exist,
    /// claimed by an earlier [`admit`](Self::admit).
    pub async fn publish_from(&self, dir: &Path) -> Result<PipelineReport> {
        self.require_host()?;

        let manifest = metadata::load_manifest(&self.config.manifest_path())?;
        let descriptor = manifest.version_descriptor();
        let tagged = self.vcs.tag_exists(descriptor.tag()).await?;
        if !tagged && !self.config.dry_run {
            crate::bail!(
                "tag {} does not exist; run the gate stage before publishing",
                descriptor.tag()
            );
        }

        let outcomes = handoff::collect_from_dir(dir, &descriptor).await;
        let to_ref = if tagged { descriptor.tag() } else { "HEAD" };
        self.release(&descriptor, outcomes, dir, to_ref).await
    }

    fn require_host(&self) -> Result<()> {
        if !self.config.dry_run && self.host.is_none() {
            return Err(PublishError::Config(
                "no release host configured; set GITHUB_TOKEN and a repository, or use --dry-run"
                    .to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Barrier, changelog, `checksums.txt`, then publish (or the dry-run report).
    async fn release(
        &self,
        descriptor: &VersionDescriptor,
        outcomes: Vec<JobOutcome>,
        dist_dir: &Path,
        to_ref: &str,
    ) -> Result<PipelineReport> {
        let artifacts = CompleteArtifacts::collect(outcomes)?;

        let changelog = changelog::generate(&self.vcs, descriptor, to_ref).await?;
        let manifest = ReleaseManifest::new(descriptor, artifacts, changelog, dist_dir);
        manifest.write_checksum_file().await?;
        let checksums = manifest.checksum_listing();

        let Some(host) = self.host.as_ref().filter(|_| !self.config.dry_run) else {
            log::info!("Dry run: not publishing {}", manifest.tag);
            return Ok(PipelineReport::DryRun {
                tag: manifest.tag.clone(),
                artifacts: manifest.artifacts().to_vec(),
                checksums,
                body: manifest.render_body()?,
            });
        };

        let published = ReleasePublisher::new(host)
            .with_retry(self.config.publish_attempts, self.config.publish_backoff)
            .publish(&manifest)
            .await?;

        Ok(PipelineReport::Released {
            tag: published.tag,
            release_url: published.url,
            artifacts: manifest.artifacts().to_vec(),
            checksums,
            reused: published.reused,
        })
    }
}

/// Build stage for one platform on a runner of its own.
///
/// Builds and packages `target` from `config.source_dir` into `out_dir` and
/// records the archive's checksum next to it for [`Pipeline::publish_from`].
/// A failed build is returned in the outcome, not as an error.
pub async fn build_platform<B: BuildBackend>(
    backend: &B,
    config: &ReleaseConfig,
    target: PlatformTarget,
    out_dir: &Path,
) -> Result<JobOutcome> {
    let manifest = metadata::load_manifest(&config.manifest_path())?;
    let descriptor = Arc::new(manifest.version_descriptor());

    for dir in [out_dir.to_path_buf(), config.jobs_dir(), config.staging_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .fs_context("creating work directory", &dir)?;
    }

    let packager = ArtifactPackager::new(&config.source_dir, out_dir, config.staging_dir())
        .with_include(manifest.release_settings.include);
    let job = BuildJob::new(target, descriptor, &config.source_dir, &config.jobs_dir());

    backend.warm_up().await;
    let outcome = run_platform(backend, &packager, job).await;
    if let Ok(artifact) = &outcome.result {
        handoff::write_checksum(artifact).await?;
    }
    Ok(outcome)
}
