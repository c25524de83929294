//! Parallel per-platform build and package, joined at a barrier.

use crate::builder::{BuildBackend, BuildFailure, BuildJob, JobStage};
use crate::matrix::PlatformTarget;
use crate::metadata::VersionDescriptor;
use crate::packager::{Artifact, ArtifactPackager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// What one matrix branch hands to the barrier.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub platform: PlatformTarget,
    pub result: Result<Artifact, BuildFailure>,
    pub duration: Duration,
}

/// Shared inputs for every branch of the fan-out.
pub struct MatrixRun<B> {
    pub backend: Arc<B>,
    pub packager: Arc<ArtifactPackager>,
    pub version: Arc<VersionDescriptor>,
    pub source_dir: PathBuf,
    pub jobs_root: PathBuf,
    /// Max branches building at once; `None` runs the whole matrix at once
    pub max_parallel: Option<usize>,
}

impl<B: BuildBackend> MatrixRun<B> {
    /// Builds and packages every platform, returning once all have finished.
    ///
    /// Branches are independent: a failure or panic in one is recorded in its
    /// own outcome and never cancels the others. Outcomes come back in matrix
    /// order.
    pub async fn run(&self) -> Vec<JobOutcome> {
        self.backend.warm_up().await;

        let permits = Arc::new(Semaphore::new(
            self.max_parallel
                .unwrap_or(PlatformTarget::ALL.len())
                .max(1),
        ));

        let mut handles = Vec::with_capacity(PlatformTarget::ALL.len());
        for target in PlatformTarget::ALL {
            let job = BuildJob::new(
                target,
                Arc::clone(&self.version),
                &self.source_dir,
                &self.jobs_root,
            );
            let backend = Arc::clone(&self.backend);
            let packager = Arc::clone(&self.packager);
            let permits = Arc::clone(&permits);

            let handle = tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return JobOutcome {
                        platform: target,
                        result: Err(BuildFailure::new(
                            target,
                            JobStage::Toolchain,
                            "job scheduler shut down",
                        )),
                        duration: Duration::ZERO,
                    };
                };
                run_platform(backend.as_ref(), &packager, job).await
            });
            handles.push((target, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    log::warn!("[{target}] ✗ job task died: {join_error}");
                    JobOutcome {
                        platform: target,
                        result: Err(BuildFailure::new(
                            target,
                            JobStage::Panicked,
                            join_error.to_string(),
                        )),
                        duration: Duration::ZERO,
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Builds and packages one platform in its own job directory.
///
/// This is one branch of [`MatrixRun`], and also what a dedicated runner
/// executes when each platform builds on its own host. The job directory is
/// removed on success and kept on failure.
pub async fn run_platform<B: BuildBackend>(
    backend: &B,
    packager: &ArtifactPackager,
    job: BuildJob,
) -> JobOutcome {
    let target = job.target;
    let started = Instant::now();
    let result = run_job(backend, packager, &job).await;
    let duration = started.elapsed();

    match &result {
        Ok(artifact) => {
            log::info!(
                "[{target}] ✓ {} in {:.1}s",
                artifact.archive_name,
                duration.as_secs_f64()
            );
            remove_job_dir(&job.job_dir).await;
        }
        Err(failure) => log::warn!(
            "[{target}] ✗ {failure} (job dir kept at {})",
            job.job_dir.display()
        ),
    }

    JobOutcome {
        platform: target,
        result,
        duration,
    }
}

async fn run_job<B: BuildBackend>(
    backend: &B,
    packager: &ArtifactPackager,
    job: &BuildJob,
) -> Result<Artifact, BuildFailure> {
    tokio::fs::create_dir_all(&job.job_dir).await.map_err(|e| {
        BuildFailure::new(
            job.target,
            JobStage::Toolchain,
            format!("cannot create job dir {}: {e}", job.job_dir.display()),
        )
    })?;

    let binary = backend.build(job).await?;
    packager.package(&binary, job.target, &job.version).await
}

async fn remove_job_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        log::debug!("Could not remove job dir {}: {e}", dir.display());
    }
}
