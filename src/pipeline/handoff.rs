//! Artifact handoff between per-platform runners and the publishing runner.
//!
//! A runner that builds a single platform leaves its archive and an
//! `<archive>.sha256` file in a shared directory. The publisher reloads them
//! as [`JobOutcome`]s so the same completeness barrier applies as for a
//! single-host run.

use super::JobOutcome;
use crate::builder::{BuildFailure, JobStage};
use crate::error::{ErrorExt, Result};
use crate::matrix::PlatformTarget;
use crate::metadata::VersionDescriptor;
use crate::packager::{Artifact, archive_file_name, checksum};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix of the per-archive checksum file.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// `<archive path>.sha256`
pub fn checksum_path(archive_path: &Path) -> PathBuf {
    let mut path = archive_path.as_os_str().to_owned();
    path.push(CHECKSUM_SUFFIX);
    PathBuf::from(path)
}

/// Writes the archive's checksum next to it, in `sha256sum` format.
pub async fn write_checksum(artifact: &Artifact) -> Result<PathBuf> {
    let path = checksum_path(&artifact.archive_path);
    let line = checksum::format_listing([(
        artifact.checksum.as_str(),
        artifact.archive_name.as_str(),
    )]);
    tokio::fs::write(&path, line)
        .await
        .fs_context("writing archive checksum", &path)?;
    Ok(path)
}

/// Reloads one outcome for every platform whose archive is in `dir`.
///
/// A platform without an archive yields no outcome, so the barrier reports it
/// as missing. An archive with no checksum file, or whose bytes no longer
/// match it, is a [`JobStage::Package`] failure.
pub async fn collect_from_dir(dir: &Path, version: &VersionDescriptor) -> Vec<JobOutcome> {
    let mut outcomes = Vec::new();

    for target in PlatformTarget::ALL {
        let archive_name = archive_file_name(version, target);
        let archive_path = dir.join(&archive_name);
        if !archive_path.is_file() {
            log::warn!("[{target}] {archive_name} not found in {}", dir.display());
            continue;
        }

        let result = load_artifact(target, archive_name, archive_path).await;
        outcomes.push(JobOutcome {
            platform: target,
            result,
            duration: Duration::ZERO,
        });
    }

    outcomes
}

async fn load_artifact(
    target: PlatformTarget,
    archive_name: String,
    archive_path: PathBuf,
) -> std::result::Result<Artifact, BuildFailure> {
    let fail = |reason: String| BuildFailure::new(target, JobStage::Package, reason);

    let recorded_path = checksum_path(&archive_path);
    let text = tokio::fs::read_to_string(&recorded_path)
        .await
        .map_err(|e| fail(format!("cannot read {}: {e}", recorded_path.display())))?;
    let recorded = checksum::parse_listing(&text)
        .map_err(|e| fail(e.to_string()))?
        .into_iter()
        .find(|entry| entry.file_name == archive_name)
        .ok_or_else(|| fail(format!("{} does not list {archive_name}", recorded_path.display())))?;

    let actual = checksum::calculate_sha256(&archive_path)
        .await
        .map_err(|e| fail(e.to_string()))?;
    if actual != recorded.checksum {
        return Err(fail(format!(
            "{archive_name} changed after packaging (recorded {}, actual {actual})",
            recorded.checksum
        )));
    }

    Ok(Artifact {
        platform: target,
        archive_name,
        archive_path,
        checksum: actual,
    })
}
