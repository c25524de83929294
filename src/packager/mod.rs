//! Turns one built binary into a distributable archive with a checksum.

pub mod archive;
pub mod checksum;
pub mod staging;

pub use checksum::CHECKSUM_FILE_NAME;
pub use staging::DEFAULT_INCLUDE;

use crate::builder::{BuildFailure, JobStage};
use crate::matrix::PlatformTarget;
use crate::metadata::VersionDescriptor;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A finished, checksummed archive for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub platform: PlatformTarget,
    pub archive_name: String,
    pub archive_path: PathBuf,
    /// Lowercase hex SHA-256 of the archive bytes
    pub checksum: String,
}

/// `{binary}_{version}_{label}`, without extension.
pub fn archive_base_name(version: &VersionDescriptor, target: PlatformTarget) -> String {
    format!(
        "{}_{}_{}",
        version.binary_name(),
        version.version(),
        target.platform_label()
    )
}

/// Archive file name including the platform's archive extension.
pub fn archive_file_name(version: &VersionDescriptor, target: PlatformTarget) -> String {
    format!(
        "{}{}",
        archive_base_name(version, target),
        target.archive_format().extension()
    )
}

/// Builds archives into a shared output directory.
///
/// Each platform stages into its own subdirectory of `staging_root` and writes
/// a uniquely named archive, so packagers for different platforms can run
/// concurrently.
#[derive(Debug, Clone)]
pub struct ArtifactPackager {
    source_dir: PathBuf,
    dist_dir: PathBuf,
    staging_root: PathBuf,
    include: Vec<String>,
}

impl ArtifactPackager {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        dist_dir: impl Into<PathBuf>,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            dist_dir: dist_dir.into(),
            staging_root: staging_root.into(),
            include: DEFAULT_INCLUDE.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Overrides the auxiliary file patterns; `None` keeps the defaults.
    pub fn with_include(mut self, patterns: Option<Vec<String>>) -> Self {
        if let Some(patterns) = patterns {
            self.include = patterns;
        }
        self
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Stages, archives and hashes `binary` for `target`.
    ///
    /// Every failure is reported with stage [`JobStage::Package`].
    pub async fn package(
        &self,
        binary: &Path,
        target: PlatformTarget,
        version: &VersionDescriptor,
    ) -> Result<Artifact, BuildFailure> {
        let fail = |reason: String| BuildFailure::new(target, JobStage::Package, reason);

        let archive_name = archive_file_name(version, target);
        let archive_path = self.dist_dir.join(&archive_name);
        let staging_dir = self.staging_root.join(target.platform_label());
        let binary_name = format!("{}{}", version.binary_name(), target.file_extension());

        let source_dir = self.source_dir.clone();
        let include = self.include.clone();
        let binary = binary.to_path_buf();
        let output = archive_path.clone();

        tokio::task::spawn_blocking(move || {
            let auxiliary = staging::collect_auxiliary(&source_dir, &include);
            let files = staging::stage(
                &binary,
                &binary_name,
                target.needs_exec_bit(),
                &auxiliary,
                &staging_dir,
            )?;
            archive::write_archive(target.archive_format(), &output, &files)
        })
        .await
        .map_err(|e| fail(format!("packaging task failed: {e}")))?
        .map_err(|e| fail(e.to_string()))?;

        let checksum = checksum::calculate_sha256(&archive_path)
            .await
            .map_err(|e| fail(e.to_string()))?;

        log::info!("[{target}] packaged {archive_name} (sha256 {checksum})");

        Ok(Artifact {
            platform: target,
            archive_name,
            archive_path,
            checksum,
        })
    }
}
