//! Version gate: decides whether this run releases anything.
//!
//! The gate reads the manifest, derives the canonical tag and claims it in the
//! repository's tag namespace before any build starts. The tag is the durable
//! "release in flight" marker: a run that finds it already present, or loses
//! the race to push it, is a successful no-op.

use crate::error::Result;
use crate::git::{TagOutcome, VersionControl};
use crate::metadata::{self, ReleaseSettings, VersionDescriptor};
use std::path::Path;
use std::sync::Arc;

/// Why the gate opened or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// Tag was created (and pushed) by this run.
    Tagged,
    /// Dry run: the tag is absent and would have been created.
    WouldTag,
    /// Tag already existed before this run looked.
    AlreadyReleased,
    /// Another run pushed the tag between our check and our push.
    LostRace,
}

/// Result of [`VersionGate::decide`].
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub descriptor: Arc<VersionDescriptor>,
    pub settings: ReleaseSettings,
    pub should_release: bool,
    pub status: GateStatus,
}

impl GateDecision {
    fn new(
        descriptor: Arc<VersionDescriptor>,
        settings: ReleaseSettings,
        status: GateStatus,
    ) -> Self {
        let should_release = matches!(status, GateStatus::Tagged | GateStatus::WouldTag);
        Self {
            descriptor,
            settings,
            should_release,
            status,
        }
    }

    /// One-line explanation for reports.
    pub fn describe(&self) -> String {
        let tag = self.descriptor.tag();
        match self.status {
            GateStatus::Tagged => format!("created tag {tag}"),
            GateStatus::WouldTag => format!("tag {tag} is free (dry run, not created)"),
            GateStatus::AlreadyReleased => format!("tag {tag} already exists; nothing to release"),
            GateStatus::LostRace => {
                format!("tag {tag} was claimed by a concurrent run; nothing to release")
            }
        }
    }
}

/// Exactly-once admission check over the tag namespace.
pub struct VersionGate<'a, V> {
    vcs: &'a V,
    dry_run: bool,
}

impl<'a, V: VersionControl> VersionGate<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self {
            vcs,
            dry_run: false,
        }
    }

    /// Only report; never create the tag.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reads `source_tree/Cargo.toml` and claims `v{version}` if it is free.
    pub async fn decide(&self, source_tree: &Path) -> Result<GateDecision> {
        let manifest = metadata::load_manifest(&source_tree.join("Cargo.toml"))?;
        let descriptor = Arc::new(manifest.version_descriptor());
        let settings = manifest.release_settings;
        let tag = descriptor.tag().to_string();

        if self.vcs.tag_exists(&tag).await? {
            log::info!("Tag {tag} already exists, skipping release");
            return Ok(GateDecision::new(
                descriptor,
                settings,
                GateStatus::AlreadyReleased,
            ));
        }

        if self.dry_run {
            log::info!("Dry run: would create tag {tag}");
            return Ok(GateDecision::new(descriptor, settings, GateStatus::WouldTag));
        }

        let message = format!(
            "{} (requested {})",
            descriptor.release_name(),
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        let status = match self.vcs.create_tag(&tag, &message).await? {
            TagOutcome::Created => {
                log::info!("Created tag {tag}");
                GateStatus::Tagged
            }
            TagOutcome::AlreadyExists => {
                log::info!("Tag {tag} appeared concurrently, skipping release");
                GateStatus::LostRace
            }
        };

        Ok(GateDecision::new(descriptor, settings, status))
    }
}
