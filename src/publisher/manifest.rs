//! Release manifest assembly after the build barrier.

use super::changelog::Changelog;
use crate::builder::BuildFailure;
use crate::error::{ErrorExt, ReleaseError, Result};
use crate::matrix::PlatformTarget;
use crate::metadata::VersionDescriptor;
use crate::packager::{Artifact, CHECKSUM_FILE_NAME, checksum};
use crate::pipeline::JobOutcome;
use handlebars::Handlebars;
use semver::Version;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Release body template.
const BODY_TEMPLATE: &str = "\
## {{name}}

Version `{{version}}` ({{tag}})

### Changes
{{#if previous_tag}}
Since {{previous_tag}}:
{{/if}}

{{changelog}}

### Checksums (SHA-256)

```text
{{checksums}}```
";

/// Not every matrix platform produced exactly one artifact.
#[derive(Debug, Clone, Error)]
pub struct IncompleteRelease {
    /// Matrix size
    pub expected: usize,
    /// Platforms that produced an artifact
    pub succeeded: Vec<PlatformTarget>,
    pub failures: Vec<BuildFailure>,
    /// Platforms with no outcome at all
    pub missing: Vec<PlatformTarget>,
    /// Platforms reported more than once
    pub duplicates: Vec<PlatformTarget>,
}

impl fmt::Display for IncompleteRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "release incomplete: {}/{} platforms produced artifacts",
            self.succeeded.len(),
            self.expected
        )?;
        for failure in &self.failures {
            write!(
                f,
                "\n  ✗ {} [{}]: {}",
                failure.platform, failure.stage, failure.reason
            )?;
        }
        for platform in &self.missing {
            write!(f, "\n  ✗ {platform}: no result")?;
        }
        for platform in &self.duplicates {
            write!(f, "\n  ✗ {platform}: reported more than once")?;
        }
        Ok(())
    }
}

/// Exactly one artifact per matrix platform, ordered by archive name.
///
/// Only [`CompleteArtifacts::collect`] builds this, so holding one proves the
/// barrier saw a fully successful matrix.
#[derive(Debug, Clone)]
pub struct CompleteArtifacts(Vec<Artifact>);

impl CompleteArtifacts {
    /// Checks every matrix label appears exactly once with an artifact.
    pub fn collect(outcomes: Vec<JobOutcome>) -> std::result::Result<Self, IncompleteRelease> {
        let mut by_platform: BTreeMap<PlatformTarget, Artifact> = BTreeMap::new();
        let mut seen: BTreeMap<PlatformTarget, usize> = BTreeMap::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            *seen.entry(outcome.platform).or_default() += 1;
            match outcome.result {
                Ok(artifact) => {
                    by_platform.insert(outcome.platform, artifact);
                }
                Err(failure) => failures.push(failure),
            }
        }

        let missing: Vec<_> = PlatformTarget::ALL
            .into_iter()
            .filter(|t| !seen.contains_key(t))
            .collect();
        let duplicates: Vec<_> = seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(t, _)| *t)
            .collect();

        if failures.is_empty() && missing.is_empty() && duplicates.is_empty() {
            let mut artifacts: Vec<_> = by_platform.into_values().collect();
            artifacts.sort_by(|a, b| a.archive_name.cmp(&b.archive_name));
            return Ok(Self(artifacts));
        }

        failures.sort_by_key(|f| f.platform);
        Err(IncompleteRelease {
            expected: PlatformTarget::ALL.len(),
            succeeded: by_platform.into_keys().collect(),
            failures,
            missing,
            duplicates,
        })
    }

    pub fn as_slice(&self) -> &[Artifact] {
        &self.0
    }
}

/// Everything that goes into one release.
#[derive(Debug, Clone)]
pub struct ReleaseManifest {
    pub tag: String,
    pub version: Version,
    pub name: String,
    pub changelog: Changelog,
    artifacts: CompleteArtifacts,
    /// `dist/checksums.txt`; written by [`write_checksum_file`](Self::write_checksum_file)
    pub checksum_file: PathBuf,
}

impl ReleaseManifest {
    pub fn new(
        descriptor: &VersionDescriptor,
        artifacts: CompleteArtifacts,
        changelog: Changelog,
        dist_dir: &Path,
    ) -> Self {
        Self {
            tag: descriptor.tag().to_string(),
            version: descriptor.version().clone(),
            name: descriptor.release_name(),
            changelog,
            artifacts,
            checksum_file: dist_dir.join(CHECKSUM_FILE_NAME),
        }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        self.artifacts.as_slice()
    }

    /// `checksums.txt` contents.
    pub fn checksum_listing(&self) -> String {
        checksum::format_listing(
            self.artifacts()
                .iter()
                .map(|a| (a.checksum.as_str(), a.archive_name.as_str())),
        )
    }

    pub async fn write_checksum_file(&self) -> Result<&Path> {
        tokio::fs::write(&self.checksum_file, self.checksum_listing())
            .await
            .fs_context("writing checksum listing", &self.checksum_file)?;
        Ok(&self.checksum_file)
    }

    /// Files attached to the release: every archive, then `checksums.txt`.
    pub fn asset_paths(&self) -> Vec<(String, PathBuf)> {
        self.artifacts()
            .iter()
            .map(|a| (a.archive_name.clone(), a.archive_path.clone()))
            .chain(std::iter::once((
                CHECKSUM_FILE_NAME.to_string(),
                self.checksum_file.clone(),
            )))
            .collect()
    }

    /// Release description: version, changelog and the checksum listing.
    pub fn render_body(&self) -> Result<String> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .render_template(
                BODY_TEMPLATE,
                &json!({
                    "name": self.name,
                    "version": self.version.to_string(),
                    "tag": self.tag,
                    "previous_tag": self.changelog.previous_tag,
                    "changelog": self.changelog.render(),
                    "checksums": self.checksum_listing(),
                }),
            )
            .map_err(|e| ReleaseError::Generic(format!("rendering release body: {e}")))
    }
}
