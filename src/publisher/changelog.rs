//! Changelog generation between the previous release tag and the new one.

use crate::error::Result;
use crate::git::{CommitSummary, VersionControl};
use crate::metadata::VersionDescriptor;
use semver::Version;

/// Commits that went into a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelog {
    /// Tag the range starts from; `None` means the whole history
    pub previous_tag: Option<String>,
    /// Newest first
    pub entries: Vec<CommitSummary>,
}

impl Changelog {
    /// Markdown bullet list, one commit per line.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "- No changes recorded".to_string();
        }
        self.entries
            .iter()
            .map(|c| format!("- {} ({})", c.summary, c.short_sha()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Greatest `v{semver}` tag strictly lower than `current`.
///
/// Tags that aren't `v`-prefixed semver are ignored.
pub fn previous_tag(tags: &[String], current: &Version) -> Option<String> {
    tags.iter()
        .filter_map(|tag| {
            let version = Version::parse(tag.strip_prefix('v')?).ok()?;
            (version < *current).then_some((version, tag))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag)| tag.clone())
}

/// Collects non-merge commits in `previous_tag..to_ref`.
///
/// `to_ref` is normally the new tag; a dry run that never created the tag
/// passes `HEAD`.
pub async fn generate<V: VersionControl>(
    vcs: &V,
    descriptor: &VersionDescriptor,
    to_ref: &str,
) -> Result<Changelog> {
    let tags = vcs.list_tags().await?;
    let previous_tag = previous_tag(&tags, descriptor.version());

    match &previous_tag {
        Some(tag) => log::info!("Changelog range {tag}..{to_ref}"),
        None => log::info!("No earlier release tag, changelog covers all history of {to_ref}"),
    }

    let entries = vcs.commit_summaries(previous_tag.as_deref(), to_ref).await?;
    Ok(Changelog {
        previous_tag,
        entries,
    })
}
