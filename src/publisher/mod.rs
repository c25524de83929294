//! Atomic, idempotent release publication.
//!
//! A release only becomes visible once every asset is attached: it is created
//! as a draft, filled, then published. Any failure deletes the draft and the
//! whole step is retried.

pub mod changelog;
pub mod error;
pub mod github;
pub mod manifest;

pub use changelog::Changelog;
pub use error::PublishError;
pub use github::{GitHubClient, NewRelease, ReleaseHost, RemoteAsset, RemoteRelease};
pub use manifest::{CompleteArtifacts, IncompleteRelease, ReleaseManifest};

use crate::error::Result;
use crate::packager::CHECKSUM_FILE_NAME;
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// A release that is live on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedRelease {
    pub tag: String,
    pub url: String,
    pub assets: Vec<String>,
    /// An identical release already existed; nothing was uploaded
    pub reused: bool,
}

/// Publishes a [`ReleaseManifest`] to a [`ReleaseHost`].
pub struct ReleasePublisher<'a, H> {
    host: &'a H,
    attempts: u32,
    backoff: Duration,
}

impl<'a, H: ReleaseHost> ReleasePublisher<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            host,
            attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }

    /// Total attempts (at least one) and the base delay between them.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Publishes `manifest` with every archive and `checksums.txt` attached.
    ///
    /// The checksum file must already be written.
    pub async fn publish(&self, manifest: &ReleaseManifest) -> Result<PublishedRelease> {
        let body = manifest.render_body()?;
        let assets = load_assets(manifest).await?;

        let mut attempt = 1;
        loop {
            match self.attempt(manifest, &body, &assets).await {
                Ok(published) => return Ok(published),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    let delay = self.backoff * attempt;
                    log::warn!(
                        "Publishing {} failed (attempt {attempt}/{}): {e}; retrying in {}s",
                        manifest.tag,
                        self.attempts,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn attempt(
        &self,
        manifest: &ReleaseManifest,
        body: &str,
        assets: &[(String, Bytes)],
    ) -> std::result::Result<PublishedRelease, PublishError> {
        let expected: BTreeSet<&str> = assets.iter().map(|(name, _)| name.as_str()).collect();

        for existing in self.host.releases_for_tag(&manifest.tag).await? {
            if existing.draft {
                log::warn!("Deleting stale draft release {} for {}", existing.id, manifest.tag);
                self.host.delete_release(&existing).await?;
                continue;
            }

            let present: BTreeSet<&str> = existing.assets.iter().map(|a| a.name.as_str()).collect();
            if present != expected {
                return Err(PublishError::Conflict {
                    tag: manifest.tag.clone(),
                    reason: describe_difference(&expected, &present),
                });
            }
            if let Some(reason) = self.content_difference(&existing, assets).await? {
                return Err(PublishError::Conflict {
                    tag: manifest.tag.clone(),
                    reason,
                });
            }

            log::info!("Release {} already published with identical assets", manifest.tag);
            return Ok(PublishedRelease {
                tag: manifest.tag.clone(),
                url: existing.html_url,
                assets: expected.iter().map(|s| s.to_string()).collect(),
                reused: true,
            });
        }

        let draft = self
            .host
            .create_release(&NewRelease {
                tag_name: manifest.tag.clone(),
                name: manifest.name.clone(),
                body: body.to_string(),
                draft: true,
                prerelease: !manifest.version.pre.is_empty(),
            })
            .await?;
        log::info!("Created draft release {} for {}", draft.id, manifest.tag);

        match self.fill_and_publish(&draft, assets).await {
            Ok(published) => Ok(PublishedRelease {
                tag: manifest.tag.clone(),
                url: published.html_url,
                assets: expected.iter().map(|s| s.to_string()).collect(),
                reused: false,
            }),
            Err(e) => {
                if let Err(cleanup) = self.host.delete_release(&draft).await {
                    log::warn!("Failed to delete draft release {}: {cleanup}", draft.id);
                }
                Err(e)
            }
        }
    }

    /// How a published release whose asset names match differs in content.
    ///
    /// Sizes are compared for every asset. The published `checksums.txt` is
    /// downloaded and compared byte for byte, which covers every archive digest.
    async fn content_difference(
        &self,
        existing: &RemoteRelease,
        assets: &[(String, Bytes)],
    ) -> std::result::Result<Option<String>, PublishError> {
        for (name, data) in assets {
            let Some(remote) = existing.assets.iter().find(|a| &a.name == name) else {
                return Ok(Some(format!("missing [{name}]")));
            };
            if remote.size != data.len() as u64 {
                return Ok(Some(format!(
                    "{name} is {} bytes on the host, {} bytes locally",
                    remote.size,
                    data.len()
                )));
            }
            if name == CHECKSUM_FILE_NAME {
                let published = self.host.download_asset(remote).await?;
                if published != *data {
                    return Ok(Some(format!(
                        "published {CHECKSUM_FILE_NAME} lists different digests"
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn fill_and_publish(
        &self,
        draft: &RemoteRelease,
        assets: &[(String, Bytes)],
    ) -> std::result::Result<RemoteRelease, PublishError> {
        for (name, data) in assets {
            self.host.upload_asset(draft, name, data.clone()).await?;
        }
        self.host.publish_draft(draft).await
    }
}

/// Reads every asset once; retries reuse the buffers.
async fn load_assets(manifest: &ReleaseManifest) -> Result<Vec<(String, Bytes)>> {
    let mut assets = Vec::new();
    for (name, path) in manifest.asset_paths() {
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| PublishError::Asset {
                name: name.clone(),
                reason: format!("cannot read {}: {e}", path.display()),
            })?;
        assets.push((name, Bytes::from(data)));
    }
    Ok(assets)
}

fn describe_difference(expected: &BTreeSet<&str>, present: &BTreeSet<&str>) -> String {
    let missing: Vec<_> = expected.difference(present).copied().collect();
    let extra: Vec<_> = present.difference(expected).copied().collect();
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing [{}]", missing.join(", ")));
    }
    if !extra.is_empty() {
        parts.push(format!("unexpected [{}]", extra.join(", ")));
    }
    parts.join("; ")
}
