//! Tag namespace and commit history access.
//!
//! [`VersionControl`] is the seam between the pipeline and the repository.
//! [`SystemGit`] drives the `git` CLI; tests substitute an in-memory store.

use crate::error::{ReleaseError, Result};
use std::future::Future;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;

/// Outcome of a "create tag if absent" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    /// This invocation wrote the tag.
    Created,
    /// Someone else already owns the tag. Not an error.
    AlreadyExists,
}

/// One commit in a changelog range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub sha: String,
    pub summary: String,
    pub author: String,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(7)]
    }
}

/// Repository operations the pipeline depends on.
pub trait VersionControl: Send + Sync {
    /// Whether `tag` exists locally or on the remote.
    fn tag_exists(&self, tag: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Creates an annotated tag at `HEAD` and publishes it, unless it already exists.
    fn create_tag(&self, tag: &str, message: &str)
    -> impl Future<Output = Result<TagOutcome>> + Send;

    /// All tag names in the repository.
    fn list_tags(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Non-merge commits reachable from `to` but not from `from`, newest first.
    /// With `from = None` the whole history of `to` is returned.
    fn commit_summaries(
        &self,
        from: Option<&str>,
        to: &str,
    ) -> impl Future<Output = Result<Vec<CommitSummary>>> + Send;
}

const FIELD_SEP: char = '\u{1f}';

/// [`VersionControl`] backed by the system `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    repo_path: PathBuf,
    /// Remote tags are pushed to and checked against; `None` keeps everything local.
    remote: Option<String>,
}

impl SystemGit {
    /// Opens the repository at `repo_path`, publishing tags to `origin`.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote: Some("origin".to_string()),
        }
    }

    /// Keeps tags local; no fetch or push is attempted.
    pub fn local_only(mut self) -> Self {
        self.remote = None;
        self
    }

    async fn git(&self, args: &[&str]) -> Result<Output> {
        log::debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| ReleaseError::Git {
                command: args.join(" "),
                reason: e.to_string(),
            })
    }

    /// Runs git and fails on a non-zero exit.
    async fn git_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(ReleaseError::Git {
                command: args.join(" "),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn delete_local_tag(&self, tag: &str) {
        if let Err(e) = self.git_checked(&["tag", "-d", tag]).await {
            log::warn!("Failed to remove local tag {tag}: {e}");
        }
    }
}

impl VersionControl for SystemGit {
    async fn tag_exists(&self, tag: &str) -> Result<bool> {
        let local_ref = format!("refs/tags/{tag}");
        let local = self
            .git(&["rev-parse", "-q", "--verify", &local_ref])
            .await?
            .status
            .success();
        if local {
            return Ok(true);
        }

        match &self.remote {
            Some(remote) => {
                let listed = self
                    .git_checked(&["ls-remote", "--tags", remote, &local_ref])
                    .await?;
                Ok(!listed.trim().is_empty())
            }
            None => Ok(false),
        }
    }

    async fn create_tag(&self, tag: &str, message: &str) -> Result<TagOutcome> {
        let output = self.git(&["tag", "-a", tag, "-m", message, "HEAD"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("already exists") {
                return Ok(TagOutcome::AlreadyExists);
            }
            return Err(ReleaseError::Git {
                command: format!("tag -a {tag}"),
                reason: stderr.trim().to_string(),
            });
        }

        let Some(remote) = &self.remote else {
            return Ok(TagOutcome::Created);
        };

        let refspec = format!("refs/tags/{tag}");
        let push = self.git(&["push", remote, &refspec]).await?;
        if push.status.success() {
            return Ok(TagOutcome::Created);
        }

        // Whatever happened, the local tag must not outlive a failed push.
        self.delete_local_tag(tag).await;

        let stderr = String::from_utf8_lossy(&push.stderr);
        if stderr.contains("already exists") || stderr.contains("[rejected]") {
            log::info!("Tag {tag} was pushed by another run first");
            Ok(TagOutcome::AlreadyExists)
        } else {
            Err(ReleaseError::Git {
                command: format!("push {remote} {refspec}"),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        if let Some(remote) = &self.remote
            && let Err(e) = self.git_checked(&["fetch", "--tags", "--quiet", remote]).await
        {
            log::warn!("Could not refresh tags from {remote}: {e}");
        }
        let stdout = self.git_checked(&["tag", "--list"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn commit_summaries(&self, from: Option<&str>, to: &str) -> Result<Vec<CommitSummary>> {
        let range = match from {
            Some(from) => format!("{from}..{to}"),
            None => to.to_string(),
        };
        let format = format!("--format=%H{FIELD_SEP}%s{FIELD_SEP}%an");
        let stdout = self
            .git_checked(&["log", "--no-merges", &format, &range])
            .await?;
        Ok(parse_log(&stdout))
    }
}

fn parse_log(stdout: &str) -> Vec<CommitSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, FIELD_SEP);
            let sha = fields.next()?.trim();
            let summary = fields.next()?;
            let author = fields.next().unwrap_or_default();
            if sha.is_empty() {
                return None;
            }
            Some(CommitSummary {
                sha: sha.to_string(),
                summary: summary.to_string(),
                author: author.to_string(),
            })
        })
        .collect()
}
