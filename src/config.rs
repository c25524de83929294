//! Resolved settings for one pipeline run.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Branch whose pushes produce releases unless overridden.
pub const DEFAULT_BRANCH: &str = "main";

/// Event that triggered the run, as reported by the CI host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    /// e.g. `push`, `pull_request`, `workflow_dispatch`
    pub event: Option<String>,
    /// Fully qualified ref, e.g. `refs/heads/main`
    pub git_ref: Option<String>,
}

impl Trigger {
    pub fn new(event: Option<String>, git_ref: Option<String>) -> Self {
        Self { event, git_ref }
    }

    /// Whether this trigger is a push to `branch`.
    ///
    /// With neither event nor ref set the run counts as a manual push to the
    /// release branch.
    pub fn is_release_push(&self, branch: &str) -> bool {
        let event_ok = match self.event.as_deref() {
            None => true,
            Some(event) => event == "push",
        };
        let ref_ok = match self.git_ref.as_deref() {
            None => true,
            Some(git_ref) => {
                let name = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
                name == branch
            }
        };
        event_ok && ref_ok
    }

    /// Why [`is_release_push`](Self::is_release_push) said no.
    pub fn skip_reason(&self, branch: &str) -> String {
        format!(
            "trigger is not a push to '{branch}' (event: {}, ref: {})",
            self.event.as_deref().unwrap_or("-"),
            self.git_ref.as_deref().unwrap_or("-")
        )
    }
}

/// Everything a [`Pipeline`](crate::pipeline::Pipeline) run needs to know.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Root of the source tree containing `Cargo.toml`
    pub source_dir: PathBuf,

    /// Scratch root for jobs, staging and `dist/`
    pub work_dir: PathBuf,

    /// `owner/repo` on the release host
    pub repository: Option<String>,

    /// Release host API base URL
    pub api_url: String,

    /// Branch that releases are cut from
    pub branch: String,

    pub trigger: Trigger,

    /// Report only: no tag, no upload
    pub dry_run: bool,

    /// Create the tag locally but don't push it
    pub no_push: bool,

    /// Max platforms building at once; `None` builds the whole matrix at once
    pub jobs: Option<usize>,

    /// Per-command limit for a single platform build
    pub build_timeout: Duration,

    /// Publish attempts before giving up
    pub publish_attempts: u32,

    /// Base delay between publish attempts, multiplied by the attempt number
    pub publish_backoff: Duration,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            work_dir: PathBuf::from("target/release-pipeline"),
            repository: None,
            api_url: DEFAULT_API_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            trigger: Trigger::default(),
            dry_run: false,
            no_push: false,
            jobs: None,
            build_timeout: Duration::from_secs(3600),
            publish_attempts: 3,
            publish_backoff: Duration::from_secs(5),
        }
    }
}

impl ReleaseConfig {
    /// Config rooted at `source_dir`, with the work dir under its `target/`.
    pub fn for_source(source_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        let work_dir = source_dir.join("target").join("release-pipeline");
        Self {
            source_dir,
            work_dir,
            ..Self::default()
        }
    }

    /// Final archives and `checksums.txt`.
    pub fn dist_dir(&self) -> PathBuf {
        self.work_dir.join("dist")
    }

    /// Parent of the per-platform isolated job directories.
    pub fn jobs_dir(&self) -> PathBuf {
        self.work_dir.join("jobs")
    }

    /// Parent of the per-platform archive staging directories.
    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("staging")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.source_dir.join("Cargo.toml")
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}
