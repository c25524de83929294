//! End-to-end pipeline runs against in-memory git, build and release host fakes.

use bytes::Bytes;
use release_pipeline::builder::{BuildBackend, BuildFailure, BuildJob, JobStage};
use release_pipeline::config::{ReleaseConfig, Trigger};
use release_pipeline::git::{CommitSummary, TagOutcome, VersionControl};
use release_pipeline::packager::checksum;
use release_pipeline::pipeline::{Admission, Pipeline, PipelineReport, build_platform};
use release_pipeline::publisher::{
    NewRelease, PublishError, ReleaseHost, RemoteAsset, RemoteRelease,
};
use release_pipeline::{PlatformTarget, ReleaseError};
use std::path::{Path, PathBuf};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeVcs {
    tags: Mutex<Vec<String>>,
    ranges: Mutex<Vec<(Option<String>, String)>>,
}

impl FakeVcs {
    fn with_tags(tags: &[&str]) -> Self {
        let vcs = Self::default();
        vcs.tags
            .lock()
            .unwrap()
            .extend(tags.iter().map(|t| t.to_string()));
        vcs
    }

    fn tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().clone()
    }
}

impl VersionControl for &FakeVcs {
    async fn tag_exists(&self, tag: &str) -> release_pipeline::Result<bool> {
        Ok(self.tags.lock().unwrap().iter().any(|t| t == tag))
    }

    async fn create_tag(&self, tag: &str, _message: &str) -> release_pipeline::Result<TagOutcome> {
        let mut tags = self.tags.lock().unwrap();
        if tags.iter().any(|t| t == tag) {
            return Ok(TagOutcome::AlreadyExists);
        }
        tags.push(tag.to_string());
        Ok(TagOutcome::Created)
    }

    async fn list_tags(&self) -> release_pipeline::Result<Vec<String>> {
        Ok(self.tags())
    }

    async fn commit_summaries(
        &self,
        from: Option<&str>,
        to: &str,
    ) -> release_pipeline::Result<Vec<CommitSummary>> {
        self.ranges
            .lock()
            .unwrap()
            .push((from.map(String::from), to.to_string()));
        Ok(vec![
            CommitSummary {
                sha: "a1b2c3d4e5f6".into(),
                summary: "Add per-core CPU graph".into(),
                author: "Ada".into(),
            },
            CommitSummary {
                sha: "0f9e8d7c6b5a".into(),
                summary: "Fix memory units".into(),
                author: "Bo".into(),
            },
        ])
    }
}

/// Writes a small file where the real compiler would leave the binary.
struct FakeBackend {
    failing: Option<PlatformTarget>,
}

impl BuildBackend for FakeBackend {
    async fn build(&self, job: &BuildJob) -> Result<PathBuf, BuildFailure> {
        if self.failing == Some(job.target) {
            return Err(BuildFailure::new(
                job.target,
                JobStage::Compile,
                "error: linking with `cc` failed",
            ));
        }
        let path = job.binary_path();
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, format!("binary for {}", job.target.target_triple()))
            .await
            .unwrap();
        Ok(path)
    }
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    next_asset_id: u64,
    releases: Vec<RemoteRelease>,
    contents: HashMap<u64, Bytes>,
    created: usize,
    deleted: Vec<u64>,
}

impl HostState {
    fn attach(&mut self, release_id: u64, name: &str, data: Bytes) -> RemoteAsset {
        self.next_asset_id += 1;
        let asset = RemoteAsset {
            id: self.next_asset_id,
            name: name.to_string(),
            size: data.len() as u64,
        };
        self.contents.insert(asset.id, data);
        if let Some(release) = self.releases.iter_mut().find(|r| r.id == release_id) {
            release.assets.push(asset.clone());
        }
        asset
    }
}

#[derive(Default)]
struct FakeHost {
    state: Mutex<HostState>,
    /// Uploads that fail with a 502 before uploads start succeeding
    failing_uploads: AtomicU32,
}

impl FakeHost {
    fn releases(&self) -> Vec<RemoteRelease> {
        self.state.lock().unwrap().releases.clone()
    }

    fn insert_published(&self, tag: &str, assets: &[(&str, &[u8])]) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.releases.push(RemoteRelease {
            id,
            tag_name: tag.to_string(),
            name: Some(format!("Release {}", tag.trim_start_matches('v'))),
            draft: false,
            html_url: format!("https://github.com/acme/reson/releases/tag/{tag}"),
            upload_url: format!("https://uploads.example/releases/{id}/assets{{?name,label}}"),
            assets: Vec::new(),
        });
        for (name, data) in assets {
            state.attach(id, name, Bytes::copy_from_slice(data));
        }
    }

    /// Replaces the stored bytes of a published asset, keeping its size.
    fn rewrite_asset(&self, name: &str, rewrite: impl FnOnce(&[u8]) -> Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        let id = state
            .releases
            .iter()
            .flat_map(|r| &r.assets)
            .find(|a| a.name == name)
            .map(|a| a.id)
            .unwrap();
        let rewritten = rewrite(&state.contents[&id]);
        assert_eq!(rewritten.len(), state.contents[&id].len());
        state.contents.insert(id, Bytes::from(rewritten));
    }
}

impl ReleaseHost for &FakeHost {
    async fn releases_for_tag(&self, tag: &str) -> Result<Vec<RemoteRelease>, PublishError> {
        Ok(self
            .releases()
            .into_iter()
            .filter(|r| r.tag_name == tag)
            .collect())
    }

    async fn create_release(&self, release: &NewRelease) -> Result<RemoteRelease, PublishError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.created += 1;
        let id = state.next_id;
        let created = RemoteRelease {
            id,
            tag_name: release.tag_name.clone(),
            name: Some(release.name.clone()),
            draft: release.draft,
            html_url: format!(
                "https://github.com/acme/reson/releases/tag/{}",
                release.tag_name
            ),
            upload_url: format!("https://uploads.example/releases/{id}/assets{{?name,label}}"),
            assets: Vec::new(),
        };
        state.releases.push(created.clone());
        Ok(created)
    }

    async fn upload_asset(
        &self,
        release: &RemoteRelease,
        name: &str,
        data: Bytes,
    ) -> Result<RemoteAsset, PublishError> {
        if self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PublishError::Http {
                method: "POST".into(),
                url: release.upload_url.clone(),
                status: 502,
                message: "Bad Gateway".into(),
            });
        }
        Ok(self.state.lock().unwrap().attach(release.id, name, data))
    }

    async fn publish_draft(&self, release: &RemoteRelease) -> Result<RemoteRelease, PublishError> {
        let mut state = self.state.lock().unwrap();
        let target = state
            .releases
            .iter_mut()
            .find(|r| r.id == release.id)
            .unwrap();
        target.draft = false;
        Ok(target.clone())
    }

    async fn delete_release(&self, release: &RemoteRelease) -> Result<(), PublishError> {
        let mut state = self.state.lock().unwrap();
        state.releases.retain(|r| r.id != release.id);
        state.deleted.push(release.id);
        Ok(())
    }

    async fn download_asset(&self, asset: &RemoteAsset) -> Result<Bytes, PublishError> {
        let state = self.state.lock().unwrap();
        state
            .contents
            .get(&asset.id)
            .cloned()
            .ok_or_else(|| PublishError::Http {
                method: "GET".into(),
                url: format!("https://api.example/releases/assets/{}", asset.id),
                status: 404,
                message: "Not Found".into(),
            })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn source_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Cargo.toml");
    std::fs::copy(fixture, dir.path().join("Cargo.toml")).unwrap();
    std::fs::write(dir.path().join("LICENSE"), "MIT License").unwrap();
    std::fs::write(dir.path().join("README.md"), "# reson").unwrap();
    dir
}

fn config(source: &Path) -> ReleaseConfig {
    let mut config = ReleaseConfig::for_source(source);
    config.publish_backoff = Duration::ZERO;
    config
}

fn backend() -> FakeBackend {
    FakeBackend { failing: None }
}

const SCENARIO_ARCHIVES: [&str; 6] = [
    "reson_1.2.0_Darwin_arm64.tar.gz",
    "reson_1.2.0_Darwin_x86_64.tar.gz",
    "reson_1.2.0_Linux_aarch64.tar.gz",
    "reson_1.2.0_Linux_armv7.tar.gz",
    "reson_1.2.0_Linux_x86_64.tar.gz",
    "reson_1.2.0_Windows_x86_64.zip",
];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn releases_every_platform_with_checksums() {
    let src = source_tree();
    let vcs = FakeVcs::with_tags(&["v1.0.0", "v1.1.0"]);
    let host = FakeHost::default();
    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));

    let report = pipeline.run().await.unwrap();
    let PipelineReport::Released {
        tag,
        release_url,
        artifacts,
        checksums,
        reused,
    } = report
    else {
        panic!("expected a release, got {report:?}");
    };

    assert_eq!(tag, "v1.2.0");
    assert!(!reused);
    assert!(release_url.ends_with("/v1.2.0"));
    assert!(vcs.tags().contains(&"v1.2.0".to_string()));

    let names: Vec<_> = artifacts.iter().map(|a| a.archive_name.as_str()).collect();
    assert_eq!(names, SCENARIO_ARCHIVES);

    // checksums.txt lists exactly the archives, and every digest is right
    let dist = pipeline.config().dist_dir();
    let listing = std::fs::read_to_string(dist.join("checksums.txt")).unwrap();
    assert_eq!(listing, checksums);
    assert_eq!(listing.lines().count(), 6);
    let verification = checksum::verify_listing(&dist).await.unwrap();
    assert!(verification.is_ok());
    assert_eq!(verification.verified, SCENARIO_ARCHIVES);

    // One published release, seven files
    let releases = host.releases();
    assert_eq!(releases.len(), 1);
    assert!(!releases[0].draft);
    assert_eq!(releases[0].name.as_deref(), Some("Release 1.2.0"));
    let mut attached: Vec<_> = releases[0].assets.iter().map(|a| a.name.clone()).collect();
    attached.sort();
    let mut expected: Vec<_> = SCENARIO_ARCHIVES.iter().map(|s| s.to_string()).collect();
    expected.push("checksums.txt".to_string());
    expected.sort();
    assert_eq!(attached, expected);

    // Changelog covers v1.1.0..v1.2.0
    assert_eq!(
        vcs.ranges.lock().unwrap().as_slice(),
        [(Some("v1.1.0".to_string()), "v1.2.0".to_string())]
    );
}

#[tokio::test]
async fn archives_carry_binary_and_auxiliary_files() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    pipeline.run().await.unwrap();

    let archive = pipeline
        .config()
        .dist_dir()
        .join("reson_1.2.0_Linux_armv7.tar.gz");
    let file = std::fs::File::open(archive).unwrap();
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut entries: Vec<(String, u32)> = tar
        .entries()
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (
                e.path().unwrap().to_string_lossy().into_owned(),
                e.header().mode().unwrap(),
            )
        })
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("LICENSE".to_string(), 0o644),
            ("README.md".to_string(), 0o644),
            ("reson".to_string(), 0o755),
        ]
    );

    let zip_path = pipeline
        .config()
        .dist_dir()
        .join("reson_1.2.0_Windows_x86_64.zip");
    let zip = zip::ZipArchive::new(std::fs::File::open(zip_path).unwrap()).unwrap();
    let mut names: Vec<_> = zip.file_names().map(String::from).collect();
    names.sort();
    assert_eq!(names, ["LICENSE", "README.md", "reson.exe"]);
}

#[tokio::test]
async fn second_run_for_same_version_is_a_no_op() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));

    assert!(matches!(
        pipeline.run().await.unwrap(),
        PipelineReport::Released { .. }
    ));
    let again = pipeline.run().await.unwrap();
    let PipelineReport::Skipped { reason } = again else {
        panic!("expected skip, got {again:?}");
    };
    assert!(reason.contains("v1.2.0"));

    assert_eq!(vcs.tags(), vec!["v1.2.0".to_string()]);
    assert_eq!(host.releases().len(), 1);
    assert_eq!(host.state.lock().unwrap().created, 1);
}

#[tokio::test]
async fn one_failed_platform_blocks_the_release() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let failing = FakeBackend {
        failing: Some(PlatformTarget::LinuxAarch64),
    };
    let pipeline = Pipeline::new(config(src.path()), &vcs, failing, Some(&host));

    let err = pipeline.run().await.unwrap_err();
    let ReleaseError::IncompleteRelease(incomplete) = &err else {
        panic!("expected incomplete release, got {err}");
    };
    assert_eq!(incomplete.succeeded.len(), 5);
    assert_eq!(incomplete.failures.len(), 1);
    assert_eq!(incomplete.failures[0].platform, PlatformTarget::LinuxAarch64);
    assert!(err.to_string().contains("Linux_aarch64 [compile]"));

    // Siblings still produced their archives, but nothing was published
    let dist = pipeline.config().dist_dir();
    assert!(dist.join("reson_1.2.0_Linux_x86_64.tar.gz").is_file());
    assert!(!dist.join("reson_1.2.0_Linux_aarch64.tar.gz").exists());
    assert!(!dist.join("checksums.txt").exists());
    assert!(host.releases().is_empty());
}

#[tokio::test]
async fn transient_upload_failure_retries_whole_publish() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost {
        failing_uploads: AtomicU32::new(1),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));

    assert!(matches!(
        pipeline.run().await.unwrap(),
        PipelineReport::Released { reused: false, .. }
    ));

    let state = host.state.lock().unwrap();
    assert_eq!(state.created, 2);
    assert_eq!(state.deleted.len(), 1);
    assert_eq!(state.releases.len(), 1);
    assert!(!state.releases[0].draft);
    assert_eq!(state.releases[0].assets.len(), 7);
}

#[tokio::test]
async fn publish_gives_up_after_configured_attempts() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost {
        failing_uploads: AtomicU32::new(10),
        ..Default::default()
    };
    let mut config = config(src.path());
    config.publish_attempts = 2;
    let pipeline = Pipeline::new(config, &vcs, backend(), Some(&host));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, ReleaseError::Publish(PublishError::Http { status: 502, .. })));
    let state = host.state.lock().unwrap();
    assert_eq!(state.created, 2);
    assert!(state.releases.is_empty(), "no draft may survive a failed publish");
}

#[tokio::test]
async fn identical_rebuild_reuses_published_release() {
    let src = source_tree();
    let host = FakeHost::default();
    let first_vcs = FakeVcs::default();
    Pipeline::new(config(src.path()), &first_vcs, backend(), Some(&host))
        .run()
        .await
        .unwrap();

    // Same sources, tag lost locally: archives are byte-identical
    let second_vcs = FakeVcs::default();
    let pipeline = Pipeline::new(config(src.path()), &second_vcs, backend(), Some(&host));
    assert!(matches!(
        pipeline.run().await.unwrap(),
        PipelineReport::Released { reused: true, .. }
    ));
    assert_eq!(host.state.lock().unwrap().created, 1);
}

#[tokio::test]
async fn mismatched_published_release_is_a_conflict() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    host.insert_published("v1.2.0", &[("reson_1.2.0_Linux_x86_64.tar.gz", b"old".as_slice())]);

    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, ReleaseError::Publish(PublishError::Conflict { .. })));
    assert_eq!(host.state.lock().unwrap().created, 0);
}

#[tokio::test]
async fn same_names_with_different_bytes_is_a_conflict() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let mut assets: Vec<(&str, &[u8])> = SCENARIO_ARCHIVES
        .iter()
        .map(|name| (*name, b"someone else's build".as_slice()))
        .collect();
    assets.push(("checksums.txt", b"not our digests".as_slice()));
    host.insert_published("v1.2.0", &assets);

    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    let err = pipeline.run().await.unwrap_err();
    let ReleaseError::Publish(PublishError::Conflict { reason, .. }) = &err else {
        panic!("expected conflict, got {err}");
    };
    assert!(reason.contains("bytes on the host"), "{reason}");
    assert_eq!(host.state.lock().unwrap().created, 0);
}

#[tokio::test]
async fn same_sizes_with_different_digests_is_a_conflict() {
    let src = source_tree();
    let host = FakeHost::default();
    let first_vcs = FakeVcs::default();
    Pipeline::new(config(src.path()), &first_vcs, backend(), Some(&host))
        .run()
        .await
        .unwrap();

    // Flip one hex digit of the published listing
    host.rewrite_asset("checksums.txt", |listing| {
        let mut listing = listing.to_vec();
        listing[0] = if listing[0] == b'0' { b'1' } else { b'0' };
        listing
    });

    let second_vcs = FakeVcs::default();
    let pipeline = Pipeline::new(config(src.path()), &second_vcs, backend(), Some(&host));
    let err = pipeline.run().await.unwrap_err();
    let ReleaseError::Publish(PublishError::Conflict { reason, .. }) = &err else {
        panic!("expected conflict, got {err}");
    };
    assert!(reason.contains("different digests"), "{reason}");
    assert_eq!(host.state.lock().unwrap().created, 1);
}

#[tokio::test]
async fn stale_draft_is_replaced() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    (&host)
        .create_release(&NewRelease {
            tag_name: "v1.2.0".into(),
            name: "Release 1.2.0".into(),
            body: String::new(),
            draft: true,
            prerelease: false,
        })
        .await
        .unwrap();

    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    pipeline.run().await.unwrap();

    let state = host.state.lock().unwrap();
    assert_eq!(state.deleted, vec![1]);
    assert_eq!(state.releases.len(), 1);
    assert!(!state.releases[0].draft);
}

#[tokio::test]
async fn non_release_trigger_is_skipped() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let mut config = config(src.path());
    config.trigger = Trigger::new(
        Some("pull_request".into()),
        Some("refs/pull/12/merge".into()),
    );
    let pipeline = Pipeline::new(config, &vcs, backend(), Some(&host));

    assert!(matches!(
        pipeline.run().await.unwrap(),
        PipelineReport::Skipped { .. }
    ));
    assert!(vcs.tags().is_empty());
    assert!(!pipeline.config().work_dir.exists());
}

#[tokio::test]
async fn dry_run_builds_everything_but_tags_and_publishes_nothing() {
    let src = source_tree();
    let vcs = FakeVcs::with_tags(&["v1.1.0"]);
    let mut config = config(src.path());
    config.dry_run = true;
    let pipeline: Pipeline<_, _, &FakeHost> = Pipeline::new(config, &vcs, backend(), None);

    let report = pipeline.run().await.unwrap();
    let PipelineReport::DryRun {
        tag,
        artifacts,
        checksums,
        body,
    } = report
    else {
        panic!("expected dry run, got {report:?}");
    };
    assert_eq!(tag, "v1.2.0");
    assert_eq!(artifacts.len(), 6);
    assert!(body.contains("## Release 1.2.0"));
    assert!(body.contains("- Add per-core CPU graph (a1b2c3d)"));
    assert!(body.contains(&checksums));
    assert_eq!(vcs.tags(), vec!["v1.1.0".to_string()]);
    assert_eq!(
        vcs.ranges.lock().unwrap().as_slice(),
        [(Some("v1.1.0".to_string()), "HEAD".to_string())]
    );
}

#[tokio::test]
async fn missing_host_without_dry_run_fails_before_tagging() {
    let src = source_tree();
    let vcs = FakeVcs::default();
    let pipeline: Pipeline<_, _, &FakeHost> =
        Pipeline::new(config(src.path()), &vcs, backend(), None);

    assert!(pipeline.run().await.is_err());
    assert!(vcs.tags().is_empty());
}

// ---------------------------------------------------------------------------
// Split runs: gate, one build per runner, publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn per_platform_builds_publish_from_shared_dir() {
    let src = source_tree();
    let shared = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::with_tags(&["v1.1.0"]);
    let host = FakeHost::default();

    let gate = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    let Admission::Open(decision) = gate.admit().await.unwrap() else {
        panic!("expected the gate to open");
    };
    assert_eq!(decision.descriptor.tag(), "v1.2.0");
    assert!(vcs.tags().contains(&"v1.2.0".to_string()));

    // Each runner has its own scratch space and only sees the shared dir
    for target in PlatformTarget::ALL {
        let runner = tempfile::tempdir().unwrap();
        let mut runner_config = config(src.path());
        runner_config.work_dir = runner.path().to_path_buf();
        let outcome = build_platform(&backend(), &runner_config, target, shared.path())
            .await
            .unwrap();
        let artifact = outcome.result.unwrap();
        assert!(shared.path().join(format!("{}.sha256", artifact.archive_name)).is_file());
    }

    let publisher = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    let report = publisher.publish_from(shared.path()).await.unwrap();
    let PipelineReport::Released { artifacts, reused, .. } = report else {
        panic!("expected a release, got {report:?}");
    };
    assert!(!reused);
    let names: Vec<_> = artifacts.iter().map(|a| a.archive_name.as_str()).collect();
    assert_eq!(names, SCENARIO_ARCHIVES);

    let verification = checksum::verify_listing(shared.path()).await.unwrap();
    assert_eq!(verification.verified, SCENARIO_ARCHIVES);
    let releases = host.releases();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].assets.len(), 7);
    assert_eq!(
        vcs.ranges.lock().unwrap().as_slice(),
        [(Some("v1.1.0".to_string()), "v1.2.0".to_string())]
    );
}

#[tokio::test]
async fn publish_refuses_when_a_runner_left_nothing() {
    let src = source_tree();
    let shared = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));
    assert!(matches!(pipeline.admit().await.unwrap(), Admission::Open(_)));

    for target in PlatformTarget::ALL {
        if target == PlatformTarget::DarwinX86_64 {
            continue;
        }
        build_platform(&backend(), pipeline.config(), target, shared.path())
            .await
            .unwrap();
    }

    let err = pipeline.publish_from(shared.path()).await.unwrap_err();
    let ReleaseError::IncompleteRelease(incomplete) = &err else {
        panic!("expected incomplete release, got {err}");
    };
    assert_eq!(incomplete.missing, [PlatformTarget::DarwinX86_64]);
    assert_eq!(incomplete.succeeded.len(), 5);
    assert!(host.releases().is_empty());
    assert!(!shared.path().join("checksums.txt").exists());
}

#[tokio::test]
async fn failed_platform_build_leaves_no_archive() {
    let src = source_tree();
    let shared = tempfile::tempdir().unwrap();
    let failing = FakeBackend {
        failing: Some(PlatformTarget::WindowsX86_64),
    };

    let outcome = build_platform(
        &failing,
        &config(src.path()),
        PlatformTarget::WindowsX86_64,
        shared.path(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.result.unwrap_err().stage, JobStage::Compile);
    assert_eq!(std::fs::read_dir(shared.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn publish_without_claimed_tag_fails() {
    let src = source_tree();
    let shared = tempfile::tempdir().unwrap();
    let vcs = FakeVcs::default();
    let host = FakeHost::default();
    let pipeline = Pipeline::new(config(src.path()), &vcs, backend(), Some(&host));

    let err = pipeline.publish_from(shared.path()).await.unwrap_err();
    assert!(err.to_string().contains("v1.2.0 does not exist"), "{err}");
    assert!(host.releases().is_empty());
}
