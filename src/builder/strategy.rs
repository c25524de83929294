//! Native vs containerized build strategies.

use super::process::{self, ToolCommand};
use super::tool_detection::{HAS_CROSS, HAS_RUSTUP, check_docker_available};
use super::{BuildFailure, BuildJob, JobStage};
use crate::matrix::{OsFamily, PlatformTarget, RunnerKind};
use std::time::Duration;

/// Flags that force a fully static binary on the musl targets.
pub const STATIC_RUSTFLAGS: &str = "-C target-feature=+crt-static";

/// Limit for `rustup target add`.
const RUSTUP_TIMEOUT: Duration = Duration::from_secs(600);

/// How one platform's binary gets compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// `cargo build` on a host of the target's OS family
    Native,
    /// `cross build` inside a container with the target's toolchain and sysroot
    Cross,
}

impl BuildStrategy {
    /// Static selection from the matrix row.
    pub fn for_target(target: PlatformTarget) -> Self {
        match target.runner_kind() {
            RunnerKind::Native => Self::Native,
            RunnerKind::Cross => Self::Cross,
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            Self::Native => "cargo",
            Self::Cross => "cross",
        }
    }

    /// The compile command for `job`, including its isolated target dir.
    pub fn build_command(self, job: &BuildJob) -> ToolCommand {
        let mut command = ToolCommand::new(self.program()).args([
            "build".to_string(),
            "--release".to_string(),
            "--target".to_string(),
            job.target.target_triple().to_string(),
            "--target-dir".to_string(),
            job.target_dir().display().to_string(),
            "--bin".to_string(),
            job.version.binary_name().to_string(),
        ]);

        if job.target.requires_static_linkage() {
            command = command.env("RUSTFLAGS", STATIC_RUSTFLAGS);
        }

        command
    }

    /// Checks the host can run this strategy for `job`'s target.
    ///
    /// Every failure here is reported with stage [`JobStage::Toolchain`].
    pub async fn prepare(self, job: &BuildJob) -> Result<(), BuildFailure> {
        let target = job.target;
        let fail = |reason: String| BuildFailure::new(target, JobStage::Toolchain, reason);

        match self {
            Self::Native => {
                check_native_host(target, OsFamily::host()).map_err(fail)?;

                if !*HAS_RUSTUP {
                    log::debug!(
                        "[{target}] rustup not available, assuming {} std is installed",
                        target.target_triple()
                    );
                    return Ok(());
                }

                let add = ToolCommand::new("rustup").args(["target", "add", target.target_triple()]);
                let output = process::run_streaming(
                    &add,
                    &job.source_dir,
                    RUSTUP_TIMEOUT,
                    target.platform_label(),
                )
                .await
                .map_err(|e| fail(e.to_string()))?;

                if !output.status.success() {
                    return Err(fail(format!(
                        "`{}` exited with {}:\n{}",
                        add.display(),
                        output.status,
                        output.tail()
                    )));
                }
                Ok(())
            }
            Self::Cross => {
                if !*HAS_CROSS {
                    return Err(fail(
                        "`cross` not found on PATH; install it with `cargo install cross --locked`"
                            .to_string(),
                    ));
                }
                check_docker_available()
                    .await
                    .map_err(|e| fail(e.to_string()))
            }
        }
    }
}

/// A native build only works on a host of the target's OS family.
fn check_native_host(target: PlatformTarget, host: Option<OsFamily>) -> Result<(), String> {
    match host {
        Some(host) if host == target.os_family() => Ok(()),
        Some(host) => Err(format!(
            "{} must be built natively on a {:?} host, not {:?}",
            target.target_triple(),
            target.os_family(),
            host
        )),
        None => Err("unsupported build host operating system".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::VersionDescriptor;
    use std::path::Path;
    use std::sync::Arc;

    fn job(target: PlatformTarget) -> BuildJob {
        let version = Arc::new(VersionDescriptor::new(
            semver::Version::new(1, 2, 0),
            "reson".to_string(),
        ));
        BuildJob::new(target, version, Path::new("/src"), Path::new("/work/jobs"))
    }

    #[test]
    fn strategy_follows_runner_kind() {
        assert_eq!(
            BuildStrategy::for_target(PlatformTarget::DarwinArm64),
            BuildStrategy::Native
        );
        assert_eq!(
            BuildStrategy::for_target(PlatformTarget::LinuxArmv7),
            BuildStrategy::Cross
        );
    }

    #[test]
    fn cross_command_is_static_and_isolated() {
        let job = job(PlatformTarget::LinuxAarch64);
        let command = BuildStrategy::Cross.build_command(&job);
        assert_eq!(command.program, "cross");
        assert_eq!(&command.args[..3], ["build", "--release", "--target"]);
        assert_eq!(command.args[3], "aarch64-unknown-linux-musl");
        assert_eq!(command.args[5], job.target_dir().display().to_string());
        assert_eq!(command.args[7], "reson");
        assert_eq!(
            command.envs.get("RUSTFLAGS").map(String::as_str),
            Some(STATIC_RUSTFLAGS)
        );
    }

    #[test]
    fn native_command_has_no_static_flags() {
        let job = job(PlatformTarget::WindowsX86_64);
        let command = BuildStrategy::Native.build_command(&job);
        assert_eq!(command.program, "cargo");
        assert!(command.envs.is_empty());
    }

    #[test]
    fn native_host_must_match_family() {
        assert!(check_native_host(PlatformTarget::DarwinX86_64, Some(OsFamily::Darwin)).is_ok());
        assert!(check_native_host(PlatformTarget::DarwinArm64, Some(OsFamily::Darwin)).is_ok());
        assert!(check_native_host(PlatformTarget::WindowsX86_64, Some(OsFamily::Linux)).is_err());
        assert!(check_native_host(PlatformTarget::DarwinArm64, None).is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn native_prepare_on_wrong_host_is_toolchain_failure() {
        let failure = BuildStrategy::Native
            .prepare(&job(PlatformTarget::WindowsX86_64))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, JobStage::Toolchain);
        assert_eq!(failure.platform, PlatformTarget::WindowsX86_64);
    }
}
