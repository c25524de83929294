//! External tool detection and availability checking.
//!
//! Cross-compiled jobs need `cross` and a responsive Docker daemon; native jobs
//! optionally use `rustup` to install the target's standard library.

use crate::error::{CliError, ReleaseError};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for `docker info`
pub const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(20);

/// Check if `cross` is available for containerized builds.
///
/// Cached result to avoid repeated subprocess calls across the matrix.
pub static HAS_CROSS: LazyLock<bool> = LazyLock::new(|| detect("cross", "--version"));

/// Check if `rustup` is available for installing target standard libraries.
pub static HAS_RUSTUP: LazyLock<bool> = LazyLock::new(|| detect("rustup", "--version"));

/// Resolves [`HAS_CROSS`] and [`HAS_RUSTUP`] on the blocking pool, so job
/// tasks only ever read cached values.
pub async fn warm_up() {
    let detected = tokio::task::spawn_blocking(|| {
        LazyLock::force(&HAS_CROSS);
        LazyLock::force(&HAS_RUSTUP);
    })
    .await;
    if let Err(e) = detected {
        log::warn!("Tool detection task failed: {e}");
    }
}

fn detect(tool: &str, version_flag: &str) -> bool {
    match which::which(tool) {
        Ok(path) => {
            log::debug!("Found {tool} at: {}", path.display());

            match std::process::Command::new(&path).arg(version_flag).output() {
                Ok(output) if output.status.success() => {
                    let version = String::from_utf8_lossy(&output.stdout);
                    log::info!("✓ {tool} available: {}", version.lines().next().unwrap_or("").trim());
                    true
                }
                Ok(output) => {
                    log::warn!(
                        "{tool} found at {} but {version_flag} check failed (exit code: {:?}). \
                         Stderr: {}",
                        path.display(),
                        output.status.code(),
                        String::from_utf8_lossy(&output.stderr)
                    );
                    false
                }
                Err(e) => {
                    log::warn!(
                        "{tool} found at {} but failed to execute: {}. Check file permissions.",
                        path.display(),
                        e
                    );
                    false
                }
            }
        }
        Err(e) => {
            log::debug!("{tool} not found in PATH: {e}");
            false
        }
    }
}

/// Checks if Docker is installed and the daemon is running.
///
/// # Returns
///
/// * `Ok(())` - Docker is available
/// * `Err` - Docker is not installed or daemon is not running
pub async fn check_docker_available() -> Result<(), ReleaseError> {
    let status_result = timeout(
        DOCKER_INFO_TIMEOUT,
        Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    )
    .await;

    match status_result {
        Err(_) => Err(CliError::ExecutionFailed {
            command: "docker info".to_string(),
            reason: format!(
                "Docker daemon check timed out after {} seconds",
                DOCKER_INFO_TIMEOUT.as_secs()
            ),
        }
        .into()),

        Ok(Ok(status)) if status.success() => Ok(()),

        // Docker command exists but daemon isn't responding
        Ok(Ok(status)) => Err(CliError::ExecutionFailed {
            command: "docker info".to_string(),
            reason: format!(
                "Docker daemon is not responding (exit code: {}). \
                 cross needs a running daemon to build Linux targets.",
                status.code().unwrap_or(-1)
            ),
        }
        .into()),

        Ok(Err(e)) => Err(CliError::ExecutionFailed {
            command: "docker".to_string(),
            reason: format!(
                "Docker command not found: {e}. \
                 Install from: https://docs.docker.com/get-docker/"
            ),
        }
        .into()),
    }
}
