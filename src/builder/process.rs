//! Build tool execution with streamed output and a hard timeout.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Stderr lines kept for failure reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// Grace period for a killed process to be reaped.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// A fully described external command.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    /// Command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Result of a command that ran to completion.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Last [`STDERR_TAIL_LINES`] lines of stderr
    pub stderr_tail: Vec<String>,
}

impl ToolOutput {
    pub fn tail(&self) -> String {
        self.stderr_tail.join("\n")
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s and was killed", .limit.as_secs())]
    TimedOut { command: String, limit: Duration },
}

/// Runs `command` in `cwd`, streaming both output streams to the debug log.
///
/// Stdout and stderr are drained concurrently so neither pipe can fill up and
/// stall the child. The whole run, including draining, is bounded by `limit`;
/// on expiry the child is killed.
///
/// # Arguments
///
/// * `command` - Program, arguments and extra environment
/// * `cwd` - Working directory
/// * `limit` - Wall-clock limit for the run
/// * `label` - Prefix for streamed log lines (usually the platform label)
pub async fn run_streaming(
    command: &ToolCommand,
    cwd: &Path,
    limit: Duration,
    label: &str,
) -> Result<ToolOutput, ToolError> {
    log::debug!("[{label}] $ {}", command.display());

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(&command.envs)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            command: command.display(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let drive = async {
        let (_, stderr_tail) = tokio::join!(
            async {
                if let Some(stdout) = stdout {
                    drain(stdout, label, 0).await;
                }
            },
            async {
                match stderr {
                    Some(stderr) => drain(stderr, label, STDERR_TAIL_LINES).await,
                    None => Vec::new(),
                }
            }
        );
        (child.wait().await, stderr_tail)
    };

    let outcome = tokio::time::timeout(limit, drive).await;

    match outcome {
        Ok((Ok(status), stderr_tail)) => Ok(ToolOutput {
            status,
            stderr_tail,
        }),
        Ok((Err(source), _)) => Err(ToolError::Wait {
            command: command.display(),
            source,
        }),
        Err(_elapsed) => {
            log::warn!(
                "[{label}] `{}` exceeded {}s, terminating",
                command.program,
                limit.as_secs()
            );
            if let Err(e) = child.kill().await {
                log::warn!("[{label}] failed to kill `{}`: {e}", command.program);
            }
            let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            Err(ToolError::TimedOut {
                command: command.display(),
                limit,
            })
        }
    }
}

/// Logs every line of `stream` and returns the last `keep` of them.
async fn drain<R: AsyncRead + Unpin>(stream: R, label: &str, keep: usize) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut tail = VecDeque::with_capacity(keep);

    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("[{label}] {line}");
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    tail.into()
}
