//! Error types for release pipeline operations.
//!
//! Build jobs report their own [`BuildFailure`](crate::builder::BuildFailure)
//! records; everything that fails the run as a whole ends up here.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::publisher::{IncompleteRelease, PublishError};

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all pipeline operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO errors with the path and action that produced them
    #[error("{action} {}: {source}", .path.display())]
    Fs {
        /// What was being attempted
        action: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The build manifest is missing or does not declare what the pipeline needs
    #[error("Invalid manifest {}: {reason}", .path.display())]
    Manifest {
        /// Manifest path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A git invocation failed
    #[error("git {command} failed: {reason}")]
    Git {
        /// Git subcommand and arguments
        command: String,
        /// Stderr or spawn error
        reason: String,
    },

    /// One or more platforms did not produce an artifact
    #[error(transparent)]
    IncompleteRelease(#[from] IncompleteRelease),

    /// Publishing the release failed
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    /// Errors raised with [`bail!`](crate::bail)
    #[error("{0}")]
    Generic(String),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Whether re-invoking the pipeline could plausibly succeed without changes.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Publish(e) => e.is_retryable(),
            Self::Git { .. } | Self::Io(_) | Self::Fs { .. } => true,
            _ => false,
        }
    }
}

/// Attaches the action and path to filesystem errors.
pub trait ErrorExt<T> {
    /// Wraps an `io::Error` into [`ReleaseError::Fs`].
    fn fs_context(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|source| ReleaseError::Fs {
            action: action.to_string(),
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns early with a formatted [`ReleaseError::Generic`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::ReleaseError::Generic(format!($($arg)*)))
    };
}
