//! Release host errors.

use thiserror::Error;

/// Failure while talking to the release host.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The host answered with a non-success status
    #[error("{method} {url} returned {status}: {message}")]
    Http {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    /// The request never got an answer
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A published release for the tag already exists with different content
    #[error("release for {tag} already published with different assets: {reason}")]
    Conflict { tag: String, reason: String },

    /// An asset could not be read or uploaded
    #[error("asset {name}: {reason}")]
    Asset { name: String, reason: String },

    /// Missing configuration, e.g. no token or repository
    #[error("{0}")]
    Config(String),
}

impl PublishError {
    /// Whether the whole publish step is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } if *status == 429 || *status >= 500 => true,
            // A half-uploaded asset left behind by an earlier attempt
            Self::Http {
                status: 422,
                message,
                ..
            } => message.contains("already_exists"),
            Self::Http { .. } => false,
            Self::Transport(_) | Self::Asset { .. } => true,
            Self::Conflict { .. } | Self::Config(_) => false,
        }
    }
}
