//! Release orchestration for Rust binaries
//!
//! This library drives one release end to end:
//! - a version gate that claims the `v{version}` tag exactly once
//! - parallel builds for a fixed six-platform matrix (native and `cross`)
//! - zip / tar.gz packaging with SHA-256 checksums
//! - an atomic GitHub release carrying every archive and `checksums.txt`
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod git;
pub mod matrix;
pub mod metadata;
pub mod packager;
pub mod pipeline;
pub mod publisher;

// Re-export commonly used types
pub use config::{ReleaseConfig, Trigger};
pub use error::{CliError, ReleaseError, Result};
pub use matrix::PlatformTarget;
pub use pipeline::{Pipeline, PipelineReport};
