//! CPU architecture types and utilities.

use serde::Serialize;
use std::fmt;

/// CPU architecture of a matrix target.
///
/// Only the architectures the release matrix actually ships are represented.
///
/// # Examples
///
/// ```
/// use release_pipeline::matrix::{Arch, PlatformTarget};
///
/// assert_eq!(PlatformTarget::DarwinArm64.arch(), Arch::AArch64);
/// assert_eq!(Arch::AArch64.to_string(), "aarch64");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86_64 / AMD64 (64-bit)
    X86_64,
    /// AArch64 / ARM64 (64-bit) - Apple Silicon, modern ARM servers
    AArch64,
    /// ARMv7 with hard-float (32-bit) - Raspberry Pi and embedded ARM
    Armv7,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X86_64 => f.write_str("x86_64"),
            Self::AArch64 => f.write_str("aarch64"),
            Self::Armv7 => f.write_str("armv7"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PlatformTarget;

    #[test]
    fn display_matches_triple_prefix() {
        for target in PlatformTarget::ALL {
            assert!(
                target
                    .target_triple()
                    .starts_with(&target.arch().to_string()),
                "{target}"
            );
        }
    }
}
