//! The fixed platform matrix.
//!
//! Every release is built for exactly the platforms enumerated by
//! [`PlatformTarget`]. The matrix is closed: adding a platform means adding a
//! variant, which forces every `match` over it to be revisited.

mod arch;

pub use arch::Arch;

use serde::Serialize;
use std::fmt;

/// How a platform's binary is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// `cargo build` on a host of the same OS family
    Native,
    /// `cross build` inside a containerized toolchain + sysroot
    Cross,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Cross => f.write_str("cross"),
        }
    }
}

/// Archive container used for a platform's artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ArchiveFormat {
    /// `.zip` (Windows)
    #[serde(rename = "zip")]
    Zip,
    /// `.tar.gz` (everything else)
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension()[1..])
    }
}

/// Operating system family of a target or of the build host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OsFamily {
    /// Windows
    Windows,
    /// macOS
    Darwin,
    /// Linux
    Linux,
}

impl OsFamily {
    /// OS family of the machine running the pipeline, if it is one we build on.
    pub fn host() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Self::Darwin)
        } else if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else {
            None
        }
    }
}

/// One row of the release matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformTarget {
    /// 64-bit Windows (MSVC)
    WindowsX86_64,
    /// Intel macOS
    DarwinX86_64,
    /// Apple Silicon macOS
    DarwinArm64,
    /// 64-bit Linux, statically linked against musl
    LinuxX86_64,
    /// 64-bit ARM Linux, statically linked against musl
    LinuxAarch64,
    /// 32-bit ARMv7 hard-float Linux, statically linked against musl
    LinuxArmv7,
}

impl PlatformTarget {
    /// The whole matrix, in declaration order.
    pub const ALL: [PlatformTarget; 6] = [
        Self::WindowsX86_64,
        Self::DarwinX86_64,
        Self::DarwinArm64,
        Self::LinuxX86_64,
        Self::LinuxAarch64,
        Self::LinuxArmv7,
    ];

    /// Rust target triple passed to `--target`.
    pub fn target_triple(self) -> &'static str {
        match self {
            Self::WindowsX86_64 => "x86_64-pc-windows-msvc",
            Self::DarwinX86_64 => "x86_64-apple-darwin",
            Self::DarwinArm64 => "aarch64-apple-darwin",
            Self::LinuxX86_64 => "x86_64-unknown-linux-musl",
            Self::LinuxAarch64 => "aarch64-unknown-linux-musl",
            Self::LinuxArmv7 => "armv7-unknown-linux-musleabihf",
        }
    }

    /// Label used in archive names; unique across the matrix.
    pub fn platform_label(self) -> &'static str {
        match self {
            Self::WindowsX86_64 => "Windows_x86_64",
            Self::DarwinX86_64 => "Darwin_x86_64",
            Self::DarwinArm64 => "Darwin_arm64",
            Self::LinuxX86_64 => "Linux_x86_64",
            Self::LinuxAarch64 => "Linux_aarch64",
            Self::LinuxArmv7 => "Linux_armv7",
        }
    }

    /// Parses a platform label back into its target.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.platform_label() == label)
    }

    pub fn runner_kind(self) -> RunnerKind {
        match self.os_family() {
            OsFamily::Linux => RunnerKind::Cross,
            OsFamily::Windows | OsFamily::Darwin => RunnerKind::Native,
        }
    }

    pub fn os_family(self) -> OsFamily {
        match self {
            Self::WindowsX86_64 => OsFamily::Windows,
            Self::DarwinX86_64 | Self::DarwinArm64 => OsFamily::Darwin,
            Self::LinuxX86_64 | Self::LinuxAarch64 | Self::LinuxArmv7 => OsFamily::Linux,
        }
    }

    pub fn arch(self) -> Arch {
        match self {
            Self::WindowsX86_64 | Self::DarwinX86_64 | Self::LinuxX86_64 => Arch::X86_64,
            Self::DarwinArm64 | Self::LinuxAarch64 => Arch::AArch64,
            Self::LinuxArmv7 => Arch::Armv7,
        }
    }

    /// Suffix of the executable file (`.exe` on Windows, empty elsewhere).
    pub fn file_extension(self) -> &'static str {
        match self.os_family() {
            OsFamily::Windows => ".exe",
            OsFamily::Darwin | OsFamily::Linux => "",
        }
    }

    /// Fixed mapping: zip for Windows, tar.gz for the rest.
    pub fn archive_format(self) -> ArchiveFormat {
        match self.os_family() {
            OsFamily::Windows => ArchiveFormat::Zip,
            OsFamily::Darwin | OsFamily::Linux => ArchiveFormat::TarGz,
        }
    }

    /// The containerized Linux variants ship fully static binaries.
    pub fn requires_static_linkage(self) -> bool {
        self.os_family() == OsFamily::Linux
    }

    /// Whether the staged binary must carry executable permission bits.
    pub fn needs_exec_bit(self) -> bool {
        self.os_family() != OsFamily::Windows
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.platform_label())
    }
}

impl Serialize for PlatformTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.platform_label())
    }
}

/// Flattened view of one matrix row, for `matrix --json` and reports.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixRow {
    pub platform_label: &'static str,
    pub target_triple: &'static str,
    pub runner_kind: RunnerKind,
    pub archive_format: ArchiveFormat,
    pub static_linkage: bool,
    pub arch: Arch,
}

impl From<PlatformTarget> for MatrixRow {
    fn from(target: PlatformTarget) -> Self {
        Self {
            platform_label: target.platform_label(),
            target_triple: target.target_triple(),
            runner_kind: target.runner_kind(),
            archive_format: target.archive_format(),
            static_linkage: target.requires_static_linkage(),
            arch: target.arch(),
        }
    }
}

/// All matrix rows in declaration order.
pub fn rows() -> Vec<MatrixRow> {
    PlatformTarget::ALL.into_iter().map(MatrixRow::from).collect()
}
