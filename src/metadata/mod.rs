//! Version and binary discovery from the build manifest (Cargo.toml).
//!
//! The manifest is the single source of truth for the release version and the
//! binary name; every other component receives them through
//! [`VersionDescriptor`].

use crate::error::{ReleaseError, Result};
use semver::Version;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Package metadata extracted from Cargo.toml
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    /// Package name from Cargo.toml
    pub name: String,

    /// Package version from Cargo.toml
    pub version: Version,

    /// Repository URL if specified in Cargo.toml
    pub repository: Option<String>,
}

/// Settings from the `[package.metadata.release]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseSettings {
    /// Glob patterns (relative to the source root) for auxiliary files
    /// copied next to the binary in every archive.
    pub include: Option<Vec<String>>,

    /// GitHub repository (`owner/repo`) releases are published to.
    pub repository: Option<String>,
}

/// Complete manifest data from Cargo.toml
#[derive(Debug, Clone)]
pub struct CargoManifest {
    /// Package metadata ([package] section)
    pub metadata: PackageMetadata,

    /// Primary binary name (from [[bin]] or package.name)
    pub binary_name: String,

    /// Pipeline settings (from [package.metadata.release])
    pub release_settings: ReleaseSettings,
}

impl CargoManifest {
    /// Derives the run's immutable version descriptor.
    pub fn version_descriptor(&self) -> VersionDescriptor {
        VersionDescriptor::new(self.metadata.version.clone(), self.binary_name.clone())
    }
}

/// Version, tag and binary name for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    version: Version,
    tag: String,
    binary_name: String,
}

impl VersionDescriptor {
    pub fn new(version: Version, binary_name: String) -> Self {
        let tag = format!("v{version}");
        Self {
            version,
            tag,
            binary_name,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Canonical tag, always `v{version}`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    /// Human-facing release name.
    pub fn release_name(&self) -> String {
        format!("Release {}", self.version)
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.binary_name, self.tag)
    }
}

/// Load complete manifest from Cargo.toml (single read + parse)
///
/// Reads and parses the file exactly once, then extracts the package
/// metadata, the binary name and the release settings from the parsed value.
pub fn load_manifest(cargo_toml_path: &Path) -> Result<CargoManifest> {
    let invalid = |reason: String| ReleaseError::Manifest {
        path: cargo_toml_path.to_path_buf(),
        reason,
    };

    // Step 1: Read file once
    let manifest = std::fs::read_to_string(cargo_toml_path)
        .map_err(|e| invalid(format!("cannot read file: {e}")))?;

    // Step 2: Parse TOML once
    let toml_value: toml::Value = toml::from_str(&manifest)?;

    let package = toml_value
        .get("package")
        .ok_or_else(|| invalid("no [package] section".to_string()))?;

    let name = package
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("missing 'name' in [package]".to_string()))?
        .to_string();

    // Step 3: Version must be a literal semver string
    let version = match package.get("version") {
        Some(toml::Value::String(raw)) => Version::parse(raw)
            .map_err(|e| invalid(format!("version '{raw}' is not valid semver: {e}")))?,
        Some(toml::Value::Table(_)) => {
            return Err(invalid(
                "inherited workspace versions are not supported; declare the version literally"
                    .to_string(),
            ));
        }
        _ => return Err(invalid("missing 'version' in [package]".to_string())),
    };

    let metadata = PackageMetadata {
        name,
        version,
        repository: package
            .get("repository")
            .and_then(|v| v.as_str())
            .map(String::from),
    };

    // Step 4: Discover binary name, [[bin]] first then package name
    let binary_name = toml_value
        .get("bin")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|first| first.get("name"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| metadata.name.clone());

    // Step 5: Release settings from [package.metadata.release]
    let release_settings = match package.get("metadata").and_then(|m| m.get("release")) {
        Some(table) => table.clone().try_into::<ReleaseSettings>()?,
        None => ReleaseSettings::default(),
    };

    log::debug!(
        "Loaded manifest {}: {} {} (binary '{}')",
        cargo_toml_path.display(),
        metadata.name,
        metadata.version,
        binary_name
    );

    Ok(CargoManifest {
        metadata,
        binary_name,
        release_settings,
    })
}

/// Parses `owner/repo` out of a GitHub repository URL or slug.
pub fn github_slug(repository: &str) -> Option<String> {
    let trimmed = repository
        .trim()
        .trim_end_matches('/')
        .trim_end_matches(".git");
    let path = trimmed
        .strip_prefix("https://github.com/")
        .or_else(|| trimmed.strip_prefix("http://github.com/"))
        .or_else(|| trimmed.strip_prefix("git@github.com:"))
        .unwrap_or(trimmed);

    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Some(format!("{owner}/{repo}"))
        }
        _ => None,
    }
}
