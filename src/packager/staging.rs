//! Staging directory assembly: the binary plus auxiliary files.

use crate::error::{ErrorExt, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Auxiliary files shipped when the manifest doesn't say otherwise.
pub const DEFAULT_INCLUDE: &[&str] = &["LICENSE*", "COPYING*", "README*"];

/// A file placed in the staging directory, ready to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path inside the staging directory
    pub path: PathBuf,
    /// Entry name inside the archive (flat, no directories)
    pub name: String,
    pub executable: bool,
}

/// Resolves `patterns` against `source_dir`, returning matching files.
///
/// Patterns that are invalid or match nothing are logged and skipped; missing
/// auxiliary files never fail a job.
pub fn collect_auxiliary(source_dir: &Path, patterns: &[String]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();

    for pattern in patterns {
        let full = source_dir.join(pattern);
        let full = full.to_string_lossy();
        let paths = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Ignoring invalid include pattern '{pattern}': {e}");
                continue;
            }
        };

        let before = found.len();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => log::warn!("Cannot read include match for '{pattern}': {e}"),
            }
        }
        if found.len() == before {
            log::warn!("Include pattern '{pattern}' matched no files");
        }
    }

    found.into_iter().collect()
}

/// Fills `staging_dir` with the binary (as `binary_name`) and the auxiliary
/// files, and returns the staged entries sorted by name.
///
/// The directory is recreated from scratch. A failure to stage the binary is
/// an error; an auxiliary file that cannot be copied, or whose name collides
/// with an entry already staged, is logged and left out.
pub fn stage(
    binary: &Path,
    binary_name: &str,
    executable: bool,
    auxiliary: &[PathBuf],
    staging_dir: &Path,
) -> Result<Vec<StagedFile>> {
    if staging_dir.exists() {
        fs::remove_dir_all(staging_dir).fs_context("clearing staging directory", staging_dir)?;
    }
    fs::create_dir_all(staging_dir).fs_context("creating staging directory", staging_dir)?;

    let binary_dest = staging_dir.join(binary_name);
    fs::copy(binary, &binary_dest).fs_context("staging binary", binary)?;
    if executable {
        set_executable(&binary_dest)?;
    }

    let mut staged = vec![StagedFile {
        path: binary_dest,
        name: binary_name.to_string(),
        executable,
    }];

    for source in auxiliary {
        let Some(name) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if staged.iter().any(|s| s.name == name) {
            log::warn!("Skipping {}: an entry named '{name}' is already staged", source.display());
            continue;
        }
        let dest = staging_dir.join(&name);
        match fs::copy(source, &dest) {
            Ok(_) => staged.push(StagedFile {
                path: dest,
                name,
                executable: false,
            }),
            Err(e) => log::warn!("Skipping auxiliary file {}: {e}", source.display()),
        }
    }

    staged.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(staged)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .fs_context("setting executable permissions", path)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
