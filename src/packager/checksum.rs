//! Artifact checksum calculation and `checksums.txt` handling.
//!
//! Listings use the `sha256sum` format: lowercase hex digest, two spaces,
//! file name. Lines are sorted by file name.

use crate::error::{ErrorExt, ReleaseError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Name of the checksum listing attached to every release.
pub const CHECKSUM_FILE_NAME: &str = "checksums.txt";

/// Calculates the SHA-256 checksum of a single file.
///
/// Reads the file in 8KB chunks to handle large archives efficiently.
///
/// # Arguments
///
/// * `file_path` - Path to file to hash
///
/// # Returns
///
/// * `Ok(String)` - Lowercase hex-encoded SHA-256 hash (64 characters)
/// * `Err` - If the file cannot be read
pub async fn calculate_sha256(file_path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(file_path)
        .await
        .fs_context("opening file for hashing", file_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", file_path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// One `checksums.txt` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub checksum: String,
    pub file_name: String,
}

/// Renders entries as a sorted `sha256sum` listing with a trailing newline.
pub fn format_listing<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut lines: Vec<(&str, &str)> = entries.into_iter().collect();
    lines.sort_by(|a, b| a.1.cmp(b.1));
    lines
        .into_iter()
        .map(|(checksum, name)| format!("{checksum}  {name}\n"))
        .collect()
}

/// Parses a `sha256sum` listing. Blank lines are ignored; the binary-mode
/// marker (`*name`) is accepted.
pub fn parse_listing(text: &str) -> Result<Vec<ChecksumEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let (checksum, rest) = line.split_once(' ').ok_or_else(|| {
                ReleaseError::Generic(format!("checksums line {}: missing file name", idx + 1))
            })?;
            let file_name = rest.trim_start_matches(' ').trim_start_matches('*').trim_end();
            let valid_hex =
                checksum.len() == 64 && checksum.bytes().all(|b| b.is_ascii_hexdigit());
            if !valid_hex || file_name.is_empty() {
                return Err(ReleaseError::Generic(format!(
                    "checksums line {}: malformed entry '{line}'",
                    idx + 1
                )));
            }
            Ok(ChecksumEntry {
                checksum: checksum.to_ascii_lowercase(),
                file_name: file_name.to_string(),
            })
        })
        .collect()
}

/// Outcome of re-hashing the files named in a listing.
#[derive(Debug, Default)]
pub struct VerificationReport {
    pub verified: Vec<String>,
    pub mismatched: Vec<Mismatch>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub file_name: String,
    pub expected: String,
    pub actual: String,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

/// Re-hashes every file listed in `dir/checksums.txt`.
pub async fn verify_listing(dir: &Path) -> Result<VerificationReport> {
    let listing_path = dir.join(CHECKSUM_FILE_NAME);
    let text = tokio::fs::read_to_string(&listing_path)
        .await
        .fs_context("reading checksum listing", &listing_path)?;

    let mut report = VerificationReport::default();
    for entry in parse_listing(&text)? {
        let path = dir.join(&entry.file_name);
        if !path.is_file() {
            report.missing.push(entry.file_name);
            continue;
        }
        let actual = calculate_sha256(&path).await?;
        if actual == entry.checksum {
            report.verified.push(entry.file_name);
        } else {
            report.mismatched.push(Mismatch {
                file_name: entry.file_name,
                expected: entry.checksum,
                actual,
            });
        }
    }
    Ok(report)
}
