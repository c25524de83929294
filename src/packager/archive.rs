//! Archive writers for staged files.
//!
//! Entries are flat, written in the order given (callers pass them sorted by
//! name) and carry a zero modification time, so the same inputs always yield
//! byte-identical archives.

use super::staging::StagedFile;
use crate::error::{ErrorExt, ReleaseError, Result};
use crate::matrix::ArchiveFormat;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const EXEC_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Writes `files` into a new archive at `output_path` in the given format.
///
/// An existing file at `output_path` is replaced.
pub fn write_archive(format: ArchiveFormat, output_path: &Path, files: &[StagedFile]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).fs_context("creating output directory", parent)?;
    }

    match format {
        ArchiveFormat::TarGz => write_tar_gz(output_path, files),
        ArchiveFormat::Zip => write_zip(output_path, files),
    }
}

fn entry_mode(file: &StagedFile) -> u32 {
    if file.executable { EXEC_MODE } else { FILE_MODE }
}

/// Create a `.tar.gz` archive at `output_path`.
fn write_tar_gz(output_path: &Path, files: &[StagedFile]) -> Result<()> {
    let output_file = File::create(output_path).fs_context("creating archive", output_path)?;
    let encoder = GzEncoder::new(BufWriter::new(output_file), Compression::best());
    let mut archive = tar::Builder::new(encoder);
    archive.mode(tar::HeaderMode::Deterministic);

    for file in files {
        let source = File::open(&file.path).fs_context("opening staged file", &file.path)?;
        let size = source
            .metadata()
            .fs_context("reading staged file metadata", &file.path)?
            .len();

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mode(entry_mode(file));
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        archive
            .append_data(&mut header, &file.name, source)
            .fs_context("appending to archive", output_path)?;
    }

    let encoder = archive
        .into_inner()
        .fs_context("finishing tar stream", output_path)?;
    let mut writer = encoder
        .finish()
        .fs_context("finishing gzip stream", output_path)?;
    writer.flush().fs_context("flushing archive", output_path)?;
    Ok(())
}

/// Create a `.zip` archive at `output_path`.
fn write_zip(output_path: &Path, files: &[StagedFile]) -> Result<()> {
    let output_file = File::create(output_path).fs_context("creating archive", output_path)?;
    let mut archive = ZipWriter::new(BufWriter::new(output_file));

    for file in files {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(entry_mode(file));

        archive
            .start_file(file.name.as_str(), options)
            .map_err(|e| zip_error(output_path, e))?;
        let mut source = File::open(&file.path).fs_context("opening staged file", &file.path)?;
        io::copy(&mut source, &mut archive).fs_context("appending to archive", output_path)?;
    }

    let mut writer = archive.finish().map_err(|e| zip_error(output_path, e))?;
    writer.flush().fs_context("flushing archive", output_path)?;
    Ok(())
}

fn zip_error(path: &Path, e: zip::result::ZipError) -> ReleaseError {
    ReleaseError::Generic(format!("writing zip {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn staged(dir: &Path) -> Vec<StagedFile> {
        std::fs::write(dir.join("LICENSE"), "MIT").unwrap();
        std::fs::write(dir.join("reson"), b"\x7fELF binary").unwrap();
        vec![
            StagedFile {
                path: dir.join("LICENSE"),
                name: "LICENSE".into(),
                executable: false,
            },
            StagedFile {
                path: dir.join("reson"),
                name: "reson".into(),
                executable: true,
            },
        ]
    }

    #[test]
    fn tar_gz_entries_are_flat_with_modes() {
        let dir = tempfile::tempdir().unwrap();
        let files = staged(dir.path());
        let out = dir.path().join("out/reson_1.2.0_Linux_x86_64.tar.gz");
        write_archive(ArchiveFormat::TarGz, &out, &files).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&out).unwrap()));
        let entries: Vec<(String, u32, u64)> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                (path, e.header().mode().unwrap(), e.header().mtime().unwrap())
            })
            .collect();
        assert_eq!(
            entries,
            vec![
                ("LICENSE".to_string(), 0o644, 0),
                ("reson".to_string(), 0o755, 0)
            ]
        );
    }

    #[test]
    fn tar_gz_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let files = staged(dir.path());
        let a = dir.path().join("a.tar.gz");
        let b = dir.path().join("b.tar.gz");
        write_archive(ArchiveFormat::TarGz, &a, &files).unwrap();
        write_archive(ArchiveFormat::TarGz, &b, &files).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn zip_contains_binary() {
        let dir = tempfile::tempdir().unwrap();
        let files = staged(dir.path());
        let out = dir.path().join("reson_1.2.0_Windows_x86_64.zip");
        write_archive(ArchiveFormat::Zip, &out, &files).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut body = Vec::new();
        archive
            .by_name("reson")
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();
        assert_eq!(body, b"\x7fELF binary");
    }
}
