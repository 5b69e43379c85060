//! Deterministic tar.gz packaging
//!
//! Entries are written in sorted path order with normalized headers and a
//! zero gzip timestamp, so the same directory tree always produces the same
//! bytes. Backups are packaged straight to a file so the archive never has to
//! fit in memory.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, HeaderMode};

use crate::error::BackupError;

/// Package `source` into the file `dest`, returning the archive size in bytes
pub fn package_to_file(source: &Path, root_name: &str, dest: &Path) -> Result<u64, BackupError> {
    let file = fs::File::create(dest).map_err(|e| tar_error("create", dest, e))?;
    let mut writer = package_directory(source, root_name, BufWriter::new(file))?;
    writer.flush().map_err(|e| tar_error("write", dest, e))?;
    drop(writer);

    let size = fs::metadata(dest).map_err(|e| tar_error("stat", dest, e))?.len();
    Ok(size)
}

/// Pack `source` into a gzipped tarball written to `writer`; the single
/// top-level directory is named `root_name`
pub fn package_directory<W: Write>(
    source: &Path,
    root_name: &str,
    writer: W,
) -> Result<W, BackupError> {
    if !source.is_dir() {
        return Err(BackupError::Packaging(format!(
            "source is not a directory: {}",
            source.display()
        )));
    }

    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    builder
        .append_dir(root_name, source)
        .map_err(|e| tar_error("append", source, e))?;

    for relative in sorted_entries(source)? {
        let fs_path = source.join(&relative);
        let archive_path = Path::new(root_name).join(&relative);

        let metadata = fs::symlink_metadata(&fs_path).map_err(|e| tar_error("stat", &fs_path, e))?;
        let result = if metadata.is_dir() {
            builder.append_dir(&archive_path, &fs_path)
        } else {
            builder.append_path_with_name(&fs_path, &archive_path)
        };
        result.map_err(|e| tar_error("append", &fs_path, e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| BackupError::Packaging(format!("tar finalize failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| BackupError::Packaging(format!("gzip finalize failed: {}", e)))
}

/// Every path below `root`, relative to it, sorted so parents precede children
fn sorted_entries(root: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let mut entries = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative) = pending.pop() {
        let dir = root.join(&relative);
        let read_dir = fs::read_dir(&dir).map_err(|e| tar_error("read", &dir, e))?;

        for entry in read_dir {
            let entry = entry.map_err(|e| tar_error("read", &dir, e))?;
            let child = relative.join(entry.file_name());
            let file_type = entry.file_type().map_err(|e| tar_error("stat", &entry.path(), e))?;
            if file_type.is_dir() {
                pending.push(child.clone());
            }
            entries.push(child);
        }
    }

    entries.sort();
    Ok(entries)
}

fn tar_error(action: &str, path: &Path, err: std::io::Error) -> BackupError {
    BackupError::Packaging(format!("tar {} failed for {}: {}", action, path.display(), err))
}
