//! Bundle archive creation.
//!
//! Walks a project directory, applies the exclusion policy, and writes the
//! surviving files into a deterministic compressed tar archive. Archive
//! headers are normalized (fixed mode, zero mtime) so two bundles of an
//! unchanged tree are byte-identical, and the content hash is computed over
//! the final archive bytes rather than the source files.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::bundle::exclude::ExclusionPolicy;
use crate::error::{Result, ShipError};

/// Result of a successful bundling run.
#[derive(Debug, Clone)]
pub struct BundleInfo {
    /// Lower-case hex SHA-256 of the final archive file bytes.
    pub content_hash: String,
    /// Size of the archive file (compressed), not the uncompressed tree.
    pub size_bytes: u64,
    /// Number of files packed into the archive.
    pub file_count: usize,
    /// Where the archive was written.
    pub archive_path: PathBuf,
}

/// Progress events emitted while bundling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleProgress {
    Scanning,
    Archiving {
        files_processed: usize,
        total_files: usize,
    },
    Hashing,
    Complete,
}

/// Bundle `source_dir` into a compressed archive at `output_path`.
///
/// The walk applies `policy` to every entry; excluded directories are not
/// descended into. Entry names are POSIX-style paths relative to
/// `source_dir`. Progress is reported once per phase plus once per archived
/// file.
pub fn create_bundle(
    source_dir: &Path,
    output_path: &Path,
    policy: &ExclusionPolicy,
    mut on_progress: impl FnMut(BundleProgress),
) -> Result<BundleInfo> {
    let meta = fs::metadata(source_dir).map_err(|err| {
        ShipError::Bundling(format!(
            "source directory {} is unreadable: {err}",
            source_dir.display()
        ))
    })?;
    if !meta.is_dir() {
        return Err(ShipError::Bundling(format!(
            "{} is not a directory",
            source_dir.display()
        )));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                ShipError::Bundling(format!(
                    "cannot create output directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
    }

    on_progress(BundleProgress::Scanning);
    let files = scan_files(source_dir, policy)?;
    debug!(
        source = %source_dir.display(),
        file_count = files.len(),
        "scan complete"
    );

    let total_files = files.len();
    write_archive(source_dir, output_path, &files, |done| {
        on_progress(BundleProgress::Archiving {
            files_processed: done,
            total_files,
        });
    })?;

    on_progress(BundleProgress::Hashing);
    let (content_hash, size_bytes) = hash_archive(output_path)?;

    on_progress(BundleProgress::Complete);
    debug!(
        archive = %output_path.display(),
        hash = %content_hash,
        size_bytes,
        "bundle complete"
    );

    Ok(BundleInfo {
        content_hash,
        size_bytes,
        file_count: total_files,
        archive_path: output_path.to_path_buf(),
    })
}

/// Stream an archive file through SHA-256; returns `(hex digest, size)`.
pub fn hash_archive(path: &Path) -> Result<(String, u64)> {
    let file = File::open(path).map_err(|err| {
        ShipError::Bundling(format!("cannot read archive {}: {err}", path.display()))
    })?;
    let size_bytes = file.metadata()?.len();

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok((hex::encode(hasher.finalize()), size_bytes))
}

/// Collect included files as sorted `(relative, absolute)` pairs.
fn scan_files(source_dir: &Path, policy: &ExclusionPolicy) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(source_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(source_dir).unwrap_or(entry.path());
            if rel.as_os_str().is_empty() {
                return true; // the root itself
            }
            !policy.should_exclude(rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.map_err(|err| {
            ShipError::Bundling(format!("walking {}: {err}", source_dir.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.push((rel, entry.path().to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn write_archive(
    source_dir: &Path,
    output_path: &Path,
    files: &[(PathBuf, PathBuf)],
    mut on_file: impl FnMut(usize),
) -> Result<()> {
    let out = File::create(output_path).map_err(|err| {
        ShipError::Bundling(format!(
            "cannot create archive {}: {err}",
            output_path.display()
        ))
    })?;
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::best());
    let mut builder = tar::Builder::new(encoder);

    for (idx, (rel, abs)) in files.iter().enumerate() {
        let entry_name = posix_entry_name(rel);
        let mut file = File::open(abs).map_err(|err| {
            ShipError::Bundling(format!("cannot read {}: {err}", abs.display()))
        })?;
        let len = file.metadata()?.len();

        let mut header = tar::Header::new_gnu();
        header.set_size(len);
        header.set_mode(0o644);
        header.set_mtime(0);

        builder
            .append_data(&mut header, Path::new(&entry_name), &mut file)
            .map_err(|err| {
                ShipError::Bundling(format!(
                    "archiving {entry_name} into {}: {err}",
                    source_dir.display()
                ))
            })?;
        on_file(idx + 1);
    }

    // Flush through every layer so a failure surfaces here, not on drop.
    let encoder = builder
        .into_inner()
        .map_err(|err| ShipError::Bundling(format!("finalizing archive: {err}")))?;
    let mut writer = encoder
        .finish()
        .map_err(|err| ShipError::Bundling(format!("compressing archive: {err}")))?;
    writer
        .flush()
        .map_err(|err| ShipError::Bundling(format!("flushing archive: {err}")))?;

    Ok(())
}

/// Join path components with `/` regardless of platform.
fn posix_entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
