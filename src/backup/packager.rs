//! Backup packaging
//!
//! Walks the storage roots, drops transient files and writes everything else
//! into a ZIP archive under a fixed folder layout, finishing with the
//! manifest. The archive is assembled in a temporary file next to the
//! destination and only renamed into place once it is complete.

use std::cell::Cell;
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::settings::Compression;
use crate::crypto::SecureString;
use crate::error::{ReceiptsError, ReceiptsResult};

use super::category::{manifest_path, ArchiveEntry, EntryFailure, StorageRoots};
use super::exclusion::{is_excluded_dir, is_excluded_file};
use super::manifest::{BackupManifest, CategoryCounts};
use super::progress::{fraction, CancellationToken, ProgressObserver};
use super::sealed::seal_archive;

/// How an archive is written
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub compression: Compression,
    /// Seal the finished archive with this passphrase
    pub passphrase: Option<SecureString>,
}

/// Files selected for a backup
#[derive(Debug, Default)]
pub struct BackupPlan {
    /// Entries in archive order
    pub entries: Vec<ArchiveEntry>,
    /// Files that could not even be inspected
    pub failures: Vec<EntryFailure>,
}

impl BackupPlan {
    /// Planned entries per category
    pub fn counts(&self) -> CategoryCounts {
        let mut counts = CategoryCounts::default();
        for entry in &self.entries {
            counts.increment(entry.category);
        }
        counts
    }

    /// Sum of planned file sizes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

/// Result of a successful backup
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    /// Where the archive was written
    pub archive_path: PathBuf,
    /// Final size of the archive on disk
    pub archive_size: u64,
    /// Manifest stored in the archive
    pub manifest: BackupManifest,
    /// Source files that were skipped because they could not be read
    pub failures: Vec<EntryFailure>,
    /// Whether the archive is sealed with a passphrase
    pub sealed: bool,
}

impl BackupReport {
    /// Files written per category
    pub fn counts(&self) -> CategoryCounts {
        self.manifest.counts
    }

    /// Whether every selected file made it into the archive
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let counts = self.counts();
        let mut summary = format!(
            "Backed up {} database, {} preference and {} image file(s)",
            counts.database, counts.preferences, counts.images
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!("; skipped {} unreadable file(s)", self.failures.len()));
        }
        summary
    }
}

/// Produces backup archives from the storage roots
#[derive(Debug, Clone)]
pub struct BackupPackager {
    roots: StorageRoots,
    options: BackupOptions,
}

impl BackupPackager {
    pub fn new(roots: StorageRoots) -> Self {
        Self {
            roots,
            options: BackupOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    /// Select the files that would go into a backup
    ///
    /// Paths in `skip` (files or directories) are never selected.
    pub fn plan(&self, skip: &[&Path]) -> BackupPlan {
        let mut plan = BackupPlan::default();
        // Walked and skipped paths are compared in canonical form
        let all_roots: Vec<PathBuf> = self.roots.iter().map(|(_, root)| canonical(root)).collect();
        let skip: Vec<PathBuf> = skip.iter().map(|path| canonical(path)).collect();

        for (category, root) in self.roots.iter() {
            if !root.is_dir() {
                tracing::debug!(root = %root.display(), %category, "storage root missing, nothing to back up");
                continue;
            }
            let root = canonical(root);
            let root = root.as_path();

            // A root nested inside this one is packaged under its own category
            let nested: Vec<&Path> = all_roots
                .iter()
                .map(PathBuf::as_path)
                .filter(|other| *other != root && other.starts_with(root))
                .collect();

            let walker = WalkDir::new(root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| keep_entry(entry, &nested, &skip));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err
                            .path()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| root.display().to_string());
                        tracing::warn!(%path, error = %err, "cannot read source entry");
                        plan.failures
                            .push(EntryFailure::new(path, category, err.to_string()));
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }
                if is_excluded_file(entry.file_name()) {
                    tracing::debug!(path = %entry.path().display(), "excluded transient file");
                    continue;
                }

                let path = entry.path();
                let size = match entry.metadata() {
                    Ok(metadata) => metadata.len(),
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "cannot stat source file");
                        plan.failures.push(EntryFailure::new(
                            path.display().to_string(),
                            category,
                            err.to_string(),
                        ));
                        continue;
                    }
                };

                let relative = path.strip_prefix(root).unwrap_or(path);
                match ArchiveEntry::new(path.to_path_buf(), relative, category, size) {
                    Some(archive_entry) => plan.entries.push(archive_entry),
                    None => plan.failures.push(EntryFailure::new(
                        path.display().to_string(),
                        category,
                        "file name is not valid UTF-8",
                    )),
                }
            }
        }

        plan
    }

    /// Write a backup archive to `destination`
    ///
    /// On any failure the destination path is left untouched.
    pub fn create_backup(
        &self,
        destination: &Path,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> ReceiptsResult<BackupReport> {
        if destination.is_dir() {
            return Err(ReceiptsError::DestinationUnwritable(format!(
                "{} is a directory",
                destination.display()
            )));
        }
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| ReceiptsError::destination(parent.display(), &e))?;

        let plan = self.plan(&[destination]);
        tracing::info!(
            destination = %destination.display(),
            files = plan.entries.len(),
            bytes = plan.total_bytes(),
            "creating backup"
        );

        let mut temp = tempfile::Builder::new()
            .prefix(".receipts-backup-")
            .suffix(".part")
            .tempfile_in(&parent)
            .map_err(|e| ReceiptsError::destination(parent.display(), &e))?;

        let created_at = Utc::now().trunc_subsecs(3);
        let (manifest, write_failures) = write_archive(
            temp.as_file_mut(),
            &plan.entries,
            self.options.compression,
            created_at,
            progress,
            cancel,
        )?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ReceiptsError::destination(destination.display(), &e))?;

        let sealed = self.options.passphrase.is_some();
        let finished = match &self.options.passphrase {
            Some(passphrase) => {
                let mut sealed_temp = tempfile::Builder::new()
                    .prefix(".receipts-backup-")
                    .suffix(".sealed.part")
                    .tempfile_in(&parent)
                    .map_err(|e| ReceiptsError::destination(parent.display(), &e))?;
                seal_archive(temp.path(), sealed_temp.as_file_mut(), passphrase)?;
                sealed_temp
                    .as_file()
                    .sync_all()
                    .map_err(|e| ReceiptsError::destination(destination.display(), &e))?;
                sealed_temp
            }
            None => temp,
        };

        finished
            .persist(destination)
            .map_err(|e| ReceiptsError::destination(destination.display(), &e.error))?;

        let archive_size = fs::metadata(destination)
            .map_err(|e| ReceiptsError::destination(destination.display(), &e))?
            .len();

        let mut failures = plan.failures;
        failures.extend(write_failures);
        let report = BackupReport {
            archive_path: destination.to_path_buf(),
            archive_size,
            manifest,
            failures,
            sealed,
        };
        tracing::info!(
            archive = %destination.display(),
            size = archive_size,
            skipped = report.failures.len(),
            "{}",
            report.summary()
        );
        Ok(report)
    }
}

/// `path` with its parent resolved, so a file that does not exist yet still
/// compares equal to the walked path of the same location
fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|parent| parent.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

fn keep_entry(entry: &DirEntry, nested: &[&Path], skip: &[PathBuf]) -> bool {
    if skip.iter().any(|path| path == entry.path()) {
        return false;
    }
    if entry.file_type().is_dir() {
        if is_excluded_dir(entry.file_name()) {
            tracing::debug!(path = %entry.path().display(), "excluded cache directory");
            return false;
        }
        return !nested.contains(&entry.path());
    }
    true
}

/// Write `entries` and the manifest as a ZIP archive into `writer`
///
/// Unreadable source files are skipped and returned as failures. Any error
/// writing to `writer` aborts with `DestinationUnwritable`.
pub(crate) fn write_archive<W: Write + Seek>(
    writer: W,
    entries: &[ArchiveEntry],
    compression: Compression,
    created_at: DateTime<Utc>,
    progress: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> ReceiptsResult<(BackupManifest, Vec<EntryFailure>)> {
    let written = Rc::new(Cell::new(0u64));
    let mut zip = ZipWriter::new(TrackedWriter::new(writer, Rc::clone(&written)));

    let method = match compression {
        Compression::Deflated => CompressionMethod::Deflated,
        Compression::Stored => CompressionMethod::Stored,
    };
    let options = FileOptions::default()
        .compression_method(method)
        .unix_permissions(0o644);

    let mut counts = CategoryCounts::default();
    let mut uncompressed = 0u64;
    let mut failures = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!("backup cancelled");
            return Err(ReceiptsError::Cancelled);
        }

        let bytes = match fs::read(&entry.source_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %entry.source_path.display(), error = %err, "skipping unreadable file");
                failures.push(EntryFailure::new(
                    entry.source_path.display().to_string(),
                    entry.category,
                    err.to_string(),
                ));
                progress.on_progress(fraction(index + 1, entries.len()), &entry.archive_path);
                continue;
            }
        };

        let large = bytes.len() as u64 >= u64::from(u32::MAX);
        zip.start_file(entry.archive_path.as_str(), options.large_file(large))
            .map_err(|e| zip_write_error(&entry.archive_path, e))?;
        zip.write_all(&bytes)
            .map_err(|e| ReceiptsError::destination(&entry.archive_path, &e))?;

        tracing::debug!(entry = %entry.archive_path, bytes = bytes.len(), "archived");
        counts.increment(entry.category);
        uncompressed += bytes.len() as u64;
        progress.on_progress(fraction(index + 1, entries.len()), &entry.archive_path);
    }

    let manifest = BackupManifest::new(created_at, counts, uncompressed, written.get());
    let manifest_name = manifest_path();
    zip.start_file(manifest_name.as_str(), options)
        .map_err(|e| zip_write_error(&manifest_name, e))?;
    zip.write_all(manifest.to_text().as_bytes())
        .map_err(|e| ReceiptsError::destination(&manifest_name, &e))?;
    zip.finish()
        .map_err(|e| zip_write_error("archive directory", e))?;

    progress.on_progress(1.0, &manifest_name);
    Ok((manifest, failures))
}

fn zip_write_error(context: &str, err: zip::result::ZipError) -> ReceiptsError {
    match err {
        zip::result::ZipError::Io(io) => ReceiptsError::destination(context, &io),
        other => ReceiptsError::DestinationUnwritable(format!("{}: {}", context, other)),
    }
}

/// Tracks the furthest byte offset written through it
struct TrackedWriter<W> {
    inner: W,
    position: u64,
    high_water: Rc<Cell<u64>>,
}

impl<W> TrackedWriter<W> {
    fn new(inner: W, high_water: Rc<Cell<u64>>) -> Self {
        Self {
            inner,
            position: 0,
            high_water,
        }
    }
}

impl<W: Write> Write for TrackedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        if self.position > self.high_water.get() {
            self.high_water.set(self.position);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for TrackedWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}
