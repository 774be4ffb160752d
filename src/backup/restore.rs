//! Backup restoration
//!
//! Validates an archive and unpacks it over the storage roots. The database
//! is replaced as one unit or not at all; preferences and images are
//! restored file by file and failures are collected in the report.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::crypto::SecureString;
use crate::error::{ReceiptsError, ReceiptsResult};

use super::category::{
    classify_archive_path, manifest_path, EntryFailure, StorageCategory, StorageRoots,
};
use super::collaborators::RestoreHooks;
use super::manifest::{BackupManifest, CategoryCounts};
use super::progress::{fraction, CancellationToken, ProgressObserver};
use super::sealed::{is_sealed, open_sealed};

/// First bytes of every SQLite database file
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Suffix for database files moved aside while the restored ones go in
const ASIDE_SUFFIX: &str = ".pre-restore";

/// SQLite companions that belong to a database file
const DATABASE_COMPANIONS: [&str; 2] = ["-wal", "-shm"];

/// How an archive is opened
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Passphrase for sealed archives
    pub passphrase: Option<SecureString>,
}

/// Outcome of a restore that got past the database
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub archive_path: PathBuf,
    /// Manifest read from the archive
    pub manifest: BackupManifest,
    /// Files written per category
    pub restored: CategoryCounts,
    /// Entries that were not restored
    pub failures: Vec<EntryFailure>,
    /// Non-fatal problems, such as a collaborator that failed to reload
    pub warnings: Vec<String>,
    /// Categories processed to the end, in restore order
    pub completed_categories: Vec<StorageCategory>,
    /// Whether the restore stopped early on request
    pub cancelled: bool,
}

impl RestoreReport {
    fn new(archive_path: &Path, manifest: BackupManifest) -> Self {
        Self {
            archive_path: archive_path.to_path_buf(),
            manifest,
            restored: CategoryCounts::default(),
            failures: Vec::new(),
            warnings: Vec::new(),
            completed_categories: Vec::new(),
            cancelled: false,
        }
    }

    /// Number of failed entries in `category`
    pub fn failed_in(&self, category: StorageCategory) -> usize {
        self.failures
            .iter()
            .filter(|f| f.category == category)
            .count()
    }

    /// One `PartialCategoryFailure` per category with failed entries
    pub fn partial_failures(&self) -> Vec<ReceiptsError> {
        StorageCategory::RESTORABLE
            .into_iter()
            .chain(std::iter::once(StorageCategory::Other))
            .filter_map(|category| {
                let failed = self.failed_in(category);
                (failed > 0).then(|| ReceiptsError::PartialCategoryFailure {
                    category,
                    failed,
                    restored: self.restored.get(category),
                })
            })
            .collect()
    }

    /// Whether everything in the archive was restored
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }

    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Restored {} database, {} preference and {} image file(s)",
            self.restored.database, self.restored.preferences, self.restored.images
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!("; {} file(s) failed", self.failures.len()));
        }
        if self.cancelled {
            summary.push_str("; cancelled before completion");
        }
        summary
    }
}

/// Summary of an archive that was checked but not restored
#[derive(Debug, Clone, Serialize)]
pub struct BackupInspection {
    pub archive_path: PathBuf,
    pub manifest: BackupManifest,
    /// Entries found per category
    pub entries: CategoryCounts,
    /// Entries that would be ignored by a restore
    pub other_entries: Vec<String>,
    pub sealed: bool,
    /// Size of the archive file
    pub archive_size: u64,
}

impl BackupInspection {
    /// Whether the entries match the counts in the manifest
    pub fn counts_match(&self) -> bool {
        self.entries == self.manifest.counts
    }

    /// Whether the archive carries a database to restore
    pub fn has_database(&self) -> bool {
        self.entries.database > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} database, {} preference and {} image file(s){}",
            self.entries.database,
            self.entries.preferences,
            self.entries.images,
            if self.counts_match() {
                ""
            } else {
                " (does not match manifest)"
            }
        )
    }
}

/// An opened archive, decrypted first when sealed
struct OpenArchive {
    zip: ZipArchive<File>,
    sealed: bool,
    // Holds the decrypted copy on disk until the restore is done
    _plain: Option<NamedTempFile>,
}

/// An archive entry that maps onto a storage root
struct PlannedFile {
    index: usize,
    name: String,
    category: StorageCategory,
    relative: PathBuf,
}

/// Restores backup archives over the storage roots
#[derive(Debug, Clone)]
pub struct RestoreUnpacker {
    roots: StorageRoots,
    hooks: RestoreHooks,
    options: RestoreOptions,
}

impl RestoreUnpacker {
    pub fn new(roots: StorageRoots, hooks: RestoreHooks) -> Self {
        Self {
            roots,
            hooks,
            options: RestoreOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RestoreOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_passphrase(self, passphrase: Option<SecureString>) -> Self {
        self.with_options(RestoreOptions { passphrase })
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Validate an archive and describe its contents without writing anything
    pub fn inspect_backup(&self, archive_path: &Path) -> ReceiptsResult<BackupInspection> {
        let mut archive = self.open_archive(archive_path)?;
        let manifest = read_manifest(&mut archive.zip)?;
        let (files, rejected) = plan_entries(&mut archive.zip)?;

        let mut entries = CategoryCounts::default();
        for file in &files {
            entries.increment(file.category);
        }
        let archive_size = fs::metadata(archive_path)
            .map_err(|e| ReceiptsError::source(archive_path.display(), &e))?
            .len();

        Ok(BackupInspection {
            archive_path: archive_path.to_path_buf(),
            manifest,
            entries,
            other_entries: rejected.into_iter().map(|f| f.path).collect(),
            sealed: archive.sealed,
            archive_size,
        })
    }

    /// Restore `archive_path` over the storage roots
    ///
    /// Fails without touching any file when the archive or its database is
    /// unusable. Once the database has been replaced the restore always
    /// returns a report, even if later files fail or it is cancelled.
    pub fn restore_backup(
        &self,
        archive_path: &Path,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> ReceiptsResult<RestoreReport> {
        let mut archive = self.open_archive(archive_path)?;
        let manifest = read_manifest(&mut archive.zip)?;
        let (files, rejected) = plan_entries(&mut archive.zip)?;
        tracing::info!(
            archive = %archive_path.display(),
            created_at = %manifest.created_at,
            entries = files.len(),
            "restoring backup"
        );

        let mut report = RestoreReport::new(archive_path, manifest);
        for failure in rejected {
            tracing::warn!(entry = %failure.path, reason = %failure.reason, "ignoring archive entry");
            report.failures.push(failure);
        }

        let total = files.len();
        let mut done = 0;

        // Database: everything is read and checked before anything is replaced
        let database_files: Vec<&PlannedFile> = files
            .iter()
            .filter(|f| f.category == StorageCategory::Database)
            .collect();
        if database_files.is_empty() {
            return Err(ReceiptsError::DatabaseEntryMissingOrInvalid(
                "archive contains no database files".to_string(),
            ));
        }

        let mut staged = Vec::with_capacity(database_files.len());
        for file in database_files {
            if cancel.is_cancelled() {
                tracing::info!("restore cancelled before the database was replaced");
                return Err(ReceiptsError::Cancelled);
            }
            let bytes = read_entry(&mut archive.zip, file.index)
                .and_then(|bytes| validate_database(&file.relative, &bytes).map(|_| bytes))
                .map_err(|reason| {
                    ReceiptsError::DatabaseEntryMissingOrInvalid(format!("{}: {}", file.name, reason))
                })?;
            staged.push((file.relative.clone(), bytes));
            done += 1;
            progress.on_progress(fraction(done, total), &file.name);
        }
        if cancel.is_cancelled() {
            tracing::info!("restore cancelled before the database was replaced");
            return Err(ReceiptsError::Cancelled);
        }

        self.hooks.database.close()?;
        let committed = replace_database(&self.roots.database, &staged);
        if let Err(err) = self.hooks.database.reopen() {
            tracing::warn!(error = %err, "database did not reopen after restore");
            report
                .warnings
                .push(format!("Database did not reopen: {}", err));
        }
        committed?;
        report.restored.database = staged.len();
        report.completed_categories.push(StorageCategory::Database);
        tracing::info!(files = staged.len(), "database restored");

        for category in [StorageCategory::Preferences, StorageCategory::Images] {
            let finished = self.restore_category(
                &mut archive.zip,
                category,
                &files,
                &mut report,
                (&mut done, total),
                progress,
                cancel,
            );
            self.notify(category, &mut report);
            if !finished {
                tracing::info!(%category, "restore cancelled");
                report.cancelled = true;
                break;
            }
            report.completed_categories.push(category);
        }

        progress.on_progress(1.0, "");
        tracing::info!(
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "{}",
            report.summary()
        );
        Ok(report)
    }

    fn open_archive(&self, path: &Path) -> ReceiptsResult<OpenArchive> {
        if is_sealed(path)? {
            let passphrase = self.options.passphrase.as_ref().ok_or_else(|| {
                ReceiptsError::Encryption("archive is sealed and no passphrase was given".to_string())
            })?;
            let plain = open_sealed(path, passphrase)?;
            let file = plain.reopen()?;
            let zip = ZipArchive::new(file).map_err(|e| open_error(path, e))?;
            return Ok(OpenArchive {
                zip,
                sealed: true,
                _plain: Some(plain),
            });
        }

        let file = File::open(path).map_err(|e| ReceiptsError::source(path.display(), &e))?;
        let zip = ZipArchive::new(file).map_err(|e| open_error(path, e))?;
        Ok(OpenArchive {
            zip,
            sealed: false,
            _plain: None,
        })
    }

    /// Restore one best-effort category; returns false when cancelled
    #[allow(clippy::too_many_arguments)]
    fn restore_category(
        &self,
        zip: &mut ZipArchive<File>,
        category: StorageCategory,
        files: &[PlannedFile],
        report: &mut RestoreReport,
        (done, total): (&mut usize, usize),
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(root) = self.roots.root_for(category) else {
            return true;
        };

        for file in files.iter().filter(|f| f.category == category) {
            if cancel.is_cancelled() {
                return false;
            }

            let result = read_entry(zip, file.index).and_then(|bytes| {
                if category == StorageCategory::Images {
                    validate_image(&file.relative, &bytes)?;
                }
                write_replacing(&root.join(&file.relative), &bytes)
            });

            match result {
                Ok(()) => {
                    tracing::debug!(entry = %file.name, "restored");
                    report.restored.increment(category);
                }
                Err(reason) => {
                    tracing::warn!(entry = %file.name, %reason, "could not restore file");
                    report
                        .failures
                        .push(EntryFailure::new(file.name.clone(), category, reason));
                }
            }

            *done += 1;
            progress.on_progress(fraction(*done, total), &file.name);
        }
        true
    }

    /// Tell the owner of `category` to pick up the restored files
    fn notify(&self, category: StorageCategory, report: &mut RestoreReport) {
        if report.restored.get(category) == 0 {
            return;
        }
        match category {
            StorageCategory::Preferences => {
                if let Err(err) = self.hooks.preferences.reload() {
                    tracing::warn!(error = %err, "preferences did not reload after restore");
                    report
                        .warnings
                        .push(format!("Preferences did not reload: {}", err));
                }
            }
            StorageCategory::Images => self.hooks.images.reset(),
            StorageCategory::Database | StorageCategory::Other => {}
        }
    }
}

fn open_error(path: &Path, err: ZipError) -> ReceiptsError {
    match err {
        ZipError::Io(io) => ReceiptsError::source(path.display(), &io),
        other => ReceiptsError::ArchiveCorrupt(format!("{}: {}", path.display(), other)),
    }
}

fn read_manifest(zip: &mut ZipArchive<File>) -> ReceiptsResult<BackupManifest> {
    let name = manifest_path();
    let mut entry = match zip.by_name(&name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(ReceiptsError::ArchiveCorrupt(format!(
                "archive has no {}",
                name
            )))
        }
        Err(err) => return Err(ReceiptsError::ArchiveCorrupt(err.to_string())),
    };

    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| ReceiptsError::ArchiveCorrupt(format!("unreadable manifest: {}", e)))?;
    BackupManifest::parse(&text)
}

/// Split archive entries into restorable files and rejected ones
fn plan_entries(
    zip: &mut ZipArchive<File>,
) -> ReceiptsResult<(Vec<PlannedFile>, Vec<EntryFailure>)> {
    let manifest_name = manifest_path();
    let mut files = Vec::new();
    let mut rejected = Vec::new();

    for index in 0..zip.len() {
        let entry = zip
            .by_index_raw(index)
            .map_err(|e| ReceiptsError::ArchiveCorrupt(e.to_string()))?;
        if entry.is_dir() || entry.name() == manifest_name {
            continue;
        }
        let name = entry.name().to_string();

        let Some(enclosed) = entry.enclosed_name().map(Path::to_path_buf) else {
            rejected.push(EntryFailure::new(name, StorageCategory::Other, "unsafe entry name"));
            continue;
        };
        match classify_archive_path(&enclosed) {
            (category, Some(relative)) if category != StorageCategory::Other => {
                files.push(PlannedFile {
                    index,
                    name,
                    category,
                    relative,
                });
            }
            _ => rejected.push(EntryFailure::new(
                name,
                StorageCategory::Other,
                "not under a known category folder",
            )),
        }
    }

    Ok((files, rejected))
}

/// Read an entry fully; the reader checks its CRC at the end
fn read_entry(zip: &mut ZipArchive<File>, index: usize) -> Result<Vec<u8>, String> {
    let mut entry = zip.by_index(index).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).map_err(|e| e.to_string())?;
    Ok(bytes)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Database files must carry the SQLite header; companions such as an
/// emptied `-wal` are taken as they are
fn validate_database(relative: &Path, bytes: &[u8]) -> Result<(), String> {
    let is_sqlite = matches!(
        extension(relative).as_deref(),
        Some("db" | "sqlite" | "sqlite3")
    );
    if !is_sqlite {
        return Ok(());
    }
    if bytes.is_empty() {
        return Err("file is empty".to_string());
    }
    if !bytes.starts_with(SQLITE_HEADER) {
        return Err("not a SQLite database".to_string());
    }
    Ok(())
}

fn validate_image(relative: &Path, bytes: &[u8]) -> Result<(), String> {
    if bytes.is_empty() {
        return Err("file is empty".to_string());
    }
    let valid = match extension(relative).as_deref() {
        Some("jpg" | "jpeg") => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        Some("png") => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
        Some("gif") => bytes.starts_with(b"GIF8"),
        Some("webp") => bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP",
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err("image data does not match its file type".to_string())
    }
}

/// Write `bytes` to `target` through a sibling temporary file
fn write_replacing(target: &Path, bytes: &[u8]) -> Result<(), String> {
    let temp = stage(target, bytes).map_err(|e| e.to_string())?;
    temp.persist(target).map_err(|e| e.error.to_string())?;
    Ok(())
}

fn stage(target: &Path, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".receipts-restore-")
        .tempfile_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Swap the database files under `root` for `files`
///
/// Existing files, and companions the archive does not replace, are moved
/// aside first and put back if any step fails.
fn replace_database(root: &Path, files: &[(PathBuf, Vec<u8>)]) -> ReceiptsResult<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (relative, bytes) in files {
        let target = root.join(relative);
        let temp = stage(&target, bytes).map_err(|e| ReceiptsError::destination(target.display(), &e))?;
        staged.push((target, temp));
    }

    let targets: HashSet<&Path> = staged.iter().map(|(t, _)| t.as_path()).collect();
    let mut displaced: Vec<PathBuf> = Vec::new();
    for (target, _) in &staged {
        displaced.push(target.clone());
        for companion in DATABASE_COMPANIONS {
            let path = with_suffix(target, companion);
            if !targets.contains(path.as_path()) {
                displaced.push(path);
            }
        }
    }

    let mut aside = Vec::new();
    for path in displaced {
        if fs::symlink_metadata(&path).is_err() {
            continue;
        }
        let aside_path = with_suffix(&path, ASIDE_SUFFIX);
        if let Err(err) = fs::rename(&path, &aside_path) {
            roll_back(&[], &aside);
            return Err(ReceiptsError::destination(path.display(), &err));
        }
        aside.push((path, aside_path));
    }

    let mut placed = Vec::with_capacity(staged.len());
    for (target, temp) in staged {
        if let Err(err) = temp.persist(&target) {
            roll_back(&placed, &aside);
            return Err(ReceiptsError::destination(target.display(), &err.error));
        }
        placed.push(target);
    }

    for (_, aside_path) in aside {
        if let Err(err) = fs::remove_file(&aside_path) {
            tracing::warn!(path = %aside_path.display(), error = %err, "could not remove replaced database file");
        }
    }
    Ok(())
}

fn roll_back(placed: &[PathBuf], aside: &[(PathBuf, PathBuf)]) {
    tracing::warn!("rolling back database restore");
    for path in placed {
        if let Err(err) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %err, "could not remove restored file");
        }
    }
    for (original, aside_path) in aside {
        if let Err(err) = fs::rename(aside_path, original) {
            tracing::warn!(path = %original.display(), error = %err, "could not put database file back");
        }
    }
}
