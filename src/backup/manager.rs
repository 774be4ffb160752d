//! Backup manager for Receipts
//!
//! Handles rolling backups with configurable retention policies. Backups are
//! stored as dated archives in the backup directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::paths::ReceiptsPaths;
use crate::config::settings::{BackupRetention, Settings};
use crate::crypto::SecureString;
use crate::error::{ReceiptsError, ReceiptsResult};

use super::packager::{BackupOptions, BackupPackager, BackupReport};
use super::progress::{CancellationToken, NoProgress, ProgressObserver};

/// Extension of plain archives
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extension of passphrase-sealed archives
pub const SEALED_EXTENSION: &str = "rcpt";

/// Metadata about a backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Backup filename
    pub filename: String,
    /// Full path to backup
    pub path: PathBuf,
    /// When the backup was created
    pub created_at: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
    /// Whether this is a monthly backup (kept longer)
    pub is_monthly: bool,
    /// Whether the archive is sealed with a passphrase
    pub sealed: bool,
}

/// Manages backup creation and retention
#[derive(Debug, Clone)]
pub struct BackupManager {
    /// Path to backup directory
    backup_dir: PathBuf,
    packager: BackupPackager,
    /// Retention policy
    retention: BackupRetention,
}

impl BackupManager {
    /// Create a manager for the configured storage roots
    pub fn new(paths: &ReceiptsPaths, settings: &Settings) -> Self {
        let packager = BackupPackager::new(settings.storage_roots(paths)).with_options(BackupOptions {
            compression: settings.backup.compression,
            passphrase: None,
        });
        Self {
            backup_dir: paths.backup_dir(),
            packager,
            retention: settings.backup_retention.clone(),
        }
    }

    /// Seal new backups with `passphrase`
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: Option<SecureString>) -> Self {
        let compression = self.packager.options().compression;
        self.packager = self.packager.with_options(BackupOptions {
            compression,
            passphrase,
        });
        self
    }

    pub fn packager(&self) -> &BackupPackager {
        &self.packager
    }

    /// Path for a backup created at `now`
    pub fn backup_path_for(&self, now: DateTime<Utc>) -> PathBuf {
        let extension = if self.packager.options().passphrase.is_some() {
            SEALED_EXTENSION
        } else {
            ARCHIVE_EXTENSION
        };
        let filename = format!(
            "backup-{}-{:03}.{}",
            now.format("%Y%m%d-%H%M%S"),
            now.timestamp_subsec_millis(),
            extension
        );
        self.backup_dir.join(filename)
    }

    /// Create a backup of all data
    pub fn create_backup(&self) -> ReceiptsResult<BackupReport> {
        self.create_backup_observed(&NoProgress, &CancellationToken::new())
    }

    /// Create a backup, reporting progress and honouring `cancel`
    pub fn create_backup_observed(
        &self,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> ReceiptsResult<BackupReport> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| ReceiptsError::destination(self.backup_dir.display(), &e))?;

        let backup_path = self.backup_path_for(Utc::now());
        self.packager.create_backup(&backup_path, progress, cancel)
    }

    /// List all available backups, newest first
    pub fn list_backups(&self) -> ReceiptsResult<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.backup_dir)
            .map_err(|e| ReceiptsError::Io(format!("Failed to read backup directory: {}", e)))?
        {
            let entry = entry
                .map_err(|e| ReceiptsError::Io(format!("Failed to read directory entry: {}", e)))?;

            if let Some(info) = self.parse_backup_info(&entry.path()) {
                backups.push(info);
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(backups)
    }

    /// Parse backup info from a backup file name
    fn parse_backup_info(&self, path: &Path) -> Option<BackupInfo> {
        let filename = path.file_name()?.to_string_lossy().to_string();

        // backup-YYYYMMDD-HHMMSS-mmm.zip or .rcpt
        let stem = filename.strip_prefix("backup-")?;
        let (date_part, sealed) = if let Some(date) = stem.strip_suffix(".zip") {
            (date, false)
        } else {
            (stem.strip_suffix(".rcpt")?, true)
        };
        let created_at = parse_backup_timestamp(date_part)?;

        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(BackupInfo {
            filename,
            path: path.to_path_buf(),
            created_at,
            size_bytes: metadata.len(),
            is_monthly: is_first_of_month(&created_at),
            sealed,
        })
    }

    /// Enforce retention policy by deleting old backups
    pub fn enforce_retention(&self) -> ReceiptsResult<Vec<PathBuf>> {
        let backups = self.list_backups()?;
        let mut deleted = Vec::new();

        let (monthly, daily): (Vec<_>, Vec<_>) = backups.into_iter().partition(|b| b.is_monthly);

        for backup in daily
            .into_iter()
            .skip(self.retention.daily_count as usize)
            .chain(monthly.into_iter().skip(self.retention.monthly_count as usize))
        {
            fs::remove_file(&backup.path)
                .map_err(|e| ReceiptsError::Io(format!("Failed to delete old backup: {}", e)))?;
            tracing::info!(backup = %backup.filename, "pruned backup");
            deleted.push(backup.path);
        }

        Ok(deleted)
    }

    /// Create a backup and then enforce retention policy
    pub fn create_backup_with_retention(&self) -> ReceiptsResult<(BackupReport, Vec<PathBuf>)> {
        let report = self.create_backup()?;
        let deleted = self.enforce_retention()?;
        Ok((report, deleted))
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &PathBuf {
        &self.backup_dir
    }

    /// Get a specific backup by filename
    pub fn get_backup(&self, filename: &str) -> ReceiptsResult<Option<BackupInfo>> {
        let path = self.backup_dir.join(filename);
        if path.exists() {
            Ok(self.parse_backup_info(&path))
        } else {
            Ok(None)
        }
    }

    /// Get the most recent backup
    pub fn get_latest_backup(&self) -> ReceiptsResult<Option<BackupInfo>> {
        let backups = self.list_backups()?;
        Ok(backups.into_iter().next())
    }
}

/// A backup is "monthly" if it was taken on the first of the month
fn is_first_of_month(timestamp: &DateTime<Utc>) -> bool {
    timestamp.day() == 1
}

/// Parse a backup timestamp from the filename date part
fn parse_backup_timestamp(date_str: &str) -> Option<DateTime<Utc>> {
    // YYYYMMDD-HHMMSS or YYYYMMDD-HHMMSS-mmm
    let parts: Vec<&str> = date_str.split('-').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let date_part = parts[0];
    let time_part = parts[1];
    let millis: u32 = if parts.len() == 3 {
        parts[2].parse().ok()?
    } else {
        0
    };

    if date_part.len() != 8 || time_part.len() != 6 {
        return None;
    }

    let year: i32 = date_part.get(0..4)?.parse().ok()?;
    let month: u32 = date_part.get(4..6)?.parse().ok()?;
    let day: u32 = date_part.get(6..8)?.parse().ok()?;
    let hour: u32 = time_part.get(0..2)?.parse().ok()?;
    let minute: u32 = time_part.get(2..4)?.parse().ok()?;
    let second: u32 = time_part.get(4..6)?.parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;
    let datetime = chrono::NaiveDateTime::new(date, time);

    Some(DateTime::from_naive_utc_and_offset(datetime, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::sealed::is_sealed;
    use tempfile::TempDir;

    fn create_test_manager() -> (BackupManager, ReceiptsPaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = ReceiptsPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        fs::write(paths.database_dir().join("receipts.db"), b"SQLite format 3\0").unwrap();

        let mut settings = Settings::default();
        settings.backup_retention = BackupRetention {
            daily_count: 3,
            monthly_count: 2,
        };

        let manager = BackupManager::new(&paths, &settings);
        (manager, paths, temp_dir)
    }

    /// Drop an empty file with a backup name for the given timestamp
    fn fake_backup(manager: &BackupManager, stamp: &str) -> PathBuf {
        fs::create_dir_all(manager.backup_dir()).unwrap();
        let path = manager.backup_dir().join(format!("backup-{}.zip", stamp));
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_create_backup() {
        let (manager, paths, _temp) = create_test_manager();

        let report = manager.create_backup().unwrap();
        assert!(report.archive_path.exists());
        assert!(report.archive_path.starts_with(paths.backup_dir()));
        assert!(report
            .archive_path
            .to_string_lossy()
            .ends_with(".zip"));
        assert_eq!(report.counts().database, 1);
    }

    #[test]
    fn test_sealed_backup_uses_rcpt_extension() {
        let (manager, _paths, _temp) = create_test_manager();
        let manager = manager.with_passphrase(Some(SecureString::new("hunter2")));

        let report = manager.create_backup().unwrap();
        assert!(report.sealed);
        assert_eq!(
            report.archive_path.extension().unwrap(),
            SEALED_EXTENSION
        );
        assert!(is_sealed(&report.archive_path).unwrap());

        let listed = manager.list_backups().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].sealed);
    }

    #[test]
    fn test_list_backups() {
        let (manager, _paths, _temp) = create_test_manager();

        manager.create_backup().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        manager.create_backup().unwrap();

        let backups = manager.list_backups().unwrap();
        assert_eq!(backups.len(), 2);

        // Should be sorted newest first
        assert!(backups[0].created_at >= backups[1].created_at);
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let (manager, _paths, _temp) = create_test_manager();
        fs::create_dir_all(manager.backup_dir()).unwrap();
        fs::write(manager.backup_dir().join("notes.txt"), b"").unwrap();
        fs::write(manager.backup_dir().join("backup-garbage.zip"), b"").unwrap();
        fake_backup(&manager, "20260310-101500-000");

        let backups = manager.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].filename, "backup-20260310-101500-000.zip");
    }

    #[test]
    fn test_retention_policy() {
        let (manager, _paths, _temp) = create_test_manager();

        for day in 2..=6 {
            fake_backup(&manager, &format!("202603{:02}-120000-000", day));
        }
        for month in 1..=3 {
            fake_backup(&manager, &format!("2026{:02}01-120000-000", month));
        }

        let deleted = manager.enforce_retention().unwrap();
        // 5 - 3 daily and 3 - 2 monthly
        assert_eq!(deleted.len(), 3);

        let remaining = manager.list_backups().unwrap();
        assert_eq!(remaining.len(), 5);
        assert_eq!(remaining.iter().filter(|b| b.is_monthly).count(), 2);
        assert!(!deleted
            .iter()
            .any(|p| p.to_string_lossy().contains("20260306")));
        assert!(deleted
            .iter()
            .any(|p| p.to_string_lossy().contains("20260101")));
    }

    #[test]
    fn test_get_latest_backup() {
        let (manager, _paths, _temp) = create_test_manager();

        // No backups yet
        assert!(manager.get_latest_backup().unwrap().is_none());

        let report = manager.create_backup().unwrap();

        let latest = manager.get_latest_backup().unwrap().unwrap();
        assert_eq!(latest.path, report.archive_path);

        let by_name = manager.get_backup(&latest.filename).unwrap().unwrap();
        assert_eq!(by_name.path, latest.path);
        assert!(manager.get_backup("backup-19990101-000000.zip").unwrap().is_none());
    }

    #[test]
    fn test_parse_backup_timestamp() {
        let timestamp = parse_backup_timestamp("20251127-143022").unwrap();
        assert_eq!(timestamp.year(), 2025);
        assert_eq!(timestamp.month(), 11);
        assert_eq!(timestamp.day(), 27);

        let timestamp = parse_backup_timestamp("20251127-143022-456").unwrap();
        assert_eq!(timestamp.timestamp_subsec_millis(), 456);

        assert!(parse_backup_timestamp("20251127").is_none());
        assert!(parse_backup_timestamp("20251327-143022").is_none());
    }

    #[test]
    fn test_empty_backup_dir() {
        let (manager, _paths, _temp) = create_test_manager();

        let backups = manager.list_backups().unwrap();
        assert!(backups.is_empty());
    }

    #[test]
    fn test_create_backup_with_retention() {
        let (manager, _paths, _temp) = create_test_manager();

        for day in 2..=6 {
            fake_backup(&manager, &format!("202001{:02}-120000-000", day));
        }

        let (report, deleted) = manager.create_backup_with_retention().unwrap();

        assert!(report.archive_path.exists());
        assert!(!deleted.is_empty());
        assert!(!deleted.contains(&report.archive_path));
    }
}
