//! Backup system for Receipts
//!
//! Packages the application's durable state into a single archive and
//! restores it again.
//!
//! # Architecture
//!
//! - `BackupPackager`: walks the storage roots, skips transient files and
//!   writes the archive with its manifest
//! - `RestoreUnpacker`: validates an archive and unpacks it, replacing the
//!   database as one unit
//! - `BackupManager`: dated backups in the backup directory with retention
//! - `BackupController`: runs either operation on a worker thread and tracks
//!   its state
//!
//! # Archive Format
//!
//! A ZIP file with a single top-level folder:
//!
//! ```text
//! ReceiptsBackup/
//!   database/...
//!   preferences/...
//!   images/...
//!   backup_info.txt
//! ```
//!
//! `backup_info.txt` holds `key: value` lines with the format version, the
//! creation time, the app version, per-category file counts and byte totals.
//! A sealed archive wraps the whole ZIP in AES-256-GCM under a passphrase.
//!
//! # Retention Policy
//!
//! By default, the system keeps:
//! - 30 daily backups
//! - 12 monthly backups (first backup of each month)
//!
//! # Example
//!
//! ```rust,ignore
//! use receipts::backup::{BackupManager, CancellationToken, NoProgress, RestoreHooks, RestoreUnpacker};
//! use receipts::config::{ReceiptsPaths, Settings};
//!
//! let paths = ReceiptsPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//!
//! let report = BackupManager::new(&paths, &settings).create_backup()?;
//!
//! // Later, restore from backup
//! let unpacker = RestoreUnpacker::new(settings.storage_roots(&paths), RestoreHooks::detached());
//! let result = unpacker.restore_backup(&report.archive_path, &NoProgress, &CancellationToken::new())?;
//! println!("{}", result.summary());
//! ```

mod category;
mod collaborators;
mod controller;
mod exclusion;
mod manager;
mod manifest;
mod packager;
mod progress;
mod restore;
mod sealed;

pub use category::{
    ArchiveEntry, EntryFailure, StorageCategory, StorageRoots, ARCHIVE_ROOT, MANIFEST_NAME,
};
pub use collaborators::{DatabaseLifecycle, Detached, ImageCache, PreferenceStore, RestoreHooks};
pub use controller::{BackupController, OperationKind, OperationState, Outcome};
pub use exclusion::{is_excluded_dir, is_excluded_file, FileExclusionRule};
pub use manager::{BackupInfo, BackupManager, ARCHIVE_EXTENSION, SEALED_EXTENSION};
pub use manifest::{BackupManifest, CategoryCounts, FORMAT_VERSION};
pub use packager::{BackupOptions, BackupPackager, BackupPlan, BackupReport};
pub use progress::{CancellationToken, NoProgress, ProgressObserver};
pub use restore::{BackupInspection, RestoreOptions, RestoreReport, RestoreUnpacker};
pub use sealed::{is_sealed, SEAL_MAGIC};
