//! Audit entry data structures
//!
//! Defines the operations that are recorded and the entry format itself.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backup::{BackupReport, CategoryCounts, RestoreReport};
use crate::error::ReceiptsError;

/// Types of operations that are audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    BackupCreated,
    BackupFailed,
    BackupRestored,
    RestoreFailed,
    BackupsPruned,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::BackupCreated => write!(f, "BACKUP"),
            Operation::BackupFailed => write!(f, "BACKUP FAILED"),
            Operation::BackupRestored => write!(f, "RESTORE"),
            Operation::RestoreFailed => write!(f, "RESTORE FAILED"),
            Operation::BackupsPruned => write!(f, "PRUNE"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation finished (UTC)
    pub timestamp: DateTime<Utc>,

    /// Unique id of this operation
    pub operation_id: Uuid,

    pub operation: Operation,

    /// Archive written, read or attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,

    /// Files per category written to or restored from the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<CategoryCounts>,

    /// Number of files that were skipped or failed
    #[serde(default)]
    pub failures: usize,

    /// Error message for failed operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Archives deleted by a prune
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<PathBuf>,
}

impl AuditEntry {
    fn new(operation: Operation) -> Self {
        Self {
            timestamp: Utc::now(),
            operation_id: Uuid::new_v4(),
            operation,
            archive: None,
            counts: None,
            failures: 0,
            reason: None,
            removed: Vec::new(),
        }
    }

    /// Entry for a finished backup
    pub fn backup_created(report: &BackupReport) -> Self {
        Self {
            archive: Some(report.archive_path.clone()),
            counts: Some(report.counts()),
            failures: report.failures.len(),
            ..Self::new(Operation::BackupCreated)
        }
    }

    /// Entry for a backup that did not produce an archive
    pub fn backup_failed(destination: Option<&Path>, error: &ReceiptsError) -> Self {
        Self {
            archive: destination.map(Path::to_path_buf),
            reason: Some(error.to_string()),
            ..Self::new(Operation::BackupFailed)
        }
    }

    /// Entry for a restore that replaced the database
    pub fn backup_restored(report: &RestoreReport) -> Self {
        Self {
            archive: Some(report.archive_path.clone()),
            counts: Some(report.restored),
            failures: report.failures.len(),
            reason: report
                .cancelled
                .then(|| "cancelled before completion".to_string()),
            ..Self::new(Operation::BackupRestored)
        }
    }

    /// Entry for a restore that left the existing data in place
    pub fn restore_failed(archive: &Path, error: &ReceiptsError) -> Self {
        Self {
            archive: Some(archive.to_path_buf()),
            reason: Some(error.to_string()),
            ..Self::new(Operation::RestoreFailed)
        }
    }

    /// Entry for old backups removed by the retention policy
    pub fn backups_pruned(removed: &[PathBuf]) -> Self {
        Self {
            removed: removed.to_vec(),
            ..Self::new(Operation::BackupsPruned)
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation
        );

        if let Some(archive) = &self.archive {
            output.push_str(&format!(" {}", archive.display()));
        }

        if let Some(counts) = &self.counts {
            output.push_str(&format!(
                " ({} database, {} preference, {} image)",
                counts.database, counts.preferences, counts.images
            ));
        }

        if !self.removed.is_empty() {
            output.push_str(&format!(" {} backup(s)", self.removed.len()));
        }

        if self.failures > 0 {
            output.push_str(&format!("\n  Failed files: {}", self.failures));
        }

        if let Some(reason) = &self.reason {
            output.push_str(&format!("\n  Reason: {}", reason));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::BackupCreated.to_string(), "BACKUP");
        assert_eq!(Operation::RestoreFailed.to_string(), "RESTORE FAILED");
        assert_eq!(Operation::BackupsPruned.to_string(), "PRUNE");
    }

    #[test]
    fn test_failed_entry() {
        let entry = AuditEntry::restore_failed(
            Path::new("/backups/backup.zip"),
            &ReceiptsError::ManifestVersionMismatch {
                found: 9,
                supported: 1,
            },
        );

        assert_eq!(entry.operation, Operation::RestoreFailed);
        assert!(entry.counts.is_none());
        assert!(entry.reason.as_deref().unwrap().contains("version 9"));
    }

    #[test]
    fn test_operation_ids_are_unique() {
        let a = AuditEntry::backups_pruned(&[]);
        let b = AuditEntry::backups_pruned(&[]);
        assert_ne!(a.operation_id, b.operation_id);
    }

    #[test]
    fn test_serialization() {
        let entry = AuditEntry::backups_pruned(&[PathBuf::from("/b/backup-20260101-000000-000.zip")]);

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"operation\":\"backups_pruned\""));
        assert!(!json.contains("\"reason\""));

        let deserialized: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.operation, Operation::BackupsPruned);
        assert_eq!(deserialized.removed.len(), 1);
        assert_eq!(deserialized.operation_id, entry.operation_id);
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::backup_failed(
            Some(Path::new("/backups/backup.zip")),
            &ReceiptsError::DestinationUnwritable("disk full".into()),
        );

        let formatted = entry.format_human_readable();
        assert!(formatted.contains("BACKUP FAILED"));
        assert!(formatted.contains("/backups/backup.zip"));
        assert!(formatted.contains("disk full"));
    }
}
