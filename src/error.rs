//! Custom error types for the Receipts backup system
//!
//! This module defines the error hierarchy for backup and restore operations
//! using thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::backup::StorageCategory;

/// Coarse classification of a [`ReceiptsError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    DestinationUnwritable,
    SourceUnreadable,
    ArchiveCorrupt,
    ManifestVersionMismatch,
    DatabaseEntryMissingOrInvalid,
    PartialCategoryFailure,
    Cancelled,
    Busy,
    Config,
    Io,
    Json,
    Encryption,
    NotFound,
}

/// The main error type for Receipts operations
#[derive(Error, Debug)]
pub enum ReceiptsError {
    /// The operating system refused access to a file or directory
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backup destination cannot be created or written
    #[error("Backup destination is not writable: {0}")]
    DestinationUnwritable(String),

    /// A source file or archive cannot be read
    #[error("Cannot read source: {0}")]
    SourceUnreadable(String),

    /// The archive is not a valid backup
    #[error("Backup archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    /// The manifest carries a format version this build does not understand
    #[error("Unsupported backup format version {found} (this version supports up to {supported})")]
    ManifestVersionMismatch { found: u32, supported: u32 },

    /// The archive has no usable database; the restore is aborted
    #[error("Backup database is missing or invalid: {0}")]
    DatabaseEntryMissingOrInvalid(String),

    /// Some entries of a category could not be restored
    #[error("{failed} {category} file(s) failed to restore ({restored} restored)")]
    PartialCategoryFailure {
        category: StorageCategory,
        failed: usize,
        restored: usize,
    },

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Another backup or restore is already running
    #[error("A backup or restore is already in progress")]
    Busy,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Encryption errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },
}

impl ReceiptsError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Classify an I/O error raised while reading a source file or archive
    pub fn source(context: impl std::fmt::Display, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{}: {}", context, err))
            }
            _ => Self::SourceUnreadable(format!("{}: {}", context, err)),
        }
    }

    /// Classify an I/O error raised while writing the backup destination
    pub fn destination(context: impl std::fmt::Display, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{}: {}", context, err))
            }
            _ => Self::DestinationUnwritable(format!("{}: {}", context, err)),
        }
    }

    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::DestinationUnwritable(_) => ErrorKind::DestinationUnwritable,
            Self::SourceUnreadable(_) => ErrorKind::SourceUnreadable,
            Self::ArchiveCorrupt(_) => ErrorKind::ArchiveCorrupt,
            Self::ManifestVersionMismatch { .. } => ErrorKind::ManifestVersionMismatch,
            Self::DatabaseEntryMissingOrInvalid(_) => ErrorKind::DatabaseEntryMissingOrInvalid,
            Self::PartialCategoryFailure { .. } => ErrorKind::PartialCategoryFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Busy => ErrorKind::Busy,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Encryption(_) => ErrorKind::Encryption,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error aborts the whole operation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PartialCategoryFailure { .. })
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for ReceiptsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ReceiptsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<zip::result::ZipError> for ReceiptsError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io.to_string()),
            other => Self::ArchiveCorrupt(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for ReceiptsError {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match err.io_error() {
            Some(io) => Self::source(path, io),
            None => Self::SourceUnreadable(err.to_string()),
        }
    }
}

/// Result type alias for Receipts operations
pub type ReceiptsResult<T> = Result<T, ReceiptsError>;
