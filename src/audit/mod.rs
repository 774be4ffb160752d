//! Audit logging for Receipts
//!
//! Records every backup, restore, failure and prune in an append-only
//! audit log next to the settings file.
//!
//! # Architecture
//!
//! - `AuditEntry`: a single entry with timestamp, operation id, operation,
//!   archive path, per-category counts and an optional failure reason.
//! - `AuditLogger`: writes entries to the audit log file using a
//!   line-delimited JSON format (JSONL).
//!
//! # Example
//!
//! ```rust,ignore
//! use receipts::audit::{AuditEntry, AuditLogger};
//!
//! let logger = AuditLogger::new(paths.audit_log());
//! let report = manager.create_backup()?;
//! logger.log(&AuditEntry::backup_created(&report))?;
//! ```

mod entry;
mod logger;

pub use entry::{AuditEntry, Operation};
pub use logger::AuditLogger;
