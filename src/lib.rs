//! receipts - backup and restore for an expense tracker
//!
//! This library packages the application's durable state (the embedded
//! database, preference files and receipt images) into one archive and
//! restores it again, replacing the database as a single unit.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `backup`: Packaging, restore, retention and the background controller
//! - `crypto`: Passphrase sealing for archives
//! - `audit`: Audit log of backup activity
//! - `cli`: Command handlers for the `receipts` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use receipts::backup::BackupManager;
//! use receipts::config::{paths::ReceiptsPaths, settings::Settings};
//!
//! let paths = ReceiptsPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let report = BackupManager::new(&paths, &settings).create_backup()?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;

pub use error::{ReceiptsError, ReceiptsResult};
