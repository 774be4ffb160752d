//! Configuration module for Receipts
//!
//! This module provides configuration management including:
//! - Platform-aware path resolution
//! - User settings persistence
//! - Storage root overrides

pub mod paths;
pub mod settings;

pub use paths::ReceiptsPaths;
pub use settings::Settings;
