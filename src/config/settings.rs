//! User settings for Receipts
//!
//! Manages backup preferences: retention policy, compression, encryption and
//! optional overrides for the storage roots.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::ReceiptsPaths;
use crate::backup::StorageRoots;
use crate::error::ReceiptsError;

/// Backup retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of daily backups to keep
    pub daily_count: u32,
    /// Number of monthly backups to keep
    pub monthly_count: u32,
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            daily_count: 30,
            monthly_count: 12,
        }
    }
}

/// Compression used for archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Deflate every entry (default)
    #[default]
    Deflated,
    /// Store entries uncompressed
    Stored,
}

/// Backup behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupSettings {
    /// Compression method for archive entries
    #[serde(default)]
    pub compression: Compression,

    /// Seal backups with a passphrase by default
    #[serde(default)]
    pub encrypt: bool,
}

/// Overrides for the directories that get backed up
///
/// Any root left unset falls back to the location under the data directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageRootOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<PathBuf>,
}

/// User settings for Receipts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Backup retention policy
    #[serde(default)]
    pub backup_retention: BackupRetention,

    /// Backup behaviour
    #[serde(default)]
    pub backup: BackupSettings,

    /// Storage root overrides
    #[serde(default)]
    pub storage_roots: StorageRootOverrides,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_retention: BackupRetention::default(),
            backup: BackupSettings::default(),
            storage_roots: StorageRootOverrides::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &ReceiptsPaths) -> Result<Self, ReceiptsError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                ReceiptsError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                ReceiptsError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &ReceiptsPaths) -> Result<(), ReceiptsError> {
        std::fs::create_dir_all(paths.base_dir())
            .map_err(|e| ReceiptsError::Io(format!("Failed to create base directory: {}", e)))?;

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            ReceiptsError::Config(format!("Failed to serialize settings: {}", e))
        })?;

        std::fs::write(paths.settings_file(), contents).map_err(|e| {
            ReceiptsError::Io(format!("Failed to write settings file: {}", e))
        })?;

        Ok(())
    }

    /// Resolve the storage roots, applying any overrides
    pub fn storage_roots(&self, paths: &ReceiptsPaths) -> StorageRoots {
        let overrides = &self.storage_roots;
        StorageRoots::new(
            overrides
                .database
                .clone()
                .unwrap_or_else(|| paths.database_dir()),
            overrides
                .preferences
                .clone()
                .unwrap_or_else(|| paths.preferences_dir()),
            overrides.images.clone().unwrap_or_else(|| paths.images_dir()),
        )
    }
}
