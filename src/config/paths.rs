//! Path management for Receipts
//!
//! Provides platform-aware path resolution for configuration, the three
//! storage roots that get backed up, and the backup directory.
//!
//! ## Path Resolution Order
//!
//! 1. `RECEIPTS_CLI_DATA_DIR` environment variable (if set)
//! 2. The platform config directory from `directories`
//!    (`~/.config/receipts-cli` on Linux, `%APPDATA%\receipts-cli` on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::ReceiptsError;

/// Environment variable that overrides the base directory
pub const DATA_DIR_ENV: &str = "RECEIPTS_CLI_DATA_DIR";

/// Manages all paths used by Receipts
#[derive(Debug, Clone)]
pub struct ReceiptsPaths {
    /// Base directory for all Receipts data
    base_dir: PathBuf,
}

impl ReceiptsPaths {
    /// Create a new ReceiptsPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, ReceiptsError> {
        let base_dir = if let Ok(custom) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create ReceiptsPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory holding the storage roots
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Database directory (`data/db`)
    pub fn database_dir(&self) -> PathBuf {
        self.data_dir().join("db")
    }

    /// Preferences directory (`data/prefs`)
    pub fn preferences_dir(&self) -> PathBuf {
        self.data_dir().join("prefs")
    }

    /// Receipt image root (`data/images`), one subdirectory per folder
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir().join("images")
    }

    /// Get the backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), ReceiptsError> {
        let dirs = [
            ("base", self.base_dir.clone()),
            ("database", self.database_dir()),
            ("preferences", self.preferences_dir()),
            ("images", self.images_dir()),
            ("backup", self.backup_dir()),
        ];

        for (label, dir) in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| {
                ReceiptsError::Io(format!("Failed to create {} directory: {}", label, e))
            })?;
        }

        Ok(())
    }

    /// Check if Receipts has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// Resolve the default base directory for this platform
fn resolve_default_path() -> Result<PathBuf, ReceiptsError> {
    ProjectDirs::from("", "", "receipts-cli")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| ReceiptsError::Config("Could not determine home directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ReceiptsPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.database_dir(), temp_dir.path().join("data").join("db"));
        assert_eq!(paths.images_dir(), temp_dir.path().join("data").join("images"));
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
    }

    #[test]
    fn test_env_var_override() {
        let temp_dir = TempDir::new().unwrap();
        let custom_path = temp_dir.path().to_str().unwrap();

        std::env::set_var(DATA_DIR_ENV, custom_path);
        let paths = ReceiptsPaths::new().unwrap();
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(paths.base_dir(), temp_dir.path());
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ReceiptsPaths::with_base_dir(temp_dir.path().to_path_buf());

        paths.ensure_directories().unwrap();

        assert!(paths.database_dir().exists());
        assert!(paths.preferences_dir().exists());
        assert!(paths.images_dir().exists());
        assert!(paths.backup_dir().exists());
    }

    #[test]
    fn test_file_paths() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ReceiptsPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(paths.audit_log(), temp_dir.path().join("audit.log"));
    }
}
