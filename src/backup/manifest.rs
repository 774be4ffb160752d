//! The `backup_info.txt` manifest
//!
//! A manifest is a handful of `key: value` lines written as the last entry of
//! every archive. Unknown keys are ignored so newer writers can add fields
//! without breaking older readers of the same format version.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReceiptsError, ReceiptsResult};

use super::category::StorageCategory;

/// Current archive format version
pub const FORMAT_VERSION: u32 = 1;

const KEY_VERSION: &str = "format_version";
const KEY_CREATED_AT: &str = "created_at";
const KEY_APP_VERSION: &str = "app_version";
const KEY_DATABASE: &str = "database_files";
const KEY_PREFERENCES: &str = "preference_files";
const KEY_IMAGES: &str = "image_files";
const KEY_UNCOMPRESSED: &str = "total_uncompressed_bytes";
const KEY_COMPRESSED: &str = "total_compressed_bytes";

/// Number of files per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub database: usize,
    pub preferences: usize,
    pub images: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: StorageCategory) -> usize {
        match category {
            StorageCategory::Database => self.database,
            StorageCategory::Preferences => self.preferences,
            StorageCategory::Images => self.images,
            StorageCategory::Other => 0,
        }
    }

    /// Count one more file of `category`; `Other` is not tracked
    pub fn increment(&mut self, category: StorageCategory) {
        match category {
            StorageCategory::Database => self.database += 1,
            StorageCategory::Preferences => self.preferences += 1,
            StorageCategory::Images => self.images += 1,
            StorageCategory::Other => {}
        }
    }

    pub fn total(&self) -> usize {
        self.database + self.preferences + self.images
    }
}

/// Metadata describing one backup archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupManifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub counts: CategoryCounts,
    /// Sum of the original file sizes
    pub total_uncompressed_bytes: u64,
    /// Size of the archive body preceding the manifest entry
    pub total_compressed_bytes: u64,
}

impl BackupManifest {
    /// Create a manifest for the current format version
    pub fn new(
        created_at: DateTime<Utc>,
        counts: CategoryCounts,
        total_uncompressed_bytes: u64,
        total_compressed_bytes: u64,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            counts,
            total_uncompressed_bytes,
            total_compressed_bytes,
        }
    }

    /// Render as `key: value` lines
    pub fn to_text(&self) -> String {
        let lines = [
            (KEY_VERSION, self.format_version.to_string()),
            (
                KEY_CREATED_AT,
                self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            (KEY_APP_VERSION, self.app_version.clone()),
            (KEY_DATABASE, self.counts.database.to_string()),
            (KEY_PREFERENCES, self.counts.preferences.to_string()),
            (KEY_IMAGES, self.counts.images.to_string()),
            (KEY_UNCOMPRESSED, self.total_uncompressed_bytes.to_string()),
            (KEY_COMPRESSED, self.total_compressed_bytes.to_string()),
        ];

        let mut text = String::new();
        for (key, value) in lines {
            text.push_str(key);
            text.push_str(": ");
            text.push_str(&value);
            text.push('\n');
        }
        text
    }

    /// Parse manifest text
    ///
    /// The version is checked before anything else so a manifest from a newer
    /// format is reported as a version mismatch even if its other keys changed.
    pub fn parse(text: &str) -> ReceiptsResult<Self> {
        let fields: HashMap<&str, &str> = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        let format_version: u32 = parse_field(&fields, KEY_VERSION)?;
        if format_version == 0 || format_version > FORMAT_VERSION {
            return Err(ReceiptsError::ManifestVersionMismatch {
                found: format_version,
                supported: FORMAT_VERSION,
            });
        }

        let created_at = required(&fields, KEY_CREATED_AT)?;
        let created_at = DateTime::parse_from_rfc3339(created_at)
            .map_err(|e| {
                ReceiptsError::ArchiveCorrupt(format!("Invalid manifest {}: {}", KEY_CREATED_AT, e))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            format_version,
            created_at,
            app_version: fields
                .get(KEY_APP_VERSION)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            counts: CategoryCounts {
                database: parse_field(&fields, KEY_DATABASE)?,
                preferences: parse_field(&fields, KEY_PREFERENCES)?,
                images: parse_field(&fields, KEY_IMAGES)?,
            },
            total_uncompressed_bytes: parse_field(&fields, KEY_UNCOMPRESSED)?,
            total_compressed_bytes: parse_field(&fields, KEY_COMPRESSED)?,
        })
    }
}

fn required<'a>(fields: &HashMap<&str, &'a str>, key: &str) -> ReceiptsResult<&'a str> {
    fields
        .get(key)
        .copied()
        .ok_or_else(|| ReceiptsError::ArchiveCorrupt(format!("Manifest is missing '{}'", key)))
}

fn parse_field<T: std::str::FromStr>(fields: &HashMap<&str, &str>, key: &str) -> ReceiptsResult<T> {
    let value = required(fields, key)?;
    value.parse().map_err(|_| {
        ReceiptsError::ArchiveCorrupt(format!("Invalid manifest {}: '{}'", key, value))
    })
}
