//! File exclusion rules
//!
//! Transient files (temp files, journals, caches, hidden files) never make it
//! into a backup. Rules are matched against names exactly and case-sensitively.

use std::ffi::OsStr;

/// File name suffixes that mark transient files
const EXCLUDED_SUFFIXES: [&str; 6] = [".tmp", ".temp", ".bak", "-journal", ".log", ".old"];

/// Marker left in the name of half-written backups
const TEMP_BACKUP_MARKER: &str = "temp_backup_";

/// Directory names whose whole subtree is skipped
const EXCLUDED_DIRS: [&str; 4] = ["cache", "tmp", "temp", "thumbnails"];

/// Substring that marks a cache directory
const CACHED_MARKER: &str = "cached";

/// A single naming rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileExclusionRule {
    /// Name starts with `.`
    Hidden,
    /// Name ends with a transient suffix such as `.tmp` or `-journal`
    TransientSuffix(&'static str),
    /// Name contains `temp_backup_`
    TempBackup,
    /// Directory is a cache/temp directory
    CacheDirectory,
}

impl FileExclusionRule {
    /// First rule that excludes a file with this name
    pub fn for_file(name: &str) -> Option<FileExclusionRule> {
        if name.starts_with('.') {
            return Some(FileExclusionRule::Hidden);
        }
        if let Some(suffix) = EXCLUDED_SUFFIXES.iter().copied().find(|s| name.ends_with(s)) {
            return Some(FileExclusionRule::TransientSuffix(suffix));
        }
        if name.contains(TEMP_BACKUP_MARKER) {
            return Some(FileExclusionRule::TempBackup);
        }
        None
    }

    /// First rule that excludes a directory with this name
    pub fn for_dir(name: &str) -> Option<FileExclusionRule> {
        if name.starts_with('.') {
            return Some(FileExclusionRule::Hidden);
        }
        if EXCLUDED_DIRS.iter().any(|d| *d == name) || name.contains(CACHED_MARKER) {
            return Some(FileExclusionRule::CacheDirectory);
        }
        None
    }
}

/// Whether a file with this name is skipped
pub fn is_excluded_file(name: &OsStr) -> bool {
    FileExclusionRule::for_file(&name.to_string_lossy()).is_some()
}

/// Whether a directory with this name is skipped along with its contents
pub fn is_excluded_dir(name: &OsStr) -> bool {
    FileExclusionRule::for_dir(&name.to_string_lossy()).is_some()
}
