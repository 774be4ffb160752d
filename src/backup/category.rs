//! Storage categories and the archive layout
//!
//! Every archived file belongs to exactly one category, which decides the
//! folder it lands in under [`ARCHIVE_ROOT`].

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level folder inside every backup archive
pub const ARCHIVE_ROOT: &str = "ReceiptsBackup";

/// Name of the manifest entry directly under [`ARCHIVE_ROOT`]
pub const MANIFEST_NAME: &str = "backup_info.txt";

/// Category of a backed-up file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageCategory {
    /// Embedded database files
    Database,
    /// Preference files
    Preferences,
    /// Receipt images
    Images,
    /// Anything in an archive that is not under a known category folder
    Other,
}

impl StorageCategory {
    /// Categories that are packaged and restored, in restore order
    pub const RESTORABLE: [StorageCategory; 3] = [
        StorageCategory::Database,
        StorageCategory::Preferences,
        StorageCategory::Images,
    ];

    /// Folder name inside the archive root
    pub fn archive_dir(&self) -> Option<&'static str> {
        match self {
            StorageCategory::Database => Some("database"),
            StorageCategory::Preferences => Some("preferences"),
            StorageCategory::Images => Some("images"),
            StorageCategory::Other => None,
        }
    }

    /// Map an archive folder name back to its category
    pub fn from_archive_dir(dir: &str) -> StorageCategory {
        match dir {
            "database" => StorageCategory::Database,
            "preferences" => StorageCategory::Preferences,
            "images" => StorageCategory::Images,
            _ => StorageCategory::Other,
        }
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageCategory::Database => write!(f, "database"),
            StorageCategory::Preferences => write!(f, "preferences"),
            StorageCategory::Images => write!(f, "images"),
            StorageCategory::Other => write!(f, "other"),
        }
    }
}

/// The three directories that make up the application's durable state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    pub database: PathBuf,
    pub preferences: PathBuf,
    pub images: PathBuf,
}

impl StorageRoots {
    pub fn new(database: PathBuf, preferences: PathBuf, images: PathBuf) -> Self {
        Self {
            database,
            preferences,
            images,
        }
    }

    /// Directory holding files of the given category
    pub fn root_for(&self, category: StorageCategory) -> Option<&Path> {
        match category {
            StorageCategory::Database => Some(&self.database),
            StorageCategory::Preferences => Some(&self.preferences),
            StorageCategory::Images => Some(&self.images),
            StorageCategory::Other => None,
        }
    }

    /// Roots paired with their category, in packaging order
    pub fn iter(&self) -> impl Iterator<Item = (StorageCategory, &Path)> {
        StorageCategory::RESTORABLE
            .into_iter()
            .filter_map(move |category| self.root_for(category).map(|root| (category, root)))
    }
}

/// A file scheduled for packaging
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Absolute path of the source file
    pub source_path: PathBuf,
    /// Name of the entry inside the archive
    pub archive_path: String,
    pub category: StorageCategory,
    pub size_bytes: u64,
}

impl ArchiveEntry {
    /// Build an entry for `source_path`, which lives at `relative` below its root
    pub fn new(
        source_path: PathBuf,
        relative: &Path,
        category: StorageCategory,
        size_bytes: u64,
    ) -> Option<Self> {
        let dir = category.archive_dir()?;
        let relative = to_archive_path(relative)?;
        Some(Self {
            source_path,
            archive_path: format!("{}/{}/{}", ARCHIVE_ROOT, dir, relative),
            category,
            size_bytes,
        })
    }
}

/// A single file that could not be packaged or restored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    /// Source path when packaging, archive entry name when restoring
    pub path: String,
    pub category: StorageCategory,
    pub reason: String,
}

impl EntryFailure {
    pub fn new(
        path: impl Into<String>,
        category: StorageCategory,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            category,
            reason: reason.into(),
        }
    }
}

/// Archive name of the manifest
pub fn manifest_path() -> String {
    format!("{}/{}", ARCHIVE_ROOT, MANIFEST_NAME)
}

/// Join the normal components of a relative path with forward slashes
///
/// Returns `None` for paths that are absolute, empty or climb out with `..`.
pub fn to_archive_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Split an archive entry name into its category and the path below it
///
/// `ReceiptsBackup/images/default/a.jpg` becomes `(Images, "default/a.jpg")`.
/// Entries outside the archive root or a category folder map to `Other`.
pub fn classify_archive_path(name: &Path) -> (StorageCategory, Option<PathBuf>) {
    let mut components = name.components();
    let in_root = matches!(
        components.next(),
        Some(Component::Normal(first)) if first == ARCHIVE_ROOT
    );
    if !in_root {
        return (StorageCategory::Other, None);
    }

    let category = match components.next() {
        Some(Component::Normal(dir)) => {
            StorageCategory::from_archive_dir(&dir.to_string_lossy())
        }
        _ => StorageCategory::Other,
    };

    let mut rest = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => rest.push(part),
            Component::CurDir => {}
            _ => return (StorageCategory::Other, None),
        }
    }
    if category == StorageCategory::Other || rest.as_os_str().is_empty() {
        return (StorageCategory::Other, None);
    }
    (category, Some(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_archive_path_preserves_subfolders() {
        let entry = ArchiveEntry::new(
            PathBuf::from("/data/images/default/a.jpg"),
            Path::new("default/a.jpg"),
            StorageCategory::Images,
            10,
        )
        .unwrap();
        assert_eq!(entry.archive_path, "ReceiptsBackup/images/default/a.jpg");
    }

    #[test]
    fn test_other_category_has_no_folder() {
        assert!(ArchiveEntry::new(
            PathBuf::from("/x"),
            Path::new("x"),
            StorageCategory::Other,
            0
        )
        .is_none());
    }

    #[test]
    fn test_to_archive_path_rejects_parent_dirs() {
        assert_eq!(to_archive_path(Path::new("a/./b.jpg")), Some("a/b.jpg".to_string()));
        assert_eq!(to_archive_path(Path::new("../evil")), None);
        assert_eq!(to_archive_path(Path::new("")), None);
    }

    #[test]
    fn test_classify_archive_path() {
        let (category, rest) =
            classify_archive_path(Path::new("ReceiptsBackup/images/default/a.jpg"));
        assert_eq!(category, StorageCategory::Images);
        assert_eq!(rest, Some(PathBuf::from("default/a.jpg")));

        let (category, rest) = classify_archive_path(Path::new("ReceiptsBackup/backup_info.txt"));
        assert_eq!(category, StorageCategory::Other);
        assert!(rest.is_none());

        let (category, _) = classify_archive_path(Path::new("elsewhere/database/app.db"));
        assert_eq!(category, StorageCategory::Other);

        let (category, _) = classify_archive_path(Path::new("ReceiptsBackup/database"));
        assert_eq!(category, StorageCategory::Other);

        let (category, rest) =
            classify_archive_path(Path::new("ReceiptsBackup/images/../../outside.jpg"));
        assert_eq!(category, StorageCategory::Other);
        assert!(rest.is_none());
    }

    #[test]
    fn test_roots_iterate_in_restore_order() {
        let roots = StorageRoots::new("db".into(), "prefs".into(), "images".into());
        let order: Vec<_> = roots.iter().map(|(c, _)| c).collect();
        assert_eq!(order, StorageCategory::RESTORABLE.to_vec());
    }
}
