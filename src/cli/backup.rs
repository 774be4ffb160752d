//! Backup CLI commands
//!
//! Implements CLI commands for creating, listing, inspecting, restoring and
//! pruning backups.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::audit::{AuditEntry, AuditLogger};
use crate::backup::{
    is_sealed, BackupInfo, BackupManager, CancellationToken, NoProgress, RestoreHooks,
    RestoreUnpacker, ARCHIVE_EXTENSION, SEALED_EXTENSION,
};
use crate::config::paths::ReceiptsPaths;
use crate::config::settings::{Compression, Settings};
use crate::crypto::SecureString;
use crate::error::{ReceiptsError, ReceiptsResult};

/// Environment variable holding the backup passphrase
pub const PASSPHRASE_ENV: &str = "RECEIPTS_BACKUP_PASSPHRASE";

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Write the archive here instead of the backup directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seal the archive with a passphrase
        #[arg(short, long)]
        encrypt: bool,

        /// Store entries without compression
        #[arg(long)]
        stored: bool,
    },

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Restore from a backup
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup filename or path
        backup: String,
    },

    /// Delete old backups according to retention policy
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "File")]
    filename: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

impl BackupRow {
    fn new(index: usize, backup: &BackupInfo) -> Self {
        let age = chrono::Utc::now().signed_duration_since(backup.created_at);
        let mut kind = Vec::new();
        if backup.is_monthly {
            kind.push("monthly");
        }
        if backup.sealed {
            kind.push("sealed");
        }
        Self {
            index,
            filename: backup.filename.clone(),
            age: format_duration(age),
            size: format_size(backup.size_bytes),
            kind: kind.join(", "),
        }
    }
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &ReceiptsPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> ReceiptsResult<()> {
    let audit = AuditLogger::new(paths.audit_log());

    match cmd {
        BackupCommands::Create {
            output,
            encrypt,
            stored,
        } => {
            let mut settings = settings.clone();
            if stored {
                settings.backup.compression = Compression::Stored;
            }
            let passphrase = if encrypt || settings.backup.encrypt {
                Some(read_passphrase(true)?)
            } else {
                None
            };
            let manager = BackupManager::new(paths, &settings).with_passphrase(passphrase);

            println!("Creating backup...");
            let result = match &output {
                Some(destination) => manager.packager().create_backup(
                    destination,
                    &NoProgress,
                    &CancellationToken::new(),
                ),
                None => manager.create_backup(),
            };
            let report = match result {
                Ok(report) => report,
                Err(err) => {
                    audit.log_or_warn(&AuditEntry::backup_failed(output.as_deref(), &err));
                    return Err(err);
                }
            };
            audit.log_or_warn(&AuditEntry::backup_created(&report));

            let filename = report
                .archive_path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| report.archive_path.display().to_string());
            println!("Backup created: {}", filename);
            println!("Location: {}", report.archive_path.display());
            println!("Size: {}", format_size(report.archive_size));
            println!("{}", report.summary());
            for failure in &report.failures {
                println!("  Skipped {}: {}", failure.path, failure.reason);
            }
        }

        BackupCommands::List { verbose } => {
            let manager = BackupManager::new(paths, settings);
            let backups = manager.list_backups()?;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: receipts backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            if verbose {
                for (i, backup) in backups.iter().enumerate() {
                    let age = chrono::Utc::now().signed_duration_since(backup.created_at);
                    println!(
                        "{}. {}{}{}\n   Created: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        backup.filename,
                        if backup.is_monthly { " [monthly]" } else { "" },
                        if backup.sealed { " [sealed]" } else { "" },
                        backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        format_size(backup.size_bytes),
                        format_duration(age),
                    );
                }
            } else {
                let rows: Vec<BackupRow> = backups
                    .iter()
                    .enumerate()
                    .map(|(i, backup)| BackupRow::new(i + 1, backup))
                    .collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Restore { backup, force } => {
            let manager = BackupManager::new(paths, settings);
            let backup_path = resolve_backup_path(&manager, &backup)?;
            let restore_passphrase = passphrase_for(&backup_path)?;
            let unpacker = RestoreUnpacker::new(settings.storage_roots(paths), RestoreHooks::detached())
                .with_passphrase(restore_passphrase.clone());

            let inspection = match unpacker.inspect_backup(&backup_path) {
                Ok(inspection) => inspection,
                Err(err) => {
                    audit.log_or_warn(&AuditEntry::restore_failed(&backup_path, &err));
                    return Err(err);
                }
            };

            println!("Backup Information");
            println!("==================");
            println!("File: {}", backup_path.display());
            println!(
                "Created: {}",
                inspection.manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Format version: {}", inspection.manifest.format_version);
            println!("Contents: {}", inspection.summary());
            println!();

            if !force {
                println!("WARNING: This will overwrite ALL current data!");
                println!("To proceed, run again with --force flag:");
                println!("  receipts backup restore {} --force", backup);
                return Ok(());
            }

            // The safety copy is sealed like every other backup when encryption is on
            let safety_passphrase = match restore_passphrase {
                Some(passphrase) if settings.backup.encrypt => Some(passphrase),
                _ if settings.backup.encrypt => Some(read_passphrase(true)?),
                _ => None,
            };
            println!("Creating backup of current data before restore...");
            let pre_restore = manager.with_passphrase(safety_passphrase).create_backup()?;
            audit.log_or_warn(&AuditEntry::backup_created(&pre_restore));
            println!(
                "Pre-restore backup saved: {}",
                pre_restore.archive_path.display()
            );
            println!();

            println!("Restoring from backup...");
            let report = match unpacker.restore_backup(
                &backup_path,
                &NoProgress,
                &CancellationToken::new(),
            ) {
                Ok(report) => report,
                Err(err) => {
                    audit.log_or_warn(&AuditEntry::restore_failed(&backup_path, &err));
                    return Err(err);
                }
            };
            audit.log_or_warn(&AuditEntry::backup_restored(&report));

            println!("Restore complete!");
            println!("{}", report.summary());
            for partial in report.partial_failures() {
                println!("  {}", partial);
            }
            for failure in &report.failures {
                println!("  {}: {}", failure.path, failure.reason);
            }
            for warning in &report.warnings {
                println!("  Warning: {}", warning);
            }

            if report.is_complete() {
                println!("\nAll data has been restored successfully.");
            }
        }

        BackupCommands::Info { backup } => {
            let manager = BackupManager::new(paths, settings);
            let backup_path = resolve_backup_path(&manager, &backup)?;
            let unpacker = RestoreUnpacker::new(settings.storage_roots(paths), RestoreHooks::detached())
                .with_passphrase(passphrase_for(&backup_path)?);
            let inspection = unpacker.inspect_backup(&backup_path)?;
            let manifest = &inspection.manifest;

            println!("Backup Details");
            println!("==============");
            println!("File: {}", backup_path.display());
            println!("Size: {}", format_size(inspection.archive_size));
            println!("Sealed: {}", if inspection.sealed { "Yes" } else { "No" });
            println!(
                "Created: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Format version: {}", manifest.format_version);
            println!("App version: {}", manifest.app_version);
            println!();
            println!("Contents:");
            println!("  Database files:   {}", inspection.entries.database);
            println!("  Preference files: {}", inspection.entries.preferences);
            println!("  Image files:      {}", inspection.entries.images);
            println!(
                "  Uncompressed:     {}",
                format_size(manifest.total_uncompressed_bytes)
            );
            if !inspection.other_entries.is_empty() {
                println!("  Ignored entries:  {}", inspection.other_entries.len());
            }
            println!();
            println!(
                "Status: {}",
                if !inspection.has_database() {
                    "Unusable (no database)"
                } else if inspection.counts_match() {
                    "Complete"
                } else {
                    "Incomplete (does not match manifest)"
                }
            );
        }

        BackupCommands::Prune { force } => {
            let manager = BackupManager::new(paths, settings);
            let backups = manager.list_backups()?;
            let retention = &settings.backup_retention;

            let (monthly, daily): (Vec<_>, Vec<_>) = backups.iter().partition(|b| b.is_monthly);

            let daily_to_delete = daily.len().saturating_sub(retention.daily_count as usize);
            let monthly_to_delete = monthly
                .len()
                .saturating_sub(retention.monthly_count as usize);
            let total_to_delete = daily_to_delete + monthly_to_delete;

            if total_to_delete == 0 {
                println!("No backups to prune.");
                println!(
                    "Current retention policy: {} daily, {} monthly",
                    retention.daily_count, retention.monthly_count
                );
                println!(
                    "You have {} daily and {} monthly backups.",
                    daily.len(),
                    monthly.len()
                );
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!(
                "Retention policy: {} daily, {} monthly",
                retention.daily_count, retention.monthly_count
            );
            println!(
                "Current backups: {} daily, {} monthly",
                daily.len(),
                monthly.len()
            );
            println!(
                "To be deleted: {} daily, {} monthly ({} total)",
                daily_to_delete, monthly_to_delete, total_to_delete
            );
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  receipts backup prune --force");
                return Ok(());
            }

            let deleted = manager.enforce_retention()?;
            audit.log_or_warn(&AuditEntry::backups_pruned(&deleted));
            println!("Deleted {} backup(s).", deleted.len());
        }
    }

    Ok(())
}

/// Resolve a backup identifier to a full path
fn resolve_backup_path(manager: &BackupManager, backup: &str) -> ReceiptsResult<PathBuf> {
    if backup.eq_ignore_ascii_case("latest") {
        return manager
            .get_latest_backup()?
            .map(|b| b.path)
            .ok_or_else(|| ReceiptsError::backup_not_found("latest"));
    }

    let path = PathBuf::from(backup);
    if path.is_file() {
        return Ok(path);
    }

    let backup_path = manager.backup_dir().join(backup);
    if backup_path.is_file() {
        return Ok(backup_path);
    }

    for ext in [ARCHIVE_EXTENSION, SEALED_EXTENSION] {
        let with_ext = manager.backup_dir().join(format!("{}.{}", backup, ext));
        if with_ext.is_file() {
            return Ok(with_ext);
        }
    }

    Err(ReceiptsError::backup_not_found(backup))
}

/// Passphrase needed to open `archive`, if it is sealed
fn passphrase_for(archive: &Path) -> ReceiptsResult<Option<SecureString>> {
    if is_sealed(archive)? {
        Ok(Some(read_passphrase(false)?))
    } else {
        Ok(None)
    }
}

/// Read the passphrase from the environment, or prompt for it
fn read_passphrase(confirm: bool) -> ReceiptsResult<SecureString> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        if !value.is_empty() {
            return Ok(SecureString::new(value));
        }
    }

    loop {
        let first = prompt_passphrase("Backup passphrase: ")?;
        if first.is_empty() {
            println!("Passphrase must not be empty. Please try again.");
            continue;
        }
        if !confirm {
            return Ok(first);
        }

        let second = prompt_passphrase("Confirm passphrase: ")?;
        if first.as_str() != second.as_str() {
            println!("Passphrases do not match. Please try again.");
            continue;
        }
        return Ok(first);
    }
}

/// Prompt for a passphrase (hidden input)
fn prompt_passphrase(prompt: &str) -> ReceiptsResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::new)
        .map_err(|e| ReceiptsError::Encryption(format!("Failed to read passphrase: {}", e)))
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(30)), "30s");
        assert_eq!(format_duration(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_duration(chrono::Duration::hours(3)), "3h");
        assert_eq!(format_duration(chrono::Duration::days(2)), "2d");
        assert_eq!(format_duration(chrono::Duration::days(65)), "2mo");
    }
}
