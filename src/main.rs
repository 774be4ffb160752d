use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use receipts::audit::AuditLogger;
use receipts::cli::{handle_backup_command, BackupCommands};
use receipts::config::{paths::ReceiptsPaths, settings::Settings};

/// Environment variable holding the log filter
const LOG_ENV: &str = "RECEIPTS_LOG";

#[derive(Parser)]
#[command(
    name = "receipts",
    version,
    about = "Backup and restore for the receipts expense tracker",
    long_about = "Packages the expense database, preferences and receipt images \
                  into a single archive and restores them again."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Show recent backup and restore activity
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Create the data directories and default settings
    Init,

    /// Show current configuration and paths
    Config,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let paths = ReceiptsPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&paths, &settings, cmd)?;
        }
        Some(Commands::History { limit }) => {
            let entries = AuditLogger::new(paths.audit_log()).read_recent(limit)?;
            if entries.is_empty() {
                println!("No backup activity recorded yet.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
        Some(Commands::Init) => {
            println!("Initializing receipts at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Run 'receipts backup create' to take the first backup.");
        }
        Some(Commands::Config) => {
            let roots = settings.storage_roots(&paths);
            println!("Receipts Configuration");
            println!("======================");
            println!("Base directory:        {}", paths.base_dir().display());
            println!("Database directory:    {}", roots.database.display());
            println!("Preferences directory: {}", roots.preferences.display());
            println!("Images directory:      {}", roots.images.display());
            println!("Backup directory:      {}", paths.backup_dir().display());
            println!();
            println!("Settings:");
            println!(
                "  Retention: {} daily, {} monthly",
                settings.backup_retention.daily_count, settings.backup_retention.monthly_count
            );
            println!("  Compression: {:?}", settings.backup.compression);
            println!("  Encrypt backups: {}", settings.backup.encrypt);
        }
        None => {
            println!("receipts - backup and restore for your expense data");
            println!();
            println!("Run 'receipts --help' for usage information.");
        }
    }

    Ok(())
}
