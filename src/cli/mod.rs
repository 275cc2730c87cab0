//! Admin CLI over the storage core.

use crate::core::{read_history, BackupCoordinator, SortOrder};
use crate::db::scripts::{self, CURRENT_SCHEMA_VERSION};
use crate::db::{read_schema_version, Backend, DbFile, SchemaManager};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "roadlog")]
#[command(about = "Vehicle logbook storage administration")]
#[command(version)]
pub struct Cli {
    /// Path of the logbook database file.
    #[arg(long, global = true, default_value = "logbook.db")]
    pub db: PathBuf,

    /// Storage backend used to open the database.
    #[arg(long, global = true, value_enum, default_value = "native")]
    pub backend: BackendArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    /// Embedded SQLite library.
    Native,
    /// Generic SQL-client driver.
    Client,
}

impl From<BackendArg> for Backend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Native => Backend::Native,
            BackendArg::Client => Backend::Client,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new logbook database at the current schema version
    Init,

    /// Show the database file, schema version, and backup history
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upgrade the database to the current schema version
    Upgrade,

    /// Run the engine integrity check
    Check,

    /// Back up the database
    Backup {
        /// Destination directory (defaults to `backups` next to the database)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Restore the database from a backup file
    Restore {
        /// Backup file to restore
        file: PathBuf,
    },

    /// List backup files
    Backups {
        /// Directory to list (defaults to `backups` next to the database)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Regular expression filter on file names
        #[arg(long)]
        pattern: Option<String>,

        /// Sort ascending instead of the default order
        #[arg(long)]
        ascending: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Default backup directory: `backups` next to the database file.
fn default_backup_dir(db_path: &Path) -> PathBuf {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("backups"),
        _ => PathBuf::from("backups"),
    }
}

/// Run one parsed CLI invocation.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let db = DbFile::new(&cli.db, cli.backend.into());
    let scripts = scripts::bundled();
    let manager = SchemaManager::new(&scripts, CURRENT_SCHEMA_VERSION);
    let coordinator = BackupCoordinator::new(db.clone(), default_backup_dir(&cli.db));

    match cli.command {
        Commands::Init => {
            if db.exists() {
                bail!("database {} already exists", cli.db.display());
            }
            let mut adapter = manager.open_current(&db).context("creating database")?;
            adapter.close()?;
            println!(
                "Created {} at schema version {}",
                cli.db.display(),
                CURRENT_SCHEMA_VERSION
            );
        }

        Commands::Info { json } => {
            if !db.exists() {
                bail!("database {} does not exist", cli.db.display());
            }
            let version = read_schema_version(db.path()).context("reading schema version")?;
            let mut adapter = db.open()?;
            let history = if adapter.table_exists("app_info")? {
                Some(read_history(adapter.as_mut())?)
            } else {
                None
            };
            adapter.close()?;

            if json {
                let info = serde_json::json!({
                    "path": cli.db,
                    "backend": db.backend().as_str(),
                    "schema_version": version,
                    "current_version": CURRENT_SCHEMA_VERSION,
                    "backup_history": history,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Database:       {}", cli.db.display());
                println!("Backend:        {}", db.backend());
                println!(
                    "Schema version: {version} (current: {CURRENT_SCHEMA_VERSION})"
                );
                match history {
                    Some(history) => {
                        match history.this {
                            Some(record) => println!(
                                "Last backup:    {} ({})",
                                record.file, record.time
                            ),
                            None => println!("Last backup:    none"),
                        }
                        if let Some(record) = history.previous {
                            println!("Prev backup:    {} ({})", record.file, record.time);
                        }
                    }
                    None => println!("Last backup:    unknown (no app_info table)"),
                }
            }
        }

        Commands::Upgrade => {
            let before = read_schema_version(db.path()).unwrap_or(0);
            let mut adapter = manager.open_current(&db).context("upgrading database")?;
            adapter.close()?;
            if before == CURRENT_SCHEMA_VERSION {
                println!("Already at schema version {CURRENT_SCHEMA_VERSION}");
            } else {
                println!("Upgraded from version {before} to {CURRENT_SCHEMA_VERSION}");
            }
        }

        Commands::Check => {
            let mut adapter = db.open()?;
            let report = adapter.integrity_check();
            adapter.close()?;
            match report? {
                None => println!("ok"),
                Some(diagnostics) => bail!("integrity check failed:\n{diagnostics}"),
            }
        }

        Commands::Backup { dir } => {
            let path = match dir {
                Some(dir) => coordinator.backup_to(&dir),
                None => coordinator.backup(),
            }
            .context("backing up database")?;
            println!("Backed up to {}", path.display());
        }

        Commands::Restore { file } => {
            let version = read_schema_version(&file)
                .with_context(|| format!("{} is not a readable database", file.display()))?;
            if version > CURRENT_SCHEMA_VERSION {
                bail!(
                    "backup has schema version {version}, newer than the supported {CURRENT_SCHEMA_VERSION}"
                );
            }
            coordinator.restore(&file).context("restoring database")?;
            if version < CURRENT_SCHEMA_VERSION {
                let mut adapter = manager
                    .open_current(&db)
                    .context("upgrading restored database")?;
                adapter.close()?;
            }
            println!("Restored from {}", file.display());
        }

        Commands::Backups {
            dir,
            pattern,
            ascending,
            json,
        } => {
            let order = ascending.then_some(SortOrder::Ascending);
            let names = coordinator
                .list_backups(dir.as_deref(), pattern.as_deref(), order)
                .context("listing backups")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backup_dir_next_to_db() {
        assert_eq!(
            default_backup_dir(Path::new("/data/logbook.db")),
            PathBuf::from("/data/backups")
        );
        assert_eq!(
            default_backup_dir(Path::new("logbook.db")),
            PathBuf::from("backups")
        );
    }

    #[test]
    fn test_backend_arg_mapping() {
        assert_eq!(Backend::from(BackendArg::Native), Backend::Native);
        assert_eq!(Backend::from(BackendArg::Client), Backend::Client);
    }
}
