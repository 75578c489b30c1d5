use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use log::{debug, info};

use crate::column_drop::{drop_columns, DropOutcome, DropRequest};
use crate::config::Config;
use crate::database::Database;
use crate::error::MigrateError;
use crate::presets;
use crate::report;
use crate::row_move::{move_rows, MoveRequest, RowFilter};
use crate::schema::IndexSpec;

#[derive(Parser, Debug)]
#[command(
    name = "ewcs-migrate",
    version,
    about = "One-shot schema and data migrations for the EWCS station database"
)]
pub struct Cli {
    /// Database file (default: database.path from the config, "data/ewcs.db")
    #[arg(long = "db", short = 'd', global = true)]
    pub db: Option<PathBuf>,

    /// Configuration file
    #[arg(long = "config", global = true, default_value = Config::FILE_NAME)]
    pub config: PathBuf,

    /// Do not ask for confirmation
    #[arg(long = "yes", short = 'y', global = true, default_value_t = false)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove the cs125_current column from ewcs_data
    #[command(name = "drop-cs125-current")]
    DropCs125Current,

    /// Remove the power_save_mode column from ewcs_data (run after drop-cs125-current)
    #[command(name = "drop-power-save-mode")]
    DropPowerSaveMode,

    /// Move FITS images from ewcs_images to oasc_images
    #[command(name = "move-oasc-images")]
    MoveOascImages,

    /// Remove one or more columns from any table
    #[command(name = "drop-columns")]
    DropColumns {
        /// Table to rebuild
        #[arg(long = "table", short = 't')]
        table: String,

        /// Column to remove (repeatable)
        #[arg(long = "column", short = 'c', required = true)]
        columns: Vec<String>,

        /// Index to ensure afterwards, as NAME=COL[,COL...][:unique] (repeatable)
        #[arg(long = "index", value_parser = parse_index)]
        indexes: Vec<IndexSpec>,
    },

    /// Move rows whose column ends with a suffix from one table to another
    #[command(name = "move-rows")]
    MoveRows {
        /// Source table
        #[arg(long = "from")]
        from: String,

        /// Target table
        #[arg(long = "to")]
        to: String,

        /// Columns copied to the target, comma separated
        #[arg(long = "columns", value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Column the suffix is matched against
        #[arg(long = "match-column")]
        match_column: String,

        /// Suffix to match (matched literally, ASCII case-insensitive)
        #[arg(long = "suffix")]
        suffix: String,
    },

    /// Show the columns, row count and indexes of a table
    Inspect {
        /// Table to inspect
        #[arg(long = "table", short = 't', default_value = presets::EWCS_DATA)]
        table: String,
    },
}

impl Cli {
    pub fn handle_command_line(self, config: &Config) -> Result<(), MigrateError> {
        let db_path = self.db.clone().unwrap_or_else(|| config.database.path.clone());
        debug!("Using database {}", db_path.display());

        match self.command {
            Command::DropCs125Current => Self::run_drop(
                "EWCS cs125_current Column Removal",
                "This will remove the cs125_current column from ewcs_data table.\nContinue?",
                presets::drop_cs125_current(),
                &db_path,
                config,
                self.yes,
            ),
            Command::DropPowerSaveMode => Self::run_drop(
                "EWCS power_save_mode Column Removal",
                "This will remove the power_save_mode column from ewcs_data table.\nContinue?",
                presets::drop_power_save_mode(),
                &db_path,
                config,
                self.yes,
            ),
            Command::MoveOascImages => Self::run_move(
                "EWCS Image Table Migration",
                "This will move all FITS files from ewcs_images to oasc_images table.\nContinue?",
                presets::move_oasc_images(),
                &db_path,
                config,
                self.yes,
            ),
            Command::DropColumns {
                table,
                columns,
                indexes,
            } => {
                let prompt = format!(
                    "This will remove {} from {} table.\nContinue?",
                    columns.join(", "),
                    table
                );
                let request = indexes
                    .into_iter()
                    .fold(DropRequest::new(&table, &columns), DropRequest::with_index);
                Self::run_drop("Column Removal", &prompt, request, &db_path, config, self.yes)
            }
            Command::MoveRows {
                from,
                to,
                columns,
                match_column,
                suffix,
            } => {
                let prompt = format!(
                    "This will move rows whose {} ends with '{}' from {} to {}.\nContinue?",
                    match_column, suffix, from, to
                );
                let request =
                    MoveRequest::new(&from, &to, &columns, RowFilter::suffix(&match_column, &suffix));
                Self::run_move("Row Migration", &prompt, request, &db_path, config, self.yes)
            }
            Command::Inspect { table } => Self::run_inspect(&table, &db_path, config),
        }
    }

    fn run_drop(
        title: &str,
        prompt: &str,
        request: DropRequest,
        db_path: &Path,
        config: &Config,
        yes: bool,
    ) -> Result<(), MigrateError> {
        report::banner(title);
        if !confirm(prompt, yes)? {
            report::line("Migration cancelled.");
            return Ok(());
        }

        let mut db = Database::open(db_path, config.database.busy_timeout())?;
        let outcome = drop_columns(&mut db, &request)?;
        info!(
            "Column removal on {} finished: {} rows migrated",
            request.table,
            outcome.rows_migrated()
        );
        if let DropOutcome::Migrated(summary) = &outcome {
            debug!(
                "Removed {:?}; layout {:?} -> {:?}; indexes recreated {:?}, discarded {:?}",
                summary.removed,
                summary.columns_before,
                summary.columns_after,
                summary.recreated_indexes,
                summary.discarded_indexes
            );
        }
        db.close()
    }

    fn run_move(
        title: &str,
        prompt: &str,
        request: MoveRequest,
        db_path: &Path,
        config: &Config,
        yes: bool,
    ) -> Result<(), MigrateError> {
        report::banner(title);
        if !confirm(prompt, yes)? {
            report::line("Migration cancelled.");
            return Ok(());
        }

        let mut db = Database::open(db_path, config.database.busy_timeout())?;
        let outcome = move_rows(&mut db, &request)?;
        info!(
            "Row move {} -> {} finished: {} rows moved",
            request.source,
            request.target,
            outcome.rows_moved()
        );
        db.close()
    }

    fn run_inspect(table: &str, db_path: &Path, config: &Config) -> Result<(), MigrateError> {
        let db = Database::open(db_path, config.database.busy_timeout())?;
        let schema = db.table_schema(table)?;

        report::line(&format!("Table {} ({})", schema.table, db.path().display()));
        for column in &schema.columns {
            let mut line = format!("  {:<24} {}", column.name, column.decl_type);
            if column.is_primary_key() {
                line.push_str(if schema.autoincrement {
                    " PRIMARY KEY AUTOINCREMENT"
                } else {
                    " PRIMARY KEY"
                });
            }
            if column.not_null {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                line.push_str(&format!(" DEFAULT {}", default));
            }
            report::line(&line);
        }
        report::line(&format!("Rows: {}", db.count_rows(table)?));
        for index in db.indexes(table)? {
            report::line(&format!("Index: {}", index));
        }

        db.close()
    }
}

fn confirm(prompt: &str, yes: bool) -> Result<bool, MigrateError> {
    if yes {
        report::line("Auto-confirming migration with -y flag...");
        return Ok(true);
    }

    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| MigrateError::Error(format!("Confirmation prompt failed: {}", e)))
}

fn parse_index(s: &str) -> Result<IndexSpec, String> {
    let (name, cols) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COL[,COL...], got '{}'", s))?;

    let name = name.trim();
    let (cols, unique) = match cols.strip_suffix(":unique") {
        Some(cols) => (cols, true),
        None => (cols, false),
    };
    let columns: Vec<&str> = cols
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    if name.is_empty() || columns.is_empty() {
        return Err(format!("expected NAME=COL[,COL...], got '{}'", s));
    }

    let spec = IndexSpec::new(name, &columns);
    Ok(if unique { spec.unique() } else { spec })
}
