use log::{debug, info, warn, Level};
use logging_timer::timer;
use rusqlite::{params, OptionalExtension};

use crate::database::{self, Database};
use crate::error::MigrateError;
use crate::report;
use crate::schema::{quote_ident, ExistingIndex, IndexSpec};
use crate::schema_diff::SchemaDiff;

/// Request to remove columns from one table.
#[derive(Debug, Clone)]
pub struct DropRequest {
    pub table: String,
    pub remove: Vec<String>,
    /// Column list the table must end up with. When set, a request whose computed
    /// layout differs is rejected before anything is written.
    pub expected_columns: Option<Vec<String>>,
    /// Indexes to ensure on the rebuilt table, created with `IF NOT EXISTS`.
    pub indexes: Vec<IndexSpec>,
}

impl DropRequest {
    pub fn new<S: AsRef<str>>(table: &str, remove: &[S]) -> Self {
        DropRequest {
            table: table.to_owned(),
            remove: remove.iter().map(|s| s.as_ref().to_owned()).collect(),
            expected_columns: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_expected_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.expected_columns = Some(columns.iter().map(|s| s.as_ref().to_owned()).collect());
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropSummary {
    pub rows: usize,
    pub removed: Vec<String>,
    pub columns_before: Vec<String>,
    /// Layout read back after commit; empty if the read-back failed.
    pub columns_after: Vec<String>,
    pub recreated_indexes: Vec<String>,
    /// Indexes that covered a removed column and were not recreated.
    pub discarded_indexes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    NothingToMigrate { columns: Vec<String> },
    Migrated(DropSummary),
}

impl DropOutcome {
    pub fn rows_migrated(&self) -> usize {
        match self {
            DropOutcome::NothingToMigrate { .. } => 0,
            DropOutcome::Migrated(summary) => summary.rows,
        }
    }
}

/// Removes columns from a table by rebuilding it.
///
/// SQLite has no usable `DROP COLUMN` for this case, so the table is rebuilt in a
/// single immediate transaction:
/// 1. create `{table}_new` with the remaining columns (types, NOT NULL, defaults, key)
/// 2. copy every row with explicit, identical column lists on both sides
/// 3. drop the original table
/// 4. rename `{table}_new` to the original name
/// 5. recreate the surviving indexes and the requested ones
///
/// Any failure rolls the whole transaction back, leaving the original table and
/// no sibling behind. A request whose columns are already absent returns
/// [`DropOutcome::NothingToMigrate`] without opening a transaction, so re-running
/// a completed migration is safe.
pub fn drop_columns(db: &mut Database, request: &DropRequest) -> Result<DropOutcome, MigrateError> {
    let current = db.table_schema(&request.table)?;
    let columns_before = current.column_names();
    // Name as stored, so the rebuilt table keeps its original spelling
    let table = current.table.clone();

    let diff = match SchemaDiff::compute(&current, &request.remove)? {
        Some(diff) => diff,
        None => {
            report::line(&format!(
                "{} not found in {} table. Nothing to migrate.",
                request.remove.join(", "),
                table
            ));
            return Ok(DropOutcome::NothingToMigrate {
                columns: columns_before,
            });
        }
    };

    if let Some(expected) = &request.expected_columns {
        diff.check_expected(expected)?;
    }

    for spec in &request.indexes {
        if let Some(column) = spec.columns.iter().find(|c| !diff.target.has_column(c)) {
            return Err(MigrateError::Validation(format!(
                "index '{}' names column '{}', which '{}' will not have",
                spec.name, column, table
            )));
        }
    }

    if db.table_exists(&diff.sibling)? {
        return Err(MigrateError::Validation(format!(
            "table '{}' already exists; remove it before migrating '{}'",
            diff.sibling, table
        )));
    }

    report::line(&format!(
        "Found {} in {} table",
        diff.removed.join(", "),
        table
    ));
    report::columns("Current columns", &columns_before);

    let (carried, discarded): (Vec<ExistingIndex>, Vec<ExistingIndex>) = db
        .indexes(&table)?
        .into_iter()
        .partition(|idx| !idx.references_any(&diff.removed));

    for idx in &discarded {
        warn!(
            "Index {} covers a removed column and will not be recreated",
            idx
        );
        report::line(&format!("Index {} will be dropped with its column", idx.name));
    }

    let (rows, recreated_indexes) =
        db.immediate_transaction(|tx| rebuild_table(tx, &diff, &carried, &request.indexes))?;

    report::line(&format!("Migrated {} rows to new table", rows));
    report::line(&format!(
        "Successfully removed {} from {} table",
        diff.removed.join(", "),
        table
    ));

    // Read-back is observational; the migration is already committed.
    let columns_after = match db.column_names(&table) {
        Ok(columns) => {
            report::columns("New columns", &columns);
            columns
        }
        Err(err) => {
            warn!("Could not verify layout of {}: {}", table, err);
            Vec::new()
        }
    };

    Ok(DropOutcome::Migrated(DropSummary {
        rows,
        removed: diff.removed.clone(),
        columns_before,
        columns_after,
        recreated_indexes,
        discarded_indexes: discarded.into_iter().map(|idx| idx.name).collect(),
    }))
}

fn rebuild_table(
    tx: &rusqlite::Connection,
    diff: &SchemaDiff,
    carried: &[ExistingIndex],
    declared: &[IndexSpec],
) -> Result<(usize, Vec<String>), MigrateError> {
    let table = &diff.current.table;
    let _tmr = timer!(Level::Debug; "rebuild_table", "{}", table);

    debug!("Creating sibling table:\n{}", diff.create_sql);
    tx.execute(&diff.create_sql, [])
        .map_err(MigrateError::at_step("creating the sibling table"))?;

    debug!("Copying rows: {}", diff.copy_sql);
    let copied = tx
        .execute(&diff.copy_sql, [])
        .map_err(MigrateError::at_step("copying rows"))?;

    let source_rows = database::count_rows(tx, table)
        .map_err(MigrateError::at_step("counting source rows"))?;
    if copied as i64 != source_rows {
        return Err(MigrateError::Integrity(format!(
            "copied {} rows but {} holds {}",
            copied, table, source_rows
        )));
    }

    // DROP TABLE forgets the AUTOINCREMENT counter; carry it over so ids of rows
    // deleted before the migration are never reissued.
    let high_water: Option<i64> = if diff.current.autoincrement {
        tx.query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(MigrateError::at_step("reading the autoincrement counter"))?
    } else {
        None
    };

    tx.execute(&format!("DROP TABLE {}", quote_ident(table)), [])
        .map_err(MigrateError::at_step("dropping the original table"))?;

    tx.execute(
        &format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&diff.sibling),
            quote_ident(table)
        ),
        [],
    )
    .map_err(MigrateError::at_step("renaming the sibling table"))?;

    if let Some(seq) = high_water {
        tx.execute(
            "INSERT INTO sqlite_sequence (name, seq)
             SELECT ?1, 0 WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = ?1)",
            [table],
        )
        .and_then(|_| {
            tx.execute(
                "UPDATE sqlite_sequence SET seq = MAX(seq, ?2) WHERE name = ?1",
                params![table, seq],
            )
        })
        .map_err(MigrateError::at_step("restoring the autoincrement counter"))?;
    }

    let mut recreated = Vec::new();

    for idx in carried {
        if database::index_exists(tx, &idx.name)
            .map_err(MigrateError::at_step("recreating indexes"))?
        {
            continue;
        }
        tx.execute(&idx.sql, [])
            .map_err(MigrateError::at_step("recreating indexes"))?;
        info!("Recreated index {}", idx);
        recreated.push(idx.name.clone());
    }

    for spec in declared {
        if database::index_exists(tx, &spec.name)
            .map_err(MigrateError::at_step("recreating indexes"))?
        {
            continue;
        }
        tx.execute(&spec.create_sql(table), [])
            .map_err(MigrateError::at_step("recreating indexes"))?;
        info!("Created index {}", spec.name);
        recreated.push(spec.name.clone());
    }

    Ok((copied, recreated))
}
