use log::{debug, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::database::Database;
use crate::error::MigrateError;
use crate::report;
use crate::schema::{column_list, quote_ident};

/// Row predicate for a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Text in `column` ends with `suffix`. Matched with `LIKE`, so ASCII letters
    /// compare case-insensitively; `%`, `_` and `\` in the suffix are literal.
    Suffix { column: String, suffix: String },
}

impl RowFilter {
    pub fn suffix(column: &str, suffix: &str) -> Self {
        RowFilter::Suffix {
            column: column.to_owned(),
            suffix: suffix.to_owned(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            RowFilter::Suffix { column, .. } => column,
        }
    }

    /// WHERE clause body; binds the value returned by [`RowFilter::param`] as `?1`.
    pub fn where_sql(&self) -> String {
        match self {
            RowFilter::Suffix { column, .. } => {
                format!("{} LIKE ?1 ESCAPE '\\'", quote_ident(column))
            }
        }
    }

    pub fn param(&self) -> String {
        match self {
            RowFilter::Suffix { suffix, .. } => format!("%{}", escape_like(suffix)),
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Move matching rows from `source` to `target`, copying `columns` on both sides.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub source: String,
    pub target: String,
    pub columns: Vec<String>,
    pub filter: RowFilter,
}

impl MoveRequest {
    pub fn new<S: AsRef<str>>(source: &str, target: &str, columns: &[S], filter: RowFilter) -> Self {
        MoveRequest {
            source: source.to_owned(),
            target: target.to_owned(),
            columns: columns.iter().map(|c| c.as_ref().to_owned()).collect(),
            filter,
        }
    }

    fn insert_sql(&self) -> String {
        let cols = column_list(&self.columns);
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} WHERE {}",
            quote_ident(&self.target),
            cols,
            cols,
            quote_ident(&self.source),
            self.filter.where_sql()
        )
    }

    fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(&self.source),
            self.filter.where_sql()
        )
    }

    fn count_matching_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(&self.source),
            self.filter.where_sql()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    NothingToMove {
        source_rows: i64,
        target_rows: i64,
    },
    Moved {
        copied: usize,
        deleted: usize,
        source_rows: i64,
        target_rows: i64,
    },
}

impl MoveOutcome {
    pub fn rows_moved(&self) -> usize {
        match self {
            MoveOutcome::NothingToMove { .. } => 0,
            MoveOutcome::Moved { copied, .. } => *copied,
        }
    }
}

/// Copies the rows matching the filter into the target table and deletes them from
/// the source, in one immediate transaction. The copied and deleted counts must both
/// equal the number of matching rows, otherwise nothing is changed.
pub fn move_rows(db: &mut Database, request: &MoveRequest) -> Result<MoveOutcome, MigrateError> {
    validate(db, request)?;

    let matching = count_matching(db.conn(), request)?;
    let target_before = db.count_rows(&request.target)?;

    report::line(&format!(
        "Found {} matching rows in {} table",
        matching, request.source
    ));
    report::line(&format!(
        "Current {} table has {} records",
        request.target, target_before
    ));

    if matching == 0 {
        report::line(&format!(
            "No matching rows found in {} table. Nothing to migrate.",
            request.source
        ));
        return Ok(MoveOutcome::NothingToMove {
            source_rows: db.count_rows(&request.source)?,
            target_rows: target_before,
        });
    }

    let (copied, deleted) = db.immediate_transaction(|tx| {
        let _tmr = timer!(Level::Debug; "move_rows", "{} -> {}", request.source, request.target);

        // Re-count under the write lock
        let expected = count_matching(tx, request)
            .map_err(MigrateError::at_step("counting matching rows"))?;

        let param = request.filter.param();

        let insert = request.insert_sql();
        debug!("Copying rows: {}", insert);
        let copied = tx
            .execute(&insert, [&param])
            .map_err(MigrateError::at_step("copying rows"))?;

        let delete = request.delete_sql();
        debug!("Deleting rows: {}", delete);
        let deleted = tx
            .execute(&delete, [&param])
            .map_err(MigrateError::at_step("deleting moved rows"))?;

        if copied as i64 != expected || deleted as i64 != expected {
            return Err(MigrateError::Integrity(format!(
                "expected to move {} rows but copied {} and deleted {}",
                expected, copied, deleted
            )));
        }

        Ok((copied, deleted))
    })?;

    report::line(&format!(
        "Migrated {} rows to {}",
        copied, request.target
    ));
    report::line(&format!(
        "Removed {} rows from {}",
        deleted, request.source
    ));

    let source_rows = db.count_rows(&request.source)?;
    let target_rows = db.count_rows(&request.target)?;
    report::line("Final state:");
    report::line(&format!("  {}: {} records", request.source, source_rows));
    report::line(&format!("  {}: {} records", request.target, target_rows));

    Ok(MoveOutcome::Moved {
        copied,
        deleted,
        source_rows,
        target_rows,
    })
}

fn count_matching(conn: &Connection, request: &MoveRequest) -> rusqlite::Result<i64> {
    conn.query_row(
        &request.count_matching_sql(),
        [request.filter.param()],
        |row| row.get(0),
    )
}

fn validate(db: &Database, request: &MoveRequest) -> Result<(), MigrateError> {
    if request.columns.is_empty() {
        return Err(MigrateError::Validation(
            "no columns were given to copy".to_owned(),
        ));
    }

    if request.source.eq_ignore_ascii_case(&request.target) {
        return Err(MigrateError::Validation(format!(
            "source and target are both '{}'",
            request.source
        )));
    }

    let source = db.table_schema(&request.source)?;
    let target = db.table_schema(&request.target)?;

    let filter_column = request.filter.column();
    if !source.has_column(filter_column) {
        return Err(MigrateError::Validation(format!(
            "filter column '{}' does not exist in '{}'",
            filter_column, request.source
        )));
    }

    for column in &request.columns {
        for schema in [&source, &target] {
            if !schema.has_column(column) {
                return Err(MigrateError::Validation(format!(
                    "column '{}' does not exist in '{}'",
                    column, schema.table
                )));
            }
        }
    }

    Ok(())
}
