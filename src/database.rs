use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info};
use rusqlite::config::DbConfig;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::MigrateError;
use crate::schema::{declares_autoincrement, quote_ident, ColumnDef, ExistingIndex, TableSchema};

/// Owned session against an existing database file.
///
/// The connection is closed when the value drops, so every exit path releases it.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Opens an existing, writable database file. The file is never created.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, MigrateError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|source| {
            MigrateError::Connection {
                path: path.to_path_buf(),
                source,
            }
        })?;

        // SQLite silently falls back to read-only for write-protected files
        if fs::metadata(path)?.permissions().readonly() {
            return Err(MigrateError::Error(format!(
                "Database '{}' is not writable",
                path.display()
            )));
        }

        conn.busy_timeout(busy_timeout)?;

        // Generated SQL quotes every identifier; a misspelled one must fail instead of
        // silently becoming a string literal.
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DDL, false)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DML, false)?;

        info!("Database opened at: {}", path.display());

        Ok(Database {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<(), MigrateError> {
        let path = self.path;
        self.conn.close().map_err(|(_, err)| {
            error!("Failed to close database {}: {}", path.display(), err);
            MigrateError::DatabaseError(err)
        })
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction. Commits when `f` succeeds,
    /// rolls back and returns the error otherwise.
    pub fn immediate_transaction<F, T>(&mut self, f: F) -> Result<T, MigrateError>
    where
        F: FnOnce(&Transaction) -> Result<T, MigrateError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(MigrateError::at_step("beginning the transaction"))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(MigrateError::at_step("committing"))?;
                Ok(value)
            }
            Err(err) => {
                debug!("Rolling back transaction after error: {}", err);
                if let Err(rollback_err) = tx.rollback() {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, MigrateError> {
        table_exists(&self.conn, table)
    }

    /// Reads the column layout of `table`. The lookup ignores case; the returned
    /// schema carries the name as stored in `sqlite_master`.
    pub fn table_schema(&self, table: &str) -> Result<TableSchema, MigrateError> {
        let found: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [table],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((name, create_sql)) = found else {
            return Err(MigrateError::TableNotFound(table.to_owned()));
        };

        let mut stmt = self.conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;

        let columns = stmt
            .query_map([&name], |row| {
                Ok(ColumnDef {
                    name: row.get(0)?,
                    decl_type: row.get(1)?,
                    not_null: row.get(2)?,
                    default: row.get(3)?,
                    pk: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TableSchema::new(&name, columns, declares_autoincrement(&create_sql)))
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>, MigrateError> {
        Ok(self.table_schema(table)?.column_names())
    }

    pub fn count_rows(&self, table: &str) -> Result<i64, MigrateError> {
        Ok(count_rows(&self.conn, table)?)
    }

    /// Explicitly created indexes on `table`, in name order.
    pub fn indexes(&self, table: &str) -> Result<Vec<ExistingIndex>, MigrateError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 COLLATE NOCASE AND sql IS NOT NULL
             ORDER BY name",
        )?;

        let named: Vec<(String, String)> = stmt
            .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut col_stmt = self
            .conn
            .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;

        let mut indexes = Vec::with_capacity(named.len());
        for (name, sql) in named {
            let columns = col_stmt
                .query_map([&name], |row| row.get::<_, Option<String>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            indexes.push(ExistingIndex { name, sql, columns });
        }

        Ok(indexes)
    }

    pub fn index_exists(&self, name: &str) -> Result<bool, MigrateError> {
        Ok(index_exists(&self.conn, name)?)
    }
}

// Connection-level helpers shared with code running inside a transaction
// (a `Transaction` derefs to `Connection`).

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, MigrateError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
}

pub fn index_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1 COLLATE NOCASE",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
