use crate::error::MigrateError;
use crate::schema::{column_list, quote_ident, TableSchema};

/// Result of removing columns from a table layout: the layout to build and the
/// statements that build and fill it.
#[derive(Debug, Clone)]
pub struct SchemaDiff {
    pub current: TableSchema,
    pub target: TableSchema,
    /// Removed columns, named as the table names them.
    pub removed: Vec<String>,
    pub sibling: String,
    pub create_sql: String,
    pub copy_sql: String,
}

impl SchemaDiff {
    pub fn sibling_name(table: &str) -> String {
        format!("{}_new", table)
    }

    /// Computes the layout of `current` without `remove`.
    ///
    /// Returns `Ok(None)` when none of the requested columns are present. Rejects
    /// requests that would remove a primary key column or every column.
    pub fn compute<S: AsRef<str>>(
        current: &TableSchema,
        remove: &[S],
    ) -> Result<Option<SchemaDiff>, MigrateError> {
        if remove.is_empty() {
            return Err(MigrateError::Validation(
                "no columns were given to remove".to_owned(),
            ));
        }

        let removed: Vec<String> = current
            .columns
            .iter()
            .filter(|c| remove.iter().any(|r| c.has_name(r.as_ref())))
            .map(|c| c.name.clone())
            .collect();

        if removed.is_empty() {
            return Ok(None);
        }

        if let Some(pk) = current
            .columns
            .iter()
            .find(|c| c.is_primary_key() && removed.contains(&c.name))
        {
            return Err(MigrateError::Validation(format!(
                "column '{}' is part of the primary key of '{}' and cannot be removed",
                pk.name, current.table
            )));
        }

        let columns: Vec<_> = current
            .columns
            .iter()
            .filter(|c| !removed.contains(&c.name))
            .cloned()
            .collect();

        if columns.is_empty() {
            return Err(MigrateError::Validation(format!(
                "removing {} would leave '{}' without columns",
                removed.join(", "),
                current.table
            )));
        }

        let target = TableSchema::new(&current.table, columns, current.autoincrement);
        let sibling = Self::sibling_name(&current.table);
        let create_sql = target.create_table_sql(&sibling);

        // Same explicit list on both sides; never SELECT *.
        let cols = column_list(target.columns.iter().map(|c| &c.name));
        let copy_sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&sibling),
            cols,
            cols,
            quote_ident(&current.table)
        );

        Ok(Some(SchemaDiff {
            current: current.clone(),
            target,
            removed,
            sibling,
            create_sql,
            copy_sql,
        }))
    }

    /// Checks the computed target against a hardcoded expected column list.
    ///
    /// Names are compared as a set, ignoring ASCII case. The rebuilt table keeps the
    /// physical order of the live table, so a column appended by `ALTER TABLE ADD
    /// COLUMN` at a different position still matches.
    pub fn check_expected<S: AsRef<str>>(&self, expected: &[S]) -> Result<(), MigrateError> {
        let target = self.target.column_names();

        let unexpected: Vec<&str> = target
            .iter()
            .filter(|t| !expected.iter().any(|e| t.eq_ignore_ascii_case(e.as_ref())))
            .map(String::as_str)
            .collect();
        let missing: Vec<&str> = expected
            .iter()
            .map(|e| e.as_ref())
            .filter(|e| !target.iter().any(|t| t.eq_ignore_ascii_case(e)))
            .collect();

        if unexpected.is_empty() && missing.is_empty() {
            if target.len() != expected.len() {
                return Err(MigrateError::Validation(format!(
                    "expected layout for '{}' names a column more than once",
                    self.current.table
                )));
            }
            return Ok(());
        }

        let detail = format!(
            "unexpected columns [{}], missing columns [{}]",
            unexpected.join(", "),
            missing.join(", ")
        );

        Err(MigrateError::Validation(format!(
            "resulting layout of '{}' does not match the expected schema: {}",
            self.current.table, detail
        )))
    }
}
