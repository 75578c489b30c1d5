use std::fmt;

/// One column of a table as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type text, possibly empty (SQLite allows untyped columns).
    pub decl_type: String,
    pub not_null: bool,
    /// Default expression text exactly as SQLite stores it, without the outer parentheses.
    pub default: Option<String>,
    /// 0 when the column is not part of the primary key, otherwise its 1-based position in the key.
    pub pk: u32,
}

impl ColumnDef {
    pub fn new(name: &str, decl_type: &str) -> Self {
        ColumnDef {
            name: name.to_owned(),
            decl_type: decl_type.to_owned(),
            not_null: false,
            default: None,
            pk: 0,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.pk > 0
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn to_sql(&self, inline_pk: Option<bool>) -> String {
        let mut sql = quote_ident(&self.name);

        if !self.decl_type.is_empty() {
            sql.push(' ');
            sql.push_str(&self.decl_type);
        }

        if let Some(autoincrement) = inline_pk {
            sql.push_str(" PRIMARY KEY");
            if autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }

        if self.not_null {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = &self.default {
            sql.push(' ');
            sql.push_str(&default_clause(default));
        }

        sql
    }
}

/// Ordered column layout of a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    /// Whether the integer primary key was declared `AUTOINCREMENT`.
    pub autoincrement: bool,
}

impl TableSchema {
    pub fn new(table: &str, columns: Vec<ColumnDef>, autoincrement: bool) -> Self {
        TableSchema {
            table: table.to_owned(),
            columns,
            autoincrement,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.has_name(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary key columns in key order.
    pub fn primary_key(&self) -> Vec<&ColumnDef> {
        let mut pk: Vec<&ColumnDef> = self.columns.iter().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.pk);
        pk
    }

    /// Renders `CREATE TABLE` for this layout under the given table name.
    ///
    /// A single-column primary key is declared inline so an `INTEGER PRIMARY KEY`
    /// keeps its rowid aliasing (and `AUTOINCREMENT` when the source had it).
    /// Composite keys become a table-level constraint.
    pub fn create_table_sql(&self, table_name: &str) -> String {
        let pk = self.primary_key();
        let inline_pk = if pk.len() == 1 { Some(pk[0].name.as_str()) } else { None };

        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let inline = match inline_pk {
                    Some(name) if c.name == name => Some(
                        self.autoincrement && c.decl_type.eq_ignore_ascii_case("INTEGER"),
                    ),
                    _ => None,
                };
                c.to_sql(inline)
            })
            .collect();

        if pk.len() > 1 {
            defs.push(format!("PRIMARY KEY ({})", column_list(pk.iter().map(|c| &c.name))));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            quote_ident(table_name),
            defs.join(",\n    ")
        )
    }
}

/// An index the caller wants present on the table after a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        IndexSpec {
            name: name.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_ident(&self.name),
            quote_ident(table),
            column_list(&self.columns)
        )
    }
}

/// An explicitly created index found on a table before it is rebuilt.
/// Automatic indexes (from UNIQUE / PRIMARY KEY constraints) have no SQL and are never listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingIndex {
    pub name: String,
    pub sql: String,
    /// Indexed column names; `None` for expression terms.
    pub columns: Vec<Option<String>>,
}

impl ExistingIndex {
    pub fn references_any(&self, names: &[String]) -> bool {
        self.columns
            .iter()
            .flatten()
            .any(|c| names.iter().any(|n| n.eq_ignore_ascii_case(c)))
    }
}

impl fmt::Display for ExistingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.as_deref().unwrap_or("<expr>"))
            .collect();
        write!(f, "{}({})", self.name, cols.join(", "))
    }
}

/// Whether a `CREATE TABLE` statement declares an `AUTOINCREMENT` primary key.
///
/// Only the keyword counts: quoted names, string literals, comments and longer words
/// such as `autoincrement_note` are skipped, and the keyword must follow the column's
/// `PRIMARY KEY` clause.
pub fn declares_autoincrement(create_sql: &str) -> bool {
    const KEY_MODIFIERS: [&str; 9] = [
        "ASC", "DESC", "ON", "CONFLICT", "ROLLBACK", "ABORT", "FAIL", "IGNORE", "REPLACE",
    ];

    let words = sql_words(create_sql);
    words.iter().enumerate().any(|(i, word)| {
        word == "AUTOINCREMENT"
            && words[..i]
                .iter()
                .rev()
                .find(|w| !KEY_MODIFIERS.contains(&w.as_str()))
                .is_some_and(|w| w == "KEY")
    })
}

// Upper-cased bare words of a statement. Quoted tokens, literals and punctuation
// become an empty word so they break keyword sequences.
fn sql_words(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            current.push(c.to_ascii_uppercase());
            continue;
        }
        if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }

        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                while let Some(q) = chars.next() {
                    if q == close {
                        // A doubled quote is an escaped quote, not the end
                        if close != ']' && chars.peek() == Some(&close) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
                words.push(String::new());
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            c if c.is_whitespace() => {}
            _ => words.push(String::new()),
        }
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Quotes an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comma separated list of quoted identifiers.
pub fn column_list<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn default_clause(expr: &str) -> String {
    if is_bare_default(expr) {
        format!("DEFAULT {}", expr)
    } else {
        format!("DEFAULT ({})", expr)
    }
}

// SQLite strips the parentheses of `DEFAULT (expr)` when it records the default,
// so anything that is not a literal or one of the time keywords goes back in parens.
fn is_bare_default(expr: &str) -> bool {
    let trimmed = expr.trim();
    let upper = trimmed.to_ascii_uppercase();

    match upper.as_str() {
        "NULL" | "TRUE" | "FALSE" | "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP" => {
            return true
        }
        _ => {}
    }

    if is_string_literal(trimmed) {
        return true;
    }

    if (upper.starts_with("X'")) && is_string_literal(&trimmed[1..]) {
        return true;
    }

    let unsigned = trimmed.trim_start_matches(['+', '-']);
    !unsigned.is_empty() && unsigned.parse::<f64>().is_ok() && !unsigned.starts_with(['i', 'I', 'n', 'N'])
}

fn is_string_literal(s: &str) -> bool {
    if s.len() < 2 || !s.starts_with('\'') || !s.ends_with('\'') {
        return false;
    }
    // Every quote inside must be doubled, otherwise this is an expression like 'a' || 'b'.
    let inner = &s[1..s.len() - 1];
    inner.replace("''", "").find('\'').is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn col(name: &str, decl_type: &str) -> ColumnDef {
        ColumnDef::new(name, decl_type)
    }

    #[test]
    fn test_declares_autoincrement() {
        assert!(declares_autoincrement(
            "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)"
        ));
        assert!(declares_autoincrement(
            "CREATE TABLE t (id integer primary key desc on conflict replace autoincrement)"
        ));
        assert!(declares_autoincrement(
            "CREATE TABLE t (\"id\" INTEGER PRIMARY KEY /* x */ AUTOINCREMENT)"
        ));

        assert!(!declares_autoincrement(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, autoincrement_note TEXT, b TEXT)"
        ));
        assert!(!declares_autoincrement(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, \"AUTOINCREMENT\" TEXT)"
        ));
        assert!(!declares_autoincrement(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, note TEXT DEFAULT 'AUTOINCREMENT') -- AUTOINCREMENT"
        ));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("timestamp"), "\"timestamp\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_default_clause_literals_stay_bare() {
        assert_eq!(default_clause("'normal'"), "DEFAULT 'normal'");
        assert_eq!(default_clause("'it''s'"), "DEFAULT 'it''s'");
        assert_eq!(default_clause("CURRENT_TIMESTAMP"), "DEFAULT CURRENT_TIMESTAMP");
        assert_eq!(default_clause("0"), "DEFAULT 0");
        assert_eq!(default_clause("-1.5"), "DEFAULT -1.5");
        assert_eq!(default_clause("NULL"), "DEFAULT NULL");
        assert_eq!(default_clause("X'00FF'"), "DEFAULT X'00FF'");
    }

    #[test]
    fn test_default_clause_expressions_are_parenthesized() {
        assert_eq!(default_clause("datetime('now')"), "DEFAULT (datetime('now'))");
        assert_eq!(default_clause("'a' || 'b'"), "DEFAULT ('a' || 'b')");
        assert_eq!(default_clause("1 + 1"), "DEFAULT (1 + 1)");
    }

    #[test]
    fn test_create_table_sql_inline_autoincrement_key() {
        let mut id = col("id", "INTEGER");
        id.pk = 1;
        let mut ts = col("timestamp", "INTEGER");
        ts.not_null = true;
        let mut mode = col("power_save_mode", "TEXT");
        mode.default = Some("'normal'".to_owned());

        let schema = TableSchema::new("ewcs_data", vec![id, ts, mode], true);

        assert_eq!(
            schema.create_table_sql("ewcs_data_new"),
            "CREATE TABLE \"ewcs_data_new\" (\n    \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
             \"timestamp\" INTEGER NOT NULL,\n    \
             \"power_save_mode\" TEXT DEFAULT 'normal'\n)"
        );
    }

    #[test]
    fn test_create_table_sql_composite_key() {
        let mut a = col("a", "TEXT");
        a.pk = 2;
        let mut b = col("b", "INTEGER");
        b.pk = 1;
        let schema = TableSchema::new("t", vec![a, b, col("c", "")], false);

        assert_eq!(
            schema.create_table_sql("t_new"),
            "CREATE TABLE \"t_new\" (\n    \"a\" TEXT,\n    \"b\" INTEGER,\n    \"c\",\n    PRIMARY KEY (\"b\", \"a\")\n)"
        );
    }

    #[test]
    fn test_autoincrement_only_applies_to_integer_key() {
        let mut id = col("id", "TEXT");
        id.pk = 1;
        let schema = TableSchema::new("t", vec![id], true);
        assert_eq!(
            schema.create_table_sql("t"),
            "CREATE TABLE \"t\" (\n    \"id\" TEXT PRIMARY KEY\n)"
        );
    }

    #[test]
    fn test_index_spec_sql() {
        let idx = IndexSpec::new("idx_ewcs_data_timestamp", &["timestamp"]);
        assert_eq!(
            idx.create_sql("ewcs_data"),
            "CREATE INDEX IF NOT EXISTS \"idx_ewcs_data_timestamp\" ON \"ewcs_data\" (\"timestamp\")"
        );

        let idx = IndexSpec::new("idx_u", &["a", "b"]).unique();
        assert_eq!(
            idx.create_sql("t"),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_u\" ON \"t\" (\"a\", \"b\")"
        );
    }

    #[test]
    fn test_existing_index_references() {
        let idx = ExistingIndex {
            name: "idx_mixed".to_owned(),
            sql: String::new(),
            columns: vec![Some("Station_Name".to_owned()), None],
        };
        assert!(idx.references_any(&["station_name".to_owned()]));
        assert!(!idx.references_any(&["timestamp".to_owned()]));
        assert_eq!(idx.to_string(), "idx_mixed(Station_Name, <expr>)");
    }

    #[test]
    fn test_schema_lookup_is_case_insensitive() {
        let schema = TableSchema::new("t", vec![col("Timestamp", "INTEGER")], false);
        assert!(schema.has_column("timestamp"));
        assert!(!schema.has_column("ts"));
    }
}
