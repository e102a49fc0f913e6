//! Execution transport: a thin layer over one rusqlite connection.
//!
//! Everything the crate runs against SQLite, translated user statements and
//! catalog reads/writes alike, goes through [`Engine::execute`] and
//! [`Engine::query`], so the diagnostics hook sees every statement.

use crate::error::{DriverError, Result};
use crate::functions;
use crate::model::Cell;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Receives each executed statement and its parameters.
pub type QueryHook = Box<dyn Fn(&str, &[Value]) + Send>;

/// Engine features that decide between native syntax and legacy fallbacks.
/// Computed once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub version: i32,
    /// `ON CONFLICT DO UPDATE` without a conflict target (3.35.0).
    pub upsert_without_target: bool,
    /// RIGHT and FULL OUTER JOIN (3.39.0).
    pub right_join: bool,
}

impl Capabilities {
    pub fn from_version(version: i32) -> Self {
        Capabilities {
            version,
            upsert_without_target: version >= 3_035_000,
            right_join: version >= 3_039_000,
        }
    }

    pub fn detect() -> Self {
        Self::from_version(rusqlite::version_number())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RowSet {
    pub fn first_value(&self) -> Option<&Cell> {
        self.rows.first().and_then(|r| r.first())
    }
}

pub struct Engine {
    conn: Connection,
    caps: Capabilities,
    hook: Option<QueryHook>,
}

impl Engine {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Engine> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Engine> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Engine> {
        // Foreign keys are catalog metadata only; table rebuilds rely on
        // the engine not enforcing them.
        conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        functions::register(&conn)?;
        Ok(Engine {
            conn,
            caps: Capabilities::detect(),
            hook: None,
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn set_hook(&mut self, hook: QueryHook) {
        self.hook = Some(hook);
    }

    fn trace(&self, sql: &str, params: &[Value]) {
        if let Some(hook) = &self.hook {
            hook(sql, params);
        }
    }

    /// Runs a statement that returns no rows and yields the affected-row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.trace(sql, params);
        let n = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(n)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.trace(sql, &[]);
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        self.trace(sql, params);
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            let mut out = Vec::with_capacity(width);
            for i in 0..width {
                out.push(Cell::from(row.get_ref(i)?));
            }
            rows.push(out);
        }
        Ok(RowSet { columns, rows })
    }

    /// First column of the first row, or `None` for an empty result.
    pub fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Cell>> {
        Ok(self.query(sql, params)?.first_value().cloned())
    }

    pub fn query_strings(&self, sql: &str, params: &[Value]) -> Result<Vec<String>> {
        Ok(self
            .query(sql, params)?
            .rows
            .into_iter()
            .filter_map(|r| r.into_iter().next().and_then(|c| c.to_text()))
            .collect())
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    pub fn changes(&self) -> u64 {
        self.conn.changes()
    }

    /// True while a transaction (or savepoint) is open on the connection.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Physical table names, excluding engine internals and the catalog.
    pub fn list_tables(&self, temporary: bool) -> Result<Vec<String>> {
        let master = if temporary { "temp.sqlite_master" } else { "main.sqlite_master" };
        self.query_strings(
            &format!(
                "SELECT name FROM {master} WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                 AND name NOT LIKE '\\_mysql\\_%' ESCAPE '\\' ORDER BY name"
            ),
            &[],
        )
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        reinterpret(err)
    }
}

/// Marker prefix used by coercion functions to smuggle a MySQL error number
/// through the engine's error message.
pub const THROW_MARKER: &str = "mysql-error:";

/// Maps known engine failures to their MySQL-shaped counterparts.
pub fn reinterpret(err: rusqlite::Error) -> DriverError {
    let (code, message) = match &err {
        rusqlite::Error::SqliteFailure(e, msg) => (Some(e.code), msg.clone().unwrap_or_default()),
        other => (None, other.to_string()),
    };
    if matches!(code, Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)) {
        return DriverError::LockWaitTimeout;
    }
    if let Some(pos) = message.find(THROW_MARKER) {
        let rest = &message[pos + THROW_MARKER.len()..];
        if let Some((num, text)) = rest.split_once(':') {
            if let Ok(num) = num.trim().parse::<u16>() {
                return DriverError::value(num, text.to_string());
            }
        }
    }
    if let Some(cols) = message.strip_prefix("UNIQUE constraint failed: ") {
        return DriverError::DuplicateEntry(String::new(), cols.to_string());
    }
    if let Some(col) = message.strip_prefix("NOT NULL constraint failed: ") {
        let col = col.rsplit('.').next().unwrap_or(col);
        return DriverError::BadNull(col.to_string());
    }
    if let Some(name) = message.strip_prefix("CHECK constraint failed: ") {
        return DriverError::CheckViolated(name.to_string());
    }
    if let Some(table) = message.strip_prefix("no such table: ") {
        return DriverError::NoSuchTable(table.to_string());
    }
    if let Some(col) = message.strip_prefix("no such column: ") {
        return DriverError::UnknownColumn(col.to_string(), "field list".into());
    }
    if let Some(col) = message.strip_prefix("ambiguous column name: ") {
        let col = col.rsplit('.').next().unwrap_or(col);
        return DriverError::value(1052, format!("Column '{col}' in field list is ambiguous"));
    }
    if message.contains("values for") && message.contains("columns") {
        return DriverError::ValueCount(1);
    }
    if message.contains("syntax error") || message.contains("incomplete input") {
        return DriverError::Parse(message);
    }
    DriverError::Engine(err)
}

/// Parses the column list out of a `UNIQUE constraint failed: t.a, t.b`
/// message. Used by the legacy upsert retry.
pub fn unique_violation_columns(message: &str) -> Option<Vec<String>> {
    let cols: Vec<String> = message
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.rsplit('.').next().unwrap_or(part).to_string()
        })
        .filter(|c| !c.is_empty())
        .collect();
    (!cols.is_empty()).then_some(cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn capabilities_follow_version() {
        let old = Capabilities::from_version(3_031_001);
        assert!(!old.upsert_without_target);
        assert!(!old.right_join);
        let new = Capabilities::from_version(3_046_000);
        assert!(new.upsert_without_target && new.right_join);
    }

    #[test]
    fn hook_sees_every_statement() {
        let mut engine = Engine::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.set_hook(Box::new(move |sql: &str, _: &[Value]| sink.lock().unwrap().push(sql.to_string())));

        engine.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        engine
            .execute("INSERT INTO t VALUES (?)", &[Value::Integer(5)])
            .unwrap();
        let rows = engine.query("SELECT a FROM t", &[]).unwrap();
        assert_eq!(rows.rows, vec![vec![Cell::Int(5)]]);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn engine_errors_are_reinterpreted() {
        let engine = Engine::open_in_memory().unwrap();
        engine
            .execute_batch("CREATE TABLE t (a INTEGER NOT NULL UNIQUE)")
            .unwrap();
        engine.execute("INSERT INTO t VALUES (1)", &[]).unwrap();

        let dup = engine.execute("INSERT INTO t VALUES (1)", &[]).unwrap_err();
        assert_eq!(dup.code(), 1062);
        let null = engine.execute("INSERT INTO t VALUES (NULL)", &[]).unwrap_err();
        assert!(matches!(null, DriverError::BadNull(ref c) if c == "a"));
        let missing = engine.query("SELECT * FROM nope", &[]).unwrap_err();
        assert_eq!(missing.code(), 1146);
    }

    #[test]
    fn thrown_errors_keep_their_code() {
        let engine = Engine::open_in_memory().unwrap();
        let err = engine
            .query("SELECT _mysql_throw(1264, 'Out of range value')", &[])
            .unwrap_err();
        assert_eq!(err.code(), 1264);
        assert_eq!(err.to_string(), "Out of range value");
    }

    #[test]
    fn parses_unique_violation_columns() {
        assert_eq!(
            unique_violation_columns("t.a, t.b").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
