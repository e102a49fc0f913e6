//! Per-connection session state consumed by the translator and the coercion
//! engine.

use crate::error::{DriverError, Result};
use crate::ident;
use crate::model::Cell;
use bitflags::bitflags;
use std::collections::{BTreeMap, HashMap};

pub const SERVER_VERSION: &str = "8.0.38-mysql-on-sqlite";
pub const VERSION_COMMENT: &str = "mysql-on-sqlite";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SqlMode: u32 {
        const REAL_AS_FLOAT = 1 << 0;
        const PIPES_AS_CONCAT = 1 << 1;
        const ANSI_QUOTES = 1 << 2;
        const IGNORE_SPACE = 1 << 3;
        const ONLY_FULL_GROUP_BY = 1 << 4;
        const NO_UNSIGNED_SUBTRACTION = 1 << 5;
        const NO_DIR_IN_CREATE = 1 << 6;
        const NO_AUTO_VALUE_ON_ZERO = 1 << 7;
        const NO_BACKSLASH_ESCAPES = 1 << 8;
        const STRICT_TRANS_TABLES = 1 << 9;
        const STRICT_ALL_TABLES = 1 << 10;
        const NO_ZERO_IN_DATE = 1 << 11;
        const NO_ZERO_DATE = 1 << 12;
        const ALLOW_INVALID_DATES = 1 << 13;
        const ERROR_FOR_DIVISION_BY_ZERO = 1 << 14;
        const HIGH_NOT_PRECEDENCE = 1 << 15;
        const NO_ENGINE_SUBSTITUTION = 1 << 16;
        const PAD_CHAR_TO_FULL_LENGTH = 1 << 17;
        const TIME_TRUNCATE_FRACTIONAL = 1 << 18;
    }
}

impl SqlMode {
    pub fn parse(value: &str) -> Result<SqlMode> {
        let mut mode = SqlMode::empty();
        for part in value.split(',') {
            let name = part.trim().to_ascii_uppercase();
            if name.is_empty() {
                continue;
            }
            mode |= match name.as_str() {
                "TRADITIONAL" => {
                    SqlMode::STRICT_TRANS_TABLES
                        | SqlMode::STRICT_ALL_TABLES
                        | SqlMode::NO_ZERO_IN_DATE
                        | SqlMode::NO_ZERO_DATE
                        | SqlMode::ERROR_FOR_DIVISION_BY_ZERO
                        | SqlMode::NO_ENGINE_SUBSTITUTION
                }
                "ANSI" => {
                    SqlMode::REAL_AS_FLOAT
                        | SqlMode::PIPES_AS_CONCAT
                        | SqlMode::ANSI_QUOTES
                        | SqlMode::IGNORE_SPACE
                        | SqlMode::ONLY_FULL_GROUP_BY
                }
                other => SqlMode::from_name(other).ok_or_else(|| {
                    DriverError::WrongValueForVariable("sql_mode".into(), other.into())
                })?,
            };
        }
        Ok(mode)
    }

    pub fn is_strict(self) -> bool {
        self.intersects(SqlMode::STRICT_TRANS_TABLES | SqlMode::STRICT_ALL_TABLES)
    }

    pub fn to_mysql_string(self) -> String {
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Bookkeeping for `FOUND_ROWS()`.
#[derive(Debug, Clone, PartialEq)]
pub enum FoundRows {
    None,
    /// Counted eagerly for `SQL_CALC_FOUND_ROWS`.
    Count(u64),
    /// Translated text of the last SELECT, counted when asked for.
    Pending(String),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: u32,
    pub user: String,
    /// Configured main schema name.
    pub database: String,
    pub current_db: Option<String>,
    pub sql_mode: SqlMode,
    pub autocommit: bool,
    pub last_insert_id: u64,
    pub row_count: i64,
    pub found_rows: FoundRows,
    vars: BTreeMap<String, String>,
    user_vars: HashMap<String, Cell>,
}

const SESSION_VARIABLES: &[(&str, &str)] = &[
    ("auto_increment_increment", "1"),
    ("auto_increment_offset", "1"),
    ("character_set_client", "utf8mb4"),
    ("character_set_connection", "utf8mb4"),
    ("character_set_database", "utf8mb4"),
    ("character_set_results", "utf8mb4"),
    ("character_set_server", "utf8mb4"),
    ("character_set_system", "utf8mb3"),
    ("collation_connection", "utf8mb4_0900_ai_ci"),
    ("collation_database", "utf8mb4_0900_ai_ci"),
    ("collation_server", "utf8mb4_0900_ai_ci"),
    ("default_storage_engine", "InnoDB"),
    ("explicit_defaults_for_timestamp", "1"),
    ("foreign_key_checks", "1"),
    ("init_connect", ""),
    ("interactive_timeout", "28800"),
    ("license", "GPL"),
    ("lower_case_table_names", "0"),
    ("max_allowed_packet", "67108864"),
    ("net_buffer_length", "16384"),
    ("net_write_timeout", "60"),
    ("performance_schema", "0"),
    ("query_cache_size", "0"),
    ("query_cache_type", "OFF"),
    ("sql_auto_is_null", "0"),
    ("sql_big_selects", "1"),
    ("sql_safe_updates", "0"),
    ("sql_select_limit", "18446744073709551615"),
    ("system_time_zone", "UTC"),
    ("time_zone", "SYSTEM"),
    ("transaction_isolation", "REPEATABLE-READ"),
    ("transaction_read_only", "0"),
    ("unique_checks", "1"),
    ("wait_timeout", "28800"),
];

impl Session {
    pub fn new(conn_id: u32, database: &str, sql_mode: SqlMode) -> Self {
        Self {
            conn_id,
            user: String::new(),
            database: database.to_string(),
            current_db: None,
            sql_mode,
            autocommit: true,
            last_insert_id: 0,
            row_count: -1,
            found_rows: FoundRows::None,
            vars: SESSION_VARIABLES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            user_vars: HashMap::new(),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.sql_mode.is_strict()
    }

    pub fn no_backslash_escapes(&self) -> bool {
        self.sql_mode.contains(SqlMode::NO_BACKSLASH_ESCAPES)
    }

    pub fn pipes_as_concat(&self) -> bool {
        self.sql_mode.contains(SqlMode::PIPES_AS_CONCAT)
    }

    /// Reads `@@name`.
    pub fn system_variable(&self, name: &str) -> Result<Cell> {
        let key = normalize_var_name(name);
        let cell = match key.as_str() {
            "autocommit" => Cell::Int(self.autocommit as i64),
            "sql_mode" => Cell::Text(self.sql_mode.to_mysql_string()),
            "version" => Cell::Text(SERVER_VERSION.into()),
            "version_comment" => Cell::Text(VERSION_COMMENT.into()),
            "last_insert_id" | "identity" => Cell::Int(self.last_insert_id as i64),
            "warning_count" | "error_count" => Cell::Int(0),
            "hostname" => Cell::Text("localhost".into()),
            "pseudo_thread_id" => Cell::Int(self.conn_id as i64),
            "tx_isolation" => self.text_var("transaction_isolation"),
            "tx_read_only" => self.int_var("transaction_read_only"),
            "storage_engine" => self.text_var("default_storage_engine"),
            other => match self.vars.get(other) {
                Some(v) => match v.parse::<i64>() {
                    Ok(n) if !v.is_empty() => Cell::Int(n),
                    _ => Cell::Text(v.clone()),
                },
                None => return Err(DriverError::UnknownSystemVariable(name.to_string())),
            },
        };
        Ok(cell)
    }

    fn text_var(&self, key: &str) -> Cell {
        self.vars
            .get(key)
            .map(|v| Cell::Text(v.clone()))
            .unwrap_or(Cell::Null)
    }

    fn int_var(&self, key: &str) -> Cell {
        self.vars
            .get(key)
            .and_then(|v| v.parse().ok())
            .map(Cell::Int)
            .unwrap_or(Cell::Null)
    }

    /// Assigns `SET [SESSION] name = value`. Autocommit transitions are
    /// handled by the caller, which also owns the transaction state.
    pub fn set_system_variable(&mut self, name: &str, value: &Cell) -> Result<()> {
        let key = normalize_var_name(name);
        let text = value.to_text();
        match key.as_str() {
            "sql_mode" => {
                self.sql_mode = SqlMode::parse(text.as_deref().unwrap_or(""))?;
            }
            "autocommit" => {
                self.autocommit = parse_bool(&key, value)?;
            }
            "transaction_isolation" | "tx_isolation" => {
                let iso = normalize_isolation(text.as_deref().unwrap_or(""))?;
                self.vars.insert("transaction_isolation".into(), iso);
            }
            "transaction_read_only" | "tx_read_only" => {
                let on = parse_bool(&key, value)?;
                self.vars
                    .insert("transaction_read_only".into(), (on as i64).to_string());
            }
            "foreign_key_checks" | "unique_checks" | "sql_safe_updates" | "sql_auto_is_null" => {
                let on = parse_bool(&key, value)?;
                self.vars.insert(key, (on as i64).to_string());
            }
            "names" => {
                let charset = text.unwrap_or_else(|| "utf8mb4".into());
                self.set_names(&charset, None);
            }
            other if self.vars.contains_key(other) => {
                self.vars.insert(key.clone(), text.unwrap_or_default());
            }
            _ => return Err(DriverError::UnknownSystemVariable(name.to_string())),
        }
        Ok(())
    }

    pub fn set_names(&mut self, charset: &str, collation: Option<&str>) {
        for var in [
            "character_set_client",
            "character_set_connection",
            "character_set_results",
        ] {
            self.vars.insert(var.into(), charset.to_string());
        }
        let collation = collation
            .map(str::to_string)
            .unwrap_or_else(|| default_collation(charset).to_string());
        self.vars.insert("collation_connection".into(), collation);
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.vars.insert(
            "transaction_read_only".into(),
            (read_only as i64).to_string(),
        );
    }

    pub fn set_isolation(&mut self, level: &str) -> Result<()> {
        let iso = normalize_isolation(level)?;
        self.vars.insert("transaction_isolation".into(), iso);
        Ok(())
    }

    pub fn user_variable(&self, name: &str) -> Cell {
        self.user_vars
            .get(&ident::fold(name.trim_start_matches('@')))
            .cloned()
            .unwrap_or(Cell::Null)
    }

    pub fn set_user_variable(&mut self, name: &str, value: Cell) {
        self.user_vars
            .insert(ident::fold(name.trim_start_matches('@')), value);
    }

    /// `(name, value)` pairs for SHOW VARIABLES, sorted by name.
    pub fn variables(&self) -> Vec<(String, String)> {
        let mut out: BTreeMap<String, String> = self.vars.clone();
        out.insert("autocommit".into(), on_off(self.autocommit));
        out.insert("sql_mode".into(), self.sql_mode.to_mysql_string());
        out.insert("version".into(), SERVER_VERSION.into());
        out.insert("version_comment".into(), VERSION_COMMENT.into());
        out.into_iter().collect()
    }

    pub fn is_main_schema(&self, name: &str) -> bool {
        ident::eq(name, &self.database)
    }
}

fn on_off(b: bool) -> String {
    if b { "ON" } else { "OFF" }.to_string()
}

fn normalize_var_name(name: &str) -> String {
    let n = name.trim().trim_start_matches('@');
    let n = n
        .strip_prefix("session.")
        .or_else(|| n.strip_prefix("SESSION."))
        .or_else(|| n.strip_prefix("local."))
        .or_else(|| n.strip_prefix("LOCAL."))
        .or_else(|| n.strip_prefix("global."))
        .or_else(|| n.strip_prefix("GLOBAL."))
        .unwrap_or(n);
    ident::fold(n)
}

fn parse_bool(var: &str, value: &Cell) -> Result<bool> {
    match value {
        Cell::Int(n) => Ok(*n != 0),
        Cell::Float(f) => Ok(*f != 0.0),
        Cell::Text(s) => {
            let t = s.trim();
            if t.eq_ignore_ascii_case("on") || t.eq_ignore_ascii_case("true") || t == "1" {
                Ok(true)
            } else if t.eq_ignore_ascii_case("off") || t.eq_ignore_ascii_case("false") || t == "0"
            {
                Ok(false)
            } else {
                Err(DriverError::WrongValueForVariable(var.into(), t.into()))
            }
        }
        Cell::Null => Err(DriverError::WrongValueForVariable(var.into(), "NULL".into())),
        Cell::Blob(_) => Err(DriverError::WrongValueForVariable(var.into(), "BLOB".into())),
    }
}

fn normalize_isolation(s: &str) -> Result<String> {
    let t = s.trim().to_ascii_uppercase().replace(' ', "-");
    match t.as_str() {
        "READ-UNCOMMITTED" | "READ-COMMITTED" | "REPEATABLE-READ" | "SERIALIZABLE" => Ok(t),
        _ => Err(DriverError::WrongValueForVariable(
            "transaction_isolation".into(),
            s.into(),
        )),
    }
}

fn default_collation(charset: &str) -> &'static str {
    match charset.to_ascii_lowercase().as_str() {
        "utf8" | "utf8mb3" => "utf8mb3_general_ci",
        "latin1" => "latin1_swedish_ci",
        "binary" => "binary",
        "ascii" => "ascii_general_ci",
        _ => "utf8mb4_0900_ai_ci",
    }
}
