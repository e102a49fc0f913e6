//! Startup repair of catalog drift: engine tables without catalog rows get
//! rows synthesized from the best available type source, and catalog rows
//! of vanished tables are purged.

use std::collections::HashMap;

use rusqlite::types::Value;
use tracing::{debug, info, warn};

use super::builder::Mutator;
use super::ddl::{self, CreateTable, TableBody};
use super::store::CatalogStore;
use super::types::infer_from_affinity;
use crate::engine::Engine;
use crate::error::Result;
use crate::ident;
use crate::lexer;

/// Catalog variable recording the driver version that last reconciled.
pub const VERSION_VARIABLE: &str = "driver_version";
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Legacy per-column type hints written by older installations.
pub const TYPE_CACHE_TABLE: &str = "_mysql_data_types_cache";

#[derive(Debug, Default, PartialEq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub purged: Vec<String>,
}

pub struct Reconciler<'e> {
    engine: &'e Engine,
    /// Authoritative CREATE TABLE definitions keyed by folded table name.
    schema_source: HashMap<String, CreateTable>,
}

impl<'e> Reconciler<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Reconciler {
            engine,
            schema_source: HashMap::new(),
        }
    }

    /// Uses the CREATE TABLE statements of a MySQL DDL script as the
    /// preferred source of table definitions. Other statements are skipped.
    pub fn with_schema_script(mut self, script: &str) -> Result<Self> {
        for statement in lexer::split_statements(script)? {
            let head: Vec<String> = lexer::tokenize(&statement, true)?
                .iter()
                .take(3)
                .filter_map(|t| t.ident().map(|w| w.to_ascii_uppercase()))
                .collect();
            let is_create_table = head.first().map(String::as_str) == Some("CREATE")
                && head.iter().skip(1).any(|w| w == "TABLE");
            if !is_create_table {
                continue;
            }
            match ddl::parse_create_table(&statement) {
                Ok(table) => {
                    self.schema_source.insert(ident::fold(&table.name), table);
                }
                Err(err) => warn!(%err, "skipping unparsable schema statement"),
            }
        }
        Ok(self)
    }

    /// Whether the recorded driver version differs from this build.
    pub fn is_due(store: &CatalogStore, force: bool) -> Result<bool> {
        if force {
            return Ok(true);
        }
        Ok(store.variable(VERSION_VARIABLE)?.as_deref() != Some(DRIVER_VERSION))
    }

    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let store = CatalogStore::new(self.engine);
        store.ensure_tables()?;
        store.ensure_temporary_tables()?;
        let mutator = Mutator::new(CatalogStore::new(self.engine), false);

        let engine_tables = self.engine.list_tables(false)?;
        let catalog_tables = store.table_names(false)?;
        let mut report = ReconcileReport::default();

        for table in &engine_tables {
            if catalog_tables.iter().any(|c| ident::eq(c, table)) {
                continue;
            }
            store.delete(table, false)?;
            let definition = self.definition(table)?;
            let TableBody::Definition {
                columns,
                constraints,
                options,
            } = &definition.body
            else {
                continue;
            };
            mutator.record_create_table(table, false, columns, constraints, options)?;
            info!(table = %table, "recorded catalog rows for untracked table");
            report.added.push(table.clone());
        }

        for table in &catalog_tables {
            if engine_tables.iter().any(|e| ident::eq(e, table)) {
                continue;
            }
            store.delete(table, false)?;
            info!(table = %table, "purged catalog rows of missing table");
            report.purged.push(table.clone());
        }

        store.set_variable(VERSION_VARIABLE, DRIVER_VERSION)?;
        Ok(report)
    }

    fn definition(&self, table: &str) -> Result<CreateTable> {
        if let Some(known) = self.schema_source.get(&ident::fold(table)) {
            if matches!(known.body, TableBody::Definition { .. }) {
                debug!(table = %table, "using schema script definition");
                return Ok(known.clone());
            }
        }
        let ddl = self.synthesize(table)?;
        debug!(table = %table, ddl = %ddl, "synthesized definition");
        ddl::parse_create_table(&ddl)
    }

    fn type_hints(&self, table: &str) -> Result<HashMap<String, String>> {
        let present = self
            .engine
            .query_scalar(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::Text(TYPE_CACHE_TABLE.to_string())],
            )?
            .is_some();
        if !present {
            return Ok(HashMap::new());
        }
        let rows = self.engine.query(
            &format!(
                "SELECT column_or_index, mysql_type FROM {TYPE_CACHE_TABLE} WHERE \"table\" = ? COLLATE NOCASE"
            ),
            &[Value::Text(table.to_string())],
        )?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|r| {
                let mut it = r.into_iter().map(|c| c.to_text());
                Some((ident::fold(&it.next()??), it.next()??))
            })
            .collect())
    }

    /// MySQL DDL describing an engine table, with types from the legacy
    /// cache or inferred from column affinity.
    fn synthesize(&self, table: &str) -> Result<String> {
        let hints = self.type_hints(table)?;
        let quoted = ident::quote(table);
        let create_sql = self
            .engine
            .query_scalar("SELECT sql FROM sqlite_master WHERE name = ?", &[Value::Text(table.to_string())])?
            .and_then(|c| c.to_text())
            .unwrap_or_default();
        let autoincrement = create_sql.to_ascii_uppercase().contains("AUTOINCREMENT");

        let prefix = format!("{table}__");
        let mut keys = Vec::new();
        let mut keyed: Vec<String> = Vec::new();
        let indexes = self.engine.query(&format!("PRAGMA index_list({quoted})"), &[])?;
        for row in &indexes.rows {
            let index = row.get(1).and_then(|c| c.to_text()).unwrap_or_default();
            let unique = row.get(2).and_then(|c| c.as_i64()).unwrap_or(0) != 0;
            let origin = row.get(3).and_then(|c| c.to_text()).unwrap_or_default();
            if origin == "pk" {
                continue;
            }
            let parts = self
                .engine
                .query(&format!("PRAGMA index_info({})", ident::quote(&index)), &[])?;
            let columns: Option<Vec<String>> = parts
                .rows
                .iter()
                .map(|r| r.get(2).and_then(|c| c.to_text()))
                .collect();
            // Expression indexes have no column names.
            let Some(columns) = columns.filter(|c| !c.is_empty()) else {
                continue;
            };
            let mysql_name = match index.strip_prefix(&prefix) {
                Some(stripped) if origin == "c" => stripped.to_string(),
                _ if origin == "c" => index.clone(),
                // Inline UNIQUE constraints carry engine-generated names.
                _ => String::new(),
            };
            keyed.extend(columns.iter().map(|c| ident::fold(c)));
            if mysql_name == "PRIMARY" {
                keys.push(format!("PRIMARY KEY ({})", quote_list(&columns)));
                continue;
            }
            let name = if mysql_name.is_empty() {
                String::new()
            } else {
                ident::quote_mysql(&mysql_name)
            };
            keys.push(format!(
                "{} {name} ({})",
                if unique { "UNIQUE KEY" } else { "KEY" },
                quote_list(&columns)
            ));
        }

        let info = self.engine.query(&format!("PRAGMA table_info({quoted})"), &[])?;
        let mut defs = Vec::new();
        let mut primary: Vec<(i64, String)> = Vec::new();
        for row in &info.rows {
            let name = row.get(1).and_then(|c| c.to_text()).unwrap_or_default();
            let declared = row.get(2).and_then(|c| c.to_text()).unwrap_or_default();
            let not_null = row.get(3).and_then(|c| c.as_i64()).unwrap_or(0) != 0;
            let default = row.get(4).and_then(|c| c.to_text());
            let pk = row.get(5).and_then(|c| c.as_i64()).unwrap_or(0);
            let folded = ident::fold(&name);

            let ty = match hints.get(&folded) {
                Some(hint) => hint.clone(),
                None => {
                    let inferred = infer_from_affinity(&declared);
                    // MySQL cannot index unbounded text without a prefix.
                    match inferred {
                        "text" if pk > 0 || keyed.contains(&folded) => "varchar(255)",
                        "longblob" if pk > 0 || keyed.contains(&folded) => "varbinary(255)",
                        other => other,
                    }
                    .to_string()
                }
            };
            let mut def = format!("{} {ty}", ident::quote_mysql(&name));
            if not_null {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = default.as_deref().and_then(mysql_default) {
                def.push_str(" DEFAULT ");
                def.push_str(&default);
            }
            if pk > 0 {
                if autoincrement && declared.eq_ignore_ascii_case("INTEGER") {
                    def.push_str(" AUTO_INCREMENT");
                }
                primary.push((pk, name.clone()));
            }
            defs.push(def);
        }
        primary.sort();
        // A `PRIMARY` unique index holds the MySQL key when the engine key
        // is only the auto-increment column.
        if !primary.is_empty() && !keys.iter().any(|k| k.starts_with("PRIMARY KEY")) {
            let cols: Vec<String> = primary.into_iter().map(|(_, c)| c).collect();
            defs.push(format!("PRIMARY KEY ({})", quote_list(&cols)));
        }
        defs.extend(keys);
        Ok(format!("CREATE TABLE {} ({})", ident::quote_mysql(table), defs.join(", ")))
    }
}

fn quote_list(columns: &[String]) -> String {
    columns.iter().map(|c| ident::quote_mysql(c)).collect::<Vec<_>>().join(", ")
}

/// Engine default text as a MySQL DDL default, when it has a direct
/// equivalent.
fn mysql_default(text: &str) -> Option<String> {
    let t = text.trim();
    if t.eq_ignore_ascii_case("NULL") {
        return Some("NULL".into());
    }
    if t.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
        return Some("CURRENT_TIMESTAMP".into());
    }
    if t.starts_with('\'') && t.ends_with('\'') && t.len() >= 2 {
        return Some(t.to_string());
    }
    let unsigned = t.strip_prefix('-').unwrap_or(t);
    if !unsigned.is_empty() && unsigned.parse::<f64>().is_ok() {
        return Some(t.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Engine {
        let engine = Engine::open_in_memory().unwrap();
        CatalogStore::new(&engine).ensure_tables().unwrap();
        engine
    }

    #[test]
    fn untracked_tables_get_inferred_rows() {
        let engine = setup();
        engine
            .execute_batch(
                "CREATE TABLE legacy (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL DEFAULT 'x', score REAL, raw BLOB, n NUMERIC);
                 CREATE UNIQUE INDEX legacy__by_name ON legacy (name);",
            )
            .unwrap();
        let report = Reconciler::new(&engine).reconcile().unwrap();
        assert_eq!(report.added, vec!["legacy"]);

        let store = CatalogStore::new(&engine);
        let t = store.load("legacy", false).unwrap().unwrap();
        let types: Vec<String> = t.columns.iter().map(|c| c.ty.column_type()).collect();
        assert_eq!(types, vec!["int", "varchar(255)", "double", "longblob", "decimal(10,0)"]);
        assert!(t.columns[0].auto_increment);
        assert_eq!(t.columns[1].default.as_deref(), Some("x"));
        assert!(t.index("by_name").is_some_and(|i| i.unique));
        assert_eq!(store.variable(VERSION_VARIABLE).unwrap().as_deref(), Some(DRIVER_VERSION));
    }

    #[test]
    fn type_cache_and_schema_script_take_precedence() {
        let engine = setup();
        engine
            .execute_batch(
                "CREATE TABLE a (id INTEGER, label TEXT);
                 CREATE TABLE b (code TEXT);
                 CREATE TABLE _mysql_data_types_cache (\"table\" TEXT, column_or_index TEXT, mysql_type TEXT);
                 INSERT INTO _mysql_data_types_cache VALUES ('a', 'label', 'varchar(32)');",
            )
            .unwrap();
        let reconciler = Reconciler::new(&engine)
            .with_schema_script("SET NAMES utf8mb4; CREATE TABLE `b` (`code` char(3) NOT NULL, PRIMARY KEY (`code`));")
            .unwrap();
        reconciler.reconcile().unwrap();
        let store = CatalogStore::new(&engine);
        let a = store.load("a", false).unwrap().unwrap();
        assert_eq!(a.columns[1].ty.column_type(), "varchar(32)");
        let b = store.load("b", false).unwrap().unwrap();
        assert_eq!(b.columns[0].ty.column_type(), "char(3)");
        assert_eq!(b.columns[0].key, "PRI");
    }

    #[test]
    fn stale_rows_are_purged_and_consistent_tables_untouched() {
        let engine = setup();
        engine.execute_batch("CREATE TABLE kept (x INTEGER)").unwrap();
        Reconciler::new(&engine).reconcile().unwrap();
        engine.execute_batch("DROP TABLE kept; CREATE TABLE fresh (y TEXT)").unwrap();
        let report = Reconciler::new(&engine).reconcile().unwrap();
        assert_eq!(report.added, vec!["fresh"]);
        assert_eq!(report.purged, vec!["kept"]);

        let store = CatalogStore::new(&engine);
        assert!(!Reconciler::is_due(&store, false).unwrap());
        assert!(Reconciler::is_due(&store, true).unwrap());
    }
}
