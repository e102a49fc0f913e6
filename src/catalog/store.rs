//! Catalog Store: INFORMATION_SCHEMA-shaped tables kept in the engine next to
//! user data, in a persistent set and a per-connection temporary set.

use super::types::MysqlType;
use super::{
    CheckInfo, ColumnInfo, ForeignKeyInfo, Generated, IndexInfo, IndexKind, KeyPart, TableSchema,
    SCHEMA_SENTINEL,
};
use crate::engine::{Engine, RowSet};
use crate::error::{DriverError, Result};
use crate::ident;
use rusqlite::types::Value;

pub const PREFIX: &str = "_mysql_information_schema_";
pub const TEMPORARY_PREFIX: &str = "_mysql_information_schema_temporary_";
pub const VARIABLES_TABLE: &str = "_mysql_global_variables";

/// INFORMATION_SCHEMA views backed by the store, with their columns in
/// MySQL order. Columns named in `schema_columns` hold the sentinel schema.
#[derive(Debug, PartialEq)]
pub struct InfoSchemaTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub schema_columns: &'static [&'static str],
}

pub const TABLES: InfoSchemaTable = InfoSchemaTable {
    name: "tables",
    columns: &[
        "table_catalog",
        "table_schema",
        "table_name",
        "table_type",
        "engine",
        "version",
        "row_format",
        "table_rows",
        "avg_row_length",
        "data_length",
        "max_data_length",
        "index_length",
        "data_free",
        "auto_increment",
        "create_time",
        "update_time",
        "check_time",
        "table_collation",
        "checksum",
        "create_options",
        "table_comment",
    ],
    schema_columns: &["table_schema"],
};

pub const COLUMNS: InfoSchemaTable = InfoSchemaTable {
    name: "columns",
    columns: &[
        "table_catalog",
        "table_schema",
        "table_name",
        "column_name",
        "ordinal_position",
        "column_default",
        "is_nullable",
        "data_type",
        "character_maximum_length",
        "character_octet_length",
        "numeric_precision",
        "numeric_scale",
        "datetime_precision",
        "character_set_name",
        "collation_name",
        "column_type",
        "column_key",
        "extra",
        "privileges",
        "column_comment",
        "generation_expression",
        "srs_id",
    ],
    schema_columns: &["table_schema"],
};

pub const STATISTICS: InfoSchemaTable = InfoSchemaTable {
    name: "statistics",
    columns: &[
        "table_catalog",
        "table_schema",
        "table_name",
        "non_unique",
        "index_schema",
        "index_name",
        "seq_in_index",
        "column_name",
        "collation",
        "cardinality",
        "sub_part",
        "packed",
        "nullable",
        "index_type",
        "comment",
        "index_comment",
        "is_visible",
        "expression",
    ],
    schema_columns: &["table_schema", "index_schema"],
};

pub const TABLE_CONSTRAINTS: InfoSchemaTable = InfoSchemaTable {
    name: "table_constraints",
    columns: &[
        "constraint_catalog",
        "constraint_schema",
        "constraint_name",
        "table_schema",
        "table_name",
        "constraint_type",
        "enforced",
    ],
    schema_columns: &["constraint_schema", "table_schema"],
};

pub const REFERENTIAL_CONSTRAINTS: InfoSchemaTable = InfoSchemaTable {
    name: "referential_constraints",
    columns: &[
        "constraint_catalog",
        "constraint_schema",
        "constraint_name",
        "unique_constraint_catalog",
        "unique_constraint_schema",
        "unique_constraint_name",
        "match_option",
        "update_rule",
        "delete_rule",
        "table_name",
        "referenced_table_name",
    ],
    schema_columns: &["constraint_schema", "unique_constraint_schema"],
};

pub const KEY_COLUMN_USAGE: InfoSchemaTable = InfoSchemaTable {
    name: "key_column_usage",
    columns: &[
        "constraint_catalog",
        "constraint_schema",
        "constraint_name",
        "table_catalog",
        "table_schema",
        "table_name",
        "column_name",
        "ordinal_position",
        "position_in_unique_constraint",
        "referenced_table_schema",
        "referenced_table_name",
        "referenced_column_name",
    ],
    schema_columns: &["constraint_schema", "table_schema", "referenced_table_schema"],
};

pub const CHECK_CONSTRAINTS: InfoSchemaTable = InfoSchemaTable {
    name: "check_constraints",
    columns: &[
        "constraint_catalog",
        "constraint_schema",
        "constraint_name",
        "check_clause",
    ],
    schema_columns: &["constraint_schema"],
};

pub const SCHEMATA: InfoSchemaTable = InfoSchemaTable {
    name: "schemata",
    columns: &[
        "catalog_name",
        "schema_name",
        "default_character_set_name",
        "default_collation_name",
        "sql_path",
        "default_encryption",
    ],
    schema_columns: &["schema_name"],
};

pub const ALL: &[&InfoSchemaTable] = &[
    &TABLES,
    &COLUMNS,
    &STATISTICS,
    &TABLE_CONSTRAINTS,
    &REFERENTIAL_CONSTRAINTS,
    &KEY_COLUMN_USAGE,
    &CHECK_CONSTRAINTS,
    &SCHEMATA,
];

pub fn info_schema_table(name: &str) -> Option<&'static InfoSchemaTable> {
    ALL.iter().copied().find(|t| ident::eq(t.name, name))
}

/// Physical name of a catalog table.
pub fn physical(table: &InfoSchemaTable, temporary: bool) -> String {
    if temporary {
        format!("temp.{TEMPORARY_PREFIX}{}", table.name)
    } else {
        format!("{PREFIX}{}", table.name)
    }
}

const NAME_COLUMNS: &[&str] = &[
    "table_schema",
    "table_name",
    "column_name",
    "index_schema",
    "index_name",
    "constraint_schema",
    "constraint_name",
    "unique_constraint_schema",
    "unique_constraint_name",
    "referenced_table_schema",
    "referenced_table_name",
    "referenced_column_name",
    "schema_name",
];

fn create_sql(table: &InfoSchemaTable, temporary: bool) -> String {
    let mut cols: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            if NAME_COLUMNS.contains(c) {
                format!("{c} TEXT COLLATE NOCASE")
            } else {
                c.to_string()
            }
        })
        .collect();
    // CHECK_CONSTRAINTS has no table column in MySQL; the store needs one.
    if table.name == "check_constraints" {
        cols.push("table_name TEXT COLLATE NOCASE".into());
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        physical(table, temporary),
        cols.join(", ")
    )
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

fn opt_text(v: Option<String>) -> Value {
    v.map(Value::Text).unwrap_or(Value::Null)
}

fn row_text(rows: &RowSet, row: usize, col: &str) -> Option<String> {
    let idx = rows.columns.iter().position(|c| c == col)?;
    rows.rows.get(row)?.get(idx)?.to_text()
}

fn row_int(rows: &RowSet, row: usize, col: &str) -> Option<i64> {
    let idx = rows.columns.iter().position(|c| c == col)?;
    rows.rows.get(row)?.get(idx)?.as_i64()
}

pub struct CatalogStore<'e> {
    engine: &'e Engine,
}

impl<'e> CatalogStore<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        CatalogStore { engine }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Creates the persistent catalog tables and the version table.
    pub fn ensure_tables(&self) -> Result<()> {
        for table in ALL {
            self.engine.execute_batch(&create_sql(table, false))?;
        }
        self.engine.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {VARIABLES_TABLE} (name TEXT PRIMARY KEY, value TEXT)"
        ))?;
        let schemata = physical(&SCHEMATA, false);
        let present = self
            .engine
            .query_scalar(&format!("SELECT COUNT(*) FROM {schemata}"), &[])?
            .and_then(|c| c.as_i64())
            .unwrap_or(0);
        if present == 0 {
            self.engine.execute(
                &format!(
                    "INSERT INTO {schemata} VALUES ('def', ?, 'utf8mb4', 'utf8mb4_0900_ai_ci', NULL, 'NO')"
                ),
                &[text(SCHEMA_SENTINEL)],
            )?;
        }
        Ok(())
    }

    /// Creates the temporary-table catalog for this connection.
    pub fn ensure_temporary_tables(&self) -> Result<()> {
        for table in ALL.iter().filter(|t| t.name != "schemata") {
            self.engine.execute_batch(&create_sql(table, true))?;
        }
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .engine
            .query_scalar(
                &format!("SELECT value FROM {VARIABLES_TABLE} WHERE name = ?"),
                &[text(name)],
            )?
            .and_then(|c| c.to_text()))
    }

    pub fn set_variable(&self, name: &str, value: &str) -> Result<()> {
        self.engine.execute(
            &format!(
                "INSERT INTO {VARIABLES_TABLE} (name, value) VALUES (?, ?) \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value"
            ),
            &[text(name), text(value)],
        )?;
        Ok(())
    }

    /// Stored table names, in creation order.
    pub fn table_names(&self, temporary: bool) -> Result<Vec<String>> {
        self.engine.query_strings(
            &format!(
                "SELECT table_name FROM {} ORDER BY rowid",
                physical(&TABLES, temporary)
            ),
            &[],
        )
    }

    /// Finds a table by name, temporary tables shadowing persistent ones.
    /// Returns its stored name and whether it is temporary.
    pub fn resolve(&self, name: &str) -> Result<Option<(String, bool)>> {
        for temporary in [true, false] {
            let found = self.engine.query_scalar(
                &format!(
                    "SELECT table_name FROM {} WHERE table_name = ?",
                    physical(&TABLES, temporary)
                ),
                &[text(name)],
            )?;
            if let Some(stored) = found.and_then(|c| c.to_text()) {
                return Ok(Some((stored, temporary)));
            }
        }
        Ok(None)
    }

    pub fn exists(&self, name: &str, temporary: bool) -> Result<bool> {
        Ok(self
            .engine
            .query_scalar(
                &format!(
                    "SELECT 1 FROM {} WHERE table_name = ?",
                    physical(&TABLES, temporary)
                ),
                &[text(name)],
            )?
            .is_some())
    }

    /// Loads a table, temporary first.
    pub fn load_any(&self, name: &str) -> Result<Option<TableSchema>> {
        match self.resolve(name)? {
            Some((stored, temporary)) => self.load(&stored, temporary),
            None => Ok(None),
        }
    }

    pub fn load(&self, name: &str, temporary: bool) -> Result<Option<TableSchema>> {
        let tables = self.engine.query(
            &format!(
                "SELECT * FROM {} WHERE table_name = ?",
                physical(&TABLES, temporary)
            ),
            &[text(name)],
        )?;
        if tables.rows.is_empty() {
            return Ok(None);
        }
        let stored = row_text(&tables, 0, "table_name").unwrap_or_else(|| name.to_string());
        let mut schema = TableSchema::new(&stored, temporary);
        schema.engine = row_text(&tables, 0, "engine").unwrap_or_default();
        schema.row_format = row_text(&tables, 0, "row_format").unwrap_or_default();
        schema.collation = row_text(&tables, 0, "table_collation").unwrap_or_default();
        schema.comment = row_text(&tables, 0, "table_comment").unwrap_or_default();
        schema.auto_increment = row_int(&tables, 0, "auto_increment");
        schema.create_time = row_text(&tables, 0, "create_time").unwrap_or_default();

        schema.columns = self.load_columns(&stored, temporary)?;
        schema.indexes = self.load_indexes(&stored, temporary)?;
        schema.foreign_keys = self.load_foreign_keys(&stored, temporary)?;
        schema.checks = self.load_checks(&stored, temporary)?;
        Ok(Some(schema))
    }

    fn load_columns(&self, table: &str, temporary: bool) -> Result<Vec<ColumnInfo>> {
        let rows = self.engine.query(
            &format!(
                "SELECT * FROM {} WHERE table_name = ? ORDER BY ordinal_position",
                physical(&COLUMNS, temporary)
            ),
            &[text(table)],
        )?;
        let mut out = Vec::with_capacity(rows.rows.len());
        for i in 0..rows.rows.len() {
            let name = row_text(&rows, i, "column_name").unwrap_or_default();
            let column_type = row_text(&rows, i, "column_type").unwrap_or_default();
            let mut ty = MysqlType::parse(&column_type).map_err(|e| {
                DriverError::Invalid(format!("catalog column {table}.{name}: {e}"))
            })?;
            let collation = row_text(&rows, i, "collation_name");
            if ty.is_textual() {
                ty.charset = row_text(&rows, i, "character_set_name")
                    .filter(|c| c != super::DEFAULT_CHARSET);
                ty.collation = collation.filter(|c| c != super::DEFAULT_COLLATION);
            }
            let extra = row_text(&rows, i, "extra").unwrap_or_default();
            let generation = row_text(&rows, i, "generation_expression").unwrap_or_default();
            let mut column = ColumnInfo::new(&name, ty);
            column.nullable = row_text(&rows, i, "is_nullable").as_deref() == Some("YES");
            column.default = row_text(&rows, i, "column_default");
            column.default_generated = extra.contains("DEFAULT_GENERATED");
            column.auto_increment = extra.contains("auto_increment");
            column.on_update_current_timestamp = extra.contains("on update CURRENT_TIMESTAMP");
            if extra.contains("GENERATED") && !generation.is_empty() {
                column.generated = Some(Generated {
                    expression: generation,
                    stored: extra.contains("STORED GENERATED"),
                });
            }
            column.comment = row_text(&rows, i, "column_comment").unwrap_or_default();
            column.key = row_text(&rows, i, "column_key").unwrap_or_default();
            out.push(column);
        }
        Ok(out)
    }

    fn load_indexes(&self, table: &str, temporary: bool) -> Result<Vec<IndexInfo>> {
        let rows = self.engine.query(
            &format!(
                "SELECT * FROM {} WHERE table_name = ? ORDER BY rowid",
                physical(&STATISTICS, temporary)
            ),
            &[text(table)],
        )?;
        let mut out: Vec<IndexInfo> = Vec::new();
        for i in 0..rows.rows.len() {
            let name = row_text(&rows, i, "index_name").unwrap_or_default();
            let part = KeyPart {
                column: row_text(&rows, i, "column_name"),
                expression: row_text(&rows, i, "expression"),
                sub_part: row_int(&rows, i, "sub_part").map(|n| n as u32),
                descending: row_text(&rows, i, "collation").as_deref() == Some("D"),
            };
            match out.iter_mut().find(|idx| idx.name == name) {
                Some(idx) => idx.parts.push(part),
                None => out.push(IndexInfo {
                    name,
                    unique: row_int(&rows, i, "non_unique") == Some(0),
                    kind: IndexKind::parse(&row_text(&rows, i, "index_type").unwrap_or_default()),
                    parts: vec![part],
                    comment: row_text(&rows, i, "index_comment").unwrap_or_default(),
                    visible: row_text(&rows, i, "is_visible").as_deref() != Some("NO"),
                }),
            }
        }
        Ok(out)
    }

    fn load_foreign_keys(&self, table: &str, temporary: bool) -> Result<Vec<ForeignKeyInfo>> {
        let refs = self.engine.query(
            &format!(
                "SELECT constraint_name, update_rule, delete_rule, referenced_table_name \
                 FROM {} WHERE table_name = ? ORDER BY rowid",
                physical(&REFERENTIAL_CONSTRAINTS, temporary)
            ),
            &[text(table)],
        )?;
        let mut out = Vec::new();
        for i in 0..refs.rows.len() {
            let name = row_text(&refs, i, "constraint_name").unwrap_or_default();
            let usage = self.engine.query(
                &format!(
                    "SELECT column_name, referenced_column_name FROM {} \
                     WHERE table_name = ? AND constraint_name = ? \
                     AND referenced_table_name IS NOT NULL ORDER BY ordinal_position",
                    physical(&KEY_COLUMN_USAGE, temporary)
                ),
                &[text(table), text(&name)],
            )?;
            let columns = (0..usage.rows.len())
                .filter_map(|j| row_text(&usage, j, "column_name"))
                .collect();
            let referenced_columns = (0..usage.rows.len())
                .filter_map(|j| row_text(&usage, j, "referenced_column_name"))
                .collect();
            out.push(ForeignKeyInfo {
                name,
                columns,
                referenced_table: row_text(&refs, i, "referenced_table_name").unwrap_or_default(),
                referenced_columns,
                on_update: row_text(&refs, i, "update_rule").unwrap_or_else(|| "NO ACTION".into()),
                on_delete: row_text(&refs, i, "delete_rule").unwrap_or_else(|| "NO ACTION".into()),
            });
        }
        Ok(out)
    }

    fn load_checks(&self, table: &str, temporary: bool) -> Result<Vec<CheckInfo>> {
        let rows = self.engine.query(
            &format!(
                "SELECT c.constraint_name, c.check_clause, t.enforced FROM {} c \
                 LEFT JOIN {} t ON t.table_name = c.table_name \
                 AND t.constraint_name = c.constraint_name AND t.constraint_type = 'CHECK' \
                 WHERE c.table_name = ? ORDER BY c.rowid",
                physical(&CHECK_CONSTRAINTS, temporary),
                physical(&TABLE_CONSTRAINTS, temporary)
            ),
            &[text(table)],
        )?;
        Ok((0..rows.rows.len())
            .map(|i| CheckInfo {
                name: row_text(&rows, i, "constraint_name").unwrap_or_default(),
                clause: row_text(&rows, i, "check_clause").unwrap_or_default(),
                enforced: row_text(&rows, i, "enforced").as_deref() != Some("NO"),
            })
            .collect())
    }

    /// Deletes every catalog row of a table.
    pub fn delete(&self, name: &str, temporary: bool) -> Result<()> {
        for table in ALL.iter().filter(|t| t.name != "schemata") {
            self.engine.execute(
                &format!(
                    "DELETE FROM {} WHERE table_name = ?",
                    physical(table, temporary)
                ),
                &[text(name)],
            )?;
        }
        Ok(())
    }

    /// Replaces every catalog row of a table with rows describing `schema`.
    pub fn write(&self, schema: &TableSchema) -> Result<()> {
        self.delete(&schema.name, schema.temporary)?;
        let temporary = schema.temporary;
        let name = text(&schema.name);
        let sentinel = text(SCHEMA_SENTINEL);

        self.engine.execute(
            &format!(
                "INSERT INTO {} (table_catalog, table_schema, table_name, table_type, engine, \
                 version, row_format, table_rows, avg_row_length, data_length, max_data_length, \
                 index_length, data_free, auto_increment, create_time, update_time, check_time, \
                 table_collation, checksum, create_options, table_comment) \
                 VALUES ('def', ?, ?, ?, ?, 10, ?, 0, 0, 0, 0, 0, 0, ?, ?, NULL, NULL, ?, NULL, '', ?)",
                physical(&TABLES, temporary)
            ),
            &[
                sentinel.clone(),
                name.clone(),
                text(if temporary { "LOCAL TEMPORARY" } else { "BASE TABLE" }),
                text(&schema.engine),
                text(&schema.row_format),
                opt_int(schema.auto_increment),
                text(&schema.create_time),
                text(&schema.collation),
                text(&schema.comment),
            ],
        )?;

        for (pos, column) in schema.columns.iter().enumerate() {
            let ty = &column.ty;
            self.engine.execute(
                &format!(
                    "INSERT INTO {} (table_catalog, table_schema, table_name, column_name, \
                     ordinal_position, column_default, is_nullable, data_type, \
                     character_maximum_length, character_octet_length, numeric_precision, \
                     numeric_scale, datetime_precision, character_set_name, collation_name, \
                     column_type, column_key, extra, privileges, column_comment, \
                     generation_expression, srs_id) \
                     VALUES ('def', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                     'select,insert,update,references', ?, ?, NULL)",
                    physical(&COLUMNS, temporary)
                ),
                &[
                    sentinel.clone(),
                    name.clone(),
                    text(&column.name),
                    Value::Integer(pos as i64 + 1),
                    opt_text(column.default.clone()),
                    text(if column.nullable { "YES" } else { "NO" }),
                    text(&ty.data_type),
                    opt_int(ty.character_maximum_length()),
                    opt_int(ty.character_octet_length()),
                    opt_int(ty.numeric_precision()),
                    opt_int(ty.numeric_scale()),
                    opt_int(ty.datetime_precision()),
                    opt_text(column.charset()),
                    opt_text(column.collation()),
                    text(&ty.column_type()),
                    text(&column.key),
                    text(&column.extra()),
                    text(&column.comment),
                    text(
                        column
                            .generated
                            .as_ref()
                            .map(|g| g.expression.as_str())
                            .unwrap_or(""),
                    ),
                ],
            )?;
        }

        for index in &schema.indexes {
            for (seq, part) in index.parts.iter().enumerate() {
                let nullable = part
                    .column
                    .as_deref()
                    .and_then(|c| schema.column(c))
                    .map(|c| c.nullable)
                    .unwrap_or(true);
                let collation = match index.kind {
                    IndexKind::Btree if part.descending => Value::Text("D".into()),
                    IndexKind::Btree => Value::Text("A".into()),
                    _ => Value::Null,
                };
                self.engine.execute(
                    &format!(
                        "INSERT INTO {} (table_catalog, table_schema, table_name, non_unique, \
                         index_schema, index_name, seq_in_index, column_name, collation, \
                         cardinality, sub_part, packed, nullable, index_type, comment, \
                         index_comment, is_visible, expression) \
                         VALUES ('def', ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, NULL, ?, ?, '', ?, ?, ?)",
                        physical(&STATISTICS, temporary)
                    ),
                    &[
                        sentinel.clone(),
                        name.clone(),
                        Value::Integer(!index.unique as i64),
                        sentinel.clone(),
                        text(&index.name),
                        Value::Integer(seq as i64 + 1),
                        opt_text(part.column.clone()),
                        collation,
                        opt_int(part.sub_part.map(|n| n as i64)),
                        text(if nullable { "YES" } else { "" }),
                        text(index.kind.as_str()),
                        text(&index.comment),
                        text(if index.visible { "YES" } else { "NO" }),
                        opt_text(part.expression.clone()),
                    ],
                )?;
            }
            if index.unique {
                let kind = if index.is_primary() { "PRIMARY KEY" } else { "UNIQUE" };
                self.insert_constraint(schema, &index.name, kind, true)?;
                for (pos, column) in index.column_names().iter().enumerate() {
                    self.insert_key_usage(schema, &index.name, column, pos + 1, None)?;
                }
            }
        }

        for fk in &schema.foreign_keys {
            self.insert_constraint(schema, &fk.name, "FOREIGN KEY", true)?;
            let unique_name = self.referenced_unique_index(schema, fk)?;
            self.engine.execute(
                &format!(
                    "INSERT INTO {} (constraint_catalog, constraint_schema, constraint_name, \
                     unique_constraint_catalog, unique_constraint_schema, unique_constraint_name, \
                     match_option, update_rule, delete_rule, table_name, referenced_table_name) \
                     VALUES ('def', ?, ?, 'def', ?, ?, 'NONE', ?, ?, ?, ?)",
                    physical(&REFERENTIAL_CONSTRAINTS, temporary)
                ),
                &[
                    sentinel.clone(),
                    text(&fk.name),
                    sentinel.clone(),
                    opt_text(unique_name),
                    text(&fk.on_update),
                    text(&fk.on_delete),
                    name.clone(),
                    text(&fk.referenced_table),
                ],
            )?;
            for (pos, (column, referenced)) in
                fk.columns.iter().zip(&fk.referenced_columns).enumerate()
            {
                self.insert_key_usage(
                    schema,
                    &fk.name,
                    column,
                    pos + 1,
                    Some((&fk.referenced_table, referenced.as_str())),
                )?;
            }
        }

        for check in &schema.checks {
            self.insert_constraint(schema, &check.name, "CHECK", check.enforced)?;
            self.engine.execute(
                &format!(
                    "INSERT INTO {} (constraint_catalog, constraint_schema, constraint_name, \
                     check_clause, table_name) VALUES ('def', ?, ?, ?, ?)",
                    physical(&CHECK_CONSTRAINTS, temporary)
                ),
                &[sentinel.clone(), text(&check.name), text(&check.clause), name.clone()],
            )?;
        }
        Ok(())
    }

    fn insert_constraint(
        &self,
        schema: &TableSchema,
        constraint: &str,
        kind: &str,
        enforced: bool,
    ) -> Result<()> {
        self.engine.execute(
            &format!(
                "INSERT INTO {} (constraint_catalog, constraint_schema, constraint_name, \
                 table_schema, table_name, constraint_type, enforced) \
                 VALUES ('def', ?, ?, ?, ?, ?, ?)",
                physical(&TABLE_CONSTRAINTS, schema.temporary)
            ),
            &[
                text(SCHEMA_SENTINEL),
                text(constraint),
                text(SCHEMA_SENTINEL),
                text(&schema.name),
                text(kind),
                text(if enforced { "YES" } else { "NO" }),
            ],
        )?;
        Ok(())
    }

    fn insert_key_usage(
        &self,
        schema: &TableSchema,
        constraint: &str,
        column: &str,
        position: usize,
        referenced: Option<(&str, &str)>,
    ) -> Result<()> {
        let (ref_schema, ref_table, ref_column, position_in_unique) = match referenced {
            Some((table, column)) => (
                text(SCHEMA_SENTINEL),
                text(table),
                text(column),
                Value::Integer(position as i64),
            ),
            None => (Value::Null, Value::Null, Value::Null, Value::Null),
        };
        self.engine.execute(
            &format!(
                "INSERT INTO {} (constraint_catalog, constraint_schema, constraint_name, \
                 table_catalog, table_schema, table_name, column_name, ordinal_position, \
                 position_in_unique_constraint, referenced_table_schema, referenced_table_name, \
                 referenced_column_name) VALUES ('def', ?, ?, 'def', ?, ?, ?, ?, ?, ?, ?, ?)",
                physical(&KEY_COLUMN_USAGE, schema.temporary)
            ),
            &[
                text(SCHEMA_SENTINEL),
                text(constraint),
                text(SCHEMA_SENTINEL),
                text(&schema.name),
                text(column),
                Value::Integer(position as i64),
                position_in_unique,
                ref_schema,
                ref_table,
                ref_column,
            ],
        )?;
        Ok(())
    }

    /// Name of the PRIMARY/UNIQUE index on the referenced table whose columns
    /// match the foreign key's referenced columns.
    fn referenced_unique_index(
        &self,
        schema: &TableSchema,
        fk: &ForeignKeyInfo,
    ) -> Result<Option<String>> {
        let referenced = if ident::eq(&fk.referenced_table, &schema.name) {
            Some(schema.clone())
        } else {
            self.load(&fk.referenced_table, schema.temporary)?
        };
        Ok(referenced.and_then(|t| {
            t.indexes
                .iter()
                .find(|i| {
                    i.unique
                        && i.parts.len() == fk.referenced_columns.len()
                        && i
                            .column_names()
                            .iter()
                            .zip(&fk.referenced_columns)
                            .all(|(a, b)| ident::eq(a, b))
                })
                .map(|i| i.name.clone())
        }))
    }

    /// Constraint names of a kind in use anywhere in the schema, with the
    /// table that owns each.
    pub fn constraint_names(&self, kind: &str, temporary: bool) -> Result<Vec<(String, String)>> {
        let rows = self.engine.query(
            &format!(
                "SELECT constraint_name, table_name FROM {} WHERE constraint_type = ?",
                physical(&TABLE_CONSTRAINTS, temporary)
            ),
            &[text(kind)],
        )?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|r| {
                let mut it = r.into_iter().map(|c| c.to_text());
                Some((it.next()??, it.next()??))
            })
            .collect())
    }

    /// Points foreign keys of other tables at a renamed table.
    pub fn rename_references(&self, old: &str, new: &str, temporary: bool) -> Result<()> {
        for table in [&REFERENTIAL_CONSTRAINTS, &KEY_COLUMN_USAGE] {
            self.engine.execute(
                &format!(
                    "UPDATE {} SET referenced_table_name = ? WHERE referenced_table_name = ?",
                    physical(table, temporary)
                ),
                &[text(new), text(old)],
            )?;
        }
        Ok(())
    }

    /// Tables whose foreign keys reference `table`.
    pub fn referencing_tables(&self, table: &str, temporary: bool) -> Result<Vec<String>> {
        self.engine.query_strings(
            &format!(
                "SELECT DISTINCT table_name FROM {} WHERE referenced_table_name = ?",
                physical(&REFERENTIAL_CONSTRAINTS, temporary)
            ),
            &[text(table)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cell;

    fn column(name: &str, ty: &str, nullable: bool) -> ColumnInfo {
        let mut c = ColumnInfo::new(name, MysqlType::parse(ty).unwrap());
        c.nullable = nullable;
        c
    }

    fn sample() -> TableSchema {
        let mut t = TableSchema::new("Users", false);
        let mut id = column("id", "bigint unsigned", false);
        id.auto_increment = true;
        let mut name = column("name", "varchar(50)", false);
        name.default = Some("anon".into());
        t.columns = vec![id, name, column("team_id", "int", true)];
        t.indexes = vec![
            IndexInfo {
                name: "PRIMARY".into(),
                unique: true,
                kind: IndexKind::Btree,
                parts: vec![KeyPart::column("id")],
                comment: String::new(),
                visible: true,
            },
            IndexInfo {
                name: "name_team".into(),
                unique: true,
                kind: IndexKind::Btree,
                parts: vec![
                    KeyPart {
                        sub_part: Some(10),
                        ..KeyPart::column("name")
                    },
                    KeyPart::column("team_id"),
                ],
                comment: String::new(),
                visible: true,
            },
        ];
        t.foreign_keys = vec![ForeignKeyInfo {
            name: "Users_ibfk_1".into(),
            columns: vec!["team_id".into()],
            referenced_table: "teams".into(),
            referenced_columns: vec!["id".into()],
            on_update: "NO ACTION".into(),
            on_delete: "CASCADE".into(),
        }];
        t.checks = vec![CheckInfo {
            name: "Users_chk_1".into(),
            clause: "(`team_id` > 0)".into(),
            enforced: true,
        }];
        t.sync_derived();
        t
    }

    #[test]
    fn info_schema_tables_resolve_case_insensitively() {
        assert_eq!(info_schema_table("STATISTICS"), Some(&STATISTICS));
        assert_eq!(info_schema_table("Key_Column_Usage"), Some(&KEY_COLUMN_USAGE));
        assert_eq!(info_schema_table("engines"), None);
        assert_eq!(physical(&TABLES, true), "temp._mysql_information_schema_temporary_tables");
    }

    #[test]
    fn write_then_load_round_trips() {
        let engine = Engine::open_in_memory().unwrap();
        let store = CatalogStore::new(&engine);
        store.ensure_tables().unwrap();
        store.ensure_temporary_tables().unwrap();

        let t = sample();
        store.write(&t).unwrap();
        let loaded = store.load("users", false).unwrap().unwrap();
        assert_eq!(loaded.name, "Users");
        assert_eq!(loaded.columns, t.columns);
        assert_eq!(loaded.indexes, t.indexes);
        assert_eq!(loaded.foreign_keys, t.foreign_keys);
        assert_eq!(loaded.checks, t.checks);

        assert_eq!(store.resolve("USERS").unwrap(), Some(("Users".into(), false)));
        assert!(store.load("users", true).unwrap().is_none());
    }

    #[test]
    fn delete_cascades_to_every_row() {
        let engine = Engine::open_in_memory().unwrap();
        let store = CatalogStore::new(&engine);
        store.ensure_tables().unwrap();
        store.write(&sample()).unwrap();
        store.delete("users", false).unwrap();
        for table in ALL.iter().filter(|t| t.name != "schemata") {
            let n = engine
                .query_scalar(&format!("SELECT COUNT(*) FROM {}", physical(table, false)), &[])
                .unwrap()
                .unwrap();
            assert_eq!(n, Cell::Int(0), "{}", table.name);
        }
    }

    #[test]
    fn variables_and_constraint_names() {
        let engine = Engine::open_in_memory().unwrap();
        let store = CatalogStore::new(&engine);
        store.ensure_tables().unwrap();
        store.set_variable("driver_version", "1").unwrap();
        store.set_variable("driver_version", "2").unwrap();
        assert_eq!(store.variable("driver_version").unwrap().as_deref(), Some("2"));

        store.write(&sample()).unwrap();
        let fks = store.constraint_names("FOREIGN KEY", false).unwrap();
        assert_eq!(fks, vec![("Users_ibfk_1".to_string(), "Users".to_string())]);
    }
}
