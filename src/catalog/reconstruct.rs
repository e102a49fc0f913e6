//! Physical schema derived from catalog rows: engine CREATE TABLE, index
//! and trigger statements, the copy-and-swap table rebuild used by ALTER
//! TABLE, and MySQL's SHOW CREATE TABLE text.

use super::types::TypeClass;
use super::{ColumnInfo, IndexInfo, IndexKind, TableSchema, DEFAULT_COLLATION};
use crate::coercion;
use crate::error::Result;
use crate::ident;
use crate::session::SqlMode;

/// Translates a MySQL expression (CHECK clause, generated column, default)
/// into engine SQL.
pub type Render<'a> = &'a dyn Fn(&str) -> Result<String>;

pub const REBUILD_PREFIX: &str = "_mysql_rebuild_";

/// Engine expression for `CURRENT_TIMESTAMP[(fsp)]`.
pub fn now_sql(fsp: u32) -> String {
    if fsp == 0 {
        "datetime('now', 'localtime')".to_string()
    } else {
        "strftime('%Y-%m-%d %H:%M:%f', 'now', 'localtime')".to_string()
    }
}

/// Engine name of a table or index, in the temp schema when temporary.
pub fn qualified(name: &str, temporary: bool) -> String {
    if temporary {
        format!("temp.{}", ident::quote(name))
    } else {
        ident::quote(name)
    }
}

/// The column that becomes the engine's `INTEGER PRIMARY KEY AUTOINCREMENT`.
fn rowid_column(schema: &TableSchema) -> Option<&ColumnInfo> {
    schema.auto_increment_column()
}

/// True when the MySQL primary key is exactly the auto-increment column,
/// so no extra unique index is needed to enforce it.
fn primary_is_rowid(schema: &TableSchema) -> bool {
    match (schema.primary_key(), rowid_column(schema)) {
        (Some(pk), Some(auto)) => pk.parts.len() == 1 && pk.covers_column(&auto.name),
        _ => false,
    }
}

/// Engine expression for the column default, if it has one.
pub fn default_sql(column: &ColumnInfo, render: Render) -> Result<Option<String>> {
    let Some(value) = &column.default else {
        return Ok(None);
    };
    if column.default_generated {
        let upper = value.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("CURRENT_TIMESTAMP") {
            let fsp = rest.trim_matches(|c| c == '(' || c == ')').parse().unwrap_or(0);
            return Ok(Some(format!("({})", now_sql(fsp))));
        }
        return Ok(Some(format!("({})", render(value)?)));
    }
    let numeric = matches!(
        column.ty.class(),
        TypeClass::Integer { .. } | TypeClass::Bit { .. } | TypeClass::Decimal { .. } | TypeClass::Float { .. }
    );
    if numeric && value.trim().parse::<f64>().is_ok() {
        return Ok(Some(value.trim().to_string()));
    }
    Ok(Some(ident::string_literal(value)))
}

fn column_sql(schema: &TableSchema, column: &ColumnInfo, render: Render) -> Result<String> {
    let mut out = ident::quote(&column.name);
    if rowid_column(schema).is_some_and(|c| ident::eq(&c.name, &column.name)) {
        out.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
        return Ok(out);
    }
    out.push(' ');
    out.push_str(column.ty.affinity());
    if let Some(generated) = &column.generated {
        out.push_str(&format!(
            " GENERATED ALWAYS AS ({}) {}",
            render(&generated.expression)?,
            if generated.stored { "STORED" } else { "VIRTUAL" }
        ));
    }
    if !column.nullable {
        out.push_str(" NOT NULL");
    }
    if column.generated.is_none() {
        if let Some(default) = default_sql(column, render)? {
            out.push_str(" DEFAULT ");
            out.push_str(&default);
        }
    }
    if column.is_case_insensitive() {
        out.push_str(" COLLATE NOCASE");
    }
    Ok(out)
}

/// Engine CREATE TABLE for `schema` under `physical_name`.
pub fn create_table_sql(schema: &TableSchema, physical_name: &str, render: Render) -> Result<String> {
    let mut defs = Vec::new();
    for column in &schema.columns {
        defs.push(column_sql(schema, column, render)?);
    }
    if rowid_column(schema).is_none() {
        if let Some(pk) = schema.primary_key() {
            let cols: Vec<String> = pk.column_names().iter().map(|c| ident::quote(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }
    }
    for check in schema.checks.iter().filter(|c| c.enforced) {
        defs.push(format!(
            "CONSTRAINT {} CHECK ({})",
            ident::quote(&check.name),
            render(&check.clause)?
        ));
    }
    Ok(format!(
        "CREATE {}TABLE {} (\n  {}\n)",
        if schema.temporary { "TEMP " } else { "" },
        ident::quote(physical_name),
        defs.join(",\n  ")
    ))
}

fn key_part_sql(schema: &TableSchema, index: &IndexInfo, render: Render) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    for part in &index.parts {
        let mut sql = match (&part.column, &part.expression) {
            (Some(column), _) => match part.sub_part {
                // Unique prefixes constrain only the prefix.
                Some(n) if index.unique => {
                    let collate = schema
                        .column(column)
                        .filter(|c| c.is_case_insensitive())
                        .map(|_| " COLLATE NOCASE")
                        .unwrap_or("");
                    format!("substr({}, 1, {n}){collate}", ident::quote(column))
                }
                _ => ident::quote(column),
            },
            (None, Some(expr)) => format!("({})", render(expr)?),
            (None, None) => continue,
        };
        if part.descending {
            sql.push_str(" DESC");
        }
        parts.push(sql);
    }
    Ok(parts)
}

/// Engine statement creating one catalog index, or `None` for indexes the
/// engine cannot represent (FULLTEXT, SPATIAL) and for a primary key the
/// table definition already enforces.
pub fn index_sql(schema: &TableSchema, index: &IndexInfo, physical_table: &str, render: Render) -> Result<Option<String>> {
    if index.kind != IndexKind::Btree {
        return Ok(None);
    }
    if index.is_primary() && (rowid_column(schema).is_none() || primary_is_rowid(schema)) {
        return Ok(None);
    }
    let parts = key_part_sql(schema, index, render)?;
    if parts.is_empty() {
        return Ok(None);
    }
    let name = ident::physical_index_name(&schema.name, &index.name);
    Ok(Some(format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        qualified(&name, schema.temporary),
        ident::quote(physical_table),
        parts.join(", ")
    )))
}

/// Triggers emulating `ON UPDATE CURRENT_TIMESTAMP`.
pub fn trigger_sql(schema: &TableSchema) -> Vec<String> {
    let table = ident::quote(&schema.name);
    schema
        .columns
        .iter()
        .filter(|c| c.on_update_current_timestamp)
        .map(|column| {
            let col = ident::quote(&column.name);
            let others: Vec<String> = schema
                .columns
                .iter()
                .filter(|c| !ident::eq(&c.name, &column.name) && c.generated.is_none())
                .map(|c| {
                    let q = ident::quote(&c.name);
                    format!("NEW.{q} IS NOT OLD.{q}")
                })
                .collect();
            let changed = if others.is_empty() {
                "0".to_string()
            } else {
                others.join(" OR ")
            };
            let fsp = column.ty.length.unwrap_or(0) as u32;
            format!(
                "CREATE {}TRIGGER {} AFTER UPDATE ON {table} FOR EACH ROW \
                 WHEN NEW.{col} IS OLD.{col} AND ({changed}) \
                 BEGIN UPDATE {table} SET {col} = {} WHERE rowid = NEW.rowid; END",
                if schema.temporary { "TEMP " } else { "" },
                ident::quote(&format!("{}__on_update_{}", schema.name, column.name)),
                now_sql(fsp)
            )
        })
        .collect()
}

/// CREATE TABLE plus every index and trigger of a table.
pub fn create_statements(schema: &TableSchema, render: Render) -> Result<Vec<String>> {
    let mut out = vec![create_table_sql(schema, &schema.name, render)?];
    for index in &schema.indexes {
        if let Some(sql) = index_sql(schema, index, &schema.name, render)? {
            out.push(sql);
        }
    }
    out.extend(trigger_sql(schema));
    Ok(out)
}

/// Copy-and-swap rebuild of `old_name` into the shape of `schema`.
/// `sources[i]` names the old column feeding `schema.columns[i]`.
pub fn rebuild_statements(
    old_name: &str,
    schema: &TableSchema,
    sources: &[Option<String>],
    sql_mode: SqlMode,
    strict: bool,
    render: Render,
) -> Result<Vec<String>> {
    let scratch = format!("{REBUILD_PREFIX}{}", schema.name);
    let mut out = vec![
        format!("DROP TABLE IF EXISTS {}", qualified(&scratch, schema.temporary)),
        create_table_sql(schema, &scratch, render)?,
    ];

    let mut targets = Vec::new();
    let mut values = Vec::new();
    for (column, source) in schema.columns.iter().zip(sources) {
        if column.generated.is_some() {
            continue;
        }
        let value = match source {
            Some(old) => coercion::coerce_expr(column, sql_mode, strict, &ident::quote(old)),
            // New NOT NULL columns are filled with the implicit default.
            None if !column.nullable && column.default.is_none() && !column.auto_increment => {
                match column.ty.implicit_default() {
                    Some(lit) => lit,
                    None => continue,
                }
            }
            None => continue,
        };
        targets.push(ident::quote(&column.name));
        values.push(value);
    }
    if !targets.is_empty() {
        out.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            qualified(&scratch, schema.temporary),
            targets.join(", "),
            values.join(", "),
            qualified(old_name, schema.temporary)
        ));
    }
    out.push(format!("DROP TABLE {}", qualified(old_name, schema.temporary)));
    out.push(format!(
        "ALTER TABLE {} RENAME TO {}",
        qualified(&scratch, schema.temporary),
        ident::quote(&schema.name)
    ));
    for index in &schema.indexes {
        if let Some(sql) = index_sql(schema, index, &schema.name, render)? {
            out.push(sql);
        }
    }
    out.extend(trigger_sql(schema));
    Ok(out)
}

fn mysql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn charset_of(collation: &str) -> &str {
    collation.split('_').next().unwrap_or(collation)
}

fn show_column(schema: &TableSchema, column: &ColumnInfo) -> String {
    let mut out = format!("{} {}", ident::quote_mysql(&column.name), column.ty.column_type());
    if let Some(collation) = column.ty.collation.as_deref().filter(|_| column.ty.is_textual()) {
        let collation = if collation == "binary" {
            column.collation().unwrap_or_default()
        } else {
            collation.to_string()
        };
        if !ident::eq(&collation, &schema.collation) {
            if charset_of(&collation) != charset_of(&schema.collation) {
                out.push_str(&format!(" CHARACTER SET {}", charset_of(&collation)));
            }
            out.push_str(&format!(" COLLATE {collation}"));
        }
    }
    if let Some(generated) = &column.generated {
        out.push_str(&format!(
            " GENERATED ALWAYS AS ({}) {}",
            generated.expression,
            if generated.stored { "STORED" } else { "VIRTUAL" }
        ));
    }
    let no_default_shown = column.ty.is_blob_or_text()
        || matches!(column.ty.class(), TypeClass::Json | TypeClass::Spatial);
    if !column.nullable {
        out.push_str(" NOT NULL");
    } else if column.ty.data_type == "timestamp" {
        out.push_str(" NULL");
    }
    if column.generated.is_none() && !column.auto_increment {
        match &column.default {
            Some(value) if column.default_generated => {
                if value.to_ascii_uppercase().starts_with("CURRENT_TIMESTAMP") {
                    out.push_str(&format!(" DEFAULT {value}"));
                } else {
                    out.push_str(&format!(" DEFAULT ({value})"));
                }
            }
            Some(value) if matches!(column.ty.class(), TypeClass::Bit { .. }) => {
                let bits = value.parse::<u64>().map(|v| format!("{v:b}")).unwrap_or_else(|_| value.clone());
                out.push_str(&format!(" DEFAULT b'{bits}'"));
            }
            Some(value) => out.push_str(&format!(" DEFAULT {}", mysql_string(value))),
            None if column.nullable && !no_default_shown => out.push_str(" DEFAULT NULL"),
            None => {}
        }
    }
    if column.auto_increment {
        out.push_str(" AUTO_INCREMENT");
    }
    if column.on_update_current_timestamp {
        let fsp = column.ty.length.unwrap_or(0);
        if fsp > 0 {
            out.push_str(&format!(" ON UPDATE CURRENT_TIMESTAMP({fsp})"));
        } else {
            out.push_str(" ON UPDATE CURRENT_TIMESTAMP");
        }
    }
    if !column.comment.is_empty() {
        out.push_str(&format!(" COMMENT {}", mysql_string(&column.comment)));
    }
    out
}

fn show_parts(index: &IndexInfo) -> String {
    index
        .parts
        .iter()
        .map(|p| {
            let mut s = match (&p.column, &p.expression) {
                (Some(c), _) => match p.sub_part {
                    Some(n) => format!("{}({n})", ident::quote_mysql(c)),
                    None => ident::quote_mysql(c),
                },
                (None, Some(e)) => format!("({e})"),
                (None, None) => String::new(),
            };
            if p.descending {
                s.push_str(" DESC");
            }
            s
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// MySQL's SHOW CREATE TABLE text. `next_auto_increment` is the value the
/// next generated id would take.
pub fn show_create_table(schema: &TableSchema, next_auto_increment: Option<i64>) -> String {
    let mut lines: Vec<String> = schema
        .columns
        .iter()
        .map(|c| format!("  {}", show_column(schema, c)))
        .collect();
    for index in &schema.indexes {
        let mut line = if index.is_primary() {
            format!("  PRIMARY KEY ({})", show_parts(index))
        } else {
            let kind = match (index.kind, index.unique) {
                (IndexKind::Fulltext, _) => "FULLTEXT KEY",
                (IndexKind::Spatial, _) => "SPATIAL KEY",
                (IndexKind::Btree, true) => "UNIQUE KEY",
                (IndexKind::Btree, false) => "KEY",
            };
            format!("  {kind} {} ({})", ident::quote_mysql(&index.name), show_parts(index))
        };
        if !index.comment.is_empty() {
            line.push_str(&format!(" COMMENT {}", mysql_string(&index.comment)));
        }
        if !index.visible {
            line.push_str(" /*!80000 INVISIBLE */");
        }
        lines.push(line);
    }
    for fk in &schema.foreign_keys {
        let cols: Vec<String> = fk.columns.iter().map(|c| ident::quote_mysql(c)).collect();
        let refs: Vec<String> = fk.referenced_columns.iter().map(|c| ident::quote_mysql(c)).collect();
        let mut line = format!(
            "  CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            ident::quote_mysql(&fk.name),
            cols.join(", "),
            ident::quote_mysql(&fk.referenced_table),
            refs.join(", ")
        );
        if fk.on_delete != "NO ACTION" && fk.on_delete != "RESTRICT" {
            line.push_str(&format!(" ON DELETE {}", fk.on_delete));
        }
        if fk.on_update != "NO ACTION" && fk.on_update != "RESTRICT" {
            line.push_str(&format!(" ON UPDATE {}", fk.on_update));
        }
        lines.push(line);
    }
    for check in &schema.checks {
        let mut line = format!(
            "  CONSTRAINT {} CHECK ({})",
            ident::quote_mysql(&check.name),
            check.clause
        );
        if !check.enforced {
            line.push_str(" /*!80016 NOT ENFORCED */");
        }
        lines.push(line);
    }

    let mut options = format!(") ENGINE={}", schema.engine);
    if let Some(next) = next_auto_increment.filter(|n| *n > 1) {
        options.push_str(&format!(" AUTO_INCREMENT={next}"));
    }
    let collation = if schema.collation.is_empty() {
        DEFAULT_COLLATION
    } else {
        schema.collation.as_str()
    };
    options.push_str(&format!(" DEFAULT CHARSET={}", charset_of(collation)));
    options.push_str(&format!(" COLLATE={collation}"));
    if !schema.comment.is_empty() {
        options.push_str(&format!(" COMMENT={}", mysql_string(&schema.comment)));
    }
    format!(
        "CREATE {}TABLE {} (\n{}\n{options}",
        if schema.temporary { "TEMPORARY " } else { "" },
        ident::quote_mysql(&schema.name),
        lines.join(",\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::MysqlType;
    use crate::catalog::{CheckInfo, KeyPart};

    fn identity(expr: &str) -> Result<String> {
        Ok(expr.to_string())
    }

    fn column(name: &str, ty: &str) -> ColumnInfo {
        ColumnInfo::new(name, MysqlType::parse(ty).unwrap())
    }

    fn index(name: &str, unique: bool, cols: &[&str]) -> IndexInfo {
        IndexInfo {
            name: name.into(),
            unique,
            kind: IndexKind::Btree,
            parts: cols.iter().map(|c| KeyPart::column(c)).collect(),
            comment: String::new(),
            visible: true,
        }
    }

    fn orders() -> TableSchema {
        let mut t = TableSchema::new("orders", false);
        let mut id = column("id", "int");
        id.auto_increment = true;
        let mut shop = column("shop", "int");
        shop.nullable = false;
        let mut note = column("note", "varchar(20)");
        note.default = Some("none".into());
        t.columns = vec![id, shop, note];
        t.indexes = vec![index("PRIMARY", true, &["id", "shop"]), index("note", false, &["note"])];
        t.checks = vec![CheckInfo {
            name: "orders_chk_1".into(),
            clause: "shop > 0".into(),
            enforced: true,
        }];
        t.sync_derived();
        t
    }

    #[test]
    fn compound_primary_key_with_auto_increment_is_split() {
        let t = orders();
        let stmts = create_statements(&t, &identity).unwrap();
        assert_eq!(
            stmts[0],
            "CREATE TABLE \"orders\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \"shop\" INTEGER NOT NULL,\n  \"note\" TEXT DEFAULT 'none' COLLATE NOCASE,\n  CONSTRAINT \"orders_chk_1\" CHECK (shop > 0)\n)"
        );
        assert_eq!(
            stmts[1],
            "CREATE UNIQUE INDEX \"orders__PRIMARY\" ON \"orders\" (\"id\", \"shop\")"
        );
        assert_eq!(stmts[2], "CREATE INDEX \"orders__note\" ON \"orders\" (\"note\")");
    }

    #[test]
    fn plain_primary_key_stays_in_table_definition() {
        let mut t = TableSchema::new("kv", true);
        t.columns = vec![column("k", "varbinary(16)"), column("v", "blob")];
        t.indexes = vec![index("PRIMARY", true, &["k"])];
        t.sync_derived();
        let stmts = create_statements(&t, &identity).unwrap();
        assert_eq!(
            stmts,
            vec!["CREATE TEMP TABLE \"kv\" (\n  \"k\" BLOB NOT NULL,\n  \"v\" BLOB,\n  PRIMARY KEY (\"k\")\n)".to_string()]
        );
    }

    #[test]
    fn engine_accepts_reconstructed_schema_and_rebuild() {
        let engine = crate::engine::Engine::open_in_memory().unwrap();
        let t = orders();
        for sql in create_statements(&t, &identity).unwrap() {
            engine.execute_batch(&sql).unwrap();
        }
        engine
            .execute_batch("INSERT INTO orders (shop, note) VALUES (3, 'a'), (4, 'b')")
            .unwrap();
        let mut next = t.clone();
        next.columns.insert(1, {
            let mut c = column("qty", "int");
            c.nullable = false;
            c
        });
        let sources = vec![Some("id".into()), None, Some("shop".into()), Some("note".into())];
        for sql in rebuild_statements("orders", &next, &sources, SqlMode::empty(), false, &identity).unwrap() {
            engine.execute_batch(&sql).unwrap();
        }
        let rows = engine
            .query_strings("SELECT id || ':' || qty || ':' || shop FROM orders ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows, vec!["1:0:3", "2:0:4"]);
    }

    #[test]
    fn on_update_trigger_refreshes_timestamp() {
        let engine = crate::engine::Engine::open_in_memory().unwrap();
        let mut t = TableSchema::new("t", false);
        let mut ts = column("ts", "datetime");
        ts.on_update_current_timestamp = true;
        t.columns = vec![column("a", "int"), ts];
        for sql in create_statements(&t, &identity).unwrap() {
            engine.execute_batch(&sql).unwrap();
        }
        engine.execute_batch("INSERT INTO t VALUES (1, '2000-01-01 00:00:00')").unwrap();
        engine.execute_batch("UPDATE t SET a = 2").unwrap();
        let ts = engine.query_strings("SELECT ts FROM t", &[]).unwrap();
        assert_ne!(ts, vec!["2000-01-01 00:00:00"]);
        engine.execute_batch("UPDATE t SET ts = '1999-01-01 00:00:00', a = 3").unwrap();
        let ts = engine.query_strings("SELECT ts FROM t", &[]).unwrap();
        assert_eq!(ts, vec!["1999-01-01 00:00:00"]);
    }

    #[test]
    fn show_create_table_matches_mysql_layout() {
        let mut t = orders();
        t.columns[2].comment = "it's".into();
        let text = show_create_table(&t, Some(3));
        assert_eq!(
            text,
            "CREATE TABLE `orders` (\n  `id` int NOT NULL AUTO_INCREMENT,\n  `shop` int NOT NULL,\n  `note` varchar(20) DEFAULT 'none' COMMENT 'it''s',\n  PRIMARY KEY (`id`,`shop`),\n  KEY `note` (`note`),\n  CONSTRAINT `orders_chk_1` CHECK (shop > 0)\n) ENGINE=InnoDB AUTO_INCREMENT=3 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_0900_ai_ci"
        );
    }
}
