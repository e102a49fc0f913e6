//! SHOW and DESCRIBE, answered from the catalog store and session state.
//!
//! `LIKE` filters match case-insensitively against the first column.
//! `WHERE` filters run over the result rows in the engine.

use rusqlite::types::Value;
use sqlparser::ast::{
    Expr, ObjectName, ShowCreateObject, ShowStatementFilter, ShowStatementFilterPosition, ShowStatementOptions,
    Statement,
};

use super::names::{self, TableRef};
use super::Translator;
use crate::catalog::store::CatalogStore;
use crate::catalog::{reconstruct, TableSchema};
use crate::engine::Engine;
use crate::error::{DriverError, Result};
use crate::ident;
use crate::model::{Cell, ExecOutput};
use crate::session::Session;

/// Row filter of a SHOW statement.
#[derive(Debug, Clone, Copy)]
pub enum Filter<'s> {
    None,
    Like(&'s str),
    Where(&'s Expr),
}

impl<'s> Filter<'s> {
    fn from_ast(filter: Option<&'s ShowStatementFilter>) -> Filter<'s> {
        match filter {
            None => Filter::None,
            Some(ShowStatementFilter::Like(p))
            | Some(ShowStatementFilter::ILike(p))
            | Some(ShowStatementFilter::NoKeyword(p)) => Filter::Like(p),
            Some(ShowStatementFilter::Where(e)) => Filter::Where(e),
        }
    }

    fn from_options(options: &'s ShowStatementOptions) -> Filter<'s> {
        Filter::from_ast(options.filter_position.as_ref().map(|p| match p {
            ShowStatementFilterPosition::Infix(f) | ShowStatementFilterPosition::Suffix(f) => f,
        }))
    }
}

fn text(s: impl Into<String>) -> Cell {
    Cell::Text(s.into())
}

fn optional(s: Option<String>) -> Cell {
    s.map_or(Cell::Null, Cell::Text)
}

fn result(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> ExecOutput {
    ExecOutput::ResultSet { columns, rows }
}

fn names_of(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Applies a SHOW filter. LIKE matches the first column.
fn filtered(
    session: &Session,
    engine: &Engine,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    filter: Filter,
) -> Result<ExecOutput> {
    match filter {
        Filter::None => Ok(result(columns, rows)),
        Filter::Like(pattern) => {
            let rows = rows
                .into_iter()
                .filter(|r| {
                    r.first()
                        .and_then(Cell::to_text)
                        .is_some_and(|t| ident::like_matches(&t, pattern, '\\', false))
                })
                .collect();
            Ok(result(columns, rows))
        }
        Filter::Where(e) => {
            if rows.is_empty() {
                return Ok(result(columns, rows));
            }
            let condition = Translator::new(session, engine).expr(e)?;
            let values: Vec<String> = rows
                .iter()
                .map(|r| {
                    let cells: Vec<String> = r.iter().map(Cell::to_sql_literal).collect();
                    format!("({})", cells.join(", "))
                })
                .collect();
            let quoted: Vec<String> = columns.iter().map(|c| ident::quote(c)).collect();
            let sql = format!(
                "WITH \"_mysql_show\"({}) AS (VALUES {}) SELECT * FROM \"_mysql_show\" WHERE {condition}",
                quoted.join(", "),
                values.join(", ")
            );
            let rows = engine.query(&sql, &[])?.rows;
            Ok(result(columns, rows))
        }
    }
}

/// Dispatches the SHOW and DESCRIBE forms the parser understands.
pub fn show(session: &Session, engine: &Engine, stmt: &Statement) -> Result<ExecOutput> {
    match stmt {
        Statement::ShowDatabases { show_options, .. } => {
            databases(session, engine, Filter::from_options(show_options))
        }
        Statement::ShowTables { full, show_options, .. } => {
            let schema = show_options
                .show_in
                .as_ref()
                .and_then(|s| s.parent_name.as_ref())
                .map(|n| names::object_parts(n).map(|mut p| p.pop().unwrap_or_default()))
                .transpose()?;
            tables(session, engine, schema.as_deref(), *full, Filter::from_options(show_options))
        }
        Statement::ShowColumns { full, show_options, .. } => {
            let name = show_options
                .show_in
                .as_ref()
                .and_then(|s| s.parent_name.as_ref())
                .ok_or_else(|| DriverError::Parse("SHOW COLUMNS requires a table name".into()))?;
            columns(session, engine, name, *full, Filter::from_options(show_options))
        }
        Statement::ExplainTable { table_name, .. } => columns(session, engine, table_name, false, Filter::None),
        Statement::ShowCreate { obj_type, obj_name } => match obj_type {
            ShowCreateObject::Table => create_table(session, engine, obj_name),
            other => Err(DriverError::not_supported(format!("show > CREATE {other}"))),
        },
        Statement::ShowVariables { filter, .. } => {
            variables(session, engine, Filter::from_ast(filter.as_ref()))
        }
        Statement::ShowStatus { filter, .. } => {
            let columns = names_of(&["Variable_name", "Value"]);
            let rows = vec![
                vec![text("Threads_connected"), text("1")],
                vec![text("Uptime"), text("0")],
            ];
            filtered(session, engine, columns, rows, Filter::from_ast(filter.as_ref()))
        }
        other => Err(DriverError::not_supported(format!("show > {other}"))),
    }
}

pub fn databases(session: &Session, engine: &Engine, filter: Filter) -> Result<ExecOutput> {
    let rows = vec![
        vec![text(names::INFORMATION_SCHEMA)],
        vec![text(session.database.clone())],
    ];
    filtered(session, engine, names_of(&["Database"]), rows, filter)
}

pub fn tables(
    session: &Session,
    engine: &Engine,
    schema: Option<&str>,
    full: bool,
    filter: Filter,
) -> Result<ExecOutput> {
    let schema = match schema {
        Some(s) => {
            names::check_schema(session, s)?;
            s.to_string()
        }
        None => session.current_db.clone().ok_or(DriverError::NoDatabase)?,
    };
    let (names, kind) = if names::is_information_schema(&schema) {
        (names::info_schema_table_names(), "SYSTEM VIEW")
    } else {
        let mut names = CatalogStore::new(engine).table_names(false)?;
        names.sort_by_key(|n| ident::fold(n));
        (names, "BASE TABLE")
    };
    let mut columns = vec![format!("Tables_in_{schema}")];
    if full {
        columns.push("Table_type".into());
    }
    let rows = names
        .into_iter()
        .map(|n| {
            let mut row = vec![text(n)];
            if full {
                row.push(text(kind));
            }
            row
        })
        .collect();
    filtered(session, engine, columns, rows, filter)
}

fn user_schema(session: &Session, engine: &Engine, name: &ObjectName) -> Result<TableSchema> {
    match names::resolve_table(session, name)? {
        TableRef::User(table) => CatalogStore::new(engine)
            .load_any(&table)?
            .ok_or_else(|| DriverError::NoSuchTable(format!("{}.{table}", session.database))),
        TableRef::InfoSchema(t) => Err(DriverError::not_supported(format!(
            "show > information_schema.{}",
            t.name
        ))),
    }
}

/// SHOW [FULL] COLUMNS and DESCRIBE.
pub fn columns(
    session: &Session,
    engine: &Engine,
    name: &ObjectName,
    full: bool,
    filter: Filter,
) -> Result<ExecOutput> {
    let schema = user_schema(session, engine, name)?;
    let columns = if full {
        names_of(&["Field", "Type", "Collation", "Null", "Key", "Default", "Extra", "Privileges", "Comment"])
    } else {
        names_of(&["Field", "Type", "Null", "Key", "Default", "Extra"])
    };
    let rows = schema
        .columns
        .iter()
        .map(|c| {
            let mut row = vec![text(c.name.clone()), text(c.ty.column_type())];
            if full {
                row.push(optional(c.collation()));
            }
            row.push(text(if c.nullable { "YES" } else { "NO" }));
            row.push(text(c.key.clone()));
            row.push(optional(c.default.clone()));
            row.push(text(c.extra()));
            if full {
                row.push(text("select,insert,update,references"));
                row.push(text(c.comment.clone()));
            }
            row
        })
        .collect();
    filtered(session, engine, columns, rows, filter)
}

/// Value the next generated id takes, or `None` for tables without an
/// auto-increment column.
pub fn next_auto_increment(engine: &Engine, schema: &TableSchema) -> Result<Option<i64>> {
    if schema.auto_increment_column().is_none() {
        return Ok(None);
    }
    let sequence = if schema.temporary { "temp.sqlite_sequence" } else { "sqlite_sequence" };
    let seq = engine
        .query(
            &format!("SELECT seq FROM {sequence} WHERE name = ?"),
            &[Value::Text(schema.name.clone())],
        )
        .ok()
        .and_then(|r| r.first_value().and_then(Cell::as_i64));
    Ok(Some(match seq {
        Some(seq) => seq + 1,
        None => schema.auto_increment.unwrap_or(1),
    }))
}

pub fn create_table(session: &Session, engine: &Engine, name: &ObjectName) -> Result<ExecOutput> {
    let schema = user_schema(session, engine, name)?;
    let next = next_auto_increment(engine, &schema)?;
    Ok(result(
        names_of(&["Table", "Create Table"]),
        vec![vec![text(schema.name.clone()), text(reconstruct::show_create_table(&schema, next))]],
    ))
}

pub fn variables(session: &Session, engine: &Engine, filter: Filter) -> Result<ExecOutput> {
    let rows = session
        .variables()
        .into_iter()
        .map(|(k, v)| vec![text(k), text(v)])
        .collect();
    filtered(session, engine, names_of(&["Variable_name", "Value"]), rows, filter)
}

/// SHOW INDEX FROM t.
pub fn index(session: &Session, engine: &Engine, name: &ObjectName) -> Result<ExecOutput> {
    let schema = user_schema(session, engine, name)?;
    let columns = names_of(&[
        "Table",
        "Non_unique",
        "Key_name",
        "Seq_in_index",
        "Column_name",
        "Collation",
        "Cardinality",
        "Sub_part",
        "Packed",
        "Null",
        "Index_type",
        "Comment",
        "Index_comment",
        "Visible",
        "Expression",
    ]);
    let mut rows = Vec::new();
    for index in &schema.indexes {
        for (seq, part) in index.parts.iter().enumerate() {
            let nullable = part
                .column
                .as_deref()
                .and_then(|c| schema.column(c))
                .is_some_and(|c| c.nullable);
            rows.push(vec![
                text(schema.name.clone()),
                Cell::Int(!index.unique as i64),
                text(index.name.clone()),
                Cell::Int(seq as i64 + 1),
                optional(part.column.clone()),
                text(if part.descending { "D" } else { "A" }),
                Cell::Int(0),
                part.sub_part.map_or(Cell::Null, |n| Cell::Int(n as i64)),
                Cell::Null,
                text(if nullable { "YES" } else { "" }),
                text(index.kind.as_str()),
                text(""),
                text(index.comment.clone()),
                text(if index.visible { "YES" } else { "NO" }),
                optional(part.expression.clone()),
            ]);
        }
    }
    Ok(result(columns, rows))
}

/// SHOW TABLE STATUS [LIKE 'pattern'].
pub fn table_status(session: &Session, engine: &Engine, filter: Filter) -> Result<ExecOutput> {
    let store = CatalogStore::new(engine);
    let columns = names_of(&[
        "Name",
        "Engine",
        "Version",
        "Row_format",
        "Rows",
        "Avg_row_length",
        "Data_length",
        "Max_data_length",
        "Index_length",
        "Data_free",
        "Auto_increment",
        "Create_time",
        "Update_time",
        "Check_time",
        "Collation",
        "Checksum",
        "Create_options",
        "Comment",
    ]);
    let mut names = store.table_names(false)?;
    names.sort_by_key(|n| ident::fold(n));
    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let Some(schema) = store.load(&name, false)? else {
            continue;
        };
        let count = engine
            .query_scalar(&format!("SELECT COUNT(*) FROM {}", ident::quote(&schema.name)), &[])?
            .and_then(|c| c.as_i64())
            .unwrap_or(0);
        rows.push(vec![
            text(schema.name.clone()),
            text(schema.engine.clone()),
            Cell::Int(10),
            text(schema.row_format.clone()),
            Cell::Int(count),
            Cell::Int(0),
            Cell::Int(0),
            Cell::Int(0),
            Cell::Int(0),
            Cell::Int(0),
            next_auto_increment(engine, &schema)?.map_or(Cell::Null, Cell::Int),
            text(schema.create_time.clone()),
            Cell::Null,
            Cell::Null,
            text(schema.collation.clone()),
            Cell::Null,
            text(""),
            text(schema.comment.clone()),
        ]);
    }
    filtered(session, engine, columns, rows, filter)
}

pub fn grants(session: &Session) -> ExecOutput {
    let user = if session.user.is_empty() { "root" } else { session.user.as_str() };
    result(
        vec![format!("Grants for {user}@%")],
        vec![vec![text(format!("GRANT ALL PRIVILEGES ON *.* TO `{user}`@`%`"))]],
    )
}

pub fn warnings() -> ExecOutput {
    ExecOutput::rows(&["Level", "Code", "Message"], Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SqlMode;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn setup() -> (Session, Engine) {
        let engine = Engine::open_in_memory().unwrap();
        let store = CatalogStore::new(&engine);
        store.ensure_tables().unwrap();
        store.ensure_temporary_tables().unwrap();
        let ct = crate::catalog::ddl::parse_create_table(
            "CREATE TABLE users (id INT AUTO_INCREMENT PRIMARY KEY, email VARCHAR(100) NOT NULL, \
             nick VARCHAR(20) DEFAULT 'anon', UNIQUE KEY email_uq (email))",
        )
        .unwrap();
        let crate::catalog::ddl::TableBody::Definition { columns, constraints, options } = ct.body else {
            panic!("not a definition")
        };
        let schema = crate::catalog::builder::Mutator::new(CatalogStore::new(&engine), true)
            .record_create_table(&ct.name, false, &columns, &constraints, &options)
            .unwrap();
        let render = |s: &str| -> Result<String> { Ok(s.to_string()) };
        for sql in reconstruct::create_statements(&schema, &render).unwrap() {
            engine.execute_batch(&sql).unwrap();
        }
        let mut session = Session::new(1, "app", SqlMode::STRICT_TRANS_TABLES);
        session.current_db = Some("app".into());
        (session, engine)
    }

    fn run(session: &Session, engine: &Engine, sql: &str) -> Result<ExecOutput> {
        let stmt = Parser::parse_sql(&MySqlDialect {}, sql).unwrap().remove(0);
        show(session, engine, &stmt)
    }

    fn rows(out: ExecOutput) -> Vec<Vec<Cell>> {
        match out {
            ExecOutput::ResultSet { rows, .. } => rows,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn databases_and_tables() {
        let (s, engine) = setup();
        let out = rows(run(&s, &engine, "SHOW DATABASES").unwrap());
        assert_eq!(out, vec![vec![text("information_schema")], vec![text("app")]]);

        let out = run(&s, &engine, "SHOW FULL TABLES").unwrap();
        let ExecOutput::ResultSet { columns, rows } = out else { panic!() };
        assert_eq!(columns, vec!["Tables_in_app".to_string(), "Table_type".to_string()]);
        assert_eq!(rows, vec![vec![text("users"), text("BASE TABLE")]]);

        assert!(rows_of_like(&s, &engine, "SHOW TABLES LIKE 'x%'").is_empty());
        assert_eq!(run(&s, &engine, "SHOW TABLES FROM other").unwrap_err().code(), 1044);
    }

    fn rows_of_like(s: &Session, engine: &Engine, sql: &str) -> Vec<Vec<Cell>> {
        rows(run(s, engine, sql).unwrap())
    }

    #[test]
    fn columns_and_describe() {
        let (s, engine) = setup();
        let out = rows(run(&s, &engine, "DESCRIBE users").unwrap());
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0],
            vec![text("id"), text("int"), text("NO"), text("PRI"), Cell::Null, text("auto_increment")]
        );
        assert_eq!(out[1][3], text("UNI"));
        assert_eq!(out[2][4], text("anon"));

        let out = rows(run(&s, &engine, "SHOW FULL COLUMNS FROM users LIKE 'NI%'").unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][2], text("utf8mb4_0900_ai_ci"));

        let out = rows(run(&s, &engine, "SHOW COLUMNS FROM users WHERE `Null` = 'NO'").unwrap());
        assert_eq!(out.len(), 2);
        assert_eq!(run(&s, &engine, "DESCRIBE nope").unwrap_err().code(), 1146);
    }

    #[test]
    fn create_table_reports_the_next_id() {
        let (s, engine) = setup();
        engine
            .execute_batch("INSERT INTO users (email) VALUES ('a@x'), ('b@x')")
            .unwrap();
        let out = rows(run(&s, &engine, "SHOW CREATE TABLE users").unwrap());
        let Cell::Text(ddl) = &out[0][1] else { panic!() };
        assert!(ddl.starts_with("CREATE TABLE `users` (\n  `id` int NOT NULL AUTO_INCREMENT,"));
        assert!(ddl.contains("UNIQUE KEY `email_uq` (`email`)"));
        assert!(ddl.contains("AUTO_INCREMENT=3"));
    }

    #[test]
    fn indexes_and_status() {
        let (s, engine) = setup();
        let name = Parser::new(&MySqlDialect {})
            .try_with_sql("users")
            .unwrap()
            .parse_object_name(false)
            .unwrap();
        let out = rows(index(&s, &engine, &name).unwrap());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0][2], text("PRIMARY"));
        assert_eq!(out[1][1], Cell::Int(0));
        assert_eq!(out[1][4], text("email"));

        engine.execute_batch("INSERT INTO users (email) VALUES ('a@x')").unwrap();
        let out = rows(table_status(&s, &engine, Filter::Like("us%")).unwrap());
        assert_eq!(out[0][0], text("users"));
        assert_eq!(out[0][4], Cell::Int(1));
        assert_eq!(out[0][10], Cell::Int(2));
    }

    #[test]
    fn variables_filter_by_name() {
        let (s, engine) = setup();
        let out = rows(run(&s, &engine, "SHOW VARIABLES LIKE 'auto%'").unwrap());
        assert_eq!(
            out,
            vec![
                vec![text("auto_increment_increment"), text("1")],
                vec![text("auto_increment_offset"), text("1")],
                vec![text("autocommit"), text("ON")],
            ]
        );
    }
}
