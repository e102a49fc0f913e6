//! INSERT, REPLACE, UPDATE and DELETE translation.
//!
//! Every stored value goes through the coercion engine: an INSERT becomes
//! `WITH "_mysql_values"(..) AS (<rows>) INSERT INTO t (..) SELECT <coerced>
//! FROM "_mysql_values" WHERE true`, where the `WHERE true` keeps a trailing
//! `ON CONFLICT` from being read as a join constraint. Multi-table DELETE has
//! no engine counterpart and is planned as one rowid capture per target.

use sqlparser::ast::{
    Assignment, AssignmentTarget, Delete, Expr, FromTable, Insert, JoinConstraint, JoinOperator, OnInsert,
    SetExpr, TableFactor, TableObject, TableWithJoins, Update,
};

use super::names::{self, TableRef};
use super::{render_expression, Translator};
use crate::catalog::reconstruct;
use crate::catalog::{ColumnInfo, TableSchema};
use crate::coercion;
use crate::error::{DriverError, Result};
use crate::ident;

const VALUES_CTE: &str = "_mysql_values";

#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub table: String,
    pub sql: String,
    /// Columns the statement leaves to a default they do not have. A NOT
    /// NULL failure on one of them is reported as 1364.
    pub omitted: Vec<String>,
    pub generates_ids: bool,
    /// Statement up to the conflict clause and its `DO UPDATE SET` list.
    upsert: Option<(String, String)>,
}

impl InsertPlan {
    pub fn is_upsert(&self) -> bool {
        self.upsert.is_some()
    }

    /// The upsert with an explicit conflict target.
    pub fn with_conflict_target(&self, columns: &[String]) -> Option<String> {
        let (head, set) = self.upsert.as_ref()?;
        let columns: Vec<String> = columns.iter().map(|c| ident::quote(c)).collect();
        Some(format!("{head} ON CONFLICT ({}) DO UPDATE SET {set}", columns.join(", ")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteTarget {
    pub table: String,
    /// Selects the rowids of the rows to delete.
    pub rowids_sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeletePlan {
    Single(String),
    /// Rowids of every target are captured before any row is deleted.
    Multi(Vec<DeleteTarget>),
}

fn is_default_keyword(e: &Expr) -> bool {
    matches!(e, Expr::Identifier(i) if i.quote_style.is_none() && i.value.eq_ignore_ascii_case("DEFAULT"))
}

fn generated_value_error(column: &str, table: &str) -> DriverError {
    DriverError::value(
        3105,
        format!("The value specified for generated column '{column}' in table '{table}' is not allowed."),
    )
}

fn and_all(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        let wrapped: Vec<String> = conditions.iter().map(|c| format!("({c})")).collect();
        format!(" WHERE {}", wrapped.join(" AND "))
    }
}

fn aliased(table: &str, alias: Option<&str>) -> String {
    match alias {
        Some(a) => format!("{} AS {}", ident::quote(table), ident::quote(a)),
        None => ident::quote(table),
    }
}

/// `(qualifier, column)` of an assignment target.
fn assignment_column(a: &Assignment) -> Result<(Option<String>, String)> {
    let AssignmentTarget::ColumnName(name) = &a.target else {
        return Err(DriverError::not_supported("assignment > tuple target"));
    };
    let mut parts = names::object_parts(name)?;
    let column = parts
        .pop()
        .ok_or_else(|| DriverError::Invalid("empty assignment target".into()))?;
    Ok((parts.pop(), column))
}

impl<'a> Translator<'a> {
    /// Engine SQL for `DEFAULT` in a value position.
    fn default_value(&self, column: &ColumnInfo, strict: bool) -> Result<String> {
        if column.auto_increment || column.generated.is_some() {
            return Ok("NULL".into());
        }
        let render = |text: &str| render_expression(self.session, self.engine, text);
        if let Some(sql) = reconstruct::default_sql(column, &render)? {
            return Ok(sql);
        }
        if column.nullable {
            Ok("NULL".into())
        } else if strict {
            Err(DriverError::NoDefault(column.name.clone()))
        } else {
            Ok(column.ty.implicit_default().unwrap_or_else(|| "NULL".into()))
        }
    }

    fn coerced(&self, column: &ColumnInfo, strict: bool, value_sql: &str) -> String {
        coercion::coerce_expr(column, self.session.sql_mode, strict, value_sql)
    }

    /// A DML target: a user table and its alias.
    fn target_table(&self, factor: &TableFactor) -> Result<(String, Option<String>)> {
        match factor {
            TableFactor::Table { name, alias, args: None, .. } => Ok((
                names::user_table(self.session, name)?,
                alias.as_ref().map(|a| a.name.value.clone()),
            )),
            other => Err(DriverError::not_supported(format!("target > {other}"))),
        }
    }

    pub fn insert(&mut self, insert: &Insert) -> Result<InsertPlan> {
        if insert.insert_alias.is_some() {
            return Err(DriverError::not_supported("insert > row alias"));
        }
        if insert.returning.is_some() {
            return Err(DriverError::not_supported("insert > RETURNING"));
        }
        let TableObject::TableName(name) = &insert.table else {
            return Err(DriverError::not_supported("insert > table function"));
        };
        let table = names::user_table(self.session, name)?;
        let schema = self.table_schema(&table)?;
        let strict = self.strict() && !insert.ignore;

        let (named, rows) = if !insert.assignments.is_empty() {
            let mut named = Vec::new();
            let mut row = Vec::new();
            for a in &insert.assignments {
                named.push(assignment_column(a)?.1);
                row.push(a.value.clone());
            }
            (named, Some(vec![row]))
        } else {
            let source = insert
                .source
                .as_ref()
                .ok_or_else(|| DriverError::Invalid("INSERT without a row source".into()))?;
            let named: Vec<String> = insert.columns.iter().map(|c| c.value.clone()).collect();
            let plain = source.with.is_none() && source.order_by.is_none() && source.limit_clause.is_none();
            match source.body.as_ref() {
                SetExpr::Values(v) if plain => (named, Some(v.rows.clone())),
                _ => (named, None),
            }
        };

        let all_empty = rows.as_ref().is_some_and(|r| r.iter().all(Vec::is_empty));
        let columns: Vec<&ColumnInfo> = if named.is_empty() {
            if all_empty {
                Vec::new()
            } else {
                schema.columns.iter().collect()
            }
        } else {
            let mut seen: Vec<&ColumnInfo> = Vec::new();
            for n in &named {
                let column = schema
                    .column(n)
                    .ok_or_else(|| DriverError::UnknownColumn(n.clone(), "field list".into()))?;
                if seen.iter().any(|c| ident::eq(&c.name, &column.name)) {
                    return Err(DriverError::value(1110, format!("Column '{}' specified twice", column.name)));
                }
                seen.push(column);
            }
            seen
        };

        let source_sql = match &rows {
            Some(rows) => {
                let mut rendered = Vec::with_capacity(rows.len());
                for (i, row) in rows.iter().enumerate() {
                    if row.len() != columns.len() {
                        return Err(DriverError::ValueCount(i + 1));
                    }
                    if columns.is_empty() {
                        rendered.push("(NULL)".to_string());
                        continue;
                    }
                    let mut values = Vec::with_capacity(row.len());
                    for (column, e) in columns.iter().zip(row) {
                        if column.generated.is_some() {
                            if !is_default_keyword(e) {
                                return Err(generated_value_error(&column.name, &table));
                            }
                            values.push("NULL".to_string());
                        } else if is_default_keyword(e) {
                            values.push(self.default_value(column, strict)?);
                        } else {
                            values.push(self.expr(e)?);
                        }
                    }
                    rendered.push(format!("({})", values.join(", ")));
                }
                format!("VALUES {}", rendered.join(", "))
            }
            None => {
                let source = insert
                    .source
                    .as_ref()
                    .ok_or_else(|| DriverError::Invalid("INSERT without a row source".into()))?;
                if let Some(column) = columns.iter().find(|c| c.generated.is_some()) {
                    return Err(generated_value_error(&column.name, &table));
                }
                let sql = self.query(source)?;
                let width = self
                    .engine
                    .query(&format!("SELECT * FROM ({sql}) LIMIT 0"), &[])?
                    .columns
                    .len();
                if width != columns.len() {
                    return Err(DriverError::ValueCount(1));
                }
                sql
            }
        };

        let mut targets = Vec::new();
        let mut values = Vec::new();
        for (i, column) in columns.iter().enumerate() {
            if column.generated.is_some() {
                continue;
            }
            targets.push(ident::quote(&column.name));
            values.push(self.coerced(column, strict, &ident::quote(&format!("column{}", i + 1))));
        }
        let mut omitted = Vec::new();
        for column in &schema.columns {
            let listed = columns.iter().any(|c| ident::eq(&c.name, &column.name));
            if listed || column.generated.is_some() {
                continue;
            }
            match coercion::omitted_column_value(column, strict) {
                Some(value) => {
                    targets.push(ident::quote(&column.name));
                    values.push(value);
                }
                None if !column.has_default() => omitted.push(column.name.clone()),
                None => {}
            }
        }

        let verb = if insert.replace_into {
            "INSERT OR REPLACE"
        } else if insert.ignore {
            "INSERT OR IGNORE"
        } else {
            "INSERT"
        };
        let head = if targets.is_empty() {
            if rows.as_ref().map_or(true, |r| r.len() != 1) {
                return Err(DriverError::not_supported("insert > multiple default rows"));
            }
            format!("{verb} INTO {} DEFAULT VALUES", ident::quote(&table))
        } else {
            let width = columns.len().max(1);
            let cte_columns: Vec<String> = (1..=width).map(|i| ident::quote(&format!("column{i}"))).collect();
            format!(
                "WITH {cte}({}) AS ({source_sql}) {verb} INTO {} ({}) SELECT {} FROM {cte} WHERE true",
                cte_columns.join(", "),
                ident::quote(&table),
                targets.join(", "),
                values.join(", "),
                cte = ident::quote(VALUES_CTE),
            )
        };

        let upsert = match &insert.on {
            None => None,
            Some(OnInsert::DuplicateKeyUpdate(assignments)) => {
                if targets.is_empty() {
                    return Err(DriverError::not_supported("insert > DEFAULT VALUES upsert"));
                }
                self.upsert = true;
                let set = self.update_assignments(&schema, None, assignments, strict);
                self.upsert = false;
                Some((head.clone(), set?.join(", ")))
            }
            Some(_) => return Err(DriverError::not_supported("insert > ON CONFLICT")),
        };

        let mut plan = InsertPlan {
            table: schema.name.clone(),
            sql: head,
            omitted,
            generates_ids: schema.auto_increment_column().is_some(),
            upsert: None,
        };
        if let Some((head, set)) = upsert {
            plan.sql = if self.caps.upsert_without_target {
                format!("{head} ON CONFLICT DO UPDATE SET {set}")
            } else {
                // Older engines need a conflict target: the primary key first,
                // the violated key's columns on retry.
                let primary: Vec<String> = schema
                    .primary_key()
                    .map(|pk| pk.column_names().iter().map(|c| ident::quote(c)).collect())
                    .unwrap_or_default();
                if primary.is_empty() {
                    format!("{head} ON CONFLICT DO UPDATE SET {set}")
                } else {
                    format!("{head} ON CONFLICT ({}) DO UPDATE SET {set}", primary.join(", "))
                }
            };
            plan.upsert = Some((head, set));
        }
        Ok(plan)
    }

    /// `"col" = <coerced value>` for each assignment. `target` is the name
    /// assignments may be qualified with, when it differs from the table.
    fn update_assignments(
        &mut self,
        schema: &TableSchema,
        target: Option<&str>,
        assignments: &[Assignment],
        strict: bool,
    ) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(assignments.len());
        for a in assignments {
            let (qualifier, name) = assignment_column(a)?;
            if let Some(q) = &qualifier {
                if !ident::eq(q, target.unwrap_or(&schema.name)) {
                    return Err(DriverError::not_supported(format!(
                        "update > assignment to joined table '{q}'"
                    )));
                }
            }
            let column = schema
                .column(&name)
                .ok_or_else(|| DriverError::UnknownColumn(name.clone(), "field list".into()))?;
            if column.generated.is_some() {
                if is_default_keyword(&a.value) {
                    continue;
                }
                return Err(generated_value_error(&column.name, &schema.name));
            }
            let value = if is_default_keyword(&a.value) {
                self.default_value(column, strict)?
            } else {
                self.expr(&a.value)?
            };
            out.push(format!(
                "{} = {}",
                ident::quote(&column.name),
                self.coerced(column, strict, &value)
            ));
        }
        Ok(out)
    }

    pub fn update(&mut self, update: &Update) -> Result<String> {
        if update.from.is_some() {
            return Err(DriverError::not_supported("update > FROM"));
        }
        if update.returning.is_some() {
            return Err(DriverError::not_supported("update > RETURNING"));
        }
        let (table, alias) = self.target_table(&update.table.relation)?;
        let schema = self.table_schema(&table)?;
        let strict = self.strict();
        let sets = self.update_assignments(&schema, alias.as_deref(), &update.assignments, strict)?;
        if sets.is_empty() {
            return Err(DriverError::Invalid("UPDATE without assignments".into()));
        }
        let target = aliased(&schema.name, alias.as_deref());

        // Joined tables move to FROM and their ON conditions to WHERE.
        let mut conditions = Vec::new();
        let mut from = String::new();
        if !update.table.joins.is_empty() {
            if update.limit.is_some() {
                return Err(DriverError::value(1221, "Incorrect usage of UPDATE and LIMIT"));
            }
            let mut factors = Vec::new();
            for join in &update.table.joins {
                let constraint = match &join.join_operator {
                    JoinOperator::Join(c)
                    | JoinOperator::Inner(c)
                    | JoinOperator::CrossJoin(c)
                    | JoinOperator::StraightJoin(c) => c,
                    other => return Err(DriverError::not_supported(format!("update > join {other:?}"))),
                };
                factors.push(self.table_factor(&join.relation)?);
                match constraint {
                    JoinConstraint::On(e) => conditions.push(self.expr(e)?),
                    JoinConstraint::None => {}
                    _ => return Err(DriverError::not_supported("update > join USING")),
                }
            }
            from = format!(" FROM {}", factors.join(", "));
        }
        if let Some(selection) = &update.selection {
            conditions.push(self.expr(selection)?);
        }
        let mut filter = and_all(&conditions);
        if let Some(limit) = &update.limit {
            let reference = ident::quote(alias.as_deref().unwrap_or(&schema.name));
            filter = format!(
                " WHERE rowid IN (SELECT {reference}.rowid FROM {target}{filter} LIMIT {})",
                self.expr(limit)?
            );
        }
        Ok(format!("UPDATE {target} SET {}{from}{filter}", sets.join(", ")))
    }

    pub fn delete(&mut self, delete: &Delete) -> Result<DeletePlan> {
        if delete.returning.is_some() {
            return Err(DriverError::not_supported("delete > RETURNING"));
        }
        let from = match &delete.from {
            FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
        };
        let single = match from.as_slice() {
            [only] => only.joins.is_empty() && delete.tables.is_empty() && delete.using.is_none(),
            _ => false,
        };
        if single {
            return self.single_delete(&from[0].relation, delete).map(DeletePlan::Single);
        }
        if delete.limit.is_some() || !delete.order_by.is_empty() {
            let clause = if delete.limit.is_some() { "LIMIT" } else { "ORDER BY" };
            return Err(DriverError::value(1221, format!("Incorrect usage of DELETE and {clause}")));
        }

        // DELETE t1, t2 FROM <joins> and DELETE FROM t1, t2 USING <joins>.
        let (targets, sources) = match &delete.using {
            Some(using) => {
                let mut names = Vec::new();
                for t in from {
                    match &t.relation {
                        TableFactor::Table { name, .. } => names.push(name.clone()),
                        other => return Err(DriverError::not_supported(format!("delete > target {other}"))),
                    }
                }
                (names, using.as_slice())
            }
            None if delete.tables.is_empty() => match from.first().map(|t| &t.relation) {
                Some(TableFactor::Table { name, .. }) => (vec![name.clone()], from.as_slice()),
                _ => return Err(DriverError::Invalid("DELETE without a target".into())),
            },
            None => (delete.tables.clone(), from.as_slice()),
        };

        let mut available = Vec::new();
        for twj in sources {
            self.collect_tables(twj, &mut available)?;
        }
        let mut joined = Vec::with_capacity(sources.len());
        for twj in sources {
            joined.push(self.table_with_joins(twj)?);
        }
        let filter = match &delete.selection {
            Some(e) => format!(" WHERE {}", self.expr(e)?),
            None => String::new(),
        };

        let mut plan = Vec::with_capacity(targets.len());
        for name in &targets {
            let written = names::user_table(self.session, name)?;
            let (reference, table) = available
                .iter()
                .find(|(reference, _)| ident::eq(reference, &written))
                .ok_or_else(|| DriverError::value(1109, format!("Unknown table '{written}' in MULTI DELETE")))?;
            let schema = self.table_schema(table)?;
            plan.push(DeleteTarget {
                table: schema.name.clone(),
                rowids_sql: format!(
                    "SELECT DISTINCT {}.rowid FROM {}{filter}",
                    ident::quote(reference),
                    joined.join(", ")
                ),
            });
        }
        Ok(DeletePlan::Multi(plan))
    }

    fn single_delete(&mut self, relation: &TableFactor, delete: &Delete) -> Result<String> {
        let (table, alias) = self.target_table(relation)?;
        let schema = self.table_schema(&table)?;
        let target = aliased(&schema.name, alias.as_deref());
        let mut filter = match &delete.selection {
            Some(e) => format!(" WHERE {}", self.expr(e)?),
            None => String::new(),
        };
        if delete.limit.is_some() || !delete.order_by.is_empty() {
            let mut order = String::new();
            if !delete.order_by.is_empty() {
                let items: Result<Vec<String>> = delete.order_by.iter().map(|i| self.order_item(i)).collect();
                order = format!(" ORDER BY {}", items?.join(", "));
            }
            let limit = match &delete.limit {
                Some(l) => format!(" LIMIT {}", self.expr(l)?),
                None => String::new(),
            };
            let reference = ident::quote(alias.as_deref().unwrap_or(&schema.name));
            filter = format!(" WHERE rowid IN (SELECT {reference}.rowid FROM {target}{filter}{order}{limit})");
        }
        Ok(format!("DELETE FROM {target}{filter}"))
    }

    /// `(reference name, table)` for every user table in a join tree.
    fn collect_tables(&self, twj: &TableWithJoins, out: &mut Vec<(String, String)>) -> Result<()> {
        let factors = std::iter::once(&twj.relation).chain(twj.joins.iter().map(|j| &j.relation));
        for factor in factors {
            match factor {
                TableFactor::Table { name, alias, .. } => {
                    if let TableRef::User(table) = names::resolve_table(self.session, name)? {
                        let reference = alias.as_ref().map_or_else(|| table.clone(), |a| a.name.value.clone());
                        out.push((reference, table));
                    }
                }
                TableFactor::NestedJoin { table_with_joins, .. } => self.collect_tables(table_with_joins, out)?,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::Mutator;
    use crate::catalog::ddl::{parse_create_table, TableBody};
    use crate::catalog::store::CatalogStore;
    use crate::engine::Engine;
    use crate::model::Cell;
    use crate::session::{Session, SqlMode};
    use sqlparser::ast::Statement;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn session(mode: SqlMode) -> Session {
        let mut s = Session::new(1, "app", mode);
        s.current_db = Some("app".into());
        s
    }

    fn engine(tables: &[&str]) -> Engine {
        let engine = Engine::open_in_memory().unwrap();
        let store = CatalogStore::new(&engine);
        store.ensure_tables().unwrap();
        store.ensure_temporary_tables().unwrap();
        let mutator = Mutator::new(CatalogStore::new(&engine), true);
        let render = |s: &str| -> Result<String> { Ok(s.to_string()) };
        for sql in tables {
            let ct = parse_create_table(sql).unwrap();
            let TableBody::Definition { columns, constraints, options } = ct.body else {
                panic!("not a definition")
            };
            let schema = mutator
                .record_create_table(&ct.name, false, &columns, &constraints, &options)
                .unwrap();
            for stmt in reconstruct::create_statements(&schema, &render).unwrap() {
                engine.execute_batch(&stmt).unwrap();
            }
        }
        engine
    }

    fn statement(sql: &str) -> Statement {
        Parser::parse_sql(&MySqlDialect {}, sql).unwrap().remove(0)
    }

    fn insert(s: &Session, engine: &Engine, sql: &str) -> Result<InsertPlan> {
        let Statement::Insert(i) = statement(sql) else { panic!("not an insert") };
        Translator::new(s, engine).insert(&i)
    }

    fn rows(engine: &Engine, sql: &str) -> Vec<Vec<Cell>> {
        engine.query(sql, &[]).unwrap().rows
    }

    const PEOPLE: &str = "CREATE TABLE people (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(5) NOT NULL, \
                          n INT NOT NULL, born DATE NULL, score INT NOT NULL DEFAULT 7)";

    #[test]
    fn non_strict_inserts_fill_implicit_defaults() {
        let engine = engine(&[PEOPLE]);
        let s = session(SqlMode::empty());
        let plan = insert(&s, &engine, "INSERT INTO people (born, name) VALUES ('2024-01-02', 'abcdefgh')").unwrap();
        assert!(plan.sql.starts_with("WITH \"_mysql_values\"(\"column1\", \"column2\") AS (VALUES"));
        assert!(plan.sql.ends_with("FROM \"_mysql_values\" WHERE true"));
        assert!(plan.omitted.is_empty());
        assert!(plan.generates_ids);
        engine.execute(&plan.sql, &[]).unwrap();
        assert_eq!(
            rows(&engine, "SELECT id, name, n, born, score FROM people"),
            vec![vec![
                Cell::Int(1),
                Cell::Text("abcde".into()),
                Cell::Int(0),
                Cell::Text("2024-01-02".into()),
                Cell::Int(7)
            ]]
        );
    }

    #[test]
    fn strict_inserts_leave_missing_defaults_to_the_engine() {
        let engine = engine(&[PEOPLE]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        let plan = insert(&s, &engine, "INSERT INTO people (name) VALUES ('a')").unwrap();
        assert_eq!(plan.omitted, vec!["n".to_string()]);
        let err = engine.execute(&plan.sql, &[]).unwrap_err();
        assert!(matches!(err, DriverError::BadNull(ref c) if c == "n"));

        let err = insert(&s, &engine, "INSERT INTO people (name, n) VALUES ('a', 1), ('b')").unwrap_err();
        assert_eq!(err.code(), 1136);
        assert_eq!(err.to_string(), "Column count doesn't match value count at row 2");
        let err = insert(&s, &engine, "INSERT INTO people (nope) VALUES (1)").unwrap_err();
        assert_eq!(err.code(), 1054);
        let err = insert(&s, &engine, "INSERT INTO people (n, n) VALUES (1, 2)").unwrap_err();
        assert_eq!(err.code(), 1110);
    }

    #[test]
    fn default_keyword_and_insert_set() {
        let engine = engine(&[PEOPLE]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        let plan = insert(&s, &engine, "INSERT INTO people VALUES (DEFAULT, 'x', 1, DEFAULT, DEFAULT)").unwrap();
        engine.execute(&plan.sql, &[]).unwrap();
        let plan = insert(&s, &engine, "INSERT INTO people SET name = 'y', n = 2").unwrap();
        engine.execute(&plan.sql, &[]).unwrap();
        assert_eq!(
            rows(&engine, "SELECT id, name, born, score FROM people ORDER BY id"),
            vec![
                vec![Cell::Int(1), Cell::Text("x".into()), Cell::Null, Cell::Int(7)],
                vec![Cell::Int(2), Cell::Text("y".into()), Cell::Null, Cell::Int(7)],
            ]
        );
        let err = insert(&s, &engine, "INSERT INTO people (name, n) VALUES ('z', DEFAULT)").unwrap_err();
        assert_eq!(err.code(), 1364);
    }

    #[test]
    fn insert_select_checks_width() {
        let engine = engine(&[PEOPLE, "CREATE TABLE src (a VARCHAR(10), b INT)"]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        engine.execute("INSERT INTO src VALUES ('p', 3), ('q', 4)", &[]).unwrap();
        let plan = insert(&s, &engine, "INSERT INTO people (name, n) SELECT a, b FROM src").unwrap();
        assert_eq!(engine.execute(&plan.sql, &[]).unwrap(), 2);
        let err = insert(&s, &engine, "INSERT INTO people (name) SELECT a, b FROM src").unwrap_err();
        assert_eq!(err.code(), 1136);
    }

    #[test]
    fn duplicate_key_update_uses_the_failed_row() {
        let engine = engine(&["CREATE TABLE hits (id INT PRIMARY KEY, n INT NOT NULL DEFAULT 0)"]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        let sql = "INSERT INTO hits (id, n) VALUES (1, 5) ON DUPLICATE KEY UPDATE n = n + VALUES(n)";
        let plan = insert(&s, &engine, sql).unwrap();
        assert!(plan.is_upsert());
        assert!(plan.sql.contains("WHERE true ON CONFLICT DO UPDATE SET \"n\" = "));
        assert!(plan.sql.contains("excluded.\"n\""));
        engine.execute(&plan.sql, &[]).unwrap();
        engine.execute(&plan.sql, &[]).unwrap();
        assert_eq!(rows(&engine, "SELECT n FROM hits"), vec![vec![Cell::Int(10)]]);

        let retry = plan.with_conflict_target(&["id".to_string()]).unwrap();
        assert!(retry.contains("WHERE true ON CONFLICT (\"id\") DO UPDATE SET"));
        engine.execute(&retry, &[]).unwrap();
        assert_eq!(rows(&engine, "SELECT n FROM hits"), vec![vec![Cell::Int(15)]]);
    }

    #[test]
    fn generated_columns_reject_explicit_values() {
        let engine = engine(&["CREATE TABLE g (a INT, b INT AS (a * 2))"]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        let err = insert(&s, &engine, "INSERT INTO g (a, b) VALUES (1, 2)").unwrap_err();
        assert_eq!(err.code(), 3105);
        let plan = insert(&s, &engine, "INSERT INTO g VALUES (3, DEFAULT)").unwrap();
        engine.execute(&plan.sql, &[]).unwrap();
        assert_eq!(rows(&engine, "SELECT a, b FROM g"), vec![vec![Cell::Int(3), Cell::Int(6)]]);
    }

    #[test]
    fn updates_coerce_and_limit_through_rowid() {
        let engine = engine(&[PEOPLE]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        engine
            .execute_batch("INSERT INTO people (name, n) VALUES ('a', 1), ('b', 2), ('c', 3)")
            .unwrap();
        let Statement::Update(u) = statement("UPDATE people SET n = n + 10 WHERE n > 1 LIMIT 1") else {
            panic!("not an update")
        };
        let sql = Translator::new(&s, &engine).update(&u).unwrap();
        assert!(sql.contains("WHERE rowid IN (SELECT \"people\".rowid FROM \"people\" WHERE"));
        assert_eq!(engine.execute(&sql, &[]).unwrap(), 1);

        let Statement::Update(u) = statement("UPDATE people SET name = 'toolong' WHERE id = 1") else {
            panic!("not an update")
        };
        let sql = Translator::new(&s, &engine).update(&u).unwrap();
        assert_eq!(engine.execute(&sql, &[]).unwrap_err().code(), 1406);
    }

    #[test]
    fn joined_updates_move_tables_to_from() {
        let engine = engine(&[PEOPLE, "CREATE TABLE bonus (person INT, extra INT)"]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        engine
            .execute_batch(
                "INSERT INTO people (name, n) VALUES ('a', 1), ('b', 2); INSERT INTO bonus VALUES (2, 40);",
            )
            .unwrap();
        let Statement::Update(u) =
            statement("UPDATE people p JOIN bonus b ON b.person = p.id SET p.n = p.n + b.extra")
        else {
            panic!("not an update")
        };
        let sql = Translator::new(&s, &engine).update(&u).unwrap();
        assert!(sql.starts_with("UPDATE \"people\" AS \"p\" SET \"n\" = _mysql_int("));
        assert!(sql.contains(" FROM \"bonus\" AS \"b\" WHERE "));
        engine.execute(&sql, &[]).unwrap();
        assert_eq!(
            rows(&engine, "SELECT n FROM people ORDER BY id"),
            vec![vec![Cell::Int(1)], vec![Cell::Int(42)]]
        );
    }

    #[test]
    fn multi_table_delete_captures_rowids_per_target() {
        let engine = engine(&[
            "CREATE TABLE t1 (id INT PRIMARY KEY)",
            "CREATE TABLE t2 (t1_id INT, flag INT)",
        ]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        engine
            .execute_batch(
                "INSERT INTO t1 VALUES (1), (2), (3); INSERT INTO t2 VALUES (1, 1), (1, 1), (2, 0), (3, 1);",
            )
            .unwrap();
        let Statement::Delete(d) = statement("DELETE t1 FROM t1 JOIN t2 ON t2.t1_id = t1.id WHERE t2.flag = 1")
        else {
            panic!("not a delete")
        };
        let DeletePlan::Multi(targets) = Translator::new(&s, &engine).delete(&d).unwrap() else {
            panic!("expected a multi-table plan")
        };
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].table, "t1");
        let mut ids: Vec<i64> = rows(&engine, &targets[0].rowids_sql)
            .into_iter()
            .filter_map(|r| r[0].as_i64())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);

        let Statement::Delete(d) = statement("DELETE FROM t3 USING t1 JOIN t2 ON t2.t1_id = t1.id") else {
            panic!("not a delete")
        };
        assert_eq!(Translator::new(&s, &engine).delete(&d).unwrap_err().code(), 1109);
    }

    #[test]
    fn single_delete_with_order_and_limit() {
        let engine = engine(&["CREATE TABLE t1 (id INT PRIMARY KEY)"]);
        let s = session(SqlMode::STRICT_TRANS_TABLES);
        engine.execute_batch("INSERT INTO t1 VALUES (1), (2), (3)").unwrap();
        let Statement::Delete(d) = statement("DELETE FROM t1 WHERE id > 0 ORDER BY id DESC LIMIT 2") else {
            panic!("not a delete")
        };
        let DeletePlan::Single(sql) = Translator::new(&s, &engine).delete(&d).unwrap() else {
            panic!("expected a single-table plan")
        };
        assert_eq!(engine.execute(&sql, &[]).unwrap(), 2);
        assert_eq!(rows(&engine, "SELECT id FROM t1"), vec![vec![Cell::Int(1)]]);
    }
}
