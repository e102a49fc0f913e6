//! SELECT translation: result column naming, ORDER BY / GROUP BY / HAVING
//! disambiguation, INFORMATION_SCHEMA table references and
//! `SQL_CALC_FOUND_ROWS`.

use std::collections::{HashMap, HashSet};

use sqlparser::ast::{
    self, Expr, GroupByExpr, JoinConstraint, JoinOperator, LimitClause, OrderByExpr, OrderByKind, Query,
    Select, SelectItem, SelectItemQualifiedWildcardKind, SetExpr, TableFactor, TableWithJoins,
};

use super::names::{self, TableRef};
use super::Translator;
use crate::error::{DriverError, Result};
use crate::ident;

/// Unqualified column name → qualified SELECT-list columns, for one select.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    columns: HashMap<String, Vec<String>>,
    aliases: HashSet<String>,
}

impl Scope {
    /// The qualified form of `name` when exactly one select-list column
    /// and no alias answer to it.
    fn qualify(&self, name: &str) -> Option<&str> {
        let key = ident::fold(name);
        if self.aliases.contains(&key) {
            return None;
        }
        match self.columns.get(&key).map(Vec::as_slice) {
            Some([only]) => Some(only.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub sql: String,
    /// Row count query for `SQL_CALC_FOUND_ROWS`.
    pub count_sql: Option<String>,
}

/// The term whose LIMIT `SQL_CALC_FOUND_ROWS` ignores, with the limit
/// stripped. Descends through parenthesized terms.
fn unlimited_term(q: &Query) -> Query {
    if q.limit_clause.is_none() {
        if let SetExpr::Query(inner) = q.body.as_ref() {
            if q.order_by.is_none() && q.with.is_none() {
                return unlimited_term(inner);
            }
        }
    }
    let mut term = q.clone();
    term.limit_clause = None;
    term
}

impl<'a> Translator<'a> {
    /// Translates a top-level SELECT.
    pub fn select_statement(&mut self, q: &Query, calc_found_rows: bool) -> Result<SelectPlan> {
        let sql = self.query(q)?;
        let count_sql = if calc_found_rows {
            let term = unlimited_term(q);
            Some(format!("SELECT COUNT(*) FROM ({})", self.query(&term)?))
        } else {
            None
        };
        Ok(SelectPlan { sql, count_sql })
    }

    pub fn subquery(&mut self, q: &Query) -> Result<String> {
        self.query(q)
    }

    pub fn query(&mut self, q: &Query) -> Result<String> {
        let (body, scope) = self.set_expr(&q.body)?;
        let mut out = String::new();
        if let Some(with) = &q.with {
            out.push_str("WITH ");
            if with.recursive {
                out.push_str("RECURSIVE ");
            }
            let mut ctes = Vec::new();
            for cte in &with.cte_tables {
                let mut name = ident::quote(&cte.alias.name.value);
                if !cte.alias.columns.is_empty() {
                    let cols: Vec<String> = cte.alias.columns.iter().map(|c| ident::quote(&c.name.value)).collect();
                    name.push_str(&format!("({})", cols.join(", ")));
                }
                ctes.push(format!("{name} AS ({})", self.query(&cte.query)?));
            }
            out.push_str(&ctes.join(", "));
            out.push(' ');
        }
        out.push_str(&body);

        if let Some(order_by) = &q.order_by {
            let OrderByKind::Expressions(items) = &order_by.kind else {
                return Err(DriverError::not_supported("select > ORDER BY ALL"));
            };
            self.scopes.push(scope.unwrap_or_default());
            let rendered: Result<Vec<String>> = items.iter().map(|i| self.order_item(i)).collect();
            self.scopes.pop();
            out.push_str(&format!(" ORDER BY {}", rendered?.join(", ")));
        }
        if let Some(limit) = &q.limit_clause {
            out.push_str(&self.limit(limit)?);
        }
        Ok(out)
    }

    fn limit(&mut self, limit: &LimitClause) -> Result<String> {
        match limit {
            LimitClause::LimitOffset { limit, offset, .. } => {
                let l = match limit {
                    Some(l) => self.expr(l)?,
                    None => "-1".to_string(),
                };
                match offset {
                    Some(o) => Ok(format!(" LIMIT {l} OFFSET {}", self.expr(&o.value)?)),
                    None => Ok(format!(" LIMIT {l}")),
                }
            }
            LimitClause::OffsetCommaLimit { offset, limit } => {
                Ok(format!(" LIMIT {} OFFSET {}", self.expr(limit)?, self.expr(offset)?))
            }
        }
    }

    /// One ORDER BY item, with unqualified names resolved against the
    /// enclosing select list.
    pub(super) fn order_item(&mut self, item: &OrderByExpr) -> Result<String> {
        let e = self.disambiguated(&item.expr)?;
        Ok(match item.options.asc {
            Some(true) => format!("{e} ASC"),
            Some(false) => format!("{e} DESC"),
            None => e,
        })
    }

    /// Renders `e`, replacing a bare or parenthesized column name with its
    /// qualified select-list form when that form is unique.
    fn disambiguated(&mut self, e: &Expr) -> Result<String> {
        let (name, nested) = match e {
            Expr::Identifier(i) if i.quote_style.is_some() || !i.value.starts_with('@') => (Some(&i.value), false),
            Expr::Nested(inner) => match inner.as_ref() {
                Expr::Identifier(i) if i.quote_style.is_some() || !i.value.starts_with('@') => (Some(&i.value), true),
                _ => (None, false),
            },
            _ => (None, false),
        };
        if let Some(name) = name {
            if let Some(q) = self.scopes.last().and_then(|s| s.qualify(name)) {
                let q = q.to_string();
                return Ok(if nested { format!("({q})") } else { q });
            }
        }
        self.expr(e)
    }

    /// Renders a query term. Returns the select-list scope when the term is
    /// a plain select.
    fn set_expr(&mut self, body: &SetExpr) -> Result<(String, Option<Scope>)> {
        match body {
            SetExpr::Select(s) => {
                let (sql, scope) = self.select(s)?;
                Ok((sql, Some(scope)))
            }
            SetExpr::Query(q) => {
                if q.with.is_none() && q.order_by.is_none() && q.limit_clause.is_none() {
                    self.set_expr(&q.body)
                } else {
                    // Compound members cannot carry their own ORDER BY/LIMIT.
                    Ok((format!("SELECT * FROM ({})", self.query(q)?), None))
                }
            }
            SetExpr::SetOperation { op, set_quantifier, left, right } => {
                let (l, _) = self.set_expr(left)?;
                let (r, _) = self.set_expr(right)?;
                let op = op.to_string().to_ascii_uppercase();
                let quantifier = match set_quantifier.to_string().to_ascii_uppercase().as_str() {
                    "ALL" => " ALL",
                    "" | "DISTINCT" => "",
                    other => {
                        return Err(DriverError::not_supported(format!("select > {op} {other}")));
                    }
                };
                Ok((format!("{l} {op}{quantifier} {r}"), None))
            }
            SetExpr::Values(values) => {
                let mut rows = Vec::new();
                for row in &values.rows {
                    rows.push(format!("({})", self.expr_list(row)?.join(", ")));
                }
                Ok((format!("VALUES {}", rows.join(", ")), None))
            }
            other => Err(DriverError::not_supported(format!("select > {other}"))),
        }
    }

    fn select(&mut self, s: &Select) -> Result<(String, Scope)> {
        let primary = std::mem::take(&mut self.primary_pending);
        if s.into.is_some() {
            return Err(DriverError::not_supported("select > SELECT ... INTO"));
        }
        let mut out = String::from("SELECT ");
        match &s.distinct {
            None => {}
            Some(ast::Distinct::Distinct) => out.push_str("DISTINCT "),
            #[allow(unreachable_patterns)]
            Some(other) => return Err(DriverError::not_supported(format!("select > {other}"))),
        }

        let items = std::mem::take(&mut self.items);
        let verbatim = primary && items.len() == s.projection.len();
        let mut scope = Scope::default();
        let mut rendered = Vec::with_capacity(s.projection.len());
        for (i, item) in s.projection.iter().enumerate() {
            let text = if verbatim { items.get(i).map(String::as_str) } else { None };
            rendered.push(self.select_item(item, text, &mut scope)?);
        }
        out.push_str(&rendered.join(", "));

        if !s.from.is_empty() {
            let mut from = Vec::new();
            for twj in &s.from {
                from.push(self.table_with_joins(twj)?);
            }
            out.push_str(&format!(" FROM {}", from.join(", ")));
        }
        if let Some(selection) = &s.selection {
            out.push_str(&format!(" WHERE {}", self.expr(selection)?));
        }

        self.scopes.push(scope);
        let tail = self.group_and_having(s);
        let scope = self.scopes.pop().unwrap_or_default();
        out.push_str(&tail?);
        Ok((out, scope))
    }

    fn group_and_having(&mut self, s: &Select) -> Result<String> {
        let mut out = String::new();
        match &s.group_by {
            GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(DriverError::not_supported("select > GROUP BY ... WITH ROLLUP"));
                }
                if !exprs.is_empty() {
                    let rendered: Result<Vec<String>> = exprs.iter().map(|e| self.disambiguated(e)).collect();
                    out.push_str(&format!(" GROUP BY {}", rendered?.join(", ")));
                }
            }
            GroupByExpr::All(_) => return Err(DriverError::not_supported("select > GROUP BY ALL")),
        }
        if let Some(having) = &s.having {
            out.push_str(&format!(" HAVING {}", self.having(having)?));
        }
        Ok(out)
    }

    /// HAVING conditions: names in simple comparisons are disambiguated.
    fn having(&mut self, e: &Expr) -> Result<String> {
        match e {
            Expr::BinaryOp { left, op, right } if matches!(op, ast::BinaryOperator::And | ast::BinaryOperator::Or) => {
                Ok(format!("({} {op} {})", self.having(left)?, self.having(right)?))
            }
            Expr::BinaryOp { left, op, right }
                if matches!(
                    op,
                    ast::BinaryOperator::Eq
                        | ast::BinaryOperator::NotEq
                        | ast::BinaryOperator::Lt
                        | ast::BinaryOperator::LtEq
                        | ast::BinaryOperator::Gt
                        | ast::BinaryOperator::GtEq
                ) =>
            {
                Ok(format!("({} {op} {})", self.disambiguated(left)?, self.disambiguated(right)?))
            }
            other => self.disambiguated(other),
        }
    }

    fn select_item(&mut self, item: &SelectItem, text: Option<&str>, scope: &mut Scope) -> Result<String> {
        match item {
            SelectItem::UnnamedExpr(e) => {
                let sql = self.expr(e)?;
                if let Expr::CompoundIdentifier(ids) = e {
                    if let Some(last) = ids.last().filter(|_| ids.len() >= 2 && !ids[0].value.starts_with('@')) {
                        scope
                            .columns
                            .entry(ident::fold(&last.value))
                            .or_default()
                            .push(sql.clone());
                    }
                }
                let alias = match (e, text) {
                    (_, None) => None,
                    (Expr::Identifier(i), _) if i.quote_style.is_some() || !i.value.starts_with('@') => None,
                    (Expr::CompoundIdentifier(ids), _) if !ids[0].value.starts_with('@') => None,
                    (Expr::Value(v), Some(text)) => match &v.value {
                        ast::Value::SingleQuotedString(s)
                        | ast::Value::DoubleQuotedString(s)
                        // The derived name ends at the first NUL, as in MySQL.
                        | ast::Value::NationalStringLiteral(s) => Some(s.split('\0').next().unwrap_or("").to_string()),
                        _ => Some(text.to_string()),
                    },
                    (_, Some(text)) => Some(text.to_string()),
                };
                match alias {
                    Some(alias) if alias != sql => {
                        scope.aliases.insert(ident::fold(&alias));
                        Ok(format!("{sql} AS {}", ident::quote(&alias)))
                    }
                    _ => Ok(sql),
                }
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                if alias.value.contains('\0') {
                    return Err(DriverError::Parse(format!(
                        "identifier contains a NUL byte: '{}'",
                        alias.value.replace('\0', "\\0")
                    )));
                }
                scope.aliases.insert(ident::fold(&alias.value));
                Ok(format!("{} AS {}", self.expr(expr)?, ident::quote(&alias.value)))
            }
            SelectItem::Wildcard(_) => Ok("*".to_string()),
            SelectItem::QualifiedWildcard(kind, _) => match kind {
                SelectItemQualifiedWildcardKind::ObjectName(name) => {
                    let parts = names::object_parts(name)?;
                    let table = match parts.as_slice() {
                        [t] => t,
                        [schema, t] => {
                            names::check_schema(self.session, schema)?;
                            t
                        }
                        _ => return Err(DriverError::not_supported(format!("select > {name}.*"))),
                    };
                    Ok(format!("{}.*", ident::quote(table)))
                }
                #[allow(unreachable_patterns)]
                other => Err(DriverError::not_supported(format!("select > {other}.*"))),
            },
        }
    }

    pub(super) fn table_with_joins(&mut self, twj: &TableWithJoins) -> Result<String> {
        let mut out = self.table_factor(&twj.relation)?;
        for join in &twj.joins {
            let relation = self.table_factor(&join.relation)?;
            let (kind, constraint) = match &join.join_operator {
                JoinOperator::Join(c) | JoinOperator::Inner(c) | JoinOperator::StraightJoin(c) => ("JOIN", c),
                JoinOperator::CrossJoin(c) => ("CROSS JOIN", c),
                JoinOperator::Left(c) | JoinOperator::LeftOuter(c) => ("LEFT JOIN", c),
                JoinOperator::Right(c) | JoinOperator::RightOuter(c) => {
                    self.require_right_join("RIGHT JOIN")?;
                    ("RIGHT JOIN", c)
                }
                JoinOperator::FullOuter(c) => {
                    self.require_right_join("FULL OUTER JOIN")?;
                    ("FULL OUTER JOIN", c)
                }
                other => return Err(DriverError::not_supported(format!("join > {other:?}"))),
            };
            match constraint {
                JoinConstraint::On(e) => out.push_str(&format!(" {kind} {relation} ON {}", self.expr(e)?)),
                JoinConstraint::Using(cols) => {
                    let cols: Result<Vec<String>> = cols
                        .iter()
                        .map(|c| {
                            names::object_parts(c)?
                                .pop()
                                .map(|n| ident::quote(&n))
                                .ok_or_else(|| DriverError::Invalid("empty USING column".into()))
                        })
                        .collect();
                    out.push_str(&format!(" {kind} {relation} USING ({})", cols?.join(", ")));
                }
                JoinConstraint::Natural => out.push_str(&format!(" NATURAL {kind} {relation}")),
                JoinConstraint::None => out.push_str(&format!(" {kind} {relation}")),
            }
        }
        Ok(out)
    }

    fn require_right_join(&self, what: &str) -> Result<()> {
        if self.caps.right_join {
            Ok(())
        } else {
            Err(DriverError::not_supported(format!(
                "join > {what} on SQLite {}",
                self.caps.version
            )))
        }
    }

    pub(super) fn table_factor(&mut self, factor: &TableFactor) -> Result<String> {
        match factor {
            TableFactor::Table { name, alias, args, .. } => {
                if args.is_some() {
                    return Err(DriverError::not_supported(format!("table > table function {name}")));
                }
                let alias = alias.as_ref().map(|a| ident::quote(&a.name.value));
                match names::resolve_table(self.session, name)? {
                    TableRef::User(t) => Ok(match alias {
                        Some(a) => format!("{} AS {a}", ident::quote(&t)),
                        None => ident::quote(&t),
                    }),
                    TableRef::InfoSchema(table) => {
                        let written = names::object_parts(name)?.pop().unwrap_or_default();
                        let alias = alias.unwrap_or_else(|| ident::quote(&written));
                        Ok(format!(
                            "({}) AS {alias}",
                            names::info_schema_subquery(table, &self.session.database)
                        ))
                    }
                }
            }
            TableFactor::Derived { subquery, alias, .. } => {
                let sub = self.subquery(subquery)?;
                match alias {
                    Some(a) if !a.columns.is_empty() => {
                        Err(DriverError::not_supported("table > derived table column list"))
                    }
                    Some(a) => Ok(format!("({sub}) AS {}", ident::quote(&a.name.value))),
                    None => Ok(format!("({sub})")),
                }
            }
            TableFactor::NestedJoin { table_with_joins, alias, .. } => {
                if alias.is_some() {
                    return Err(DriverError::not_supported("table > aliased nested join"));
                }
                Ok(format!("({})", self.table_with_joins(table_with_joins)?))
            }
            other => Err(DriverError::not_supported(format!("table > {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::session::{Session, SqlMode};
    use crate::translator::Source;
    use sqlparser::ast::Statement;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn session() -> Session {
        let mut s = Session::new(1, "app", SqlMode::STRICT_TRANS_TABLES);
        s.current_db = Some("app".into());
        s
    }

    fn translate(session: &Session, engine: &Engine, sql: &str) -> SelectPlan {
        let source = Source::prepare(sql, true).unwrap();
        let stmt = Parser::parse_sql(&MySqlDialect {}, &source.text).unwrap().remove(0);
        let Statement::Query(q) = stmt else { panic!("not a query") };
        Translator::new(session, engine)
            .with_source(&source)
            .select_statement(&q, source.calc_found_rows)
            .unwrap()
    }

    #[test]
    fn unaliased_items_take_their_source_text() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(&s, &engine, "SELECT a, t.b, 'x\\0y', COUNT(*), 1 + 2, 1 FROM t");
        assert_eq!(
            plan.sql,
            "SELECT \"a\", \"t\".\"b\", CAST(X'780079' AS TEXT) AS \"x\", COUNT(*), (1 + 2) AS \"1 + 2\", 1 FROM \"t\""
        );
        assert_eq!(plan.count_sql, None);
    }

    #[test]
    fn order_by_is_qualified_only_when_unambiguous() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(&s, &engine, "SELECT t1.name FROM t1 JOIN t2 ON t1.id = t2.id ORDER BY name");
        assert!(plan.sql.ends_with("ORDER BY \"t1\".\"name\""), "{}", plan.sql);

        let plan = translate(
            &s,
            &engine,
            "SELECT t1.name, t2.name FROM t1 JOIN t2 ON t1.id = t2.id ORDER BY name",
        );
        assert!(plan.sql.ends_with("ORDER BY \"name\""), "{}", plan.sql);

        let plan = translate(
            &s,
            &engine,
            "SELECT t1.name FROM t1 JOIN t2 ON t1.id = t2.id GROUP BY (name) HAVING name > 'a' ORDER BY name DESC",
        );
        assert!(plan.sql.contains("GROUP BY (\"t1\".\"name\")"), "{}", plan.sql);
        assert!(plan.sql.contains("HAVING (\"t1\".\"name\" > 'a')"), "{}", plan.sql);
        assert!(plan.sql.ends_with("ORDER BY \"t1\".\"name\" DESC"), "{}", plan.sql);
    }

    #[test]
    fn calc_found_rows_counts_the_unlimited_term() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(&s, &engine, "SELECT SQL_CALC_FOUND_ROWS * FROM t ORDER BY id LIMIT 1, 2");
        assert_eq!(plan.sql, "SELECT * FROM \"t\" ORDER BY \"id\" LIMIT 2 OFFSET 1");
        assert_eq!(
            plan.count_sql.as_deref(),
            Some("SELECT COUNT(*) FROM (SELECT * FROM \"t\" ORDER BY \"id\")")
        );
    }

    #[test]
    fn information_schema_reads_the_catalog() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(&s, &engine, "SELECT table_name FROM information_schema.tables WHERE table_schema = 'app'");
        assert!(plan.sql.contains("FROM _mysql_information_schema_tables) AS \"tables\""), "{}", plan.sql);
    }

    #[test]
    fn calc_found_rows_over_unions() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(
            &s,
            &engine,
            "SELECT SQL_CALC_FOUND_ROWS a FROM t UNION SELECT b FROM u ORDER BY a LIMIT 2 OFFSET 1",
        );
        assert!(plan.sql.ends_with("LIMIT 2 OFFSET 1"), "{}", plan.sql);
        let count = plan.count_sql.unwrap();
        assert!(!count.contains("LIMIT"), "{count}");
        assert!(count.contains("UNION"), "{count}");

        // Member limits stay; only the outermost one is lifted.
        let plan = translate(
            &s,
            &engine,
            "(SELECT SQL_CALC_FOUND_ROWS a FROM t LIMIT 5) UNION ALL (SELECT b FROM u) LIMIT 2",
        );
        let count = plan.count_sql.unwrap();
        assert!(count.contains("LIMIT 5"), "{count}");
        assert!(!count.contains("LIMIT 2"), "{count}");
    }

    #[test]
    fn nul_in_select_names() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(&s, &engine, "SELECT 'ab\0cd'");
        assert!(plan.sql.ends_with("AS \"ab\""), "{}", plan.sql);

        let stmt = Parser::parse_sql(&MySqlDialect {}, "SELECT 1 AS `a\u{0}b`").unwrap().remove(0);
        let Statement::Query(q) = stmt else { panic!("not a query") };
        let err = Translator::new(&s, &engine).select_statement(&q, false).unwrap_err();
        assert_eq!(err.code(), 1064);
    }

    #[test]
    fn unions_and_parenthesized_terms() {
        let engine = Engine::open_in_memory().unwrap();
        let s = session();
        let plan = translate(&s, &engine, "(SELECT a FROM t) UNION ALL (SELECT b FROM u LIMIT 1)");
        assert_eq!(
            plan.sql,
            "SELECT \"a\" FROM \"t\" UNION ALL SELECT * FROM (SELECT \"b\" FROM \"u\" LIMIT 1)"
        );
    }
}
