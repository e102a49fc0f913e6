//! Per-connection statement driver.
//!
//! A statement is preprocessed, then either claimed by one of the
//! token-level handlers for MySQL syntax outside the parser's grammar, or
//! parsed and dispatched on its AST. ALTER TABLE and CREATE INDEX
//! statements the parser rejects get a second, clause-level reading in
//! the DDL module. Everything that touches tables runs
//! inside a wrapper from the transaction coordinator, so the engine
//! statements one MySQL statement expands to apply together or not at all.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value;
use sqlparser::ast::{
    self, ContextModifier, Delete, Expr, Ident, Insert, ObjectName, ObjectType, Query, Statement,
    TransactionAccessMode, TransactionIsolationLevel, TransactionMode, Update,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, info, warn};

use crate::catalog::builder::Mutator;
use crate::catalog::ddl::{
    self, AlterAction, ConstraintSpec, CreateTable, QualifiedName, TableBody, TableOptions,
};
use crate::catalog::reconciler::Reconciler;
use crate::catalog::store::CatalogStore;
use crate::catalog::{reconstruct, TableSchema};
use crate::config::Config;
use crate::engine::{unique_violation_columns, Engine};
use crate::error::{DriverError, Result};
use crate::ident;
use crate::lexer::{self, Tok, Token};
use crate::model::{Cell, ExecOutput};
use crate::session::{FoundRows, Session, SqlMode};
use crate::translator::dml::DeletePlan;
use crate::translator::names;
use crate::translator::show::{self, Filter};
use crate::translator::{parse_error, render_expression, Source, Translator};
use crate::txn::Coordinator;

/// Rowids per DELETE when applying a multi-table delete.
const DELETE_CHUNK: usize = 500;

const MAINTENANCE_OPS: &[&str] = &["ANALYZE", "CHECK", "OPTIMIZE", "REPAIR"];

pub struct Driver {
    config: Arc<Config>,
    engine: Engine,
    session: Session,
    txn: Coordinator,
}

impl Driver {
    /// Opens a connection to the configured database file.
    pub fn open(config: Arc<Config>, conn_id: u32) -> Result<Driver> {
        let engine = Engine::open(
            &config.database_path(),
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        Driver::new(config, engine, conn_id)
    }

    pub fn new(config: Arc<Config>, mut engine: Engine, conn_id: u32) -> Result<Driver> {
        engine.set_hook(Box::new(move |sql: &str, params: &[Value]| {
            debug!(target: "mysql_on_sqlite::engine", conn_id, sql, params = ?params, "engine statement");
        }));
        let store = CatalogStore::new(&engine);
        store.ensure_tables()?;
        store.ensure_temporary_tables()?;

        let mut session = Session::new(conn_id, &config.database, SqlMode::parse(&config.sql_mode)?);
        session.user = config.root_user.clone();
        session.current_db = Some(config.database.clone());
        Ok(Driver {
            config,
            engine,
            session,
            txn: Coordinator::new(),
        })
    }

    /// Startup step run once before connections are accepted.
    pub fn bootstrap(config: &Config) -> Result<()> {
        let engine = Engine::open(
            &config.database_path(),
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        Driver::reconcile_catalog(config, &engine)
    }

    /// Repairs catalog drift when the recorded driver version is stale.
    pub fn reconcile_catalog(config: &Config, engine: &Engine) -> Result<()> {
        let store = CatalogStore::new(engine);
        store.ensure_tables()?;
        if !Reconciler::is_due(&store, config.force_reconcile)? {
            debug!("catalog is current");
            return Ok(());
        }
        let mut reconciler = Reconciler::new(engine);
        if let Some(path) = &config.schema_file {
            let script = std::fs::read_to_string(path)?;
            reconciler = reconciler.with_schema_script(&script)?;
        }
        engine.execute_batch("BEGIN IMMEDIATE")?;
        match reconciler.reconcile() {
            Ok(report) => {
                engine.execute_batch("COMMIT")?;
                info!(
                    added = report.added.len(),
                    purged = report.purged.len(),
                    "catalog reconciled"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = engine.execute_batch("ROLLBACK") {
                    warn!(%rollback, "reconcile rollback failed");
                }
                Err(err)
            }
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_user(&mut self, user: &str) {
        self.session.user = user.to_string();
    }

    pub fn autocommit(&self) -> bool {
        self.session.autocommit
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.in_transaction()
    }

    /// `USE db` and COM_INIT_DB.
    pub fn use_database(&mut self, name: &str) -> Result<()> {
        if self.session.is_main_schema(name) {
            self.session.current_db = Some(self.config.database.clone());
        } else if names::is_information_schema(name) {
            self.session.current_db = Some(names::INFORMATION_SCHEMA.to_string());
        } else {
            return Err(DriverError::UnknownDatabase(name.to_string()));
        }
        Ok(())
    }

    /// Runs one MySQL statement to completion.
    pub fn query(&mut self, sql: &str) -> Result<ExecOutput> {
        let source = Source::prepare(sql, !self.session.no_backslash_escapes())?;
        let tokens: Vec<Token> = lexer::tokenize(&source.text, true)?
            .into_iter()
            .filter(|t| !t.is_punct(';'))
            .collect();
        if tokens.is_empty() {
            return Ok(ExecOutput::ok());
        }
        let out = match self.handle_tokens(&source, &tokens) {
            Some(out) => out?,
            None => self.parsed(&source, &tokens)?,
        };
        self.session.row_count = match &out {
            ExecOutput::Ok { affected_rows, .. } => *affected_rows as i64,
            ExecOutput::ResultSet { .. } => -1,
        };
        Ok(out)
    }

    /// Runs `f` inside a statement wrapper. Any failure rolls back the
    /// statement and the client's transaction.
    fn wrapped<F>(&mut self, read_only: bool, f: F) -> Result<ExecOutput>
    where
        F: FnOnce(&mut Driver) -> Result<ExecOutput>,
    {
        if !self.session.autocommit {
            self.txn.ensure_transaction(&self.engine)?;
        }
        self.txn.begin_wrapper(&self.engine, read_only)?;
        let out = f(self).and_then(|out| {
            self.txn.commit_wrapper(&self.engine)?;
            Ok(out)
        });
        if out.is_err() {
            self.txn.rollback_after_failure(&self.engine);
        }
        out
    }

    /// DDL commits the open transaction first, except on temporary tables.
    fn ddl<F>(&mut self, temporary: bool, f: F) -> Result<ExecOutput>
    where
        F: FnOnce(&mut Driver) -> Result<ExecOutput>,
    {
        if !temporary {
            self.txn.implicit_commit(&self.engine)?;
        }
        self.wrapped(false, f)
    }

    // Statements outside the parser's grammar.

    fn handle_tokens(&mut self, source: &Source, tokens: &[Token]) -> Option<Result<ExecOutput>> {
        let word = |i: usize| -> String {
            match tokens.get(i).map(|t| &t.tok) {
                Some(Tok::Word(w)) => w.to_ascii_uppercase(),
                _ => String::new(),
            }
        };
        match word(0).as_str() {
            op if MAINTENANCE_OPS.contains(&op) && tokens.len() > 1 => {
                Some(self.maintenance(&op.to_ascii_lowercase(), &tokens[1..]))
            }
            "SHOW" => self.show_tokens(&source.text, tokens),
            _ => None,
        }
    }

    /// ALTER TABLE and CREATE INDEX statements using MySQL clauses the
    /// parser rejects. Anything else keeps the parser's error.
    fn unparsed(&mut self, text: &str, tokens: &[Token], err: DriverError) -> Result<ExecOutput> {
        let word = |i: usize| -> String {
            match tokens.get(i).map(|t| &t.tok) {
                Some(Tok::Word(w)) => w.to_ascii_uppercase(),
                _ => String::new(),
            }
        };
        match (word(0).as_str(), word(1).as_str(), word(2).as_str()) {
            ("ALTER", "TABLE", _) | ("ALTER", "IGNORE", "TABLE") => {
                debug!("reading ALTER TABLE clause by clause");
                self.alter_table(ddl::parse_alter_table(text)?)
            }
            ("CREATE", "FULLTEXT" | "SPATIAL", "INDEX") => {
                self.create_index(ddl::parse_create_index(text)?)
            }
            _ => Err(err),
        }
    }

    fn show_tokens(&mut self, text: &str, tokens: &[Token]) -> Option<Result<ExecOutput>> {
        let mut i = 1;
        if tokens.get(i).is_some_and(|t| t.is_word("EXTENDED")) {
            i += 1;
        }
        let next = tokens.get(i)?;
        if next.is_word("INDEX") || next.is_word("INDEXES") || next.is_word("KEYS") {
            return Some(self.show_index(&tokens[i + 1..]));
        }
        if next.is_word("TABLE") && tokens.get(i + 1).is_some_and(|t| t.is_word("STATUS")) {
            return Some(self.show_table_status(text, &tokens[i + 2..]));
        }
        if next.is_word("GRANTS") {
            return Some(Ok(show::grants(&self.session)));
        }
        if next.is_word("WARNINGS") || next.is_word("ERRORS") {
            return Some(Ok(show::warnings()));
        }
        None
    }

    /// SHOW INDEX FROM t [FROM db].
    fn show_index(&mut self, tokens: &[Token]) -> Result<ExecOutput> {
        let mut i = 0;
        if !tokens.first().is_some_and(|t| t.is_word("FROM") || t.is_word("IN")) {
            return Err(syntax_error_at(tokens));
        }
        i += 1;
        let (mut schema, table) = object_name(tokens, &mut i).ok_or_else(|| syntax_error_at(&tokens[i..]))?;
        if tokens.get(i).is_some_and(|t| t.is_word("FROM") || t.is_word("IN")) {
            i += 1;
            schema = tokens.get(i).and_then(Token::ident).map(str::to_string);
        }
        let mut parts = Vec::new();
        if let Some(schema) = schema {
            parts.push(Ident::new(schema));
        }
        parts.push(Ident::new(table));
        let name = ObjectName::from(parts);
        self.wrapped(true, |d| show::index(&d.session, &d.engine, &name))
    }

    /// SHOW TABLE STATUS [FROM db] [LIKE 'p' | WHERE expr].
    fn show_table_status(&mut self, text: &str, tokens: &[Token]) -> Result<ExecOutput> {
        let mut i = 0;
        if tokens.first().is_some_and(|t| t.is_word("FROM") || t.is_word("IN")) {
            let schema = tokens
                .get(1)
                .and_then(Token::ident)
                .ok_or_else(|| syntax_error_at(tokens))?;
            names::check_schema(&self.session, schema)?;
            i = 2;
        }
        match tokens.get(i) {
            None => self.wrapped(true, |d| show::table_status(&d.session, &d.engine, Filter::None)),
            Some(t) if t.is_word("LIKE") => {
                let Some(Tok::Str(pattern)) = tokens.get(i + 1).map(|t| &t.tok) else {
                    return Err(syntax_error_at(&tokens[i..]));
                };
                let pattern = pattern.clone();
                self.wrapped(true, |d| {
                    show::table_status(&d.session, &d.engine, Filter::Like(&pattern))
                })
            }
            Some(t) if t.is_word("WHERE") => {
                let dialect = MySqlDialect {};
                let expr = Parser::new(&dialect)
                    .try_with_sql(&text[t.end..])
                    .and_then(|mut p| p.parse_expr())
                    .map_err(parse_error)?;
                self.wrapped(true, |d| {
                    show::table_status(&d.session, &d.engine, Filter::Where(&expr))
                })
            }
            Some(_) => Err(syntax_error_at(&tokens[i..])),
        }
    }

    fn create_table(&mut self, ct: CreateTable) -> Result<ExecOutput> {
        self.check_qualifier(ct.schema.as_deref())?;
        self.ddl(ct.temporary, |d| d.record_create_table(&ct))
    }

    fn record_create_table(&mut self, ct: &CreateTable) -> Result<ExecOutput> {
        let store = CatalogStore::new(&self.engine);
        if store.exists(&ct.name, ct.temporary)? {
            if ct.if_not_exists {
                return Ok(ExecOutput::ok());
            }
            return Err(DriverError::TableExists(ct.name.clone()));
        }
        let mutator = Mutator::new(store, self.foreign_key_checks());
        let schema = match &ct.body {
            TableBody::Definition {
                columns,
                constraints,
                options,
            } => mutator.record_create_table(&ct.name, ct.temporary, columns, constraints, options)?,
            TableBody::Like { schema, name } => {
                self.check_qualifier(schema.as_deref())?;
                let source = self.load_table(name)?;
                mutator.record_create_like(&ct.name, ct.temporary, &source)?
            }
        };
        let render = |text: &str| render_expression(&self.session, &self.engine, text);
        for sql in reconstruct::create_statements(&schema, &render)? {
            self.engine.execute_batch(&sql)?;
        }
        if let Some(next) = schema.auto_increment.filter(|n| *n > 1) {
            if schema.auto_increment_column().is_some() {
                self.write_sequence(&schema.name, schema.temporary, next - 1)?;
            }
        }
        debug!(table = %schema.name, temporary = schema.temporary, "created table");
        Ok(ExecOutput::ok())
    }

    fn alter_table(&mut self, at: ddl::AlterTable) -> Result<ExecOutput> {
        self.check_qualifier(at.schema.as_deref())?;
        self.ddl(false, |d| {
            let current = d.load_table(&at.name)?;
            let mutator = Mutator::new(CatalogStore::new(&d.engine), d.foreign_key_checks());
            let outcome = mutator.record_alter_table(&current, &at.actions)?;
            if outcome.needs_rebuild || outcome.previous_name != outcome.schema.name {
                d.rebuild(&outcome.previous_name, &outcome.schema, &outcome.sources)?;
            }
            for action in &at.actions {
                if let AlterAction::Options(TableOptions {
                    auto_increment: Some(next),
                    ..
                }) = action
                {
                    d.raise_sequence(&outcome.schema, next - 1)?;
                }
            }
            Ok(ExecOutput::ok())
        })
    }

    fn create_index(&mut self, ci: ddl::CreateIndex) -> Result<ExecOutput> {
        self.check_qualifier(ci.schema.as_deref())?;
        self.ddl(false, |d| {
            let current = d.load_table(&ci.table)?;
            if ci.if_not_exists && index_name(&ci.index).is_some_and(|n| current.index(n).is_some()) {
                return Ok(ExecOutput::ok());
            }
            let mutator = Mutator::new(CatalogStore::new(&d.engine), d.foreign_key_checks());
            let schema = mutator.record_create_index(&current, &ci.index)?;
            let render = |text: &str| render_expression(&d.session, &d.engine, text);
            for index in schema.indexes.iter().filter(|i| current.index(&i.name).is_none()) {
                if let Some(sql) = reconstruct::index_sql(&schema, index, &schema.name, &render)? {
                    d.engine.execute_batch(&sql)?;
                }
            }
            Ok(ExecOutput::ok())
        })
    }

    fn drop_index(&mut self, di: ddl::DropIndex) -> Result<ExecOutput> {
        self.check_qualifier(di.schema.as_deref())?;
        self.ddl(false, |d| {
            let current = d.load_table(&di.table)?;
            let mutator = Mutator::new(CatalogStore::new(&d.engine), d.foreign_key_checks());
            let schema = mutator.record_drop_index(&current, &di.name)?;
            if di.name.eq_ignore_ascii_case("PRIMARY") {
                d.rebuild(&current.name, &schema, &same_columns(&schema))?;
            } else {
                let stored = current
                    .index(&di.name)
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| di.name.clone());
                let physical = ident::physical_index_name(&current.name, &stored);
                d.engine.execute_batch(&format!(
                    "DROP INDEX IF EXISTS {}",
                    reconstruct::qualified(&physical, current.temporary)
                ))?;
            }
            Ok(ExecOutput::ok())
        })
    }

    fn rename_tables(&mut self, pairs: Vec<(QualifiedName, QualifiedName)>) -> Result<ExecOutput> {
        for ((old_schema, _), (new_schema, _)) in &pairs {
            self.check_qualifier(old_schema.as_deref())?;
            self.check_qualifier(new_schema.as_deref())?;
        }
        self.ddl(false, |d| {
            for ((_, old), (_, new)) in &pairs {
                let current = d.load_table(old)?;
                if CatalogStore::new(&d.engine).exists(new, current.temporary)? {
                    return Err(DriverError::TableExists(new.clone()));
                }
                let mutator = Mutator::new(CatalogStore::new(&d.engine), d.foreign_key_checks());
                let schema = mutator.record_rename_table(&current, new)?;
                d.rebuild(&current.name, &schema, &same_columns(&schema))?;
            }
            Ok(ExecOutput::ok())
        })
    }

    /// TRUNCATE [TABLE] t: removes every row and restarts AUTO_INCREMENT.
    fn truncate(&mut self, targets: Vec<QualifiedName>) -> Result<ExecOutput> {
        for (schema, _) in &targets {
            self.check_qualifier(schema.as_deref())?;
        }
        self.ddl(false, |d| {
            for (_, table) in &targets {
                let current = d.load_table(table)?;
                let physical = reconstruct::qualified(&current.name, current.temporary);
                d.engine.execute(&format!("DELETE FROM {physical}"), &[])?;
                if d.has_sequence_table(current.temporary)? {
                    d.engine.execute(
                        &format!("DELETE FROM {} WHERE name = ?", sequence_table(current.temporary)),
                        &[Value::Text(current.name.clone())],
                    )?;
                }
            }
            Ok(ExecOutput::ok())
        })
    }

    /// ANALYZE, CHECK, OPTIMIZE and REPAIR TABLE report a status row per
    /// table. Only ANALYZE does anything in the engine.
    fn maintenance(&mut self, op: &str, tokens: &[Token]) -> Result<ExecOutput> {
        let mut i = 0;
        while tokens
            .get(i)
            .is_some_and(|t| t.is_word("NO_WRITE_TO_BINLOG") || t.is_word("LOCAL"))
        {
            i += 1;
        }
        if !tokens.get(i).is_some_and(|t| t.is_word("TABLE") || t.is_word("TABLES")) {
            return Err(syntax_error_at(&tokens[i.min(tokens.len())..]));
        }
        i += 1;
        let mut tables = Vec::new();
        loop {
            let (schema, table) = object_name(tokens, &mut i).ok_or_else(|| syntax_error_at(&tokens[i..]))?;
            self.check_qualifier(schema.as_deref())?;
            tables.push(table);
            if !tokens.get(i).is_some_and(|t| t.is_punct(',')) {
                break;
            }
            i += 1;
        }
        let op = op.to_string();
        self.wrapped(op != "analyze", |d| {
            let mut rows = Vec::new();
            for table in &tables {
                let label = Cell::Text(format!("{}.{table}", d.session.database));
                let row = |kind: &str, message: String| {
                    vec![label.clone(), Cell::Text(op.clone()), Cell::Text(kind.into()), Cell::Text(message)]
                };
                match CatalogStore::new(&d.engine).resolve(table)? {
                    Some((stored, temporary)) => {
                        if op == "analyze" {
                            d.engine
                                .execute_batch(&format!("ANALYZE {}", reconstruct::qualified(&stored, temporary)))?;
                        }
                        rows.push(row("status", "OK".into()));
                    }
                    None => {
                        rows.push(row(
                            "Error",
                            format!("Table '{}.{table}' doesn't exist", d.session.database),
                        ));
                        rows.push(row("status", "Operation failed".into()));
                    }
                }
            }
            Ok(ExecOutput::rows(&["Table", "Op", "Msg_type", "Msg_text"], rows))
        })
    }

    // Parsed statements.

    fn parsed(&mut self, source: &Source, tokens: &[Token]) -> Result<ExecOutput> {
        let mut statements = match Parser::parse_sql(&MySqlDialect {}, &source.text) {
            Ok(statements) => statements,
            Err(err) => return self.unparsed(&source.text, tokens, parse_error(err)),
        };
        if statements.len() > 1 {
            return Err(DriverError::not_supported("multiple statements"));
        }
        let Some(stmt) = statements.pop() else {
            return Ok(ExecOutput::ok());
        };
        match &stmt {
            Statement::Query(q) => self.wrapped(true, |d| d.select(source, q)),
            Statement::Insert(insert) => self.wrapped(false, |d| d.insert(insert)),
            Statement::Update(update) => self.wrapped(false, |d| d.update(update)),
            Statement::Delete(delete) => self.wrapped(false, |d| d.delete(delete)),
            Statement::ShowDatabases { .. }
            | Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowVariables { .. }
            | Statement::ShowStatus { .. }
            | Statement::ExplainTable { .. } => {
                self.wrapped(true, |d| show::show(&d.session, &d.engine, &stmt))
            }
            Statement::Set(set) => self.set(set),
            Statement::Use(target) => {
                let name = match target {
                    ast::Use::Object(name) | ast::Use::Database(name) => name,
                    other => return Err(DriverError::not_supported(format!("use > {other}"))),
                };
                let parts = names::object_parts(name)?;
                let db = parts.last().cloned().unwrap_or_default();
                self.use_database(&db)?;
                Ok(ExecOutput::ok())
            }
            Statement::StartTransaction { modes, .. } => {
                let read_only = modes
                    .iter()
                    .any(|m| matches!(m, TransactionMode::AccessMode(TransactionAccessMode::ReadOnly)));
                self.txn.begin(&self.engine, read_only)?;
                Ok(ExecOutput::ok())
            }
            Statement::Commit { .. } => {
                self.txn.commit(&self.engine)?;
                Ok(ExecOutput::ok())
            }
            Statement::Rollback {
                savepoint: Some(name),
                ..
            } => {
                self.txn.rollback_to_savepoint(&self.engine, &name.value)?;
                Ok(ExecOutput::ok())
            }
            Statement::Rollback { .. } => {
                self.txn.rollback(&self.engine)?;
                Ok(ExecOutput::ok())
            }
            Statement::Savepoint { name } => {
                self.txn.savepoint(&self.engine, &name.value)?;
                Ok(ExecOutput::ok())
            }
            Statement::ReleaseSavepoint { name } => {
                self.txn.release_savepoint(&self.engine, &name.value)?;
                Ok(ExecOutput::ok())
            }
            Statement::CreateDatabase {
                db_name,
                if_not_exists,
                ..
            } => {
                let db = names::object_parts(db_name)?.pop().unwrap_or_default();
                if !self.session.is_main_schema(&db) {
                    return Err(DriverError::not_supported("create database > other schema"));
                }
                if *if_not_exists {
                    Ok(ExecOutput::ok())
                } else {
                    Err(DriverError::DatabaseExists(db))
                }
            }
            Statement::Drop {
                object_type: ObjectType::Database | ObjectType::Schema,
                names: targets,
                if_exists,
                ..
            } => {
                for target in targets {
                    let db = names::object_parts(target)?.pop().unwrap_or_default();
                    if self.session.is_main_schema(&db) || names::is_information_schema(&db) {
                        return Err(DriverError::not_supported("drop database > configured schema"));
                    }
                    if !*if_exists {
                        return Err(DriverError::value(
                            1008,
                            format!("Can't drop database '{db}'; database doesn't exist"),
                        ));
                    }
                }
                Ok(ExecOutput::ok())
            }
            Statement::CreateTable(ct) => self.create_table(ddl::create_table(ct)?),
            Statement::AlterTable(at) => self.alter_table(ddl::alter_table(at)?),
            Statement::CreateIndex(ci) => self.create_index(ddl::create_index(ci)?),
            Statement::Drop {
                object_type: ObjectType::Index,
                names: targets,
                table,
                ..
            } => self.drop_index(ddl::drop_index(targets, table.as_ref())?),
            Statement::RenameTable(renames) => self.rename_tables(ddl::rename_pairs(renames)?),
            Statement::Truncate(truncate) => {
                let targets = truncate
                    .table_names
                    .iter()
                    .map(|t| ddl::qualified(&t.name))
                    .collect::<Result<Vec<_>>>()?;
                self.truncate(targets)
            }
            Statement::LockTables { .. } | Statement::UnlockTables => {
                debug!("table locks are not emulated");
                self.txn.implicit_commit(&self.engine)?;
                Ok(ExecOutput::ok())
            }
            Statement::Drop {
                object_type: ObjectType::Table,
                names: targets,
                if_exists,
                temporary,
                ..
            } => {
                let targets = targets
                    .iter()
                    .map(|n| names::user_table(&self.session, n))
                    .collect::<Result<Vec<_>>>()?;
                let (if_exists, temporary) = (*if_exists, *temporary);
                self.ddl(temporary, |d| d.drop_tables(&targets, if_exists, temporary))
            }
            _ => {
                let keyword = tokens
                    .first()
                    .and_then(Token::ident)
                    .unwrap_or_default()
                    .to_ascii_uppercase();
                Err(DriverError::not_supported(format!("statement > {keyword}")))
            }
        }
    }

    fn select(&mut self, source: &Source, q: &Query) -> Result<ExecOutput> {
        let plan = Translator::new(&self.session, &self.engine)
            .with_source(source)
            .select_statement(q, source.calc_found_rows)?;
        let result = self.engine.query(&plan.sql, &[])?;
        self.session.found_rows = match plan.count_sql {
            Some(count_sql) => {
                let n = self
                    .engine
                    .query_scalar(&count_sql, &[])?
                    .and_then(|c| c.as_i64())
                    .unwrap_or(0);
                FoundRows::Count(n.max(0) as u64)
            }
            None => FoundRows::Pending(plan.sql),
        };
        Ok(ExecOutput::ResultSet {
            columns: result.columns,
            rows: result.rows,
        })
    }

    fn insert(&mut self, insert: &Insert) -> Result<ExecOutput> {
        let plan = Translator::new(&self.session, &self.engine).insert(insert)?;
        let refine = |err: DriverError| match err {
            DriverError::BadNull(column) if plan.omitted.iter().any(|c| ident::eq(c, &column)) => {
                DriverError::NoDefault(column)
            }
            other => self.refine(other),
        };
        let affected = match self.engine.execute(&plan.sql, &[]) {
            Ok(n) => n,
            Err(DriverError::DuplicateEntry(_, columns))
                if plan.is_upsert() && !self.engine.capabilities().upsert_without_target =>
            {
                let retry = unique_violation_columns(&columns)
                    .and_then(|c| plan.with_conflict_target(&c));
                let Some(retry) = retry else {
                    return Err(refine(DriverError::DuplicateEntry(String::new(), columns)));
                };
                debug!(sql = %retry, "retrying upsert with the violated key as conflict target");
                self.engine.execute(&retry, &[]).map_err(refine)?
            }
            Err(err) => return Err(refine(err)),
        };
        let mut last_insert_id = 0;
        if plan.generates_ids && affected > 0 {
            let first = self.engine.last_insert_id() - (affected as i64 - 1);
            last_insert_id = first.max(0) as u64;
            self.session.last_insert_id = last_insert_id;
        }
        Ok(ExecOutput::Ok {
            affected_rows: affected as u64,
            last_insert_id,
            info: String::new(),
        })
    }

    fn update(&mut self, update: &Update) -> Result<ExecOutput> {
        let sql = Translator::new(&self.session, &self.engine).update(update)?;
        let affected = self.engine.execute(&sql, &[]).map_err(|e| self.refine(e))?;
        Ok(ExecOutput::Ok {
            affected_rows: affected as u64,
            last_insert_id: 0,
            info: format!("Rows matched: {affected}  Changed: {affected}  Warnings: 0"),
        })
    }

    fn delete(&mut self, delete: &Delete) -> Result<ExecOutput> {
        let plan = Translator::new(&self.session, &self.engine).delete(delete)?;
        let affected = match plan {
            DeletePlan::Single(sql) => self.engine.execute(&sql, &[])?,
            DeletePlan::Multi(targets) => {
                // Capture first: deleting from one target may change
                // which rows of the next one the join matches.
                let mut captured = Vec::with_capacity(targets.len());
                for target in &targets {
                    captured.push((&target.table, self.engine.query_strings(&target.rowids_sql, &[])?));
                }
                let mut total = 0;
                for (table, rowids) in captured {
                    for chunk in rowids.chunks(DELETE_CHUNK) {
                        total += self.engine.execute(
                            &format!(
                                "DELETE FROM {} WHERE rowid IN ({})",
                                ident::quote(table),
                                chunk.join(", ")
                            ),
                            &[],
                        )?;
                    }
                }
                total
            }
        };
        Ok(ExecOutput::affected(affected as u64))
    }

    fn drop_tables(&mut self, targets: &[String], if_exists: bool, temporary: bool) -> Result<ExecOutput> {
        let store = CatalogStore::new(&self.engine);
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for table in targets {
            match store.resolve(table)? {
                Some((stored, temp)) if temp || !temporary => found.push((stored, temp)),
                _ if if_exists => debug!(table = %table, "drop of missing table skipped"),
                _ => missing.push(format!("{}.{table}", self.session.database)),
            }
        }
        if !missing.is_empty() {
            return Err(DriverError::UnknownTable(missing.join(",")));
        }
        if self.foreign_key_checks() {
            for (table, temp) in &found {
                let blocking = store
                    .referencing_tables(table, *temp)?
                    .into_iter()
                    .find(|r| !found.iter().any(|(f, _)| ident::eq(f, r)));
                if let Some(child) = blocking {
                    return Err(DriverError::value(
                        3730,
                        format!("Cannot drop table '{table}' referenced by a foreign key constraint on table '{child}'."),
                    ));
                }
            }
        }
        let mutator = Mutator::new(store, false);
        for (table, temp) in &found {
            self.engine
                .execute_batch(&format!("DROP TABLE {}", reconstruct::qualified(table, *temp)))?;
            mutator.record_drop_table(table, *temp)?;
        }
        Ok(ExecOutput::ok())
    }

    fn set(&mut self, set: &ast::Set) -> Result<ExecOutput> {
        match set {
            ast::Set::SingleAssignment {
                scope,
                variable,
                values,
                ..
            } => {
                let value = values
                    .first()
                    .ok_or_else(|| DriverError::Parse("SET is missing a value".into()))?;
                self.assign(scope.as_ref(), variable, value)?;
            }
            ast::Set::MultipleAssignments { assignments } => {
                for a in assignments {
                    self.assign(a.scope.as_ref(), &a.name, &a.value)?;
                }
            }
            ast::Set::SetNames {
                charset_name,
                collation_name,
            } => {
                self.session
                    .set_names(&charset_name.value, collation_name.as_deref());
            }
            ast::Set::SetNamesDefault {} => self.session.set_names("utf8mb4", None),
            ast::Set::SetTransaction { modes, .. } => {
                for mode in modes {
                    match mode {
                        TransactionMode::AccessMode(access) => self
                            .session
                            .set_read_only(matches!(access, TransactionAccessMode::ReadOnly)),
                        TransactionMode::IsolationLevel(level) => {
                            let level = match level {
                                TransactionIsolationLevel::ReadUncommitted => "READ-UNCOMMITTED",
                                TransactionIsolationLevel::ReadCommitted => "READ-COMMITTED",
                                TransactionIsolationLevel::RepeatableRead => "REPEATABLE-READ",
                                TransactionIsolationLevel::Serializable => "SERIALIZABLE",
                                _ => return Err(DriverError::not_supported("set transaction > SNAPSHOT")),
                            };
                            self.session.set_isolation(level)?;
                        }
                    }
                }
            }
            other => return Err(DriverError::not_supported(format!("set > {other}"))),
        }
        Ok(ExecOutput::ok())
    }

    fn assign(&mut self, scope: Option<&ContextModifier>, name: &ObjectName, value: &Expr) -> Result<()> {
        let name = names::object_parts(name)?.join(".");
        if name.starts_with('@') && !name.starts_with("@@") {
            let value = self.evaluate(value)?;
            self.session.set_user_variable(&name, value);
            return Ok(());
        }
        if matches!(scope, Some(ContextModifier::Global)) || name.to_ascii_lowercase().starts_with("@@global.") {
            return Err(DriverError::not_supported("set > GLOBAL"));
        }
        let value = if is_default_keyword(value) {
            match ident::fold(name.trim_start_matches('@')).as_str() {
                "sql_mode" | "session.sql_mode" => Cell::Text(self.config.sql_mode.clone()),
                _ => return Ok(()),
            }
        } else {
            self.evaluate(value)?
        };
        let autocommit_was = self.session.autocommit;
        self.session.set_system_variable(&name, &value)?;
        if self.session.autocommit && !autocommit_was {
            self.txn.commit(&self.engine)?;
        }
        Ok(())
    }

    /// Value of a SET right-hand side. Bare words such as `ON` or
    /// `TRADITIONAL` are strings.
    fn evaluate(&self, value: &Expr) -> Result<Cell> {
        if let Expr::Identifier(word) = value {
            if word.quote_style.is_none() {
                return Ok(Cell::Text(word.value.clone()));
            }
        }
        let sql = Translator::new(&self.session, &self.engine).expr(value)?;
        Ok(self
            .engine
            .query_scalar(&format!("SELECT {sql}"), &[])?
            .unwrap_or(Cell::Null))
    }

    // Helpers.

    fn foreign_key_checks(&self) -> bool {
        self.session
            .system_variable("foreign_key_checks")
            .ok()
            .and_then(|c| c.as_i64())
            .map_or(true, |v| v != 0)
    }

    /// Checks the schema a DDL statement names, or the current one.
    fn check_qualifier(&self, schema: Option<&str>) -> Result<()> {
        let schema = match schema {
            Some(s) => s,
            None => self.session.current_db.as_deref().ok_or(DriverError::NoDatabase)?,
        };
        names::check_schema(&self.session, schema)?;
        if names::is_information_schema(schema) {
            return Err(DriverError::AccessDenied(
                self.session.user.clone(),
                names::INFORMATION_SCHEMA.to_string(),
            ));
        }
        Ok(())
    }

    fn load_table(&self, name: &str) -> Result<TableSchema> {
        CatalogStore::new(&self.engine)
            .load_any(name)?
            .ok_or_else(|| DriverError::NoSuchTable(format!("{}.{name}", self.session.database)))
    }

    /// Rebuilds a table into the shape of `schema`, keeping its
    /// AUTO_INCREMENT counter.
    fn rebuild(&self, old_name: &str, schema: &TableSchema, sources: &[Option<String>]) -> Result<()> {
        let sequence = self.read_sequence(old_name, schema.temporary)?;
        let render = |text: &str| render_expression(&self.session, &self.engine, text);
        let statements = reconstruct::rebuild_statements(
            old_name,
            schema,
            sources,
            self.session.sql_mode,
            self.session.is_strict(),
            &render,
        )?;
        for sql in statements {
            self.engine.execute_batch(&sql)?;
        }
        if let Some(seq) = sequence {
            if schema.auto_increment_column().is_some() {
                self.write_sequence(&schema.name, schema.temporary, seq)?;
            }
        }
        debug!(from = %old_name, to = %schema.name, "rebuilt table");
        Ok(())
    }

    fn has_sequence_table(&self, temporary: bool) -> Result<bool> {
        let master = if temporary { "temp.sqlite_master" } else { "main.sqlite_master" };
        Ok(self
            .engine
            .query_scalar(
                &format!("SELECT 1 FROM {master} WHERE type = 'table' AND name = 'sqlite_sequence'"),
                &[],
            )?
            .is_some())
    }

    fn read_sequence(&self, table: &str, temporary: bool) -> Result<Option<i64>> {
        if !self.has_sequence_table(temporary)? {
            return Ok(None);
        }
        Ok(self
            .engine
            .query_scalar(
                &format!("SELECT seq FROM {} WHERE name = ?", sequence_table(temporary)),
                &[Value::Text(table.to_string())],
            )?
            .and_then(|c| c.as_i64()))
    }

    fn write_sequence(&self, table: &str, temporary: bool, seq: i64) -> Result<()> {
        if !self.has_sequence_table(temporary)? {
            return Ok(());
        }
        let sequences = sequence_table(temporary);
        let name = Value::Text(table.to_string());
        self.engine
            .execute(&format!("DELETE FROM {sequences} WHERE name = ?"), &[name.clone()])?;
        self.engine.execute(
            &format!("INSERT INTO {sequences} (name, seq) VALUES (?, ?)"),
            &[name, Value::Integer(seq)],
        )?;
        Ok(())
    }

    /// `AUTO_INCREMENT = n` never moves the counter below existing ids.
    fn raise_sequence(&self, schema: &TableSchema, seq: i64) -> Result<()> {
        let Some(column) = schema.auto_increment_column() else {
            return Ok(());
        };
        let max_id = self
            .engine
            .query_scalar(
                &format!(
                    "SELECT MAX({}) FROM {}",
                    ident::quote(&column.name),
                    reconstruct::qualified(&schema.name, schema.temporary)
                ),
                &[],
            )?
            .and_then(|c| c.as_i64())
            .unwrap_or(0);
        self.write_sequence(&schema.name, schema.temporary, seq.max(max_id))
    }

    /// Names the violated key in a duplicate-entry error as MySQL does.
    fn refine(&self, err: DriverError) -> DriverError {
        let (entry, columns) = match err {
            DriverError::DuplicateEntry(entry, columns) => (entry, columns),
            other => return other,
        };
        let table = columns
            .split(',')
            .next()
            .and_then(|c| c.trim().split_once('.'))
            .map(|(t, _)| t.to_string());
        let key = table.as_deref().and_then(|t| {
            let schema = CatalogStore::new(&self.engine).load_any(t).ok().flatten()?;
            let violated = unique_violation_columns(&columns)?;
            let index = schema
                .indexes
                .iter()
                .filter(|i| i.unique)
                .find(|i| {
                    let names = i.column_names();
                    names.len() == violated.len() && names.iter().zip(&violated).all(|(a, b)| ident::eq(a, b))
                })
                .or_else(|| {
                    schema.indexes.iter().filter(|i| i.unique).find(|i| {
                        let names = i.column_names();
                        names.len() >= violated.len() && names.iter().zip(&violated).all(|(a, b)| ident::eq(a, b))
                    })
                })?;
            Some(format!("{}.{}", schema.name, index.name))
        });
        DriverError::DuplicateEntry(entry, key.unwrap_or(columns))
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if self.txn.in_transaction() {
            debug!(conn_id = self.session.conn_id, "rolling back open transaction on close");
            if let Err(err) = self.txn.rollback(&self.engine) {
                warn!(%err, "rollback on close failed");
            }
        }
    }
}

fn sequence_table(temporary: bool) -> &'static str {
    if temporary {
        "temp.sqlite_sequence"
    } else {
        "main.sqlite_sequence"
    }
}

fn is_default_keyword(e: &Expr) -> bool {
    matches!(e, Expr::Identifier(i) if i.quote_style.is_none() && i.value.eq_ignore_ascii_case("DEFAULT"))
}

fn index_name(spec: &ConstraintSpec) -> Option<&str> {
    match spec {
        ConstraintSpec::Unique { name, .. } | ConstraintSpec::Index { name, .. } => name.as_deref(),
        _ => None,
    }
}

/// Rebuild sources for a table whose columns keep their names.
fn same_columns(schema: &TableSchema) -> Vec<Option<String>> {
    schema.columns.iter().map(|c| Some(c.name.clone())).collect()
}

/// Reads `name` or `schema.name` at `tokens[*i]`.
fn object_name(tokens: &[Token], i: &mut usize) -> Option<(Option<String>, String)> {
    let first = tokens.get(*i)?.ident()?.to_string();
    if tokens.get(*i + 1).is_some_and(|t| t.is_punct('.')) {
        let second = tokens.get(*i + 2)?.ident()?.to_string();
        *i += 3;
        return Some((Some(first), second));
    }
    *i += 1;
    Some((None, first))
}

fn syntax_error_at(tokens: &[Token]) -> DriverError {
    let near = tokens
        .iter()
        .map(|t| match &t.tok {
            Tok::Word(w) | Tok::Quoted(w) | Tok::Number(w) | Tok::Var(w) | Tok::Op(w) => w.clone(),
            Tok::Str(s) => ident::string_literal(s),
            Tok::Punct(c) => c.to_string(),
            _ => String::new(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    DriverError::Parse(format!(
        "check the manual that corresponds to your MySQL server version for the right syntax to use near '{near}' at line 1"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> Driver {
        Driver::new(Arc::new(Config::for_tests()), Engine::open_in_memory().unwrap(), 7).unwrap()
    }

    fn exec(d: &mut Driver, sql: &str) -> ExecOutput {
        d.query(sql).unwrap_or_else(|e| panic!("{sql}: {e}"))
    }

    fn rows(d: &mut Driver, sql: &str) -> Vec<Vec<Option<String>>> {
        match exec(d, sql) {
            ExecOutput::ResultSet { rows, .. } => rows
                .iter()
                .map(|r| r.iter().map(Cell::to_text).collect())
                .collect(),
            other => panic!("{sql}: expected rows, got {other:?}"),
        }
    }

    fn values(d: &mut Driver, sql: &str) -> Vec<String> {
        rows(d, sql)
            .into_iter()
            .map(|r| r.into_iter().next().flatten().unwrap_or_default())
            .collect()
    }

    fn code(d: &mut Driver, sql: &str) -> u16 {
        d.query(sql).expect_err(sql).code()
    }

    #[test]
    fn insert_reports_first_generated_id() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE users (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(20) NOT NULL, age INT)");
        let out = exec(&mut d, "INSERT INTO users (name, age) VALUES ('ann', 30), ('bob', NULL)");
        assert_eq!(
            out,
            ExecOutput::Ok {
                affected_rows: 2,
                last_insert_id: 1,
                info: String::new()
            }
        );
        assert_eq!(values(&mut d, "SELECT name FROM users ORDER BY id"), vec!["ann", "bob"]);
        assert_eq!(values(&mut d, "SELECT LAST_INSERT_ID()"), vec!["1"]);
        assert_eq!(values(&mut d, "SELECT ROW_COUNT()"), vec!["-1"]);
    }

    #[test]
    fn constraint_errors_are_mysql_shaped() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE users (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(20) NOT NULL)");
        exec(&mut d, "INSERT INTO users (id, name) VALUES (1, 'ann')");

        assert_eq!(code(&mut d, "INSERT INTO users (id) VALUES (2)"), 1364);
        let dup = d.query("INSERT INTO users (id, name) VALUES (1, 'x')").unwrap_err();
        assert_eq!(dup.code(), 1062);
        assert!(dup.to_string().contains("users.PRIMARY"), "{dup}");
        assert_eq!(code(&mut d, "INSERT INTO users (name) VALUES ('a', 'b')"), 1136);
        assert_eq!(code(&mut d, "SELECT * FROM missing"), 1146);
        assert_eq!(code(&mut d, "CREATE TABLE users (a INT)"), 1050);
        exec(&mut d, "CREATE TABLE IF NOT EXISTS users (a INT)");
        assert_eq!(values(&mut d, "SELECT COUNT(*) FROM users"), vec!["1"]);
    }

    #[test]
    fn found_rows_after_calc_and_plain_selects() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE t (id INT PRIMARY KEY)");
        exec(&mut d, "INSERT INTO t VALUES (1), (2), (3), (4), (5)");
        assert_eq!(rows(&mut d, "SELECT SQL_CALC_FOUND_ROWS * FROM t LIMIT 1").len(), 1);
        assert_eq!(values(&mut d, "SELECT FOUND_ROWS()"), vec!["5"]);

        assert_eq!(rows(&mut d, "SELECT id FROM t WHERE id > 2").len(), 3);
        assert_eq!(values(&mut d, "SELECT FOUND_ROWS()"), vec!["3"]);
    }

    #[test]
    fn transactions_nest_statement_wrappers() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE t (a INT)");

        exec(&mut d, "BEGIN");
        exec(&mut d, "INSERT INTO t VALUES (1)");
        assert!(d.in_transaction());
        assert!(d.engine.in_transaction());
        exec(&mut d, "ROLLBACK");
        assert_eq!(values(&mut d, "SELECT COUNT(*) FROM t"), vec!["0"]);

        exec(&mut d, "START TRANSACTION");
        exec(&mut d, "INSERT INTO t VALUES (2)");
        exec(&mut d, "COMMIT");
        exec(&mut d, "COMMIT");
        assert_eq!(values(&mut d, "SELECT COUNT(*) FROM t"), vec!["1"]);

        exec(&mut d, "BEGIN");
        exec(&mut d, "INSERT INTO t VALUES (3)");
        assert_eq!(code(&mut d, "INSERT INTO nope VALUES (1)"), 1146);
        assert!(!d.in_transaction());
        assert_eq!(values(&mut d, "SELECT a FROM t"), vec!["2"]);
    }

    #[test]
    fn savepoints_and_autocommit() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE t (a INT)");
        exec(&mut d, "BEGIN");
        exec(&mut d, "INSERT INTO t VALUES (1)");
        exec(&mut d, "SAVEPOINT s1");
        exec(&mut d, "INSERT INTO t VALUES (2)");
        exec(&mut d, "ROLLBACK TO SAVEPOINT s1");
        exec(&mut d, "COMMIT");
        assert_eq!(values(&mut d, "SELECT a FROM t"), vec!["1"]);

        exec(&mut d, "SET autocommit = 0");
        exec(&mut d, "INSERT INTO t VALUES (3)");
        assert!(d.in_transaction());
        exec(&mut d, "ROLLBACK");
        exec(&mut d, "INSERT INTO t VALUES (4)");
        exec(&mut d, "SET autocommit = 1");
        assert!(!d.in_transaction());
        assert_eq!(values(&mut d, "SELECT a FROM t ORDER BY a"), vec!["1", "4"]);
    }

    #[test]
    fn multi_table_delete_only_touches_targets() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE t1 (id INT PRIMARY KEY, v INT)");
        exec(&mut d, "CREATE TABLE t2 (id INT PRIMARY KEY, t1_id INT, flag INT)");
        exec(&mut d, "INSERT INTO t1 VALUES (1, 10), (2, 20), (3, 30)");
        exec(&mut d, "INSERT INTO t2 VALUES (1, 1, 1), (2, 2, 0), (3, 3, 1), (4, 3, 1)");

        let out = exec(&mut d, "DELETE t1 FROM t1 JOIN t2 ON t2.t1_id = t1.id WHERE t2.flag = 1");
        assert_eq!(out, ExecOutput::affected(2));
        assert_eq!(values(&mut d, "SELECT id FROM t1"), vec!["2"]);
        assert_eq!(values(&mut d, "SELECT COUNT(*) FROM t2"), vec!["4"]);
    }

    #[test]
    fn alter_table_rebuild_keeps_rows_and_counter() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE items (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(10))");
        exec(&mut d, "INSERT INTO items (name) VALUES ('a'), ('b')");
        exec(&mut d, "ALTER TABLE items ADD COLUMN qty INT NOT NULL DEFAULT 5 AFTER id");

        assert_eq!(
            rows(&mut d, "SELECT id, qty, name FROM items ORDER BY id"),
            vec![
                vec![Some("1".into()), Some("5".into()), Some("a".into())],
                vec![Some("2".into()), Some("5".into()), Some("b".into())],
            ]
        );
        assert_eq!(values(&mut d, "SHOW COLUMNS FROM items"), vec!["id", "qty", "name"]);

        exec(&mut d, "DELETE FROM items WHERE id = 2");
        let out = exec(&mut d, "INSERT INTO items (name) VALUES ('c')");
        assert!(matches!(out, ExecOutput::Ok { last_insert_id: 3, .. }), "{out:?}");
    }

    #[test]
    fn drop_rename_like_and_truncate() {
        let mut d = driver();
        assert_eq!(code(&mut d, "DROP TABLE nope"), 1051);
        exec(&mut d, "DROP TABLE IF EXISTS nope");

        exec(&mut d, "CREATE TABLE a (id INT AUTO_INCREMENT PRIMARY KEY, v INT)");
        exec(&mut d, "INSERT INTO a (v) VALUES (1), (2)");
        exec(&mut d, "RENAME TABLE a TO b");
        assert_eq!(values(&mut d, "SELECT COUNT(*) FROM b"), vec!["2"]);
        assert_eq!(code(&mut d, "SELECT * FROM a"), 1146);

        exec(&mut d, "CREATE TABLE c LIKE b");
        let create = values(&mut d, "SHOW CREATE TABLE c");
        assert_eq!(create, vec!["c"]);
        assert_eq!(values(&mut d, "SHOW TABLES"), vec!["b", "c"]);

        exec(&mut d, "TRUNCATE TABLE b");
        exec(&mut d, "INSERT INTO b (v) VALUES (9)");
        assert_eq!(values(&mut d, "SELECT id FROM b"), vec!["1"]);

        exec(&mut d, "DROP TABLE b, c");
        assert!(values(&mut d, "SHOW TABLES").is_empty());
    }

    #[test]
    fn indexes_and_maintenance_statements() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE t (id INT PRIMARY KEY, email VARCHAR(50))");
        exec(&mut d, "CREATE UNIQUE INDEX email_uq ON t (email)");
        let keys: Vec<Option<String>> = rows(&mut d, "SHOW INDEX FROM t")
            .into_iter()
            .map(|r| r[2].clone())
            .collect();
        assert_eq!(keys, vec![Some("PRIMARY".into()), Some("email_uq".into())]);

        exec(&mut d, "INSERT INTO t VALUES (1, 'a@x')");
        assert_eq!(code(&mut d, "INSERT INTO t VALUES (2, 'a@x')"), 1062);
        exec(&mut d, "DROP INDEX email_uq ON t");
        exec(&mut d, "INSERT INTO t VALUES (2, 'a@x')");

        assert_eq!(
            rows(&mut d, "ANALYZE TABLE t"),
            vec![vec![
                Some("app.t".into()),
                Some("analyze".into()),
                Some("status".into()),
                Some("OK".into())
            ]]
        );
        exec(&mut d, "LOCK TABLES t WRITE");
        exec(&mut d, "UNLOCK TABLES");
        assert_eq!(values(&mut d, "SHOW TABLE STATUS LIKE 't'"), vec!["t"]);
    }

    #[test]
    fn alter_clauses_read_clause_by_clause() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE t (id INT PRIMARY KEY, a INT, KEY ka (a))");
        exec(&mut d, "ALTER TABLE t RENAME INDEX ka TO a_idx, ENGINE=InnoDB");
        let keys: Vec<Option<String>> = rows(&mut d, "SHOW INDEX FROM t")
            .into_iter()
            .map(|r| r[2].clone())
            .collect();
        assert_eq!(keys, vec![Some("PRIMARY".into()), Some("a_idx".into())]);

        exec(&mut d, "ALTER IGNORE TABLE t ADD COLUMN b INT");
        exec(&mut d, "ALTER TABLE t DROP KEY a_idx");
        assert_eq!(rows(&mut d, "SHOW INDEX FROM t").len(), 1);
        assert_eq!(values(&mut d, "SHOW COLUMNS FROM t"), vec!["id", "a", "b"]);

        assert_eq!(code(&mut d, "ALTER TABLE t RENAME INDEX nope"), 1064);
        assert_eq!(code(&mut d, "CREATE TABLE t2 (a INT"), 1064);
    }

    #[test]
    fn drop_column_rewrites_index_catalog_rows() {
        let mut d = driver();
        exec(
            &mut d,
            "CREATE TABLE t (id INT PRIMARY KEY, a INT, b INT, KEY ab (a, b), UNIQUE KEY b_uq (b))",
        );
        exec(&mut d, "ALTER TABLE t DROP COLUMN b");

        let mut stats = d
            .engine
            .query_strings(
                "SELECT index_name || ':' || column_name || ':' || seq_in_index \
                 FROM _mysql_information_schema_statistics WHERE table_name = 't'",
                &[],
            )
            .unwrap();
        stats.sort();
        assert_eq!(stats, vec!["PRIMARY:id:1", "ab:a:1"]);

        let usage = d
            .engine
            .query_strings(
                "SELECT constraint_name || ':' || column_name \
                 FROM _mysql_information_schema_key_column_usage WHERE table_name = 't'",
                &[],
            )
            .unwrap();
        assert_eq!(usage, vec!["PRIMARY:id"]);
    }

    #[test]
    fn session_statements() {
        let mut d = driver();
        exec(&mut d, "SET @x = 41");
        assert_eq!(values(&mut d, "SELECT @x + 1"), vec!["42"]);
        exec(&mut d, "SET NAMES utf8mb4");
        exec(&mut d, "SET sql_mode = ''");
        assert!(!d.session().is_strict());
        exec(&mut d, "SET sql_mode = DEFAULT");
        assert!(d.session().is_strict());
        assert_eq!(code(&mut d, "SET no_such_variable = 1"), 1193);

        exec(&mut d, "USE information_schema");
        exec(&mut d, "USE app");
        assert_eq!(code(&mut d, "USE other"), 1049);
        exec(&mut d, "CREATE DATABASE IF NOT EXISTS app");
        assert_eq!(code(&mut d, "CREATE DATABASE other"), 1235);
        exec(&mut d, "DROP DATABASE IF EXISTS other");
        assert_eq!(values(&mut d, "SELECT CONNECTION_ID()"), vec!["7"]);
    }

    #[test]
    fn year_values_follow_sql_mode() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE y (id INT PRIMARY KEY, v YEAR)");
        exec(&mut d, "INSERT INTO y VALUES (1, 69), (2, 70), (3, 0)");
        assert_eq!(values(&mut d, "SELECT v FROM y ORDER BY id"), vec!["2069", "1970", "0000"]);

        assert_eq!(code(&mut d, "INSERT INTO y VALUES (4, 2200)"), 1264);
        exec(&mut d, "SET sql_mode = ''");
        exec(&mut d, "INSERT INTO y VALUES (4, 2200)");
        assert_eq!(values(&mut d, "SELECT v FROM y WHERE id = 4"), vec!["0000"]);
    }

    #[test]
    fn duplicate_key_update() {
        let mut d = driver();
        exec(&mut d, "CREATE TABLE kv (k VARCHAR(10) PRIMARY KEY, n INT)");
        exec(&mut d, "INSERT INTO kv VALUES ('a', 1)");
        exec(&mut d, "INSERT INTO kv VALUES ('a', 1) ON DUPLICATE KEY UPDATE n = n + 10");
        assert_eq!(values(&mut d, "SELECT n FROM kv"), vec!["11"]);
    }

    #[test]
    fn reconcile_records_untracked_tables() {
        let config = Config::for_tests();
        let engine = Engine::open_in_memory().unwrap();
        engine
            .execute_batch("CREATE TABLE legacy (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)")
            .unwrap();
        Driver::reconcile_catalog(&config, &engine).unwrap();

        let store = CatalogStore::new(&engine);
        let schema = store.load("legacy", false).unwrap().unwrap();
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(
            store.variable(crate::catalog::reconciler::VERSION_VARIABLE).unwrap().as_deref(),
            Some(crate::catalog::reconciler::DRIVER_VERSION)
        );
        // A second run is skipped once the version is recorded.
        Driver::reconcile_catalog(&config, &engine).unwrap();
    }
}
