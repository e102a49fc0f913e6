//! Statement Translator: compiles parsed MySQL statements into engine SQL.
//!
//! Translation is a function of the statement, the catalog and the session.
//! The only engine access is read-only: catalog lookups for DML column
//! metadata and counting rows for a pending `FOUND_ROWS()`.

pub mod dml;
pub mod expr;
pub mod functions;
pub mod names;
pub mod query;
pub mod show;
pub mod source;

use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::catalog::store::CatalogStore;
use crate::catalog::TableSchema;
use crate::engine::{Capabilities, Engine};
use crate::error::{DriverError, Result};
use crate::session::Session;

pub use source::Source;

pub fn parse_error(err: sqlparser::parser::ParserError) -> DriverError {
    DriverError::Parse(err.to_string())
}

pub struct Translator<'a> {
    session: &'a Session,
    engine: &'a Engine,
    caps: Capabilities,
    /// Verbatim text of the outermost select list items.
    items: Vec<String>,
    /// The next select list rendered is the outermost one.
    primary_pending: bool,
    /// Unqualified name → qualified SELECT-list columns, innermost last.
    scopes: Vec<query::Scope>,
    /// Inside `ON DUPLICATE KEY UPDATE`, where `VALUES(col)` is the row
    /// that failed to insert.
    upsert: bool,
}

impl<'a> Translator<'a> {
    pub fn new(session: &'a Session, engine: &'a Engine) -> Self {
        Translator {
            session,
            engine,
            caps: engine.capabilities(),
            items: Vec::new(),
            primary_pending: false,
            scopes: Vec::new(),
            upsert: false,
        }
    }

    /// Names unaliased result columns after the client's text.
    pub fn with_source(mut self, source: &Source) -> Self {
        self.items = source.select_items();
        self.primary_pending = true;
        self
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    fn store(&self) -> CatalogStore<'a> {
        CatalogStore::new(self.engine)
    }

    fn strict(&self) -> bool {
        self.session.is_strict()
    }

    /// Catalog definition of a user table, or 1146.
    fn table_schema(&self, name: &str) -> Result<TableSchema> {
        self.store().load_any(name)?.ok_or_else(|| self.no_such_table(name))
    }

    fn no_such_table(&self, name: &str) -> DriverError {
        DriverError::NoSuchTable(format!("{}.{name}", self.session.database))
    }
}

/// Renders a standalone MySQL expression, such as a CHECK clause or a
/// default, as engine SQL.
pub fn render_expression(session: &Session, engine: &Engine, text: &str) -> Result<String> {
    let dialect = MySqlDialect {};
    let expr = Parser::new(&dialect)
        .try_with_sql(text)
        .and_then(|mut p| p.parse_expr())
        .map_err(parse_error)?;
    Translator::new(session, engine).expr(&expr)
}
