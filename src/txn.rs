//! Transaction coordinator.
//!
//! Each top-level statement runs inside a wrapper so that the several
//! engine statements it may expand to apply atomically. Outside a user
//! transaction the wrapper is a real transaction; inside one it is a
//! savepoint, since the engine cannot nest transactions.

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::{DriverError, Result};
use crate::ident;

const WRAPPER_SAVEPOINT: &str = "_mysql_statement";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    None,
    Transaction,
    Savepoint,
}

#[derive(Debug)]
pub struct Coordinator {
    wrapper: Wrapper,
    in_transaction: bool,
    /// User savepoints of the open transaction, oldest first.
    savepoints: Vec<String>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator {
            wrapper: Wrapper::None,
            in_transaction: false,
            savepoints: Vec::new(),
        }
    }

    /// Whether the client has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[cfg(test)]
    pub fn wrapper(&self) -> Wrapper {
        self.wrapper
    }

    /// Opens the wrapper for one statement. Writes take the engine's write
    /// lock up front so a busy database fails fast.
    pub fn begin_wrapper(&mut self, engine: &Engine, read_only: bool) -> Result<()> {
        if self.wrapper != Wrapper::None {
            return Ok(());
        }
        if self.in_transaction || engine.in_transaction() {
            engine.execute_batch(&format!("SAVEPOINT {}", ident::quote(WRAPPER_SAVEPOINT)))?;
            self.wrapper = Wrapper::Savepoint;
        } else {
            engine.execute_batch(if read_only { "BEGIN" } else { "BEGIN IMMEDIATE" })?;
            self.wrapper = Wrapper::Transaction;
        }
        Ok(())
    }

    pub fn commit_wrapper(&mut self, engine: &Engine) -> Result<()> {
        let wrapper = std::mem::replace(&mut self.wrapper, Wrapper::None);
        match wrapper {
            Wrapper::None => Ok(()),
            Wrapper::Savepoint => {
                engine.execute_batch(&format!("RELEASE SAVEPOINT {}", ident::quote(WRAPPER_SAVEPOINT)))
            }
            Wrapper::Transaction => engine.execute_batch("COMMIT"),
        }
    }

    /// Undoes the failed statement, then the client's transaction.
    /// Rollback failures are logged and swallowed so the original error
    /// reaches the client.
    pub fn rollback_after_failure(&mut self, engine: &Engine) {
        let wrapper = std::mem::replace(&mut self.wrapper, Wrapper::None);
        if wrapper == Wrapper::Savepoint {
            let name = ident::quote(WRAPPER_SAVEPOINT);
            swallow(engine, &format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"));
        }
        if engine.in_transaction() {
            swallow(engine, "ROLLBACK");
        }
        if self.in_transaction {
            debug!("statement failure rolled back the open transaction");
        }
        self.in_transaction = false;
        self.savepoints.clear();
    }

    /// BEGIN / START TRANSACTION. An open transaction is committed first.
    pub fn begin(&mut self, engine: &Engine, read_only: bool) -> Result<()> {
        self.commit(engine)?;
        engine.execute_batch(if read_only { "BEGIN" } else { "BEGIN IMMEDIATE" })?;
        self.in_transaction = true;
        Ok(())
    }

    /// Opens a transaction for a session running with autocommit off.
    pub fn ensure_transaction(&mut self, engine: &Engine) -> Result<()> {
        if !self.in_transaction {
            engine.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// COMMIT. A no-op without an open transaction.
    pub fn commit(&mut self, engine: &Engine) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.savepoints.clear();
        if engine.in_transaction() {
            engine.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// ROLLBACK. A no-op without an open transaction.
    pub fn rollback(&mut self, engine: &Engine) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.savepoints.clear();
        if engine.in_transaction() {
            engine.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Statements that end the open transaction before they run, such as
    /// DDL and LOCK TABLES.
    pub fn implicit_commit(&mut self, engine: &Engine) -> Result<()> {
        if self.in_transaction {
            debug!("implicit commit");
        }
        self.commit(engine)
    }

    /// SAVEPOINT. Outside a transaction there is nothing to mark.
    pub fn savepoint(&mut self, engine: &Engine, name: &str) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // A repeated name moves the savepoint.
        if let Some(pos) = self.savepoints.iter().position(|s| ident::eq(s, name)) {
            engine.execute_batch(&format!("RELEASE SAVEPOINT {}", user_savepoint(name)))?;
            self.savepoints.truncate(pos);
        }
        engine.execute_batch(&format!("SAVEPOINT {}", user_savepoint(name)))?;
        self.savepoints.push(name.to_string());
        Ok(())
    }

    pub fn release_savepoint(&mut self, engine: &Engine, name: &str) -> Result<()> {
        let pos = self.find_savepoint(name)?;
        engine.execute_batch(&format!("RELEASE SAVEPOINT {}", user_savepoint(name)))?;
        self.savepoints.truncate(pos);
        Ok(())
    }

    /// ROLLBACK TO SAVEPOINT keeps the savepoint itself.
    pub fn rollback_to_savepoint(&mut self, engine: &Engine, name: &str) -> Result<()> {
        let pos = self.find_savepoint(name)?;
        engine.execute_batch(&format!("ROLLBACK TO SAVEPOINT {}", user_savepoint(name)))?;
        self.savepoints.truncate(pos + 1);
        Ok(())
    }

    fn find_savepoint(&self, name: &str) -> Result<usize> {
        self.savepoints
            .iter()
            .rposition(|s| ident::eq(s, name))
            .ok_or_else(|| DriverError::NoSuchSavepoint(name.to_string()))
    }
}

fn user_savepoint(name: &str) -> String {
    ident::quote(&format!("_mysql_user_{}", ident::fold(name)))
}

fn swallow(engine: &Engine, sql: &str) {
    if let Err(err) = engine.execute_batch(sql) {
        warn!(%err, sql, "rollback failed");
    }
}
