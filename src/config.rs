use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_SQL_MODE: &str = "ONLY_FULL_GROUP_BY,STRICT_TRANS_TABLES,NO_ZERO_IN_DATE,NO_ZERO_DATE,ERROR_FOR_DIVISION_BY_ZERO,NO_ENGINE_SUBSTITUTION";

/// MySQL-compatible server backed by a single SQLite database file.
#[derive(Debug, Clone, Parser)]
#[command(name = "mysql-on-sqlite", version)]
pub struct Config {
    /// Address to accept MySQL client connections on.
    #[arg(long, default_value = "127.0.0.1:3306")]
    pub listen: String,

    /// Directory that holds the SQLite database file.
    #[arg(long, default_value = "./data")]
    pub data: PathBuf,

    /// Name of the schema exposed to clients.
    #[arg(long, default_value = "app")]
    pub database: String,

    #[arg(long, default_value = "root")]
    pub root_user: String,

    #[arg(long, default_value = "")]
    pub root_password: String,

    /// Global SQL mode applied to new sessions.
    #[arg(long, default_value = DEFAULT_SQL_MODE)]
    pub sql_mode: String,

    /// MySQL DDL used as the authoritative schema when repairing the catalog.
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    pub busy_timeout_ms: u64,

    /// Run the catalog reconciler even if the recorded driver version matches.
    #[arg(long)]
    pub force_reconcile: bool,

    /// tracing filter directive, e.g. `info` or `mysql_on_sqlite=debug`.
    #[arg(long, default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.data.join(format!("{}.sqlite", self.database))
    }

    /// In-memory configuration for unit tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            listen: "127.0.0.1:0".into(),
            data: PathBuf::from(":memory:"),
            database: "app".into(),
            root_user: "root".into(),
            root_password: String::new(),
            sql_mode: DEFAULT_SQL_MODE.into(),
            schema_file: None,
            busy_timeout_ms: 100,
            force_reconcile: false,
            log: "info".into(),
        }
    }
}
