mod auth;
mod backend;
mod catalog;
mod coercion;
mod config;
mod driver;
mod engine;
mod error;
mod functions;
mod ident;
mod lexer;
mod model;
mod session;
mod translator;
mod txn;

use crate::auth::Credentials;
use crate::backend::Backend;
use crate::config::Config;
use crate::driver::Driver;
use anyhow::Context;
use clap::Parser;
use opensrv_mysql::{AsyncMysqlIntermediary, IntermediaryOptions};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::parse());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log)))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    std::fs::create_dir_all(&config.data)
        .with_context(|| format!("creating data directory {}", config.data.display()))?;
    Driver::bootstrap(&config).context("preparing the catalog")?;

    let listener = TcpListener::bind(&config.listen).await?;
    let local_addr = listener.local_addr()?;
    let credentials = Credentials::new(&config.root_user, &config.root_password);
    let conn_id = Arc::new(AtomicU32::new(1));
    info!(
        database = %config.database_path().display(),
        "serving schema {}", config.database
    );
    eprintln!("mysql-on-sqlite listening on {local_addr}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        let config = Arc::clone(&config);
        let credentials = credentials.clone();
        let id = conn_id.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            let driver = match Driver::open(config, id) {
                Ok(driver) => driver,
                Err(err) => {
                    error!(conn_id = id, %peer, %err, "could not open database");
                    return;
                }
            };
            info!(conn_id = id, %peer, "connection opened");
            let (r, w) = tokio::io::split(stream);
            let backend = Backend::new(driver, credentials, id);
            let opts = IntermediaryOptions {
                process_use_statement_on_query: false,
                reject_connection_on_dbname_absence: false,
            };
            if let Err(err) = AsyncMysqlIntermediary::run_with_options(backend, r, w, &opts).await {
                warn!(conn_id = id, %err, "connection error");
            }
            info!(conn_id = id, "connection closed");
        });
    }
}
