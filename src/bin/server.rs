//! SQL Console Server Binary
//!
//! Starts the console HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with sql-console.toml / SQLCONSOLE_* settings
//! cargo run --bin sql-console-server
//!
//! # Explicit config file and bind address
//! cargo run --bin sql-console-server -- --config /etc/sql-console.toml --host 0.0.0.0 --port 8080
//!
//! # Produce an argon2 hash for the user directory
//! cargo run --bin sql-console-server -- hash-password 's3cret'
//! ```

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sql_console::audit::{AuditRecorder, AuditStore, InMemoryAuditStore, SqlAuditStore};
use sql_console::auth::{hash_password, DirectoryVerifier};
use sql_console::config::{AuditBackend, LoggingConfig};
use sql_console::database::{mask_database_url, Connector, PgConnector};
use sql_console::protocol::rest::{self, AppState};
use sql_console::session::InMemorySessionStore;
use sql_console::{Catalog, Config, QueryOrchestrator, TimedExecutor};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser)]
#[command(name = "sql-console-server")]
#[command(version)]
#[command(about = "Read-only SQL console with time-bounded execution and an audit trail")]
struct Cli {
    /// Configuration file (default: sql-console.toml + sql-console.local.toml)
    #[arg(long, short)]
    config: Option<String>,

    /// Override http.host
    #[arg(long)]
    host: Option<String>,

    /// Override http.port
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print an argon2id hash suitable for the credential directory
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::HashPassword { password }) = cli.command {
        println!("{}", hash_password(&password).map_err(anyhow::Error::msg)?);
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config.logging);

    // Override HTTP config from command line
    if let Some(host) = cli.host {
        config.http.host = host;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }

    info!(
        database = %mask_database_url(&config.database.url),
        timeout_secs = config.query.timeout_secs,
        audit_backend = ?config.audit.backend,
        "sql_console_starting"
    );

    let connector: Arc<dyn Connector> = Arc::new(PgConnector::new(
        config.database.url.clone(),
        Duration::from_secs(config.database.connect_timeout_secs),
    ));
    let executor = Arc::new(TimedExecutor::new(connector, config.query.timeout_secs));

    let audit_store: Arc<dyn AuditStore> = match config.audit.backend {
        AuditBackend::Database => {
            let store = SqlAuditStore::new(Arc::clone(&executor), config.audit.table.clone())?;
            if config.audit.create_table {
                // The console keeps serving without a table; writes then fail and are logged.
                if let Err(e) = store.ensure_table().await {
                    warn!(table = store.table(), error = %e, "audit_table_bootstrap_failed");
                }
            }
            Arc::new(store)
        }
        AuditBackend::Memory => Arc::new(InMemoryAuditStore::new(config.audit.memory_capacity)),
    };

    let verifier = Arc::new(DirectoryVerifier::new(
        Arc::clone(&executor),
        config.auth.credential_query.clone(),
        config.auth.required_group.clone(),
    ));
    let orchestrator = Arc::new(QueryOrchestrator::new(
        Arc::clone(&executor),
        AuditRecorder::new(audit_store)
            .with_write_timeout(Duration::from_secs(config.audit.write_timeout_secs)),
        Arc::new(InMemorySessionStore::new(config.auth.session_timeout_secs)),
        verifier,
    ));
    let catalog = Arc::new(Catalog::new(
        executor,
        config.query.autocomplete_table_limit,
    ));

    let state = Arc::new(AppState::new(
        orchestrator,
        catalog,
        &config.auth,
        &config.audit,
    ));

    rest::start_http_server(state, &config.http)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {e}"))?;

    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // RUST_LOG takes precedence over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging_config.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = logging_config.format == "json";

    let (writer, guard) = match &logging_config.file {
        Some(path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open log file '{}': {e}", path.display());
                    return;
                }
            };
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let _ = TRACE_GUARD.set(guard);
    let to_file = logging_config.file.is_some();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!to_file)
        .with_thread_ids(true)
        .with_writer(writer)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
