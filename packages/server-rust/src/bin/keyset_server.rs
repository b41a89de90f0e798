//! Keyset server binary.
//!
//! Loads the store (in-memory, optionally seeded from an event log, or
//! `PostgreSQL` with the `postgres` feature), then serves the list API until
//! Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use keyset_core::PaginationConfig;
use keyset_server::indexer::{replay_file, EventHandler};
use keyset_server::network::{NetworkConfig, NetworkModule};
use keyset_server::service::{ListService, ServiceConfig};
use keyset_server::storage::MemoryStore;
use keyset_server::{PageStore, RowSink};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "keyset-server", version, about = "Cursor-paginated list API")]
struct Args {
    /// Host interface to bind to
    #[arg(long, env = "KEYSET_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(long, env = "KEYSET_PORT", default_value_t = 8080)]
    port: u16,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "KEYSET_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Whole-request timeout, in seconds
    #[arg(long, env = "KEYSET_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// How long in-flight requests may run after shutdown starts, in seconds
    #[arg(long, env = "KEYSET_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    drain_timeout_secs: u64,

    /// Deadline for the store calls of one page, in milliseconds (0 disables)
    #[arg(long, env = "KEYSET_QUERY_TIMEOUT_MS", default_value_t = 10_000)]
    query_timeout_ms: u64,

    #[arg(long, env = "KEYSET_MAX_PAGE_SIZE", default_value_t = 100)]
    max_page_size: u32,

    #[arg(long, env = "KEYSET_DEFAULT_PAGE_SIZE", default_value_t = 100)]
    default_page_size: u32,

    #[arg(long, env = "KEYSET_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "KEYSET_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// JSON-lines event log replayed into the store before serving
    #[arg(long, env = "KEYSET_EVENTS_FILE")]
    events_file: Option<PathBuf>,

    /// `PostgreSQL` connection string; the in-memory store is used when unset
    #[cfg(feature = "postgres")]
    #[arg(long, env = "KEYSET_DATABASE_URL")]
    database_url: Option<String>,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }

    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            pagination: PaginationConfig {
                max_page_size: self.max_page_size,
                default_page_size: self.default_page_size,
            },
            query_timeout_ms: self.query_timeout_ms,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn open_store(args: &Args) -> anyhow::Result<(Arc<dyn PageStore>, Arc<dyn RowSink>)> {
    #[cfg(feature = "postgres")]
    if let Some(url) = &args.database_url {
        use keyset_server::storage::datastores::{PostgresConfig, PostgresStore};

        let store = Arc::new(PostgresStore::connect(&PostgresConfig::new(url.as_str())).await?);
        store.migrate().await?;
        info!("using PostgreSQL store");
        let pages: Arc<dyn PageStore> = store.clone();
        let sink: Arc<dyn RowSink> = store;
        return Ok((pages, sink));
    }

    let _ = args;
    info!("using in-memory store");
    let store = Arc::new(MemoryStore::new());
    let pages: Arc<dyn PageStore> = store.clone();
    let sink: Arc<dyn RowSink> = store;
    Ok((pages, sink))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let service_config = args.service_config();
    let (pages, sink) = open_store(&args).await?;

    if let Some(path) = &args.events_file {
        let handler = EventHandler::new(sink);
        replay_file(path, &handler).await?;
    }

    let mut module = NetworkModule::new(
        args.network_config(),
        ListService::new(pages, &service_config),
    );
    let port = module.start().await?;
    info!(port, "keyset server starting");

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await
}
