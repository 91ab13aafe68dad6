//! Application entry point for the `coldchain-monitor` service.
//!
//! This binary is the composition root. Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool and creating the schema
//!   (failure here is fatal; the service does not run without storage)
//! - Starting the MQTT connector and the ingestion worker in the background
//! - Mounting all API routes via the `routes` gateway and serving requests
//!
//! On Ctrl-C or SIGTERM the HTTP server drains, then the ingestion worker is
//! cancelled and the broker session is disconnected.
//!
//! # Environment Variables
//! See [`config::load_from_env`] for service settings. Logging is controlled by
//! `RUST_LOG`, or `COLDCHAIN_LOG_LEVEL` (default: `debug`), plus
//! `COLDCHAIN_SPAN_EVENTS` and `FORCE_COLOR`.
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod bridge;
mod broker;
mod classify;
mod config;
mod error;
mod ingest;
mod models;
mod normalize;
mod routes;
mod schema;
mod store;

use bridge::BridgeQueue;
use broker::BrokerConnector;
use ingest::{IngestWorker, Recorder};
use store::PgStore;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let recorder = Recorder::new(store.clone(), store.clone());
    let queue = Arc::new(BridgeQueue::new(cfg.bridge_queue_capacity));

    let broker = BrokerConnector::new(cfg.broker_settings(), queue.clone());
    broker.start();

    let cancel = CancellationToken::new();
    let worker = IngestWorker::new(queue.clone(), recorder.clone(), cfg.worker_poll_timeout())
        .spawn(cancel.clone());

    let app: Router = routes::router(routes::AppState {
        products: store.clone(),
        readings: store,
        recorder,
        broker: broker.clone(),
        queue,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, shutting down ingestion");
    cancel.cancel();
    if let Err(e) = worker.await {
        tracing::error!("Ingestion worker ended abnormally: {}", e);
    }
    broker.stop().await;
    pool.close().await;

    Ok(())
}

// ---

/// Resolve when the process receives Ctrl-C or (on Unix) SIGTERM.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize the global tracing subscriber for structured logging.
///
/// - Target, file and line number are included in every event
/// - Colors: `FORCE_COLOR=1|true|yes` forces on, `0|false|no` forces off,
///   otherwise TTY detection
/// - Span events by `COLDCHAIN_SPAN_EVENTS`: `"full"`, `"enter_exit"`, or
///   CLOSE only by default
/// - Level: `RUST_LOG` if set, else `COLDCHAIN_LOG_LEVEL` (default `debug`),
///   with `sqlx::query` and `rumqttc` kept quieter
///
/// Call once at startup before any logging.
fn init_tracing() {
    // ---
    let span_events = match env::var("COLDCHAIN_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("COLDCHAIN_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,rumqttc=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
