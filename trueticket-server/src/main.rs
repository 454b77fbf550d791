//! TrueTicket Server
//!
//! Ticket sales, capped resale and venue entry over HTTP.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use trueticket_core::clock::SystemClock;
use trueticket_core::collaborators::{HttpLedgerClient, HttpPaymentGateway};
use trueticket_core::events::{EventSenders, ledger_event_channel};
use trueticket_core::processors::LedgerSync;
use trueticket_core::store::{PgStore, Store};
use trueticket_core::{EngineDeps, TicketingEngine};

/// TrueTicket - ticket lifecycle and resale marketplace engine
#[derive(Parser, Debug)]
#[command(name = "trueticket-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./trueticket.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting trueticket-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);
    let shared_config = loaded_config.to_shared();

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool.clone()));
    let clock = Arc::new(SystemClock);
    let (ledger_tx, ledger_rx) = ledger_event_channel();
    let gateway = HttpPaymentGateway::new(
        &loaded_config.payment.endpoint,
        loaded_config.payment.secret_bytes(),
    )?;

    let engine = TicketingEngine::new(EngineDeps {
        store: store.clone(),
        clock: clock.clone(),
        settings: shared_config.settings.clone(),
        events: EventSenders::new(ledger_tx),
        gateway: Arc::new(gateway),
        signer: loaded_config.check_in_signer.clone(),
        royalty_split: loaded_config.royalty_split.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();
    workers.push(tokio::spawn(
        engine.sweeper.clone().run(shutdown_rx.clone()),
    ));
    match &loaded_config.ledger {
        Some(ledger) => {
            let client = HttpLedgerClient::new(&ledger.endpoint, ledger.secret_bytes())?;
            let sync = LedgerSync::new(
                store,
                Arc::new(client),
                clock,
                shared_config.settings.clone(),
                ledger_rx,
                shutdown_rx.clone(),
            );
            workers.push(tokio::spawn(sync.run()));
        }
        None => {
            tracing::info!("No [ledger] configured, tickets settle at purchase");
            drop(ledger_rx);
        }
    }

    let state = AppState::new(engine, shared_config.clone());
    let reload_notify = spawn_config_reload_handler(shared_config, config_loader);
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    reload_notify.notify_one();
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Background processors already stopped");
    }
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Background processor panicked");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
