mod api;
mod auth;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use centime_core::config::{self, Config};
use centime_scheduler::{
    run_sweep_loop, LifecycleController, SweepDriver, SweepSchedule, SystemClock,
};
use centime_store::{LedgerStore, MemoryStore, PgStore};

use crate::state::AppState;

/// Pick the store backend: Postgres when configured, otherwise the
/// in-memory store so dev setups run without a database.
async fn init_store(config: &Config) -> anyhow::Result<(Arc<dyn LedgerStore>, &'static str)> {
    if config.postgres.is_configured() {
        let store = PgStore::connect(&config.postgres).await?;
        Ok((Arc::new(store), "postgres"))
    } else {
        warn!("PG_USERNAME not set — using the in-memory store (data is not durable)");
        Ok((Arc::new(MemoryStore::new()), "memory"))
    }
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.server.cors_origin == "*" {
        Ok(CorsLayer::permissive())
    } else {
        let origin: HeaderValue = config.server.cors_origin.parse()?;
        Ok(CorsLayer::new().allow_origin(origin))
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    config.log_summary();

    let (store, backend) = init_store(config).await?;

    let schedule = SweepSchedule::parse(&config.scheduler.sweep_cron).map_err(|e| {
        anyhow::anyhow!("invalid SWEEP_CRON {:?}: {e}", config.scheduler.sweep_cron)
    })?;
    let driver = SweepDriver::new(
        store.clone(),
        Arc::new(SystemClock),
        Duration::from_secs(config.scheduler.item_timeout_secs),
    );
    let (sweep_trigger, trigger_rx) = mpsc::channel(8);
    tokio::spawn(run_sweep_loop(
        driver,
        schedule,
        Duration::from_secs(config.scheduler.tick_interval_secs),
        trigger_rx,
    ));

    let state = Arc::new(AppState {
        lifecycle: LifecycleController::new(store.clone()),
        store,
        sweep_trigger,
        store_backend: backend,
    });

    let app = api::router(state).layer(cors_layer(config)?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run a single sweep cycle and print the report (operator / cron hook).
async fn sweep_once(config: &Config) -> anyhow::Result<()> {
    let (store, backend) = init_store(config).await?;
    info!("Running one sweep against the {} store", backend);

    let driver = SweepDriver::new(
        store,
        Arc::new(SystemClock),
        Duration::from_secs(config.scheduler.item_timeout_secs),
    );
    let report = driver.run_sweep().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    config::load_dotenv();
    let config = Config::from_env();
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => serve(&config).await?,
        Some("sweep") => sweep_once(&config).await?,
        _ => {
            println!("centime v{}", env!("CARGO_PKG_VERSION"));
            println!("Usage: centime-server <command>");
            println!("  serve   Start the HTTP API and the background sweep loop");
            println!("  sweep   Run a single sweep cycle and print the report");
        }
    }

    Ok(())
}
