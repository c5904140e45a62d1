//! ODDSEDGE: sportsbook opportunity detection engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the JSON data directory, optionally imports a quote file, and
//! runs the compute cycle on an interval with graceful shutdown.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use oddsedge::config::AppConfig;
use oddsedge::engine::OpportunityService;
use oddsedge::storage::{JsonFileStore, Store};
use oddsedge::types::Quote;

const BANNER: &str = r#"
   ___  ____  ____  ____  _____ ____   ____ _____
  / _ \|  _ \|  _ \/ ___|| ____|  _ \ / ___| ____|
 | | | | | | | | | \___ \|  _| | | | | |  _|  _|
 | |_| | |_| | |_| |___) | |___| |_| | |_| | |___
  \___/|____/|____/|____/|_____|____/ \____|_____|

  Arbitrage / Middles / +EV / Low-hold
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default()?;

    init_logging();

    println!("{BANNER}");
    info!(
        engine_name = %cfg.engine.name,
        data_dir = %cfg.engine.data_dir,
        interval_secs = cfg.engine.compute_interval_secs,
        "ODDSEDGE starting up"
    );

    let store = JsonFileStore::new(&cfg.engine.data_dir);

    // Optional quote file to import before the first cycle
    if let Some(path) = std::env::args().nth(1) {
        let quotes = read_quote_file(&path)?;
        store.replace_quotes(&quotes).await?;
        info!(path = %path, count = quotes.len(), "Quotes imported");
    }

    let service = OpportunityService::new(store, cfg.detection.clone());

    if cfg.engine.compute_interval_secs == 0 {
        run_cycle(&service).await;
        return Ok(());
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.engine.compute_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.engine.compute_interval_secs,
        "Entering compute loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cycle(&service).await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("ODDSEDGE stopped");
    Ok(())
}

/// One compute cycle plus a stats line. Failures are logged and the loop
/// carries on with the next tick.
async fn run_cycle(service: &OpportunityService<JsonFileStore>) {
    match service.compute_cycle().await {
        Ok(report) => {
            info!(%report, "Cycle finished");
            match service.stats().await {
                Ok(stats) => {
                    info!(%stats, "Opportunity book");
                    for opp in &stats.top {
                        info!(%opp, "Top opportunity");
                    }
                }
                Err(e) => error!(error = %e, "Failed to compute statistics"),
            }
        }
        Err(e) => error!(error = %e, "Compute cycle failed"),
    }
}

fn read_quote_file(path: &str) -> Result<Vec<Quote>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read quote file: {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse quote file: {path}"))
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oddsedge=info"));

    let json_logging = std::env::var("ODDSEDGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
