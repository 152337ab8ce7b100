mod config;
mod controller;
mod scheduler;
mod state;
mod web;

use anyhow::Result;
use std::{env, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use controller::IrrigationController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "riego.toml".to_string());
    let cfg = config::load_or_default(&config_path)?;

    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(cfg.web.port);

    // ── Controller (single shared instance) ─────────────────────────
    let ctl = IrrigationController::from_config(&cfg);
    let clock = ctl.clock();
    info!(
        area_m2 = cfg.site.area_m2,
        timezone = %cfg.site.timezone,
        local_time = %state::format_local(&ctl.now()),
        automatic = ctl.state().automatic_mode,
        seed = ?cfg.simulation.seed,
        "controller ready"
    );
    let shared = ctl.into_shared();

    // ── Periodic monitoring ─────────────────────────────────────────
    let timer = if cfg.schedule.enabled {
        let interval = Duration::from_secs(cfg.schedule.interval_min.saturating_mul(60));
        Some(tokio::spawn(scheduler::run(Arc::clone(&shared), interval)))
    } else {
        warn!("scheduler disabled; cycles run only on manual trigger");
        None
    };

    // ── Web server (runs until ctrl-c) ──────────────────────────────
    let app_state = web::AppState::new(Arc::clone(&shared), clock);
    web::serve(app_state, port, shutdown_signal()).await?;

    if let Some(timer) = timer {
        timer.abort();
    }
    info!("hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
