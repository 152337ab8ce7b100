//! Periodic monitoring timer and the single entry point that runs a cycle.
//!
//! Manual HTTP triggers and timer ticks both go through [`trigger_cycle`],
//! which holds the controller's write lock for the whole cycle (including the
//! cosmetic irrigation delay), so two cycles never interleave.

use std::fmt;
use std::time::Duration;

use riego_node::EngineError;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::controller::SharedController;
use crate::state::IrrigationEvent;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Timer,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Timer => write!(f, "timer"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle entry point
// ---------------------------------------------------------------------------

/// Run one monitoring cycle under the controller's write lock.
pub async fn trigger_cycle(
    shared: &SharedController,
    trigger: Trigger,
) -> Result<IrrigationEvent, EngineError> {
    let mut ctl = shared.write().await;
    let event = ctl.run_cycle()?;

    let delay_ms = ctl.settings().irrigation_delay_ms;
    if event.active && delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        %trigger,
        reason = %event.reason,
        active = event.active,
        water_l = event.water_liters,
        humidity = format!("{:.1}", event.humidity_after),
        "cycle finished"
    );
    Ok(event)
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Run the timer loop. Intended to be `tokio::spawn`-ed from main.
///
/// The first cycle fires one full interval after start-up.
pub async fn run(shared: SharedController, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() yields immediately on the first tick.
    ticker.tick().await;

    info!(interval_sec = interval.as_secs(), "scheduler started");

    loop {
        ticker.tick().await;
        tick(&shared).await;
    }
}

/// One timer tick. A failed cycle is logged and the timer carries on.
async fn tick(shared: &SharedController) -> Option<IrrigationEvent> {
    match trigger_cycle(shared, Trigger::Timer).await {
        Ok(event) => Some(event),
        Err(e) => {
            error!("scheduler: cycle failed, retrying next tick: {e}");
            None
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
