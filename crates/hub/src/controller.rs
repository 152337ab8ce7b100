//! Irrigation controller: owns the system state, decides whether the pitch
//! needs water, runs irrigation and keeps the event history.
//!
//! ## Cycle
//!
//! ```text
//! Idle ──run_cycle──▶ Evaluating ──[needs water && automatic]──▶ Irrigating ──▶ Idle
//!                         │
//!                         └──────[otherwise]──▶ Skipped (inactive event) ──▶ Idle
//! ```
//!
//! Decision precedence: night mode, then critical humidity, then rain, then
//! low humidity. Critical humidity overrides rain; the run is then shortened
//! by `rain_reduction` because the soil already took some water.

use chrono::{DateTime, FixedOffset, Timelike};
use riego_node::sim::{clamp_humidity, HUMIDITY_MAX, HUMIDITY_MIN};
use riego_node::{Clock, EngineError, EnvironmentSimulator, EnvironmentState, ZoneClock};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, IrrigationSettings};
use crate::state::{IrrigationEvent, Reason, Report, SystemState};

pub type SharedController = Arc<RwLock<IrrigationController>>;

// ---------------------------------------------------------------------------
// Decision policy
// ---------------------------------------------------------------------------

/// True when `hour` falls in the night window `[start, end)`, which may wrap
/// past midnight.
pub fn is_night(hour: u32, start: u32, end: u32) -> bool {
    let hour = hour % 24;
    if start > end {
        hour >= start || hour < end
    } else {
        (start..end).contains(&hour)
    }
}

/// Decide whether the current readings call for irrigation.
pub fn decide(env: &EnvironmentState, hour: u32, settings: &IrrigationSettings) -> (bool, Reason) {
    let night = is_night(hour, settings.night_start_hour, settings.night_end_hour);
    if night && env.humidity > settings.critical_humidity {
        (false, Reason::NightMode)
    } else if env.humidity < settings.critical_humidity {
        (true, Reason::CriticalHumidity)
    } else if env.rain_detected {
        (false, Reason::RainDetected)
    } else if env.humidity < settings.low_humidity {
        (true, Reason::LowHumidity)
    } else {
        (false, Reason::Adequate)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct IrrigationController {
    settings: IrrigationSettings,
    area_m2: u32,
    initial_humidity: f64,
    simulator: EnvironmentSimulator,
    clock: Arc<dyn Clock>,
    state: SystemState,
}

impl IrrigationController {
    pub fn new(
        settings: IrrigationSettings,
        area_m2: u32,
        initial_humidity: f64,
        simulator: EnvironmentSimulator,
        clock: Box<dyn Clock>,
    ) -> Self {
        let state = SystemState::new(
            initial_humidity,
            settings.automatic_mode,
            area_m2,
            settings.history_limit,
        );
        Self {
            settings,
            area_m2,
            initial_humidity,
            simulator,
            clock: Arc::from(clock),
            state,
        }
    }

    /// Wire a controller from the loaded config: zone clock for the site,
    /// seeded simulator when a seed is configured.
    pub fn from_config(cfg: &Config) -> Self {
        let params = cfg.simulation.climate.clone();
        let simulator = match cfg.simulation.seed {
            Some(seed) => EnvironmentSimulator::seeded(params, seed),
            None => EnvironmentSimulator::from_entropy(params),
        };
        Self::new(
            cfg.irrigation.clone(),
            cfg.site.area_m2,
            cfg.simulation.initial_humidity,
            simulator,
            Box::new(ZoneClock::new(&cfg.site.timezone)),
        )
    }

    pub fn into_shared(self) -> SharedController {
        Arc::new(RwLock::new(self))
    }

    pub fn settings(&self) -> &IrrigationSettings {
        &self.settings
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now()
    }

    /// Handle on the controller's clock, readable without taking its lock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Reject a controller whose state could not have come from its own
    /// methods.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let h = self.state.environment.humidity;
        if !h.is_finite() || !(HUMIDITY_MIN..=HUMIDITY_MAX).contains(&h) {
            return Err(EngineError::InvalidState(format!(
                "humidity {h} outside [{HUMIDITY_MIN}, {HUMIDITY_MAX}]"
            )));
        }
        if self.state.history.len() > self.state.history_limit() {
            return Err(EngineError::InvalidState(format!(
                "history holds {} events, limit is {}",
                self.state.history.len(),
                self.state.history_limit()
            )));
        }
        Ok(())
    }

    /// One full monitoring cycle: refresh readings, decide, and irrigate
    /// or record why not.
    pub fn run_cycle(&mut self) -> Result<IrrigationEvent, EngineError> {
        self.check_invariants()?;

        let now = self.clock.now();
        self.state.roll_day(now.date_naive());
        let hour = now.hour();

        let env = self
            .simulator
            .simulate_readings(&self.state.environment, hour);
        self.state.environment = env;
        self.state.last_updated = Some(now);

        debug!(
            hour,
            humidity = format!("{:.1}", env.humidity),
            temperature = format!("{:.1}", env.temperature),
            wind = format!("{:.1}", env.wind_speed),
            rain = env.rain_detected,
            "cycle: readings refreshed"
        );

        let (needs_irrigation, reason) = decide(&env, hour, &self.settings);

        if needs_irrigation && self.state.automatic_mode {
            return self.execute_irrigation(reason);
        }

        if needs_irrigation {
            info!(%reason, "cycle: irrigation needed but automatic mode is off");
        } else {
            info!(%reason, humidity = format!("{:.1}", env.humidity), "cycle: no irrigation");
        }

        let event = IrrigationEvent::inactive(now, reason, env.humidity);
        self.state.push_event(event.clone());
        Ok(event)
    }

    /// Water the pitch for `reason`.
    ///
    /// With rain detected, anything but critical humidity is cancelled: the
    /// returned event is inactive and no state changes.
    pub fn execute_irrigation(&mut self, reason: Reason) -> Result<IrrigationEvent, EngineError> {
        self.check_invariants()?;

        let now = self.clock.now();
        let before = self.state.environment.humidity;

        if self.state.environment.rain_detected && reason != Reason::CriticalHumidity {
            warn!(requested = %reason, "irrigation cancelled: rain detected");
            return Ok(IrrigationEvent::inactive(now, Reason::Cancelled, before));
        }

        self.state.roll_day(now.date_naive());

        let s = &self.settings;
        let mut deficit = (s.target_humidity - before).max(0.0);
        if self.state.environment.rain_detected {
            deficit *= s.rain_reduction;
        }

        let duration_minutes = (deficit * s.duration_factor).round() as u32;
        if duration_minutes == 0 {
            info!(%reason, humidity = format!("{before:.1}"), "irrigation: no deficit, nothing to do");
            let event = IrrigationEvent::inactive(now, reason, before);
            self.state.push_event(event.clone());
            return Ok(event);
        }

        let water_liters = duration_minutes.saturating_mul(s.flow_rate_lpm);
        let after = clamp_humidity((before + deficit * s.recovery_factor).min(s.humidity_cap));

        self.state.environment.humidity = after;
        self.state.total_water_used += u64::from(water_liters);
        self.state.irrigations_today += 1;
        self.state.total_irrigations += 1;

        let event = IrrigationEvent {
            timestamp: now,
            reason,
            duration_minutes,
            water_liters,
            humidity_before: before,
            humidity_after: after,
            active: true,
        };
        self.state.push_event(event.clone());

        info!(
            %reason,
            duration_min = duration_minutes,
            water_l = water_liters,
            humidity_before = format!("{before:.1}"),
            humidity_after = format!("{after:.1}"),
            "irrigation complete"
        );

        Ok(event)
    }

    /// Snapshot with the full retained history.
    pub fn report(&self) -> Report {
        self.report_recent(self.state.history_limit())
    }

    /// Snapshot with at most `limit` of the newest events.
    pub fn report_recent(&self, limit: usize) -> Report {
        self.state.to_report(&self.clock.now(), limit)
    }

    /// Replace the whole state with fresh defaults.
    pub fn reset(&mut self) {
        self.state = SystemState::new(
            self.initial_humidity,
            self.settings.automatic_mode,
            self.area_m2,
            self.settings.history_limit,
        );
        info!("controller reset");
    }

    pub fn set_automatic_mode(&mut self, enabled: bool) {
        if self.state.automatic_mode != enabled {
            info!(automatic = enabled, "automatic mode changed");
        }
        self.state.automatic_mode = enabled;
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut SystemState {
        &mut self.state
    }

    #[cfg(test)]
    pub(crate) fn settings_mut(&mut self) -> &mut IrrigationSettings {
        &mut self.settings
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use riego_node::sim::ConstantSource;
    use riego_node::{FixedClock, SimulationParams};

    fn local(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn env(humidity: f64, rain: bool) -> EnvironmentState {
        EnvironmentState {
            humidity,
            rain_detected: rain,
            ..EnvironmentState::default()
        }
    }

    /// Controller at local `hour` whose random source always returns
    /// `sample`. 0.999 never rains and nudges humidity up by ~1.
    pub(crate) fn controller_at(
        humidity: f64,
        hour: u32,
        sample: f64,
    ) -> (IrrigationController, FixedClock) {
        let clock = FixedClock::at_local(local(1, hour));
        let sim = EnvironmentSimulator::new(
            SimulationParams::default(),
            Box::new(ConstantSource(sample)),
        );
        let ctl = IrrigationController::new(
            IrrigationSettings::default(),
            8000,
            humidity,
            sim,
            Box::new(clock.clone()),
        );
        (ctl, clock)
    }

    // -- decide -----------------------------------------------------------

    #[test]
    fn decide_critical_humidity_by_day() {
        let s = IrrigationSettings::default();
        assert_eq!(decide(&env(25.0, false), 10, &s), (true, Reason::CriticalHumidity));
    }

    #[test]
    fn decide_low_humidity() {
        let s = IrrigationSettings::default();
        assert_eq!(decide(&env(45.0, false), 10, &s), (true, Reason::LowHumidity));
        assert_eq!(decide(&env(30.0, false), 10, &s), (true, Reason::LowHumidity));
    }

    #[test]
    fn decide_adequate() {
        let s = IrrigationSettings::default();
        assert_eq!(decide(&env(70.0, false), 10, &s), (false, Reason::Adequate));
        assert_eq!(decide(&env(50.0, false), 10, &s), (false, Reason::Adequate));
    }

    #[test]
    fn decide_night_mode_suppresses_above_critical() {
        let s = IrrigationSettings::default();
        assert_eq!(decide(&env(45.0, false), 23, &s), (false, Reason::NightMode));
        assert_eq!(decide(&env(45.0, false), 3, &s), (false, Reason::NightMode));
        assert_eq!(decide(&env(45.0, false), 22, &s), (false, Reason::NightMode));
        // 06:00 is already daytime.
        assert_eq!(decide(&env(45.0, false), 6, &s), (true, Reason::LowHumidity));
    }

    #[test]
    fn decide_night_mode_does_not_apply_at_or_below_critical() {
        let s = IrrigationSettings::default();
        assert_eq!(decide(&env(25.0, false), 23, &s), (true, Reason::CriticalHumidity));
        // exactly 30 is not > 30, so no night suppression; and not < 30.
        assert_eq!(decide(&env(30.0, false), 23, &s), (true, Reason::LowHumidity));
    }

    #[test]
    fn decide_rain_skips_unless_critical() {
        let s = IrrigationSettings::default();
        assert_eq!(decide(&env(45.0, true), 10, &s), (false, Reason::RainDetected));
        assert_eq!(decide(&env(25.0, true), 10, &s), (true, Reason::CriticalHumidity));
    }

    #[test]
    fn decide_is_pure() {
        let s = IrrigationSettings::default();
        for h in [20.0, 29.9, 30.0, 49.9, 50.0, 80.0] {
            for rain in [false, true] {
                for hour in 0..24 {
                    let e = env(h, rain);
                    assert_eq!(decide(&e, hour, &s), decide(&e, hour, &s));
                }
            }
        }
    }

    #[test]
    fn decide_respects_configured_thresholds() {
        let s = IrrigationSettings {
            critical_humidity: 40.0,
            low_humidity: 60.0,
            ..IrrigationSettings::default()
        };
        assert_eq!(decide(&env(35.0, false), 10, &s), (true, Reason::CriticalHumidity));
        assert_eq!(decide(&env(55.0, false), 10, &s), (true, Reason::LowHumidity));
    }

    #[test]
    fn night_window_without_wrap() {
        assert!(is_night(2, 1, 5));
        assert!(!is_night(5, 1, 5));
        assert!(!is_night(0, 1, 5));
    }

    // -- execute_irrigation -----------------------------------------------

    #[test]
    fn execute_critical_raises_humidity_and_uses_water() {
        let (mut ctl, _clock) = controller_at(25.0, 10, 0.999);
        let event = ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();

        // deficit 40 → 48 min → 384 L; 25 + 32 = 57
        assert!(event.active);
        assert_eq!(event.duration_minutes, 48);
        assert_eq!(event.water_liters, 384);
        assert_eq!(event.humidity_before, 25.0);
        assert_eq!(event.humidity_after, 57.0);
        assert_eq!(ctl.state().environment.humidity, 57.0);
        assert_eq!(ctl.state().total_water_used, 384);
        assert_eq!(ctl.state().irrigations_today, 1);
        assert_eq!(ctl.state().history.len(), 1);
    }

    #[test]
    fn execute_respects_humidity_cap() {
        let (mut ctl, _clock) = controller_at(25.0, 10, 0.999);
        ctl.settings.recovery_factor = 1.0;
        ctl.settings.humidity_cap = 60.0;
        let event = ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();
        assert_eq!(event.humidity_after, 60.0);
    }

    #[test]
    fn execute_water_saturates_instead_of_overflowing() {
        let (mut ctl, _clock) = controller_at(25.0, 10, 0.999);
        ctl.settings.flow_rate_lpm = 100_000_000;
        let event = ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();

        // 48 min × 1e8 L/min exceeds u32
        assert_eq!(event.duration_minutes, 48);
        assert_eq!(event.water_liters, u32::MAX);
        assert_eq!(ctl.state().total_water_used, u64::from(u32::MAX));
    }

    #[test]
    fn execute_cancelled_by_rain_has_no_side_effects() {
        let (mut ctl, _clock) = controller_at(40.0, 10, 0.999);
        ctl.state_mut().environment.rain_detected = true;

        for reason in [Reason::LowHumidity, Reason::Adequate, Reason::NightMode] {
            let event = ctl.execute_irrigation(reason).unwrap();
            assert!(!event.active);
            assert_eq!(event.reason, Reason::Cancelled);
            assert_eq!(event.water_liters, 0);
            assert_eq!(event.duration_minutes, 0);
            assert_eq!(event.humidity_after, 40.0);
        }
        assert_eq!(ctl.state().environment.humidity, 40.0);
        assert_eq!(ctl.state().total_water_used, 0);
        assert_eq!(ctl.state().irrigations_today, 0);
        assert!(ctl.state().history.is_empty());
    }

    #[test]
    fn execute_critical_in_rain_is_shortened() {
        let (mut ctl, _clock) = controller_at(25.0, 10, 0.999);
        ctl.state_mut().environment.rain_detected = true;
        let event = ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();

        // deficit 40 halved → 24 min → 192 L; 25 + 16 = 41
        assert!(event.active);
        assert_eq!(event.duration_minutes, 24);
        assert_eq!(event.water_liters, 192);
        assert_eq!(event.humidity_after, 41.0);
    }

    #[test]
    fn execute_without_deficit_records_inactive_event() {
        let (mut ctl, _clock) = controller_at(70.0, 10, 0.999);
        let event = ctl.execute_irrigation(Reason::LowHumidity).unwrap();
        assert!(!event.active);
        assert_eq!(event.water_liters, 0);
        assert_eq!(ctl.state().environment.humidity, 70.0);
        assert_eq!(ctl.state().irrigations_today, 0);
        assert_eq!(ctl.state().history.len(), 1);
    }

    #[test]
    fn total_water_is_monotonic() {
        let (mut ctl, _clock) = controller_at(22.0, 10, 0.999);
        let mut last = 0;
        for _ in 0..10 {
            ctl.state_mut().environment.humidity = 22.0;
            ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();
            assert!(ctl.state().total_water_used > last);
            last = ctl.state().total_water_used;
        }
    }

    // -- run_cycle --------------------------------------------------------

    #[test]
    fn cycle_with_adequate_humidity_is_inactive() {
        let (mut ctl, _clock) = controller_at(70.0, 10, 0.999);
        let event = ctl.run_cycle().unwrap();
        assert!(!event.active);
        assert_eq!(event.reason, Reason::Adequate);
        assert_eq!(ctl.state().total_water_used, 0);
        assert_eq!(ctl.state().history.len(), 1);
        assert!(ctl.state().last_updated.is_some());
    }

    #[test]
    fn cycle_with_critical_humidity_irrigates() {
        let (mut ctl, _clock) = controller_at(24.0, 10, 0.999);
        let event = ctl.run_cycle().unwrap();
        assert!(event.active);
        assert_eq!(event.reason, Reason::CriticalHumidity);
        assert_eq!(
            ctl.state().total_water_used,
            u64::from(event.duration_minutes * 8)
        );
        assert!(ctl.state().environment.humidity > 24.0);
    }

    #[test]
    fn cycle_at_night_with_critical_humidity_still_irrigates() {
        let (mut ctl, _clock) = controller_at(24.0, 23, 0.999);
        let event = ctl.run_cycle().unwrap();
        assert!(event.active);
        assert_eq!(event.reason, Reason::CriticalHumidity);
    }

    #[test]
    fn cycle_at_night_with_low_humidity_is_suppressed() {
        let (mut ctl, _clock) = controller_at(40.0, 23, 0.999);
        let event = ctl.run_cycle().unwrap();
        assert!(!event.active);
        assert_eq!(event.reason, Reason::NightMode);
    }

    #[test]
    fn cycle_in_rain_skips_low_humidity() {
        // 0.0 forces rain; the +15 boost lands humidity at ~48.
        let (mut ctl, _clock) = controller_at(35.0, 10, 0.0);
        let event = ctl.run_cycle().unwrap();
        assert!(ctl.state().environment.rain_detected);
        assert!(!event.active);
        assert_eq!(event.reason, Reason::RainDetected);
    }

    #[test]
    fn manual_mode_skips_execution_but_keeps_reason() {
        let (mut ctl, _clock) = controller_at(40.0, 10, 0.999);
        ctl.set_automatic_mode(false);
        let event = ctl.run_cycle().unwrap();
        assert!(!event.active);
        assert_eq!(event.reason, Reason::LowHumidity);
        assert_eq!(ctl.state().total_water_used, 0);
        assert!(!ctl.report().automatic_mode);
    }

    #[test]
    fn history_is_bounded_across_cycles() {
        let (mut ctl, _clock) = controller_at(70.0, 10, 0.5);
        for _ in 0..120 {
            ctl.run_cycle().unwrap();
        }
        assert_eq!(ctl.state().history.len(), 50);
        assert_eq!(ctl.report().history.len(), 50);
        assert_eq!(ctl.report_recent(5).history.len(), 5);
    }

    #[test]
    fn daily_counter_rolls_over_at_midnight() {
        let (mut ctl, clock) = controller_at(24.0, 10, 0.999);
        ctl.run_cycle().unwrap();
        assert_eq!(ctl.state().irrigations_today, 1);

        clock.set(FixedClock::at_local(local(2, 10)).now());
        ctl.state_mut().environment.humidity = 24.0;
        ctl.run_cycle().unwrap();
        assert_eq!(ctl.state().irrigations_today, 1);
        assert_eq!(ctl.state().total_irrigations, 2);
    }

    #[test]
    fn cycle_on_malformed_state_is_rejected() {
        let (mut ctl, _clock) = controller_at(50.0, 10, 0.5);
        ctl.state_mut().environment.humidity = f64::NAN;
        assert!(matches!(ctl.run_cycle(), Err(EngineError::InvalidState(_))));
        assert!(matches!(
            ctl.execute_irrigation(Reason::CriticalHumidity),
            Err(EngineError::InvalidState(_))
        ));
    }

    // -- report / reset ---------------------------------------------------

    #[test]
    fn report_reflects_state() {
        let (mut ctl, _clock) = controller_at(25.0, 10, 0.999);
        ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();
        let report = ctl.report();
        assert_eq!(report.humidity, 57.0);
        assert_eq!(report.total_water_used, 384);
        assert_eq!(report.irrigations_today, 1);
        assert_eq!(report.total_irrigations, 1);
        assert_eq!(report.area_m2, 8000);
        assert_eq!(report.generated_at, "2024-03-01 10:00:00");
        assert_eq!(report.history[0].reason, Reason::CriticalHumidity);
    }

    #[test]
    fn reset_restores_defaults() {
        let (mut ctl, _clock) = controller_at(65.0, 10, 0.999);
        ctl.state_mut().environment.humidity = 25.0;
        ctl.execute_irrigation(Reason::CriticalHumidity).unwrap();
        ctl.set_automatic_mode(false);
        ctl.run_cycle().unwrap();

        ctl.reset();

        let st = ctl.state();
        assert_eq!(st.total_water_used, 0);
        assert_eq!(st.irrigations_today, 0);
        assert_eq!(st.total_irrigations, 0);
        assert!(st.history.is_empty());
        assert_eq!(st.environment.humidity, 65.0);
        assert!(st.automatic_mode);
        assert!(st.last_updated.is_none());
    }
}
