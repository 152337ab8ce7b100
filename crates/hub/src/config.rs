//! TOML config file loading and validation for the site, irrigation policy,
//! timer and simulation.

use anyhow::{bail, Context, Result};
use riego_node::sim::{HUMIDITY_MAX, HUMIDITY_MIN};
use riego_node::SimulationParams;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::state::MAX_HISTORY;

/// Upper bound for `flow_rate_lpm`; well above any sprinkler line.
pub const MAX_FLOW_RATE_LPM: u32 = 1_000;

/// Upper bound for `duration_factor`, in minutes per humidity point.
pub const MAX_DURATION_FACTOR: f64 = 10.0;

/// Longest timer interval: one day.
pub const MAX_INTERVAL_MIN: u64 = 24 * 60;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub site: SiteConfig,
    pub irrigation: IrrigationSettings,
    pub schedule: ScheduleConfig,
    pub simulation: SimulationConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Irrigated area of the pitch, m².
    pub area_m2: u32,
    /// IANA zone name. An unknown zone falls back to fixed UTC-5.
    pub timezone: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            area_m2: 8000,
            timezone: riego_node::clock::DEFAULT_ZONE.to_string(),
        }
    }
}

/// Decision thresholds and irrigation physics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IrrigationSettings {
    /// Humidity an irrigation run aims for.
    pub target_humidity: f64,
    /// Minutes of watering per point of humidity deficit.
    pub duration_factor: f64,
    pub flow_rate_lpm: u32,
    /// Fraction of the deficit recovered by one run.
    pub recovery_factor: f64,
    /// Humidity never exceeds this after a run.
    pub humidity_cap: f64,
    pub critical_humidity: f64,
    pub low_humidity: f64,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    /// Deficit multiplier when critical humidity overrides detected rain.
    pub rain_reduction: f64,
    pub history_limit: usize,
    pub automatic_mode: bool,
    /// Cosmetic pause after a run, held under the controller lock.
    pub irrigation_delay_ms: u64,
}

impl Default for IrrigationSettings {
    fn default() -> Self {
        Self {
            target_humidity: 65.0,
            duration_factor: 1.2,
            flow_rate_lpm: 8,
            recovery_factor: 0.8,
            humidity_cap: 85.0,
            critical_humidity: 30.0,
            low_humidity: 50.0,
            night_start_hour: 22,
            night_end_hour: 6,
            rain_reduction: 0.5,
            history_limit: MAX_HISTORY,
            automatic_mode: true,
            irrigation_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval_min: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_min: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
    pub initial_humidity: f64,
    pub climate: SimulationParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            initial_humidity: 65.0,
            climate: SimulationParams::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebConfig {
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn humidity_in_range(v: f64) -> bool {
    (HUMIDITY_MIN..=HUMIDITY_MAX).contains(&v)
}

fn probability(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

impl Config {
    /// Validate every section. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_site(&mut errors);
        self.validate_irrigation(&mut errors);
        self.validate_schedule(&mut errors);
        self.validate_simulation(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_site(&self, errors: &mut Vec<String>) {
        if self.site.area_m2 == 0 {
            errors.push("site: area_m2 must be positive".to_string());
        }
        if self.site.timezone.trim().is_empty() {
            errors.push("site: timezone is empty".to_string());
        }
    }

    fn validate_irrigation(&self, errors: &mut Vec<String>) {
        let s = &self.irrigation;

        // ── Humidity thresholds ─────────────────────────────
        for (name, v) in [
            ("target_humidity", s.target_humidity),
            ("humidity_cap", s.humidity_cap),
            ("critical_humidity", s.critical_humidity),
            ("low_humidity", s.low_humidity),
        ] {
            if !humidity_in_range(v) {
                errors.push(format!(
                    "irrigation: {name} {v} out of range [{HUMIDITY_MIN}, {HUMIDITY_MAX}]"
                ));
            }
        }
        if s.critical_humidity >= s.low_humidity {
            errors.push(format!(
                "irrigation: critical_humidity ({}) must be below low_humidity ({})",
                s.critical_humidity, s.low_humidity
            ));
        }
        if s.low_humidity >= s.target_humidity {
            errors.push(format!(
                "irrigation: low_humidity ({}) must be below target_humidity ({})",
                s.low_humidity, s.target_humidity
            ));
        }
        if s.humidity_cap < s.target_humidity {
            errors.push(format!(
                "irrigation: humidity_cap ({}) must not be below target_humidity ({})",
                s.humidity_cap, s.target_humidity
            ));
        }

        // ── Run physics ─────────────────────────────────────
        if !(s.duration_factor > 0.0 && s.duration_factor <= MAX_DURATION_FACTOR) {
            errors.push(format!(
                "irrigation: duration_factor {} out of range (0, {MAX_DURATION_FACTOR}]",
                s.duration_factor
            ));
        }
        if s.flow_rate_lpm == 0 || s.flow_rate_lpm > MAX_FLOW_RATE_LPM {
            errors.push(format!(
                "irrigation: flow_rate_lpm {} out of range [1, {MAX_FLOW_RATE_LPM}]",
                s.flow_rate_lpm
            ));
        }
        if s.recovery_factor <= 0.0 || s.recovery_factor > 1.0 {
            errors.push(format!(
                "irrigation: recovery_factor {} out of range (0.0, 1.0]",
                s.recovery_factor
            ));
        }
        if !probability(s.rain_reduction) {
            errors.push(format!(
                "irrigation: rain_reduction {} out of range [0.0, 1.0]",
                s.rain_reduction
            ));
        }

        // ── Night window / history ──────────────────────────
        if s.night_start_hour > 23 || s.night_end_hour > 23 {
            errors.push(format!(
                "irrigation: night window {}-{} must use hours 0-23",
                s.night_start_hour, s.night_end_hour
            ));
        }
        if s.history_limit == 0 || s.history_limit > MAX_HISTORY {
            errors.push(format!(
                "irrigation: history_limit {} out of range [1, {MAX_HISTORY}]",
                s.history_limit
            ));
        }
    }

    fn validate_schedule(&self, errors: &mut Vec<String>) {
        let minutes = self.schedule.interval_min;
        if minutes == 0 || minutes > MAX_INTERVAL_MIN {
            errors.push(format!(
                "schedule: interval_min {minutes} out of range [1, {MAX_INTERVAL_MIN}]"
            ));
        }
    }

    fn validate_simulation(&self, errors: &mut Vec<String>) {
        let sim = &self.simulation;
        if !humidity_in_range(sim.initial_humidity) {
            errors.push(format!(
                "simulation: initial_humidity {} out of range [{HUMIDITY_MIN}, {HUMIDITY_MAX}]",
                sim.initial_humidity
            ));
        }

        let c = &sim.climate;
        if !probability(c.rain_probability) || !probability(c.rain_probability_afternoon) {
            errors.push(format!(
                "simulation: rain probabilities ({}, {}) must be within [0.0, 1.0]",
                c.rain_probability, c.rain_probability_afternoon
            ));
        }
        if c.rain_boost_min > c.rain_boost_max {
            errors.push(format!(
                "simulation: rain_boost_min ({}) exceeds rain_boost_max ({})",
                c.rain_boost_min, c.rain_boost_max
            ));
        }
        if c.temp_dawn > c.temp_noon {
            errors.push(format!(
                "simulation: temp_dawn ({}) must not exceed temp_noon ({})",
                c.temp_dawn, c.temp_noon
            ));
        }
        if c.temp_noise < 0.0 || c.wind_noise < 0.0 || c.humidity_jitter < 0.0 {
            errors.push("simulation: noise widths must not be negative".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Like [`load`], but a missing file yields the built-in defaults.
pub fn load_or_default(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        let config = load(path)?;
        info!(path, "config loaded");
        Ok(config)
    } else {
        info!(path, "no config file, using defaults");
        Ok(Config::default())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
