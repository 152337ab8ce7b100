use chrono::{DateTime, FixedOffset, NaiveDate};
use riego_node::EnvironmentState;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Maximum number of irrigation events retained in the ring buffer.
pub const MAX_HISTORY: usize = 50;

/// Wall-clock format used on the dashboard and in JSON messages.
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_local(ts: &DateTime<FixedOffset>) -> String {
    ts.format(LOCAL_TIME_FORMAT).to_string()
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why a cycle did (or did not) irrigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    CriticalHumidity,
    LowHumidity,
    Adequate,
    NightMode,
    RainDetected,
    Cancelled,
}

impl Reason {
    pub fn label(self) -> &'static str {
        match self {
            Self::CriticalHumidity => "critical humidity",
            Self::LowHumidity => "low humidity",
            Self::Adequate => "adequate humidity",
            Self::NightMode => "night mode",
            Self::RainDetected => "rain detected",
            Self::Cancelled => "cancelled (rain)",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub reason: Reason,
    pub duration_minutes: u32,
    pub water_liters: u32,
    pub humidity_before: f64,
    pub humidity_after: f64,
    pub active: bool,
}

impl IrrigationEvent {
    /// A cycle that watered nothing; humidity is unchanged.
    pub fn inactive(timestamp: DateTime<FixedOffset>, reason: Reason, humidity: f64) -> Self {
        Self {
            timestamp,
            reason,
            duration_minutes: 0,
            water_liters: 0,
            humidity_before: humidity,
            humidity_after: humidity,
            active: false,
        }
    }
}

// ---------------------------------------------------------------------------
// System state
// ---------------------------------------------------------------------------

/// Everything a reset wipes. Replaced as a whole, never field by field.
pub struct SystemState {
    pub started_at: Instant,
    pub environment: EnvironmentState,
    pub total_water_used: u64,
    pub irrigations_today: u32,
    pub total_irrigations: u64,
    pub automatic_mode: bool,
    pub area_m2: u32,
    pub last_updated: Option<DateTime<FixedOffset>>,
    /// Local date `irrigations_today` refers to.
    pub day: Option<NaiveDate>,
    pub history: VecDeque<IrrigationEvent>,
    history_limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub humidity: f64,
    pub temperature: f64,
    pub wind_speed: f64,
    pub rain_detected: bool,
    pub total_water_used: u64,
    pub irrigations_today: u32,
    pub total_irrigations: u64,
    pub area_m2: u32,
    pub automatic_mode: bool,
    pub status: &'static str,
    pub last_updated: Option<String>,
    pub uptime_secs: u64,
    /// Newest first.
    pub history: Vec<IrrigationEvent>,
}

impl SystemState {
    pub fn new(
        initial_humidity: f64,
        automatic_mode: bool,
        area_m2: u32,
        history_limit: usize,
    ) -> Self {
        let history_limit = history_limit.clamp(1, MAX_HISTORY);
        Self {
            started_at: Instant::now(),
            environment: EnvironmentState::with_humidity(initial_humidity),
            total_water_used: 0,
            irrigations_today: 0,
            total_irrigations: 0,
            automatic_mode,
            area_m2,
            last_updated: None,
            day: None,
            history: VecDeque::with_capacity(history_limit),
            history_limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Zero the daily counter when the local date moves on.
    pub fn roll_day(&mut self, today: NaiveDate) {
        match self.day {
            Some(day) if day == today => {}
            Some(_) => {
                self.irrigations_today = 0;
                self.day = Some(today);
            }
            None => self.day = Some(today),
        }
    }

    pub fn push_event(&mut self, event: IrrigationEvent) {
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    /// Build the JSON-serialisable snapshot with at most `limit` events.
    pub fn to_report(&self, now: &DateTime<FixedOffset>, limit: usize) -> Report {
        let env = &self.environment;
        Report {
            generated_at: format_local(now),
            humidity: round1(env.humidity),
            temperature: round1(env.temperature),
            wind_speed: round1(env.wind_speed),
            rain_detected: env.rain_detected,
            total_water_used: self.total_water_used,
            irrigations_today: self.irrigations_today,
            total_irrigations: self.total_irrigations,
            area_m2: self.area_m2,
            automatic_mode: self.automatic_mode,
            status: if self.automatic_mode {
                "monitoring (automatic)"
            } else {
                "monitoring (manual)"
            },
            last_updated: self.last_updated.as_ref().map(format_local),
            uptime_secs: self.started_at.elapsed().as_secs(),
            history: self.history.iter().rev().take(limit).cloned().collect(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
