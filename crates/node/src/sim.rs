//! Synthetic environment for the pitch.
//!
//! Models a highland (Bogotá-like) day:
//! - Temperature follows a piecewise-linear diurnal curve plus noise
//! - Wind picks up in the early afternoon
//! - Rain is more likely in the afternoon and evening showers window
//! - Soil humidity drifts, dries faster with heat and wind, and jumps after rain
//!
//! All randomness goes through [`RandomSource`], so a seeded or constant
//! source makes every reading reproducible.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Physical bounds
// ---------------------------------------------------------------------------

pub const HUMIDITY_MIN: f64 = 20.0;
pub const HUMIDITY_MAX: f64 = 95.0;
pub const TEMPERATURE_MIN: f64 = 8.0;
pub const TEMPERATURE_MAX: f64 = 25.0;
pub const WIND_MIN: f64 = 0.0;
pub const WIND_MAX: f64 = 30.0;

/// Clamp a soil humidity percentage into the physically modelled range.
pub fn clamp_humidity(value: f64) -> f64 {
    value.clamp(HUMIDITY_MIN, HUMIDITY_MAX)
}

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Source of uniform samples for the simulator.
pub trait RandomSource: Send + Sync {
    /// Uniform sample in `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Uniform sample in `[lo, hi)`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.unit()
    }

    /// Bernoulli trial with success probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.unit() < p
    }
}

#[cfg(feature = "sim")]
impl RandomSource for fastrand::Rng {
    fn unit(&mut self) -> f64 {
        self.f64()
    }
}

/// Always returns the same sample. `ConstantSource(0.5)` zeroes every
/// symmetric noise term; `0.0` forces rain, values near `1.0` prevent it.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSource(pub f64);

impl RandomSource for ConstantSource {
    fn unit(&mut self) -> f64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// One set of simulated readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    /// Soil humidity, percent.
    pub humidity: f64,
    /// Air temperature, °C.
    pub temperature: f64,
    /// Wind speed, km/h.
    pub wind_speed: f64,
    pub rain_detected: bool,
}

impl EnvironmentState {
    pub fn with_humidity(humidity: f64) -> Self {
        Self {
            humidity: clamp_humidity(humidity),
            ..Self::default()
        }
    }
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self {
            humidity: 65.0,
            temperature: 15.0,
            wind_speed: 5.0,
            rain_detected: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Shape of the simulated climate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationParams {
    /// Temperature at 05:00, the coldest point of the curve.
    pub temp_dawn: f64,
    /// Temperature at 12:00.
    pub temp_noon: f64,
    /// Temperature at 17:00.
    pub temp_evening: f64,
    /// Half-width of the uniform temperature noise.
    pub temp_noise: f64,

    pub wind_base: f64,
    /// Base wind during 13:00-18:00.
    pub wind_afternoon: f64,
    pub wind_noise: f64,

    pub rain_probability: f64,
    /// Rain probability during 14:00-20:00.
    pub rain_probability_afternoon: f64,
    pub rain_boost_min: f64,
    pub rain_boost_max: f64,

    /// Half-width of the baseline humidity drift.
    pub humidity_jitter: f64,
    /// Temperature above which the soil dries faster.
    pub heat_threshold: f64,
    /// Humidity lost per °C above `heat_threshold`.
    pub heat_coeff: f64,
    /// Humidity lost per km/h of wind.
    pub wind_coeff: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            temp_dawn: 9.0,
            temp_noon: 22.0,
            temp_evening: 17.0,
            temp_noise: 1.5,
            wind_base: 5.0,
            wind_afternoon: 12.0,
            wind_noise: 4.0,
            rain_probability: 0.15,
            rain_probability_afternoon: 0.25,
            rain_boost_min: 15.0,
            rain_boost_max: 30.0,
            humidity_jitter: 1.5,
            heat_threshold: 20.0,
            heat_coeff: 0.3,
            wind_coeff: 0.05,
        }
    }
}

impl SimulationParams {
    /// Noise-free temperature for an hour of the day.
    pub fn base_temperature(&self, hour: u32) -> f64 {
        let h = (hour % 24) as f64;
        if (5.0..12.0).contains(&h) {
            self.temp_dawn + (self.temp_noon - self.temp_dawn) * (h - 5.0) / 7.0
        } else if (12.0..17.0).contains(&h) {
            self.temp_noon - (self.temp_noon - self.temp_evening) * (h - 12.0) / 5.0
        } else {
            // 17:00 through 04:00, cooling toward dawn over twelve hours.
            let since_evening = (h - 17.0).rem_euclid(24.0);
            self.temp_evening - (self.temp_evening - self.temp_dawn) * since_evening / 12.0
        }
    }

    pub fn base_wind(&self, hour: u32) -> f64 {
        if (13..18).contains(&(hour % 24)) {
            self.wind_afternoon
        } else {
            self.wind_base
        }
    }

    pub fn rain_chance(&self, hour: u32) -> f64 {
        if (14..20).contains(&(hour % 24)) {
            self.rain_probability_afternoon
        } else {
            self.rain_probability
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct EnvironmentSimulator {
    params: SimulationParams,
    rng: Box<dyn RandomSource>,
}

impl EnvironmentSimulator {
    pub fn new(params: SimulationParams, rng: Box<dyn RandomSource>) -> Self {
        Self { params, rng }
    }

    /// Simulator driven by an entropy-seeded generator.
    #[cfg(feature = "sim")]
    pub fn from_entropy(params: SimulationParams) -> Self {
        Self::new(params, Box::new(fastrand::Rng::new()))
    }

    /// Simulator whose readings repeat exactly for the same seed.
    #[cfg(feature = "sim")]
    pub fn seeded(params: SimulationParams, seed: u64) -> Self {
        Self::new(params, Box::new(fastrand::Rng::with_seed(seed)))
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Produce the next readings from `prev` at local hour `hour` (0-23;
    /// larger values wrap).
    ///
    /// Draw order is fixed (temperature, wind, rain, rain boost, humidity
    /// drift) so a seeded source replays identically.
    pub fn simulate_readings(&mut self, prev: &EnvironmentState, hour: u32) -> EnvironmentState {
        let p = &self.params;
        let hour = hour % 24;

        let temperature = (p.base_temperature(hour)
            + self.rng.uniform(-p.temp_noise, p.temp_noise))
        .clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);

        let wind_speed = (p.base_wind(hour) + self.rng.uniform(-p.wind_noise, p.wind_noise))
            .clamp(WIND_MIN, WIND_MAX);

        let rain_detected = self.rng.chance(p.rain_chance(hour));
        let rain_boost = if rain_detected {
            self.rng.uniform(p.rain_boost_min, p.rain_boost_max)
        } else {
            0.0
        };

        let mut delta = self.rng.uniform(-p.humidity_jitter, p.humidity_jitter);
        if temperature > p.heat_threshold {
            delta -= p.heat_coeff * (temperature - p.heat_threshold);
        }
        delta -= p.wind_coeff * wind_speed;
        delta += rain_boost;

        EnvironmentState {
            humidity: clamp_humidity(prev.humidity + delta),
            temperature,
            wind_speed,
            rain_detected,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
