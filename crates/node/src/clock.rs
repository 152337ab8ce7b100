//! Local wall-clock time at the irrigation site.
//!
//! The site runs on Colombian time: UTC-5 all year, no daylight saving. The
//! zone is normally resolved through `chrono-tz`, but a bad zone name never
//! stops the clock. It logs the lookup failure and subtracts five hours by
//! hand instead.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::EngineError;

/// IANA name of the site's zone.
pub const DEFAULT_ZONE: &str = "America/Bogota";

/// Seconds west of UTC used when the zone cannot be resolved.
const FALLBACK_OFFSET_WEST_SECS: i32 = 5 * 3600;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

// ---------------------------------------------------------------------------
// Zone-aware clock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Source {
    Zone(Tz),
    FixedUtcMinus5,
}

/// System clock projected into the site's time zone.
#[derive(Debug, Clone)]
pub struct ZoneClock {
    source: Source,
}

impl ZoneClock {
    /// Build a clock for `zone`. Falls back to a fixed UTC-5 offset if the
    /// zone name does not resolve.
    pub fn new(zone: &str) -> Self {
        match lookup_zone(zone) {
            Ok(tz) => Self {
                source: Source::Zone(tz),
            },
            Err(e) => {
                warn!(error = %e, "clock: falling back to fixed UTC-5 offset");
                Self {
                    source: Source::FixedUtcMinus5,
                }
            }
        }
    }

    pub fn bogota() -> Self {
        Self::new(DEFAULT_ZONE)
    }

    /// True when the clock is running on the hand-rolled UTC-5 offset.
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, Source::FixedUtcMinus5)
    }
}

impl Default for ZoneClock {
    fn default() -> Self {
        Self::bogota()
    }
}

impl Clock for ZoneClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let now = Utc::now();
        match self.source {
            Source::Zone(tz) => {
                let local = now.with_timezone(&tz);
                local.with_timezone(&local.offset().fix())
            }
            Source::FixedUtcMinus5 => fixed_utc_minus5(now),
        }
    }
}

/// Resolve an IANA zone name.
pub fn lookup_zone(zone: &str) -> Result<Tz, EngineError> {
    zone.parse::<Tz>()
        .map_err(|e| EngineError::ClockUnavailable {
            zone: zone.to_string(),
            reason: e.to_string(),
        })
}

/// Current time at the site, using the default zone.
pub fn current_local_time() -> DateTime<FixedOffset> {
    ZoneClock::bogota().now()
}

fn fixed_utc_minus5(now: DateTime<Utc>) -> DateTime<FixedOffset> {
    match FixedOffset::west_opt(FALLBACK_OFFSET_WEST_SECS) {
        Some(offset) => now.with_timezone(&offset),
        None => now.fixed_offset(),
    }
}

// ---------------------------------------------------------------------------
// Fixed clock
// ---------------------------------------------------------------------------

/// Clock pinned to a settable instant. Clones share the same instant, so a
/// handle kept outside the controller can move time forward.
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self {
            at: Arc::new(Mutex::new(at)),
        }
    }

    /// Pin the clock to a local wall-clock reading at UTC-5.
    pub fn at_local(local: NaiveDateTime) -> Self {
        let utc = local + chrono::Duration::seconds(FALLBACK_OFFSET_WEST_SECS as i64);
        Self::new(fixed_utc_minus5(utc.and_utc()))
    }

    pub fn set(&self, at: DateTime<FixedOffset>) {
        match self.at.lock() {
            Ok(mut guard) => *guard = at,
            Err(poisoned) => *poisoned.into_inner() = at,
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
