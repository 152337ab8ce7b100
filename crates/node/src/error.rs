use thiserror::Error;

/// Faults the monitoring engine can report.
///
/// Neither variant is expected during normal simulated operation: the clock
/// recovers from `ClockUnavailable` on its own, and `InvalidState` only shows
/// up if a controller was built or mutated outside its own methods.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("time zone '{zone}' unavailable: {reason}")]
    ClockUnavailable { zone: String, reason: String },

    #[error("invalid controller state: {0}")]
    InvalidState(String),
}
