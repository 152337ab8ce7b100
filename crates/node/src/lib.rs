//! Simulated field station for the irrigation hub: local site clock and the
//! synthetic environment (soil humidity, temperature, wind, rain).

pub mod clock;
pub mod error;
pub mod sim;

pub use clock::{Clock, FixedClock, ZoneClock};
pub use error::EngineError;
pub use sim::{EnvironmentSimulator, EnvironmentState, RandomSource, SimulationParams};
