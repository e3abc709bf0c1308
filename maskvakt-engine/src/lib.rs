//! # maskvakt-engine
//!
//! Builds the monitor from configuration as explicit owned instances and
//! exposes the control surface used by frontends.

pub mod error;
pub mod feeder;
pub mod runtime;
pub mod status;

pub use error::EngineError;
pub use feeder::FeederStats;
pub use runtime::{MonitorRuntime, RuntimeBuilder, StartReport};
pub use status::{BrokerStatus, CameraSummary, RuntimeStatus};
