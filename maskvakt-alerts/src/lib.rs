//! # maskvakt-alerts
//!
//! Alert dispatch with per-(source, kind) cooldown, the notifier contract and
//! its destinations, and the MQTT broker link.
//!
//! ### Key Submodules:
//! - `cooldown`: reservation-based cooldown tracker
//! - `dispatcher`: `AlertDispatcher`, turns results into at most one alert per window
//! - `notifier`: the `Notifier` contract and the structured log destination
//! - `telegram`: chat destination
//! - `mqtt`: broker link state machine, inbound handler registry, broker destination

pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod mqtt;
pub mod notifier;
pub mod telegram;

pub use cooldown::{CooldownKey, CooldownTracker, Reservation};
pub use dispatcher::{AlertDispatcher, DispatchOutcome, DispatcherStats, SourceDirectory};
pub use error::{MqttError, NotifyError};
pub use notifier::{LogNotifier, Notifier};
pub use telegram::{format_daily_report, CameraLine, DailyReport, TelegramNotifier};
