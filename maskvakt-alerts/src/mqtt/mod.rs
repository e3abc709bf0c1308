//! ## maskvakt-alerts::mqtt
//! **Broker link, inbound handlers, broker destination**
//!
//! Topic layout under the configured prefix:
//! - `<prefix>/status`: retained `online`/`offline` (last will)
//! - `<prefix>/detection/<source>`: every detection result
//! - `<prefix>/alert/<kind>`: every delivered alert
//! - `<prefix>/camera/<source>/control`: inbound `{"action": ...}` commands

mod client;
mod control;
mod link;
mod registry;

pub use client::{MqttLink, MqttNotifier};
pub use control::{parse_control, ControlAction};
pub use link::{LinkMachine, LinkState};
pub use registry::{topic_matches, HandlerRegistry, MessageHandler};
