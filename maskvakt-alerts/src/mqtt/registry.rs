//! Inbound message handlers keyed by topic filter.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};

pub trait MessageHandler: Send + Sync {
    fn handle(&self, topic: &str, payload: &Value);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn handle(&self, topic: &str, payload: &Value) {
        self(topic, payload)
    }
}

/// MQTT filter matching with `+` (one level) and `#` (remaining levels).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}

/// Filter -> handlers, in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<BTreeMap<String, Vec<Arc<dyn MessageHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, filter: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .write()
            .entry(filter.into())
            .or_default()
            .push(handler);
    }

    pub fn unregister(&self, filter: &str) -> bool {
        self.handlers.write().remove(filter).is_some()
    }

    pub fn filters(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Decodes the payload and calls every handler whose filter matches.
    /// Payloads that are not JSON are passed as `{"raw": "<text>"}`.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let value = serde_json::from_slice(payload)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(payload) }));

        // Handlers run outside the lock so they may register further handlers.
        let matched: Vec<Arc<dyn MessageHandler>> = self
            .handlers
            .read()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .flat_map(|(_, handlers)| handlers.iter().cloned())
            .collect();

        for handler in &matched {
            handler.handle(topic, &value);
        }
        matched.len()
    }
}
