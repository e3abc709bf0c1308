use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use maskvakt_config::MqttConfig;
use maskvakt_core::alert::Alert;
use maskvakt_core::detection::DetectionResult;
use parking_lot::Mutex;
use rand::Rng;
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, QoS};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::link::{LinkMachine, LinkState};
use super::registry::{HandlerRegistry, MessageHandler};
use crate::error::{MqttError, NotifyError};
use crate::notifier::Notifier;

const COMPONENT: &str = "maskvakt";
const REQUEST_CAPACITY: usize = 64;
const SLEEP_SLICE: Duration = Duration::from_millis(50);

struct Shared {
    machine: Mutex<LinkMachine>,
    stopping: AtomicBool,
    registry: Arc<HandlerRegistry>,
    last_error: Mutex<Option<String>>,
}

/// Broker connection driven by a dedicated event-loop thread.
pub struct MqttLink {
    client: Client,
    prefix: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn status_payload(status: &str) -> Vec<u8> {
    json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "component": COMPONENT,
    })
    .to_string()
    .into_bytes()
}

impl MqttLink {
    /// Spawns the event loop and returns immediately; the first connect
    /// happens in the background.
    pub fn connect(config: &MqttConfig, registry: Arc<HandlerRegistry>) -> Result<Self, MqttError> {
        if config.broker.is_empty() || config.client_id.is_empty() {
            return Err(MqttError::Settings("broker and client id are required".into()));
        }
        let prefix = config.topic_prefix.trim_end_matches('/').to_string();

        let mut options = MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            format!("{prefix}/status"),
            status_payload("offline"),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let shared = Arc::new(Shared {
            machine: Mutex::new(LinkMachine::new(&config.reconnect)),
            stopping: AtomicBool::new(false),
            registry,
            last_error: Mutex::new(None),
        });

        let worker = {
            let client = client.clone();
            let shared = shared.clone();
            let prefix = prefix.clone();
            thread::Builder::new()
                .name("mqtt-link".into())
                .spawn(move || event_loop(connection, client, shared, prefix))?
        };

        info!(broker = %config.broker, port = config.port, "MQTT link started");
        Ok(Self {
            client,
            prefix,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic(&self, subtopic: &str) -> String {
        format!("{}/{}", self.prefix, subtopic)
    }

    pub fn state(&self) -> LinkState {
        self.shared.machine.lock().state()
    }

    /// False once the reconnect attempts are exhausted.
    pub fn is_healthy(&self) -> bool {
        self.shared.machine.lock().is_healthy()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Registers a handler for a full topic filter and subscribes to it if
    /// the link is up. Filters registered earlier are subscribed on connect.
    pub fn subscribe(&self, filter: &str, handler: Arc<dyn MessageHandler>) {
        self.shared.registry.register(filter, handler);
        if self.state() == LinkState::Connected {
            if let Err(e) = self.client.try_subscribe(filter, QoS::AtLeastOnce) {
                warn!(filter, error = %e, "MQTT subscribe failed");
            }
        }
    }

    pub fn publish<T: Serialize>(&self, subtopic: &str, payload: &T, retain: bool) -> Result<(), NotifyError> {
        if self.state() != LinkState::Connected {
            return Err(NotifyError::Unavailable(format!(
                "MQTT link is {:?}",
                self.state()
            )));
        }
        let bytes = serde_json::to_vec(payload)?;
        self.client
            .try_publish(self.topic(subtopic), QoS::AtLeastOnce, retain, bytes)
            .map_err(|e| NotifyError::Transport(e.to_string()))
    }

    pub fn publish_detection(&self, result: &DetectionResult) -> Result<(), NotifyError> {
        self.publish(
            &format!("detection/{}", result.source_id()),
            &json!({
                "camera_id": result.source_id(),
                "timestamp": result.timestamp().to_rfc3339(),
                "detection": result,
            }),
            false,
        )
    }

    pub fn publish_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.publish(
            &format!("alert/{}", alert.kind),
            &json!({
                "type": alert.kind,
                "timestamp": alert.timestamp.to_rfc3339(),
                "data": alert,
            }),
            false,
        )
    }

    pub fn publish_status(&self, status: &str) -> Result<(), NotifyError> {
        self.publish(
            "status",
            &json!({
                "status": status,
                "timestamp": Utc::now().to_rfc3339(),
                "component": COMPONENT,
            }),
            true,
        )
    }

    /// Publishes `offline`, disconnects and joins the event loop.
    pub fn disconnect(&self) {
        if self.shared.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.publish_status("offline");
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request not queued");
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("MQTT event loop panicked");
            }
        }
        info!("MQTT link stopped");
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn event_loop(mut connection: Connection, client: Client, shared: Arc<Shared>, prefix: String) {
    shared.machine.lock().connecting();
    for event in connection.iter() {
        if shared.stopping.load(Ordering::Acquire) {
            break;
        }
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                shared.machine.lock().connected();
                info!("MQTT connected");
                for filter in shared.registry.filters() {
                    if let Err(e) = client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                        warn!(filter = %filter, error = %e, "MQTT subscribe failed");
                    }
                }
                if let Err(e) = client.try_publish(
                    format!("{prefix}/status"),
                    QoS::AtLeastOnce,
                    true,
                    status_payload("online"),
                ) {
                    warn!(error = %e, "Failed to publish online status");
                }
            }
            Ok(Event::Incoming(Packet::Publish(message))) => {
                let handled = shared.registry.dispatch(&message.topic, &message.payload);
                debug!(topic = %message.topic, handled, "MQTT message received");
            }
            Ok(_) => {}
            Err(e) => {
                *shared.last_error.lock() = Some(e.to_string());
                let next = shared.machine.lock().failed();
                let Some(delay) = next else {
                    error!(error = %e, "MQTT reconnect attempts exhausted, giving up");
                    break;
                };
                warn!(error = %e, ?delay, "MQTT connection failed, retrying");
                if !sleep_unless_stopping(&shared, jitter(delay)) {
                    break;
                }
                shared.machine.lock().connecting();
            }
        }
    }
}

/// Adds up to 10% random jitter.
fn jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 10) as u64;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

/// Returns false if a stop was requested while sleeping.
fn sleep_unless_stopping(shared: &Shared, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if shared.stopping.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

/// Publishes delivered alerts to `<prefix>/alert/<kind>`.
pub struct MqttNotifier {
    link: Arc<MqttLink>,
}

impl MqttNotifier {
    pub fn new(link: Arc<MqttLink>) -> Self {
        Self { link }
    }
}

impl Notifier for MqttNotifier {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.link.publish_alert(alert)
    }
}
