//! ## maskvakt-alerts::dispatcher
//! **Turns detection results and component failures into notifications**
//!
//! At most one alert per (source, kind) is handed off per cooldown window.
//! Candidates inside the window are discarded. A hand-off counts as
//! delivered when any external notifier accepts it (the log sink counts only
//! when it is the sole destination); only then is the cooldown stamped and
//! the alert persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use maskvakt_core::alert::{Alert, AlertKind, Severity};
use maskvakt_core::clock::Clock;
use maskvakt_core::detection::DetectionResult;
use maskvakt_core::source::SourceDescriptor;
use maskvakt_core::store::DetectionStore;
use maskvakt_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cooldown::{CooldownKey, CooldownTracker, Reservation};
use crate::notifier::{alert_metadata, Notifier};

/// Display name and location per source id, used in alert summaries.
#[derive(Debug, Clone, Default)]
pub struct SourceDirectory {
    entries: HashMap<String, (String, String)>,
}

impl SourceDirectory {
    pub fn from_descriptors(descriptors: &[SourceDescriptor]) -> Self {
        let entries = descriptors
            .iter()
            .map(|d| (d.id.clone(), (d.name.clone(), d.location.clone())))
            .collect();
        Self { entries }
    }

    /// Falls back to the id itself for unknown sources.
    pub fn name<'a>(&'a self, source_id: &'a str) -> &'a str {
        self.entries
            .get(source_id)
            .map(|(name, _)| name.as_str())
            .unwrap_or(source_id)
    }

    pub fn location(&self, source_id: &str) -> &str {
        self.entries
            .get(source_id)
            .map(|(_, location)| location.as_str())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered(Alert),
    Suppressed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatcherStats {
    pub considered: u64,
    pub delivered: u64,
    pub suppressed: u64,
    pub failed: u64,
    pub tracked_keys: usize,
    pub cooldown_secs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    considered: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
}

pub struct AlertDispatcher {
    cooldown: CooldownTracker,
    notifiers: Vec<Arc<dyn Notifier>>,
    store: Option<Arc<dyn DetectionStore>>,
    directory: SourceDirectory,
    clock: Arc<dyn Clock>,
    metrics: Option<MetricsRecorder>,
    counters: Counters,
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown: CooldownTracker::new(cooldown, clock.clone()),
            notifiers: Vec::new(),
            store: None,
            directory: SourceDirectory::default(),
            clock,
            metrics: None,
            counters: Counters::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DetectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_directory(mut self, directory: SourceDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Raises a violation alert when the result has unmasked faces.
    /// Returns the alert only when it was delivered.
    pub fn consider(&self, result: &DetectionResult) -> Option<Alert> {
        if !result.is_violation() {
            return None;
        }
        let source_id = result.source_id();
        let summary = format!(
            "Mask violation detected\nCamera: {}\nLocation: {}\nViolations: {}\nTime: {}",
            self.directory.name(source_id),
            self.directory.location(source_id),
            result.no_mask_count(),
            result.timestamp().format("%Y-%m-%d %H:%M:%S"),
        );
        let alert = Alert::new(
            AlertKind::Violation,
            source_id,
            Severity::High,
            summary,
            result.timestamp(),
        );
        match self.dispatch(alert) {
            DispatchOutcome::Delivered(alert) => Some(alert),
            _ => None,
        }
    }

    /// A camera could not be opened or stopped delivering frames.
    pub fn camera_alert(&self, source_id: &str, message: &str) -> DispatchOutcome {
        let summary = format!(
            "Camera: {}\nLocation: {}\n{}",
            self.directory.name(source_id),
            self.directory.location(source_id),
            message
        );
        self.dispatch(Alert::new(
            AlertKind::Camera,
            source_id,
            Severity::Medium,
            summary,
            self.clock.wall(),
        ))
    }

    /// A component failure not tied to one camera.
    pub fn system_alert(&self, component: &str, message: &str, severity: Severity) -> DispatchOutcome {
        self.dispatch(Alert::new(
            AlertKind::System,
            "system",
            severity,
            format!("{component}: {message}"),
            self.clock.wall(),
        ))
    }

    /// Runs one candidate through the cooldown and the notifiers.
    pub fn dispatch(&self, alert: Alert) -> DispatchOutcome {
        self.counters.considered.fetch_add(1, Ordering::Relaxed);
        let key = CooldownKey::new(alert.source_id.clone(), alert.kind);

        match self.cooldown.try_reserve(&key) {
            Reservation::Granted => {}
            Reservation::Cooling { remaining } => {
                debug!(source_id = %key.source_id, kind = %key.kind, ?remaining, "Alert suppressed");
                return self.suppressed();
            }
            Reservation::InFlight => {
                debug!(source_id = %key.source_id, kind = %key.kind, "Alert already in flight");
                return self.suppressed();
            }
        }

        let mut delivered = 0usize;
        let mut delivered_external = 0usize;
        for notifier in &self.notifiers {
            match notifier.notify(&alert) {
                Ok(()) => {
                    delivered += 1;
                    if !notifier.is_local() {
                        delivered_external += 1;
                    }
                }
                Err(e) => {
                    warn!(notifier = notifier.name(), source_id = %alert.source_id, error = %e, "Notifier failed");
                }
            }
        }

        let success = if self.notifiers.iter().any(|n| !n.is_local()) {
            delivered_external > 0
        } else {
            delivered > 0
        };
        self.cooldown.release(&key, success);

        if !success {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.notify_failures.inc();
            }
            let mut metadata = alert_metadata(&alert);
            metadata.push(KeyValue::new("notifiers", self.notifiers.len() as i64));
            EventLogger::log_event("alert_failed", metadata);
            return DispatchOutcome::Failed;
        }

        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.alerts_dispatched.inc();
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.append_alert(&alert) {
                warn!(source_id = %alert.source_id, error = %e, "Failed to persist alert");
            }
        }
        let mut metadata = alert_metadata(&alert);
        metadata.push(KeyValue::new("delivered_to", delivered as i64));
        EventLogger::log_event("alert_dispatched", metadata);
        DispatchOutcome::Delivered(alert)
    }

    fn suppressed(&self) -> DispatchOutcome {
        self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.alerts_suppressed.inc();
        }
        DispatchOutcome::Suppressed
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            considered: self.counters.considered.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            tracked_keys: self.cooldown.tracked(),
            cooldown_secs: self.cooldown.window().as_secs(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::notifier::LogNotifier;
    use chrono::Utc;
    use maskvakt_core::clock::ManualClock;
    use maskvakt_core::detection::{BoundingBox, FaceDetection, MaskLabel};
    use maskvakt_core::source::TransportDescriptor;
    use maskvakt_core::store::InMemoryStore;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;

    /// Records every alert; fails while `failing` is set.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<Alert>>,
        pub failing: AtomicBool,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Transport("connection refused".into()));
            }
            self.sent.lock().push(alert.clone());
            Ok(())
        }
    }

    fn violation(source: &str, clock: &ManualClock) -> DetectionResult {
        DetectionResult::from_faces(
            source,
            clock.wall(),
            vec![FaceDetection::new(
                BoundingBox::new(0, 0, 10, 10),
                MaskLabel::NoMask,
                0.9,
            )],
        )
    }

    fn setup(window_secs: u64) -> (AlertDispatcher, Arc<RecordingNotifier>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(Duration::from_secs(window_secs), Arc::new(clock.clone()))
            .with_notifier(notifier.clone());
        (dispatcher, notifier, clock)
    }

    #[test]
    fn compliant_results_raise_nothing() {
        let (dispatcher, notifier, clock) = setup(60);
        let ok = DetectionResult::from_faces(
            "cam1",
            clock.wall(),
            vec![FaceDetection::new(BoundingBox::new(0, 0, 5, 5), MaskLabel::Mask, 0.95)],
        );
        assert!(dispatcher.consider(&ok).is_none());
        assert!(notifier.sent.lock().is_empty());
        assert_eq!(dispatcher.stats().considered, 0);
    }

    #[test]
    fn second_candidate_inside_window_is_suppressed() {
        let (dispatcher, notifier, clock) = setup(60);
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        clock.advance(Duration::from_secs(30));
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_none());

        assert_eq!(notifier.sent.lock().len(), 1);
        let stats = dispatcher.stats();
        assert_eq!((stats.delivered, stats.suppressed), (1, 1));
    }

    #[test]
    fn second_candidate_after_window_is_sent() {
        let (dispatcher, notifier, clock) = setup(60);
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        clock.advance(Duration::from_secs(60));
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        assert_eq!(notifier.sent.lock().len(), 2);
    }

    #[test]
    fn failed_hand_off_is_retried_immediately() {
        let (dispatcher, notifier, clock) = setup(60);
        notifier.failing.store(true, Ordering::SeqCst);
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_none());
        assert_eq!(dispatcher.stats().failed, 1);

        notifier.failing.store(false, Ordering::SeqCst);
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        assert_eq!(notifier.sent.lock().len(), 1);
    }

    #[test]
    fn one_working_notifier_is_enough() {
        let clock = ManualClock::new(Utc::now());
        let broken = Arc::new(RecordingNotifier::default());
        broken.failing.store(true, Ordering::SeqCst);
        let working = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(Duration::from_secs(60), Arc::new(clock.clone()))
            .with_notifier(broken)
            .with_notifier(working.clone());

        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        assert_eq!(working.sent.lock().len(), 1);
    }

    #[test]
    fn log_sink_does_not_mask_a_failed_external_hand_off() {
        let clock = ManualClock::new(Utc::now());
        let chat = Arc::new(RecordingNotifier::default());
        chat.failing.store(true, Ordering::SeqCst);
        let dispatcher = AlertDispatcher::new(Duration::from_secs(60), Arc::new(clock.clone()))
            .with_notifier(Arc::new(LogNotifier))
            .with_notifier(chat.clone());

        assert!(dispatcher.consider(&violation("cam1", &clock)).is_none());
        assert_eq!(dispatcher.stats().failed, 1);

        chat.failing.store(false, Ordering::SeqCst);
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        assert_eq!(chat.sent.lock().len(), 1);
        assert_eq!(dispatcher.stats().suppressed, 0);
    }

    #[test]
    fn log_sink_alone_counts_as_delivery() {
        let clock = ManualClock::new(Utc::now());
        let dispatcher = AlertDispatcher::new(Duration::from_secs(60), Arc::new(clock.clone()))
            .with_notifier(Arc::new(LogNotifier));
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_none());
        assert_eq!(dispatcher.stats().suppressed, 1);
    }

    /// Takes `delay` of wall time per hand-off.
    struct SlowNotifier {
        clock: ManualClock,
        delay: Duration,
        sent: Mutex<usize>,
    }

    impl Notifier for SlowNotifier {
        fn name(&self) -> &str {
            "slow"
        }

        fn notify(&self, _alert: &Alert) -> Result<(), NotifyError> {
            self.clock.advance(self.delay);
            *self.sent.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn window_runs_from_the_first_candidate_not_the_hand_off() {
        let clock = ManualClock::new(Utc::now());
        let slow = Arc::new(SlowNotifier {
            clock: clock.clone(),
            delay: Duration::from_secs(10),
            sent: Mutex::new(0),
        });
        let dispatcher = AlertDispatcher::new(Duration::from_secs(60), Arc::new(clock.clone()))
            .with_notifier(slow.clone());

        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        // 10s already spent in the hand-off; 50s more puts us at t0 + 60s.
        clock.advance(Duration::from_secs(50));
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_some());
        assert_eq!(*slow.sent.lock(), 2);
    }

    #[test]
    fn no_notifiers_means_failure() {
        let clock = ManualClock::new(Utc::now());
        let dispatcher = AlertDispatcher::new(Duration::from_secs(60), Arc::new(clock.clone()));
        assert!(dispatcher.consider(&violation("cam1", &clock)).is_none());
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[test]
    fn kinds_and_sources_cool_down_separately() {
        let (dispatcher, notifier, clock) = setup(60);
        dispatcher.consider(&violation("cam1", &clock));
        dispatcher.consider(&violation("cam2", &clock));
        assert!(matches!(
            dispatcher.camera_alert("cam1", "Failed to open"),
            DispatchOutcome::Delivered(_)
        ));
        assert!(matches!(
            dispatcher.camera_alert("cam1", "Failed to open"),
            DispatchOutcome::Suppressed
        ));
        assert_eq!(notifier.sent.lock().len(), 3);
        assert_eq!(dispatcher.stats().tracked_keys, 3);
    }

    #[test]
    fn delivered_alerts_are_persisted_with_directory_names() {
        let (dispatcher, notifier, clock) = setup(60);
        let store = Arc::new(InMemoryStore::new());
        let directory = SourceDirectory::from_descriptors(&[SourceDescriptor::new(
            "cam1",
            "Main Entrance",
            "Building A",
            TransportDescriptor::Local { index: 0 },
        )]);
        let dispatcher = dispatcher.with_store(store.clone()).with_directory(directory);

        let alert = dispatcher.consider(&violation("cam1", &clock)).unwrap();
        assert!(alert.summary.contains("Camera: Main Entrance"));
        assert!(alert.summary.contains("Location: Building A"));
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(store.alert_count(), 1);
        assert_eq!(notifier.sent.lock()[0], alert);
    }

    #[test]
    fn system_alerts_use_the_system_source() {
        let (dispatcher, notifier, _) = setup(60);
        let outcome = dispatcher.system_alert("broker", "connection lost", Severity::Critical);
        let DispatchOutcome::Delivered(alert) = outcome else {
            panic!("expected delivery");
        };
        assert_eq!(alert.source_id, "system");
        assert_eq!(alert.summary, "broker: connection lost");
        assert_eq!(notifier.sent.lock().len(), 1);
    }

    #[test]
    fn metrics_follow_outcomes() {
        let (dispatcher, notifier, clock) = setup(60);
        let metrics = MetricsRecorder::new().unwrap();
        let dispatcher = dispatcher.with_metrics(metrics.clone());

        dispatcher.consider(&violation("cam1", &clock));
        dispatcher.consider(&violation("cam1", &clock));
        notifier.failing.store(true, Ordering::SeqCst);
        dispatcher.consider(&violation("cam2", &clock));

        assert_eq!(metrics.alerts_dispatched.get(), 1);
        assert_eq!(metrics.alerts_suppressed.get(), 1);
        assert_eq!(metrics.notify_failures.get(), 1);
    }
}
