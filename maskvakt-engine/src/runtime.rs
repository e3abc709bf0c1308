/*!
# Monitor Runtime

Wires the camera fleet, the detection pipeline, alert dispatch, analytics and
the optional broker link into one owned runtime. Frontends (CLI, HTTP) hold a
`MonitorRuntime` and call its control surface; nothing here is global.

Result fan-out per detection, on the worker thread that produced it:
persistence, then the alert dispatcher, then the analytics live counters.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use maskvakt_alerts::mqtt::{parse_control, ControlAction, HandlerRegistry, MqttLink, MqttNotifier};
use maskvakt_alerts::{
    format_daily_report, AlertDispatcher, CameraLine, DailyReport, LogNotifier, Notifier,
    NotifyError, SourceDirectory, TelegramNotifier,
};
use maskvakt_analytics::{
    ActivitySummary, AnalyticsAggregator, AnalyticsSnapshot, DailyTrend, ExportFormat, Period,
};
use maskvakt_capture::{CameraStreamManager, DeviceFactory, SourceSnapshot};
use maskvakt_config::MaskvaktConfig;
use maskvakt_core::alert::Alert;
use maskvakt_core::clock::{Clock, SystemClock};
use maskvakt_core::detection::DetectionResult;
use maskvakt_core::frame::FrameEnvelope;
use maskvakt_core::store::{DetectionStore, InMemoryStore, Page};
use maskvakt_detection::{DetectionPipeline, HttpClassifier, InferenceAdapter};
use maskvakt_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::feeder::{Feeder, FeederContext, FeederCounters};
use crate::status::{BrokerStatus, CameraSummary, RuntimeStatus};

/// Collaborators default to the production ones: HTTP classifier, in-memory
/// store, real transports, system clock.
pub struct RuntimeBuilder {
    config: MaskvaktConfig,
    adapter: Option<Arc<dyn InferenceAdapter>>,
    store: Option<Arc<dyn DetectionStore>>,
    device_factory: Option<DeviceFactory>,
    notifiers: Vec<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<MetricsRecorder>,
}

impl RuntimeBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn InferenceAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn store(mut self, store: Arc<dyn DetectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn device_factory(mut self, factory: DeviceFactory) -> Self {
        self.device_factory = Some(factory);
        self
    }

    /// Extra destination, in addition to the configured ones.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[instrument(skip(self), name = "build_runtime")]
    pub fn build(self) -> Result<MonitorRuntime, EngineError> {
        let config = self.config;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let store: Arc<dyn DetectionStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };
        let adapter: Arc<dyn InferenceAdapter> = match self.adapter {
            Some(adapter) => adapter,
            None => Arc::new(HttpClassifier::new(&config.inference)?),
        };
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => MetricsRecorder::new()?,
        };

        let cameras = Arc::new(match self.device_factory {
            Some(factory) => CameraStreamManager::with_factory(&config.capture, factory)?,
            None => CameraStreamManager::new(&config.capture)?,
        });

        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
        if config.alerts.log_alerts {
            notifiers.push(Arc::new(LogNotifier));
        }

        let telegram = if config.alerts.telegram.enabled {
            let telegram = Arc::new(TelegramNotifier::new(&config.alerts.telegram)?);
            notifiers.push(telegram.clone());
            Some(telegram)
        } else {
            None
        };

        let mqtt = if config.alerts.mqtt.enabled {
            let link = Arc::new(MqttLink::connect(
                &config.alerts.mqtt,
                Arc::new(HandlerRegistry::new()),
            )?);
            link.subscribe(
                &link.topic("camera/+/control"),
                Arc::new(control_handler(cameras.clone())),
            );
            notifiers.push(Arc::new(MqttNotifier::new(link.clone())));
            Some(link)
        } else {
            None
        };
        notifiers.extend(self.notifiers);

        let mut dispatcher = AlertDispatcher::new(config.alerts.cooldown(), clock.clone())
            .with_store(store.clone())
            .with_directory(SourceDirectory::from_descriptors(&config.capture.cameras))
            .with_metrics(metrics.clone());
        for notifier in notifiers {
            dispatcher = dispatcher.with_notifier(notifier);
        }
        let dispatcher = Arc::new(dispatcher);

        let names: HashMap<String, String> = config
            .capture
            .cameras
            .iter()
            .map(|camera| (camera.id.clone(), camera.name.clone()))
            .collect();
        let analytics = Arc::new(
            AnalyticsAggregator::new(store.clone(), clock.clone(), config.analytics.cache_ttl())
                .with_source_names(names),
        );

        let alert_hook = {
            let dispatcher = dispatcher.clone();
            move |result: &DetectionResult| {
                dispatcher.consider(result);
            }
        };
        let analytics_hook = {
            let analytics = analytics.clone();
            move |result: &DetectionResult| analytics.observe(result)
        };
        let pipeline = Arc::new(
            DetectionPipeline::new(&config.pipeline, adapter)?
                .with_store(store.clone())
                .with_metrics(metrics.clone())
                .with_clock(clock.clone())
                .with_hook(Arc::new(alert_hook))
                .with_hook(Arc::new(analytics_hook)),
        );

        info!(
            cameras = cameras.len(),
            notifiers = ?dispatcher.notifier_names(),
            broker = mqtt.is_some(),
            "Monitor runtime built"
        );

        Ok(MonitorRuntime {
            config,
            clock,
            store,
            cameras,
            pipeline,
            dispatcher,
            analytics,
            mqtt,
            telegram,
            metrics,
            feeder_counters: Arc::new(FeederCounters::default()),
            feeder: Mutex::new(None),
            started_at: Mutex::new(None),
        })
    }
}

/// Applies `{"action": ...}` commands from `<prefix>/camera/<id>/control`.
fn control_handler(cameras: Arc<CameraStreamManager>) -> impl Fn(&str, &Value) + Send + Sync {
    move |topic: &str, payload: &Value| {
        let Some((camera_id, action)) = parse_control(topic, payload) else {
            warn!(topic, "Ignoring malformed camera control message");
            return;
        };
        let outcome = match action {
            ControlAction::Start => cameras.start(camera_id),
            ControlAction::Stop => cameras.stop(camera_id),
            ControlAction::Restart => cameras.restart(camera_id),
        };
        match outcome {
            Ok(()) => info!(camera_id, ?action, "Camera control applied"),
            Err(e) => warn!(camera_id, ?action, error = %e, "Camera control failed"),
        }
    }
}

/// Outcome of [`MonitorRuntime::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    pub cameras_started: usize,
    /// `(source id, reason)` for every camera that failed to open
    pub camera_failures: Vec<(String, String)>,
}

pub struct MonitorRuntime {
    config: MaskvaktConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DetectionStore>,
    cameras: Arc<CameraStreamManager>,
    pipeline: Arc<DetectionPipeline>,
    dispatcher: Arc<AlertDispatcher>,
    analytics: Arc<AnalyticsAggregator>,
    mqtt: Option<Arc<MqttLink>>,
    telegram: Option<Arc<TelegramNotifier>>,
    metrics: MetricsRecorder,
    feeder_counters: Arc<FeederCounters>,
    feeder: Mutex<Option<Feeder>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl MonitorRuntime {
    pub fn builder(config: MaskvaktConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            adapter: None,
            store: None,
            device_factory: None,
            notifiers: Vec::new(),
            clock: None,
            metrics: None,
        }
    }

    pub fn config(&self) -> &MaskvaktConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.feeder.lock().is_some()
    }

    /// Starts the fleet, the worker pool and the feeder. Cameras that fail
    /// to open raise a camera alert and are left stopped. No-op when running.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<StartReport, EngineError> {
        let mut feeder = self.feeder.lock();
        if feeder.is_some() {
            return Ok(StartReport::default());
        }

        let failures = self.cameras.start_all();
        let mut report = StartReport {
            cameras_started: self.cameras.running_sources().len(),
            camera_failures: Vec::with_capacity(failures.len()),
        };
        for failure in failures {
            let reason = failure.error.to_string();
            self.dispatcher
                .camera_alert(&failure.source_id, &format!("Failed to start camera: {reason}"));
            report.camera_failures.push((failure.source_id, reason));
        }

        if let Err(e) = self.pipeline.start(self.config.pipeline.workers) {
            self.cameras.stop_all();
            return Err(e.into());
        }

        let context = FeederContext {
            cameras: self.cameras.clone(),
            pipeline: self.pipeline.clone(),
            mqtt: self.mqtt.clone(),
            counters: self.feeder_counters.clone(),
            pull_timeout: self.config.capture.pull_timeout(),
            interval: self.config.capture.feed_interval(),
        };
        match Feeder::spawn(context) {
            Ok(spawned) => *feeder = Some(spawned),
            Err(e) => {
                self.pipeline.stop();
                self.cameras.stop_all();
                return Err(e.into());
            }
        }

        *self.started_at.lock() = Some(self.clock.wall());
        EventLogger::log_event(
            "monitor_started",
            vec![
                KeyValue::new("cameras_started", report.cameras_started as i64),
                KeyValue::new("camera_failures", report.camera_failures.len() as i64),
            ],
        );
        Ok(report)
    }

    /// Stops the feeder, then the workers, then the cameras. Safe to call
    /// when stopped.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let Some(feeder) = self.feeder.lock().take() else {
            return;
        };
        feeder.stop();
        let report = self.pipeline.stop();
        self.cameras.stop_all();
        *self.started_at.lock() = None;
        EventLogger::log_event(
            "monitor_stopped",
            vec![
                KeyValue::new("workers_joined", report.joined as i64),
                KeyValue::new("workers_abandoned", report.abandoned as i64),
            ],
        );
    }

    /// `stop` plus an orderly broker disconnect.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(link) = &self.mqtt {
            link.disconnect();
        }
    }

    pub fn start_camera(&self, id: &str) -> Result<(), EngineError> {
        Ok(self.cameras.start(id)?)
    }

    pub fn stop_camera(&self, id: &str) -> Result<(), EngineError> {
        Ok(self.cameras.stop(id)?)
    }

    pub fn restart_camera(&self, id: &str) -> Result<(), EngineError> {
        Ok(self.cameras.restart(id)?)
    }

    pub fn cameras(&self) -> Vec<SourceSnapshot> {
        self.cameras.list_sources()
    }

    pub fn status(&self) -> RuntimeStatus {
        let running = self.is_running();
        RuntimeStatus {
            running,
            started_at: *self.started_at.lock(),
            cameras: CameraSummary::from_snapshots(&self.cameras.list_sources()),
            pipeline: self.pipeline.stats(),
            feeder: self.feeder_counters.snapshot(running),
            alerts: self.dispatcher.stats(),
            notifiers: self
                .dispatcher
                .notifier_names()
                .into_iter()
                .map(String::from)
                .collect(),
            analytics_cache: self.analytics.cache_stats(),
            live: self.analytics.live(),
            broker: self.mqtt.as_ref().map(|link| BrokerStatus {
                state: link.state(),
                healthy: link.is_healthy(),
                last_error: link.last_error(),
            }),
        }
    }

    pub fn detections(&self, page: usize, per_page: usize) -> Result<Page<DetectionResult>, EngineError> {
        Ok(self.store.recent_detections(page, per_page)?)
    }

    pub fn alerts(&self, page: usize, per_page: usize) -> Result<Page<Alert>, EngineError> {
        Ok(self.store.recent_alerts(page, per_page)?)
    }

    pub fn analytics(&self, period: Period) -> Result<Arc<AnalyticsSnapshot>, EngineError> {
        Ok(self.analytics.query(period)?)
    }

    pub fn trends(&self, days: u32) -> Result<Vec<DailyTrend>, EngineError> {
        Ok(self.analytics.trends(days)?)
    }

    /// Activity over the last hour, uncached.
    pub fn recent_activity(&self) -> Result<ActivitySummary, EngineError> {
        Ok(self.analytics.recent_activity()?)
    }

    pub fn export(&self, period: Period, format: ExportFormat) -> Result<String, EngineError> {
        Ok(self.analytics.export(period, format)?)
    }

    pub fn invalidate_analytics(&self) {
        self.analytics.invalidate();
    }

    /// Prometheus text exposition of every runtime counter.
    pub fn metrics_text(&self) -> Result<String, EngineError> {
        Ok(self.metrics.gather_metrics()?)
    }

    /// Classifies one uploaded image outside the camera path and stores it.
    /// Uploads do not raise alerts.
    pub fn classify_upload(&self, source_id: &str, image: Bytes) -> Result<DetectionResult, EngineError> {
        let frame = FrameEnvelope::new(
            Arc::from(source_id),
            0,
            Instant::now(),
            self.clock.wall(),
            image,
        );
        let result = self.pipeline.process_single(&frame)?;
        self.store.append_detection(&result)?;
        Ok(result)
    }

    /// Today's figures, as sent by [`Self::send_daily_report`].
    pub fn daily_report(&self) -> Result<DailyReport, EngineError> {
        let snapshot = self.analytics.query(Period::Today)?;
        let cameras = CameraSummary::from_snapshots(&self.cameras.list_sources());
        Ok(DailyReport {
            date: snapshot.end.date_naive(),
            total_detections: snapshot.summary.total_detections,
            total_violations: snapshot.summary.total_violations,
            active_cameras: cameras.running,
            cameras: snapshot
                .sources
                .iter()
                .map(|source| CameraLine {
                    name: source.name.clone(),
                    detections: source.summary.total_detections,
                    violations: source.summary.total_violations,
                })
                .collect(),
        })
    }

    /// Sends the daily report to the chat destination.
    pub fn send_daily_report(&self) -> Result<(), EngineError> {
        let Some(telegram) = &self.telegram else {
            return Err(NotifyError::Unavailable("telegram is not enabled".into()).into());
        };
        let report = self.daily_report()?;
        telegram.send_message(&format_daily_report(&report))?;
        Ok(())
    }
}

impl Drop for MonitorRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
