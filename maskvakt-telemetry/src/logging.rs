//! ## maskvakt-telemetry::logging
//! **Subscriber setup and structured alert events**
//!
//! Structured logging with tracing and OpenTelemetry key/value metadata.

use maskvakt_config::TelemetryConfig;
use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` overrides the configured level.
    pub fn init(config: &TelemetryConfig) -> Result<(), InitError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

        let builder = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER);

        if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    }

    /// Records one alert lifecycle event (dispatched, failed, suppressed).
    #[inline]
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "alert_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        let _entered = span.enter();
        tracing::info!(metadata = ?metadata, "Alert event occurred");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn logs_alert_event_with_metadata() {
        EventLogger::log_event(
            "alert_dispatched",
            vec![KeyValue::new("source_id", "cam1")],
        );
        assert!(logs_contain("Alert event occurred"));
        assert!(logs_contain("cam1"));
    }
}
