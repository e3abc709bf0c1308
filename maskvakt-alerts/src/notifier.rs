//! Notifier contract and the structured-log destination.

use maskvakt_core::alert::Alert;
use maskvakt_telemetry::EventLogger;
use opentelemetry::KeyValue;

use crate::error::NotifyError;

/// One alert destination. Implementations may block on network I/O.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Local sinks are always written but only count as a delivery when no
    /// external destination is configured.
    fn is_local(&self) -> bool {
        false
    }
}

/// Writes every alert to the `alert_event` log stream. Never fails.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        EventLogger::log_event("alert_raised", alert_metadata(alert));
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}

pub(crate) fn alert_metadata(alert: &Alert) -> Vec<KeyValue> {
    vec![
        KeyValue::new("kind", alert.kind.as_str()),
        KeyValue::new("source_id", alert.source_id.clone()),
        KeyValue::new("severity", alert.severity.as_str()),
        KeyValue::new("summary", alert.summary.clone()),
        KeyValue::new("timestamp", alert.timestamp.to_rfc3339()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maskvakt_core::alert::{AlertKind, Severity};
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn log_notifier_records_event() {
        let alert = Alert::new(
            AlertKind::Violation,
            "lobby-cam",
            Severity::High,
            "2 people without a mask",
            Utc::now(),
        );
        LogNotifier.notify(&alert).unwrap();
        assert!(logs_contain("alert_raised"));
        assert!(logs_contain("lobby-cam"));
    }
}
