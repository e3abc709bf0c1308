//! ## maskvakt-telemetry::metrics
//! **Prometheus exporter with histograms**

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub frames_processed: IntCounter,
    pub inference_errors: IntCounter,
    pub results_dropped: IntCounter,
    pub alerts_dispatched: IntCounter,
    pub alerts_suppressed: IntCounter,
    pub notify_failures: IntCounter,
    pub inference_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let frames_processed = counter(
            "maskvakt_frames_processed_total",
            "Frames classified by detection workers",
        )?;
        let inference_errors = counter(
            "maskvakt_inference_errors_total",
            "Frames whose classification failed",
        )?;
        let results_dropped = counter(
            "maskvakt_results_dropped_total",
            "Detection results dropped on a full output queue",
        )?;
        let alerts_dispatched = counter(
            "maskvakt_alerts_dispatched_total",
            "Alerts handed off to at least one notifier",
        )?;
        let alerts_suppressed = counter(
            "maskvakt_alerts_suppressed_total",
            "Alert candidates discarded inside the cooldown window",
        )?;
        let notify_failures = counter(
            "maskvakt_notify_failures_total",
            "Alert hand-offs rejected by every notifier",
        )?;

        let inference_latency = Histogram::with_opts(
            HistogramOpts::new(
                "maskvakt_inference_latency_seconds",
                "Classification time per frame",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        registry.register(Box::new(inference_latency.clone()))?;

        Ok(Self {
            registry,
            frames_processed,
            inference_errors,
            results_dropped,
            alerts_dispatched,
            alerts_suppressed,
            notify_failures,
            inference_latency,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_registered_series() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.frames_processed.inc();
        metrics.inference_latency.observe(0.02);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("maskvakt_frames_processed_total 1"));
        assert!(text.contains("maskvakt_inference_latency_seconds_bucket"));
        assert!(text.contains("maskvakt_notify_failures_total 0"));
    }
}
