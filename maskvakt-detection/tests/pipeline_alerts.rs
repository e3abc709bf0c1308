use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use maskvakt_alerts::{AlertDispatcher, Notifier, NotifyError};
use maskvakt_config::PipelineConfig;
use maskvakt_core::alert::Alert;
use maskvakt_core::clock::SystemClock;
use maskvakt_core::detection::{BoundingBox, DetectionResult, FaceDetection, MaskLabel};
use maskvakt_core::frame::FrameEnvelope;
use maskvakt_core::store::InMemoryStore;
use maskvakt_detection::{DetectionPipeline, InferenceError};
use parking_lot::Mutex;

#[derive(Default)]
struct CountingNotifier {
    sent: Mutex<Vec<Alert>>,
}

impl Notifier for CountingNotifier {
    fn name(&self) -> &str {
        "counting"
    }

    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}

fn unmasked(frame: &FrameEnvelope) -> Result<DetectionResult, InferenceError> {
    Ok(DetectionResult::from_faces(
        frame.source_id.as_ref(),
        frame.wall_time,
        vec![FaceDetection::new(
            BoundingBox::new(4, 4, 32, 32),
            MaskLabel::NoMask,
            0.87,
        )],
    ))
}

#[test]
fn ten_violations_inside_one_window_send_one_notification() {
    let notifier = Arc::new(CountingNotifier::default());
    let store = Arc::new(InMemoryStore::new());
    let dispatcher = Arc::new(
        AlertDispatcher::new(Duration::from_secs(300), Arc::new(SystemClock))
            .with_notifier(notifier.clone())
            .with_store(store.clone()),
    );

    let invocations = Arc::new(AtomicUsize::new(0));
    let hook = {
        let dispatcher = dispatcher.clone();
        let invocations = invocations.clone();
        move |result: &DetectionResult| {
            invocations.fetch_add(1, Ordering::SeqCst);
            dispatcher.consider(result);
        }
    };

    let config = PipelineConfig {
        workers: 2,
        input_capacity: 10,
        output_capacity: 10,
        poll_interval_ms: 10,
        stop_timeout_ms: 1000,
    };
    let pipeline = DetectionPipeline::new(&config, Arc::new(unmasked))
        .unwrap()
        .with_store(store.clone())
        .with_hook(Arc::new(hook));
    pipeline.start(2).unwrap();

    for sequence in 0..10 {
        let frame = FrameEnvelope::new(
            Arc::from("cam1"),
            sequence,
            Instant::now(),
            Utc::now(),
            Bytes::from_static(b"jpeg"),
        );
        assert!(pipeline.add_frame(frame));
    }

    let mut results = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while results.len() < 10 && Instant::now() < deadline {
        results.extend(pipeline.drain_results(10));
        thread::sleep(Duration::from_millis(5));
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    while invocations.load(Ordering::SeqCst) < 10 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    pipeline.stop();

    assert_eq!(results.len(), 10);
    assert!(results
        .iter()
        .all(|r| r.no_mask_count() == 1 && r.face_count() == 1));
    assert_eq!(invocations.load(Ordering::SeqCst), 10);
    assert_eq!(notifier.sent.lock().len(), 1);
    assert_eq!(store.detection_count(), 10);
    assert_eq!(store.alert_count(), 1);

    let stats = dispatcher.stats();
    assert_eq!(stats.considered, 10);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.suppressed, 9);
}
