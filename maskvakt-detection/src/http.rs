//! Classifier client for a face/mask model served over HTTP.
//!
//! The frame is posted as `multipart/form-data` (`image`, `source_id`,
//! `sequence`). The service answers with the detected faces and, per face,
//! the probability that a mask is worn:
//!
//! ```json
//! {"faces": [{"x": 10, "y": 20, "w": 64, "h": 64, "mask_probability": 0.93}]}
//! ```

use maskvakt_config::InferenceConfig;
use maskvakt_core::detection::{BoundingBox, DetectionResult, FaceDetection, MaskLabel};
use maskvakt_core::frame::FrameEnvelope;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

use crate::error::InferenceError;
use crate::inference::InferenceAdapter;

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    faces: Vec<FaceReport>,
}

#[derive(Debug, Deserialize)]
struct FaceReport {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    #[serde(default)]
    mask_probability: Option<f32>,
}

pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    threshold: f32,
}

impl HttpClassifier {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            threshold: config.confidence_threshold,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Maps one mask probability to a label: above the threshold is a mask,
/// otherwise no mask with the complementary confidence.
pub fn label_face(mask_probability: Option<f32>, threshold: f32) -> (MaskLabel, f32) {
    match mask_probability {
        Some(p) if p.is_finite() => {
            if p > threshold {
                (MaskLabel::Mask, p)
            } else {
                (MaskLabel::NoMask, 1.0 - p)
            }
        }
        _ => (MaskLabel::Unknown, 0.0),
    }
}

fn into_result(
    frame: &FrameEnvelope,
    response: ClassifyResponse,
    threshold: f32,
) -> DetectionResult {
    let faces = response
        .faces
        .into_iter()
        .map(|face| {
            let (label, confidence) = label_face(face.mask_probability, threshold);
            FaceDetection::new(BoundingBox::new(face.x, face.y, face.w, face.h), label, confidence)
        })
        .collect();
    DetectionResult::from_faces(frame.source_id.as_ref(), frame.wall_time, faces)
}

impl InferenceAdapter for HttpClassifier {
    fn classify(&self, frame: &FrameEnvelope) -> Result<DetectionResult, InferenceError> {
        let image = multipart::Part::bytes(frame.payload.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new()
            .text("source_id", frame.source_id.to_string())
            .text("sequence", frame.sequence.to_string())
            .part("image", image);

        let response: ClassifyResponse = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()?
            .error_for_status()?
            .json()
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        Ok(into_result(frame, response, self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn frame() -> FrameEnvelope {
        FrameEnvelope::new(
            Arc::from("cam1"),
            7,
            Instant::now(),
            Utc::now(),
            Bytes::from_static(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]),
        )
    }

    /// Answers one request with `status` and `body` after reading the upload.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).unwrap();
                request.extend_from_slice(&chunk[..n]);
                if n == 0 || request.ends_with(b"--\r\n") || request.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/v1/classify")
    }

    fn classifier(endpoint: String) -> HttpClassifier {
        HttpClassifier::new(&InferenceConfig {
            endpoint,
            ..InferenceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn threshold_mapping() {
        assert_eq!(label_face(Some(0.93), 0.8), (MaskLabel::Mask, 0.93));
        let (label, confidence) = label_face(Some(0.3), 0.8);
        assert_eq!(label, MaskLabel::NoMask);
        assert!((confidence - 0.7).abs() < 1e-6);
        assert_eq!(label_face(Some(0.8), 0.8).0, MaskLabel::NoMask);
        assert_eq!(label_face(None, 0.8), (MaskLabel::Unknown, 0.0));
        assert_eq!(label_face(Some(f32::NAN), 0.8).0, MaskLabel::Unknown);
    }

    proptest! {
        #[test]
        fn labelled_confidence_stays_in_unit_range(p in 0.0f32..=1.0, threshold in 0.0f32..=1.0) {
            let (label, confidence) = label_face(Some(p), threshold);
            prop_assert!((0.0..=1.0).contains(&confidence));
            prop_assert_eq!(label == MaskLabel::Mask, p > threshold);
        }
    }

    #[test]
    fn classifies_frame_over_http() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"faces":[{"x":1,"y":2,"w":30,"h":30,"mask_probability":0.95},{"x":50,"y":2,"w":30,"h":30,"mask_probability":0.1},{"x":90,"y":2,"w":30,"h":30}]}"#,
        );
        let result = classifier(endpoint).classify(&frame()).unwrap();
        assert_eq!(result.source_id(), "cam1");
        assert_eq!(result.face_count(), 3);
        assert_eq!(result.mask_count(), 1);
        assert_eq!(result.no_mask_count(), 1);
        assert_eq!(result.unknown_count(), 1);
        assert_eq!(result.faces()[1].bbox, BoundingBox::new(50, 2, 30, 30));
    }

    #[test]
    fn server_error_maps_to_status() {
        let endpoint = serve_once("503 Service Unavailable", "{}");
        let err = classifier(endpoint).classify(&frame()).unwrap_err();
        assert!(matches!(err, InferenceError::Status(503)));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let endpoint = serve_once("200 OK", "not json");
        let err = classifier(endpoint).classify(&frame()).unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }
}
