//! Detection results produced by classifying one frame.
//!
//! A [`DetectionResult`] can only be built from its per-face records, so the
//! aggregate counts are always derived and
//! `mask_count + no_mask_count + unknown_count == face_count` holds for any
//! classifier output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification label for one detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskLabel {
    Mask,
    NoMask,
    Unknown,
}

/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

/// Per-face sub-record of a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub label: MaskLabel,
    /// Confidence in `label`, clamped to [0, 1]
    pub confidence: f32,
}

impl FaceDetection {
    pub fn new(bbox: BoundingBox, label: MaskLabel, confidence: f32) -> Self {
        Self {
            bbox,
            label,
            confidence: clamp_unit(confidence),
        }
    }
}

/// Structured output of running one frame through the classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    source_id: String,
    timestamp: DateTime<Utc>,
    face_count: u32,
    mask_count: u32,
    no_mask_count: u32,
    unknown_count: u32,
    confidence: f32,
    faces: Vec<FaceDetection>,
}

impl DetectionResult {
    /// Builds a result from per-face records, deriving every count and the
    /// aggregate confidence (mean of per-face confidences, 0 with no faces).
    pub fn from_faces(
        source_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        faces: Vec<FaceDetection>,
    ) -> Self {
        let mut mask_count = 0;
        let mut no_mask_count = 0;
        let mut unknown_count = 0;
        let mut confidence_sum = 0.0f64;

        let faces: Vec<FaceDetection> = faces
            .into_iter()
            .map(|face| FaceDetection::new(face.bbox, face.label, face.confidence))
            .collect();

        for face in &faces {
            match face.label {
                MaskLabel::Mask => mask_count += 1,
                MaskLabel::NoMask => no_mask_count += 1,
                MaskLabel::Unknown => unknown_count += 1,
            }
            confidence_sum += f64::from(face.confidence);
        }

        let face_count = faces.len() as u32;
        let confidence = if face_count == 0 {
            0.0
        } else {
            clamp_unit((confidence_sum / f64::from(face_count)) as f32)
        };

        Self {
            source_id: source_id.into(),
            timestamp,
            face_count,
            mask_count,
            no_mask_count,
            unknown_count,
            confidence,
            faces,
        }
    }

    /// A frame in which no face was found.
    pub fn empty(source_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::from_faces(source_id, timestamp, Vec::new())
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn face_count(&self) -> u32 {
        self.face_count
    }

    pub fn mask_count(&self) -> u32 {
        self.mask_count
    }

    pub fn no_mask_count(&self) -> u32 {
        self.no_mask_count
    }

    pub fn unknown_count(&self) -> u32 {
        self.unknown_count
    }

    /// Aggregate confidence in [0, 1].
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn faces(&self) -> &[FaceDetection] {
        &self.faces
    }

    /// True when at least one face was classified as unmasked.
    pub fn is_violation(&self) -> bool {
        self.no_mask_count > 0
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
