use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;

/// A face as reported by the detector capability: raw float corner
/// coordinates, raw (unnormalized) embedding, and detection confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Corner coordinates [x1, y1, x2, y2] in image pixels.
    pub bbox: [f32; 4],
    pub embedding: Vec<f32>,
    pub confidence: f32,
}

impl DetectedFace {
    /// Bounding-box area in square pixels, computed on the raw float corners.
    pub fn area(&self) -> f32 {
        let [x1, y1, x2, y2] = self.bbox;
        (x2 - x1) * (y2 - y1)
    }
}

/// Integer pixel bounding box stored with a face, x1 < x2 and y1 < y2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Truncate raw detector corners toward zero. Applied only after face
    /// selection; selection ranks on the float area.
    pub fn from_raw(bbox: [f32; 4]) -> Self {
        Self {
            x1: bbox[0] as i32,
            y1: bbox[1] as i32,
            x2: bbox[2] as i32,
            y2: bbox[3] as i32,
        }
    }
}

/// A stored photo record. The content fingerprint is unique across all
/// photos and enforces deduplication at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    /// Storage path relative to the images root, forward slashes.
    pub path: String,
    /// Hex digest of the full file content.
    pub fingerprint: String,
    pub width: u32,
    pub height: u32,
    pub event_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    pub fn new(
        path: String,
        fingerprint: String,
        width: u32,
        height: u32,
        event_tag: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path,
            fingerprint,
            width,
            height,
            event_tag,
            created_at: Utc::now(),
        }
    }
}

/// A face retained for a photo. A photo owns its faces: they are deleted
/// with it and never shared. At most one face per photo is primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub id: String,
    pub photo_id: String,
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    pub is_primary: bool,
}

impl Face {
    /// Build a stored face from a detector result: the embedding is
    /// L2-normalized and the bounding box truncated to integer pixels.
    pub fn from_detected(photo_id: &str, detected: DetectedFace, is_primary: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            photo_id: photo_id.to_string(),
            bbox: BoundingBox::from_raw(detected.bbox),
            embedding: Embedding::normalized(detected.embedding),
            is_primary,
        }
    }
}

/// One ranked answer from a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub photo_id: String,
    pub path: String,
    /// Cosine similarity of the photo's primary face to the query, in [0, 1]
    /// for matches that pass the threshold.
    pub similarity: f32,
    pub event_tag: Option<String>,
    pub width: u32,
    pub height: u32,
}
