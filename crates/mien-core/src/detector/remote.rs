//! HTTP client for a face-detection sidecar.
//!
//! The sidecar owns the detection and embedding models; this process sends
//! it an encoded image and gets raw face records back. Wire contract:
//! `GET {endpoint}/healthz` answers 2xx when the models are loaded, and
//! `POST {endpoint}/detect` with an `image/png` body returns
//! `{"faces": [{"bbox": [x1, y1, x2, y2], "embedding": [..], "confidence": c}]}`.

use std::io::Cursor;
use std::time::Duration;

use image::RgbImage;
use serde::Deserialize;

use super::{DetectorError, FaceDetector};
use crate::types::DetectedFace;

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<WireFace>,
}

#[derive(Deserialize)]
struct WireFace {
    bbox: [f32; 4],
    embedding: Vec<f32>,
    confidence: f32,
}

/// Detector backend backed by an inference sidecar over HTTP.
pub struct RemoteDetector {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl RemoteDetector {
    /// Connect to the sidecar at `endpoint`, probing its health endpoint
    /// before returning.
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self, DetectorError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Unavailable(e.to_string()))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let health_url = format!("{endpoint}/healthz");
        let status = client
            .get(&health_url)
            .send()
            .map_err(|e| DetectorError::Unavailable(format!("{health_url}: {e}")))?
            .status();
        if !status.is_success() {
            return Err(DetectorError::Unavailable(format!(
                "{health_url} returned {status}"
            )));
        }

        tracing::info!(endpoint = %endpoint, "detector sidecar reachable");
        Ok(Self { client, endpoint })
    }

    fn encode_png(image: &RgbImage) -> Result<Vec<u8>, DetectorError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| DetectorError::Inference(format!("encode: {e}")))?;
        Ok(buf)
    }
}

impl FaceDetector for RemoteDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let body = Self::encode_png(image)?;
        let url = format!("{}/detect", self.endpoint);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::Inference(format!("{url} returned {status}")));
        }

        let parsed: DetectResponse = response
            .json()
            .map_err(|e| DetectorError::Inference(format!("decode response: {e}")))?;

        tracing::debug!(faces = parsed.faces.len(), "detector sidecar response");

        Ok(parsed
            .faces
            .into_iter()
            .map(|face| DetectedFace {
                bbox: face.bbox,
                embedding: face.embedding,
                confidence: face.confidence,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_face_deserializes() {
        let json = r#"{"faces": [{"bbox": [1.5, 2.0, 90.25, 120.0],
                                   "embedding": [0.1, 0.2, 0.3],
                                   "confidence": 0.87}]}"#;
        let parsed: DetectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.faces.len(), 1);
        assert_eq!(parsed.faces[0].bbox, [1.5, 2.0, 90.25, 120.0]);
        assert_eq!(parsed.faces[0].embedding.len(), 3);
    }

    #[test]
    fn test_encode_png_produces_signature() {
        let buf = RemoteDetector::encode_png(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(&buf[1..4], b"PNG");
    }

    #[test]
    fn test_connect_refuses_unreachable_endpoint() {
        // Port 9 (discard) should refuse connections on test machines.
        let result = RemoteDetector::connect("http://127.0.0.1:9", Duration::from_millis(200));
        assert!(matches!(result, Err(DetectorError::Unavailable(_))));
    }
}
