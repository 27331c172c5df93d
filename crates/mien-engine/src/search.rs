//! Similarity search over the stored face corpus.

use std::time::Instant;

use mien_core::detector::{DetectorError, DetectorHandle};
use mien_core::media::{self, MediaError};
use mien_core::{select, Embedding, SearchHit};
use mien_store::{Store, StoreError};
use thiserror::Error;

/// Upper bound on caller-supplied result counts.
pub const MAX_TOP_K: usize = 100;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// End-to-end query time (decode + detect + rank), milliseconds.
    pub elapsed_ms: u64,
    /// False when the query image contained no detectable face; the hit
    /// list is empty in that case.
    pub face_found: bool,
}

/// Answers "who looks like this" queries against the stored corpus.
pub struct SearchEngine {
    store: Store,
    detector: DetectorHandle,
}

impl SearchEngine {
    pub fn new(store: Store, detector: DetectorHandle) -> Self {
        Self { store, detector }
    }

    /// Rank stored primary faces against the largest face of a query image.
    ///
    /// The query embedding goes through the same selection and
    /// normalization path as ingest, so query and corpus live in the same
    /// embedding space. A query image without a detectable face is a
    /// normal outcome (`face_found = false`); a query image that fails to
    /// decode is an error.
    pub async fn search(
        &self,
        image_bytes: Vec<u8>,
        top_k: usize,
        threshold: f32,
        event_tag: Option<&str>,
    ) -> Result<SearchResponse, SearchError> {
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(SearchError::InvalidInput(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SearchError::InvalidInput(format!(
                "threshold must be between 0.0 and 1.0, got {threshold}"
            )));
        }

        let started = Instant::now();

        let image = tokio::task::spawn_blocking(move || media::decode_bytes(&image_bytes))
            .await
            .expect("decode task panicked")?;

        let detected = self.detector.detect(image).await?;
        let Some(largest) = select::select_largest(detected) else {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(elapsed_ms, "no face in query image");
            return Ok(SearchResponse {
                hits: Vec::new(),
                elapsed_ms,
                face_found: false,
            });
        };

        let query = Embedding::normalized(largest.embedding);
        let hits = self
            .store
            .search_primary(&query, top_k, threshold, event_tag)
            .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(hits = hits.len(), elapsed_ms, "search complete");
        Ok(SearchResponse {
            hits,
            elapsed_ms,
            face_found: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mien_core::detector::{spawn_detector, FaceDetector};
    use mien_core::types::DetectedFace;

    struct EmptyDetector;

    impl FaceDetector for EmptyDetector {
        fn detect(
            &mut self,
            _image: &image::RgbImage,
        ) -> Result<Vec<DetectedFace>, DetectorError> {
            Ok(Vec::new())
        }
    }

    async fn engine() -> SearchEngine {
        let store = Store::open_in_memory().await.unwrap();
        let detector =
            spawn_detector(Box::new(|| Ok(Box::new(EmptyDetector) as Box<dyn FaceDetector>)));
        SearchEngine::new(store, detector)
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_top_k() {
        let engine = engine().await;
        for top_k in [0, MAX_TOP_K + 1] {
            let err = engine.search(Vec::new(), top_k, 0.5, None).await.unwrap_err();
            assert!(matches!(err, SearchError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_threshold() {
        let engine = engine().await;
        for threshold in [-0.1f32, 1.5] {
            let err = engine.search(Vec::new(), 10, threshold, None).await.unwrap_err();
            assert!(matches!(err, SearchError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_undecodable_query_is_an_error() {
        let engine = engine().await;
        let err = engine
            .search(b"not an image".to_vec(), 10, 0.5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Media(MediaError::Decode(_))));
    }
}
