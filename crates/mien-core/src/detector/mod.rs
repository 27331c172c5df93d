//! Detector capability seam.
//!
//! Face detection and embedding extraction are provided by an external
//! backend behind the [`FaceDetector`] trait. [`spawn_detector`] owns one
//! backend instance on a dedicated OS thread and serializes inference
//! through a request channel; hashing, decoding and storage I/O run on the
//! callers and only inference waits on the single detector slot.

mod remote;

pub use remote::RemoteDetector;

use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::types::DetectedFace;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector backend unavailable: {0}")]
    Unavailable(String),
    #[error("detection failed: {0}")]
    Inference(String),
    #[error("detector worker exited")]
    ChannelClosed,
}

/// A loaded face-detection backend.
///
/// `detect` returns every face found in the image with its raw float
/// bounding box, raw embedding and confidence score, in backend order.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError>;
}

/// Deferred backend construction, run on the worker thread on first use.
pub type DetectorFactory = Box<dyn FnOnce() -> Result<Box<dyn FaceDetector>, DetectorError> + Send>;

/// Messages sent from pipeline callers to the worker thread.
enum DetectorRequest {
    Detect {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, DetectorError>>,
    },
    EnsureReady {
        reply: oneshot::Sender<Result<(), DetectorError>>,
    },
}

/// Backend lifecycle inside the worker thread. Requests arriving while the
/// factory runs queue on the channel, so concurrent callers await readiness
/// instead of racing an initialization flag.
enum Backend {
    Uninitialized(DetectorFactory),
    Ready(Box<dyn FaceDetector>),
    Failed(String),
}

/// Clone-safe handle to the detector worker thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectorRequest>,
}

impl DetectorHandle {
    /// Detect faces in an owned RGB image.
    pub async fn detect(&self, image: RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DetectorRequest::Detect {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DetectorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DetectorError::ChannelClosed)?
    }

    /// Force backend initialization, surfacing a failed load immediately
    /// instead of on the first image.
    pub async fn ensure_ready(&self) -> Result<(), DetectorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DetectorRequest::EnsureReady { reply: reply_tx })
            .await
            .map_err(|_| DetectorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DetectorError::ChannelClosed)?
    }
}

/// Spawn the detector worker on a dedicated OS thread.
///
/// The backend starts uninitialized; the factory runs when the first request
/// arrives. A failed initialization is remembered and answers every later
/// request with [`DetectorError::Unavailable`].
pub fn spawn_detector(factory: DetectorFactory) -> DetectorHandle {
    let (tx, mut rx) = mpsc::channel::<DetectorRequest>(4);

    std::thread::Builder::new()
        .name("mien-detector".into())
        .spawn(move || {
            let mut backend = Backend::Uninitialized(factory);
            tracing::debug!("detector worker started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    DetectorRequest::Detect { image, reply } => {
                        let result = match ready_backend(&mut backend) {
                            Ok(detector) => detector.detect(&image),
                            Err(e) => Err(e),
                        };
                        let _ = reply.send(result);
                    }
                    DetectorRequest::EnsureReady { reply } => {
                        let result = ready_backend(&mut backend).map(|_| ());
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::debug!("detector worker exiting");
        })
        .expect("failed to spawn detector thread");

    DetectorHandle { tx }
}

/// Drive the backend state machine to `Ready`, running the factory if this
/// is the first request.
fn ready_backend(state: &mut Backend) -> Result<&mut dyn FaceDetector, DetectorError> {
    if matches!(state, Backend::Uninitialized(_)) {
        // Placeholder while the factory runs; overwritten below.
        let previous = std::mem::replace(state, Backend::Failed("initialization interrupted".into()));
        if let Backend::Uninitialized(factory) = previous {
            tracing::info!("initializing detector backend");
            match factory() {
                Ok(detector) => {
                    tracing::info!("detector backend ready");
                    *state = Backend::Ready(detector);
                }
                Err(e) => {
                    tracing::error!(error = %e, "detector backend failed to initialize");
                    *state = Backend::Failed(e.to_string());
                }
            }
        }
    }

    match state {
        Backend::Ready(detector) => Ok(detector.as_mut()),
        Backend::Failed(message) => Err(DetectorError::Unavailable(message.clone())),
        Backend::Uninitialized(_) => Err(DetectorError::Unavailable("not initialized".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubDetector {
        faces: Vec<DetectedFace>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
            Ok(self.faces.clone())
        }
    }

    fn stub_face(confidence: f32) -> DetectedFace {
        DetectedFace {
            bbox: [0.0, 0.0, 10.0, 10.0],
            embedding: vec![1.0, 0.0],
            confidence,
        }
    }

    #[tokio::test]
    async fn test_detect_through_handle() {
        let handle = spawn_detector(Box::new(|| {
            Ok(Box::new(StubDetector {
                faces: vec![stub_face(0.9)],
            }) as Box<dyn FaceDetector>)
        }));

        let faces = handle.detect(RgbImage::new(4, 4)).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert!((faces[0].confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_factory = calls.clone();
        let handle = spawn_detector(Box::new(move || {
            calls_in_factory.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubDetector { faces: vec![] }) as Box<dyn FaceDetector>)
        }));

        handle.detect(RgbImage::new(4, 4)).await.unwrap();
        handle.detect(RgbImage::new(4, 4)).await.unwrap();
        handle.ensure_ready().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_sticky() {
        let handle = spawn_detector(Box::new(|| {
            Err(DetectorError::Unavailable("no sidecar".into()))
        }));

        assert!(matches!(
            handle.ensure_ready().await,
            Err(DetectorError::Unavailable(_))
        ));
        // Later requests see the remembered failure, not a retry.
        assert!(matches!(
            handle.detect(RgbImage::new(4, 4)).await,
            Err(DetectorError::Unavailable(_))
        ));
    }
}
