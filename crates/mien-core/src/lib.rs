//! mien-core — fingerprinting, face selection and embedding math for the
//! mien photo index, plus the capability seams the pipelines consume:
//! image decode/folder scanning and the serialized face-detector worker.

pub mod detector;
pub mod embedding;
pub mod fingerprint;
pub mod media;
pub mod select;
pub mod types;

pub use detector::{DetectorError, DetectorHandle, FaceDetector, RemoteDetector};
pub use embedding::Embedding;
pub use types::{BoundingBox, DetectedFace, Face, Photo, SearchHit};
