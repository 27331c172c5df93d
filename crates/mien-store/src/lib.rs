//! mien-store — SQLite persistence for photos and faces.
//!
//! One background connection per [`Store`], shared through a clonable
//! handle. The schema enforces the two invariants the pipelines rely on:
//! content fingerprints are unique across photos, and faces are deleted
//! with their photo.

mod store;

pub use store::{PhotoSummary, Store, StoreError, StoreStats};
