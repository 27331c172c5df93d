//! mien-engine — orchestration of the mien photo index.
//!
//! [`IngestPipeline`] turns image files into stored photos with retained
//! faces; [`SearchEngine`] ranks the stored corpus against a query image.
//! Both are thin coordinators over the capability seams in `mien-core` and
//! the persistence layer in `mien-store`, constructed once at startup from
//! clonable store and detector handles.

pub mod config;
pub mod ingest;
pub mod search;

pub use config::Config;
pub use ingest::{
    BatchSummary, IngestError, IngestOutcome, IngestPipeline, ReprocessSummary,
    DEFAULT_FACES_PER_PHOTO,
};
pub use search::{SearchEngine, SearchError, SearchResponse, MAX_TOP_K};
