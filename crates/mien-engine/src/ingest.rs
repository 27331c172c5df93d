//! Ingest pipeline: single images, folder batches, bulk reprocessing.

use std::path::{Path, PathBuf};

use mien_core::detector::{DetectorError, DetectorHandle};
use mien_core::media::{self, MediaError};
use mien_core::{fingerprint, select, Face, Photo};
use mien_store::{Store, StoreError};
use thiserror::Error;

/// Faces retained per photo; the largest becomes the primary face.
pub const DEFAULT_FACES_PER_PHOTO: usize = 3;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal state of one image's ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested { photo_id: String, faces: usize },
    /// A photo with the same content fingerprint is already stored.
    SkippedDuplicate,
    /// The detector found no face in the image.
    SkippedNoFace,
}

/// Aggregate result of a folder batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchSummary {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Aggregate result of a bulk reprocess pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReprocessSummary {
    pub processed: u64,
    pub no_faces: u64,
    pub failed: u64,
    pub faces_before: u64,
    pub faces_after: u64,
}

/// Turns image files into stored photos with their retained faces.
///
/// Constructed once at startup and shared; every operation is stateless
/// apart from the store and the detector handle.
pub struct IngestPipeline {
    store: Store,
    detector: DetectorHandle,
    images_root: PathBuf,
    faces_per_photo: usize,
}

impl IngestPipeline {
    pub fn new(
        store: Store,
        detector: DetectorHandle,
        images_root: PathBuf,
        faces_per_photo: usize,
    ) -> Self {
        Self {
            store,
            detector,
            images_root,
            faces_per_photo,
        }
    }

    /// Ingest one image file.
    ///
    /// The duplicate check runs before any decode or detection work, so a
    /// re-ingested file costs one hash and one lookup. A fingerprint
    /// collision at insert time (two concurrent ingests of the same
    /// content) also resolves to a duplicate skip.
    pub async fn ingest_one(
        &self,
        path: &Path,
        event_tag: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        let hash_path = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || fingerprint::digest_file(&hash_path))
            .await
            .expect("fingerprint task panicked")
            .map_err(|source| IngestError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if self.store.fingerprint_exists(&digest).await? {
            tracing::info!(path = %path.display(), "skipping duplicate");
            return Ok(IngestOutcome::SkippedDuplicate);
        }

        let decode_path = path.to_path_buf();
        let image = tokio::task::spawn_blocking(move || media::decode_file(&decode_path))
            .await
            .expect("decode task panicked")?;
        let (width, height) = image.dimensions();

        let detected = self.detector.detect(image).await?;
        if detected.is_empty() {
            tracing::warn!(path = %path.display(), "no face detected");
            return Ok(IngestOutcome::SkippedNoFace);
        }

        let retained = select::select_top_n(detected, self.faces_per_photo);
        let stored_path = media::storage_relative_path(path, &self.images_root);
        let photo = Photo::new(
            stored_path,
            digest,
            width,
            height,
            event_tag.map(|t| t.to_string()),
        );
        let faces: Vec<Face> = retained
            .into_iter()
            .enumerate()
            .map(|(i, detected)| Face::from_detected(&photo.id, detected, i == 0))
            .collect();

        match self.store.insert_photo(&photo, &faces).await {
            Ok(()) => {
                tracing::info!(
                    path = %path.display(),
                    photo_id = %photo.id,
                    faces = faces.len(),
                    "image ingested"
                );
                Ok(IngestOutcome::Ingested {
                    photo_id: photo.id,
                    faces: faces.len(),
                })
            }
            Err(StoreError::DuplicateFingerprint) => {
                tracing::info!(path = %path.display(), "lost duplicate race, skipping");
                Ok(IngestOutcome::SkippedDuplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist uploaded image bytes under the images root and ingest them.
    ///
    /// The file is kept only when the image is actually ingested; skipped
    /// and failed uploads are removed again.
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        event_tag: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        let relative = format!("uploads/{}_{}", uuid::Uuid::new_v4(), filename);
        let dest = self.images_root.join(&relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IngestError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&dest, bytes).map_err(|source| IngestError::Io {
            path: dest.clone(),
            source,
        })?;

        let outcome = self.ingest_one(&dest, event_tag).await;
        if !matches!(outcome, Ok(IngestOutcome::Ingested { .. })) {
            if let Err(e) = std::fs::remove_file(&dest) {
                tracing::warn!(path = %dest.display(), error = %e, "failed to remove rejected upload");
            }
        }
        outcome
    }

    /// Ingest every supported image under `folder`.
    ///
    /// One bad file never aborts the batch: per-item failures are logged,
    /// counted and skipped. A failed folder scan yields a single error and
    /// an otherwise empty summary.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        recursive: bool,
        event_tag: Option<&str>,
    ) -> BatchSummary {
        // Warm the detector up front so the first image does not pay for
        // backend initialization; a failure here still surfaces per item.
        if let Err(e) = self.detector.ensure_ready().await {
            tracing::warn!(error = %e, "detector not ready, batch items will fail");
        }

        let files = match media::scan_folder(folder, recursive) {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(folder = %folder.display(), error = %e, "failed to scan folder");
                return BatchSummary {
                    errors: 1,
                    ..Default::default()
                };
            }
        };
        tracing::info!(folder = %folder.display(), count = files.len(), "starting folder ingest");

        let mut summary = BatchSummary::default();
        for file in &files {
            match self.ingest_one(file, event_tag).await {
                Ok(IngestOutcome::Ingested { .. }) => summary.processed += 1,
                Ok(IngestOutcome::SkippedDuplicate) | Ok(IngestOutcome::SkippedNoFace) => {
                    summary.skipped += 1
                }
                Err(e) => {
                    tracing::error!(path = %file.display(), error = %e, "failed to ingest");
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            errors = summary.errors,
            "folder ingest complete"
        );
        summary
    }

    /// Re-derive the retained faces of every stored photo from its original
    /// image file. Safe to run repeatedly: with an unchanged detector the
    /// retained set comes out the same.
    pub async fn reprocess_all(&self) -> Result<ReprocessSummary, IngestError> {
        if let Err(e) = self.detector.ensure_ready().await {
            tracing::warn!(error = %e, "detector not ready, reprocess items will fail");
        }

        let photos = self.store.photos_for_reprocess().await?;
        tracing::info!(count = photos.len(), "starting reprocess");

        let mut summary = ReprocessSummary::default();
        for photo in &photos {
            summary.faces_before += self.store.count_faces(&photo.id).await?;
            match self.reprocess_photo(photo).await {
                Ok(Some(retained)) => {
                    summary.processed += 1;
                    summary.faces_after += retained as u64;
                }
                Ok(None) => summary.no_faces += 1,
                Err(e) => {
                    tracing::error!(
                        photo_id = %photo.id,
                        path = %photo.path,
                        error = %e,
                        "failed to reprocess"
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            no_faces = summary.no_faces,
            failed = summary.failed,
            faces_before = summary.faces_before,
            faces_after = summary.faces_after,
            "reprocess complete"
        );
        Ok(summary)
    }

    /// Returns the number of retained faces, or `None` when the detector
    /// no longer finds any (the stored faces are then cleared).
    async fn reprocess_photo(&self, photo: &Photo) -> Result<Option<usize>, IngestError> {
        // Stored paths are relative to the images root; absolute paths
        // (files ingested from outside the root) pass through `join`.
        let full_path = self.images_root.join(&photo.path);
        let image = tokio::task::spawn_blocking(move || media::decode_file(&full_path))
            .await
            .expect("decode task panicked")?;

        let detected = self.detector.detect(image).await?;
        if detected.is_empty() {
            self.store.replace_faces(&photo.id, &[]).await?;
            tracing::warn!(photo_id = %photo.id, "no face detected on reprocess, cleared stored faces");
            return Ok(None);
        }

        let retained = select::select_top_n(detected, self.faces_per_photo);
        let faces: Vec<Face> = retained
            .into_iter()
            .enumerate()
            .map(|(i, detected)| Face::from_detected(&photo.id, detected, i == 0))
            .collect();
        self.store.replace_faces(&photo.id, &faces).await?;
        Ok(Some(faces.len()))
    }
}
