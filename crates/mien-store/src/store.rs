use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mien_core::{Embedding, Face, Photo, SearchHit};
use rusqlite::OptionalExtension;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS photos (
    id          TEXT PRIMARY KEY,
    path        TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    width       INTEGER NOT NULL,
    height      INTEGER NOT NULL,
    event_tag   TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS faces (
    id         TEXT PRIMARY KEY,
    photo_id   TEXT NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
    x1         INTEGER NOT NULL,
    y1         INTEGER NOT NULL,
    x2         INTEGER NOT NULL,
    y2         INTEGER NOT NULL,
    embedding  BLOB NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS faces_photo_id ON faces(photo_id);
";

#[derive(Error, Debug)]
pub enum StoreError {
    /// A photo with the same content fingerprint already exists. Expected
    /// under concurrent ingest of the same file; callers treat it as a
    /// duplicate skip rather than a failure.
    #[error("a photo with this content fingerprint already exists")]
    DuplicateFingerprint,
    #[error("record not found")]
    NotFound,
    #[error("failed to prepare database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
}

/// Photo record plus the number of faces stored for it.
#[derive(Debug, Clone)]
pub struct PhotoSummary {
    pub photo: Photo,
    pub face_count: u32,
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub photos: u64,
    pub faces: u64,
    pub event_tags: Vec<String>,
}

/// Clone-safe handle to the SQLite-backed photo store.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        tracing::info!(path = %path.display(), "photo store opened");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Whether any photo already carries this content fingerprint.
    pub async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let fingerprint = fingerprint.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT 1 FROM photos WHERE fingerprint = ?1 LIMIT 1")?;
                Ok(stmt.exists([fingerprint])?)
            })
            .await?)
    }

    /// Persist a photo and its retained faces as one transaction.
    ///
    /// The photo row is written before any face row, and either everything
    /// lands or nothing does. A fingerprint collision (including the
    /// concurrent-ingest race where the duplicate check passed for both
    /// callers) surfaces as [`StoreError::DuplicateFingerprint`].
    pub async fn insert_photo(&self, photo: &Photo, faces: &[Face]) -> Result<(), StoreError> {
        let photo = photo.clone();
        let faces = faces.to_vec();
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO photos (id, path, fingerprint, width, height, event_tag, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        photo.id,
                        photo.path,
                        photo.fingerprint,
                        photo.width,
                        photo.height,
                        photo.event_tag,
                        photo.created_at.to_rfc3339(),
                    ],
                )?;
                for face in &faces {
                    insert_face(&tx, face)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await;

        match result {
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateFingerprint),
            other => other.map_err(StoreError::from),
        }
    }

    pub async fn get_photo(&self, id: &str) -> Result<Photo, StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, path, fingerprint, width, height, event_tag, created_at
                         FROM photos WHERE id = ?1",
                        [id],
                        photo_from_row,
                    )
                    .optional()?)
            })
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Newest photos first, with per-photo face counts.
    pub async fn list_photos(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PhotoSummary>, StoreError> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.path, p.fingerprint, p.width, p.height, p.event_tag,
                            p.created_at, COUNT(f.id) AS face_count
                     FROM photos p
                     LEFT JOIN faces f ON f.photo_id = p.id
                     GROUP BY p.id
                     ORDER BY p.created_at DESC
                     LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map([limit, offset], |row| {
                    Ok(PhotoSummary {
                        photo: photo_from_row(row)?,
                        face_count: row.get("face_count")?,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?)
    }

    /// All photos in creation order, for bulk re-derivation passes.
    pub async fn photos_for_reprocess(&self) -> Result<Vec<Photo>, StoreError> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, path, fingerprint, width, height, event_tag, created_at
                     FROM photos ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map([], photo_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?)
    }

    /// Faces stored for one photo, largest bounding box first.
    pub async fn faces_for_photo(&self, photo_id: &str) -> Result<Vec<Face>, StoreError> {
        let photo_id = photo_id.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, photo_id, x1, y1, x2, y2, embedding, is_primary
                     FROM faces WHERE photo_id = ?1
                     ORDER BY (x2 - x1) * (y2 - y1) DESC",
                )?;
                let rows = stmt.query_map([photo_id], face_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?)
    }

    pub async fn count_faces(&self, photo_id: &str) -> Result<u64, StoreError> {
        let photo_id = photo_id.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM faces WHERE photo_id = ?1",
                    [photo_id],
                    |row| row.get(0),
                )?)
            })
            .await?)
    }

    /// Replace every face of a photo with a freshly derived set, in one
    /// transaction. An empty slice just deletes the old faces.
    pub async fn replace_faces(&self, photo_id: &str, faces: &[Face]) -> Result<(), StoreError> {
        let photo_id = photo_id.to_string();
        let faces = faces.to_vec();
        Ok(self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM faces WHERE photo_id = ?1", [&photo_id])?;
                for face in &faces {
                    insert_face(&tx, face)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?)
    }

    /// Delete a photo; its faces go with it (cascade).
    pub async fn delete_photo(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let affected = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM photos WHERE id = ?1", [id])?))
            .await?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Set or clear a photo's event tag.
    pub async fn set_event_tag(&self, id: &str, tag: Option<&str>) -> Result<(), StoreError> {
        let id = id.to_string();
        let tag = tag.map(|t| t.to_string());
        let affected = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE photos SET event_tag = ?1 WHERE id = ?2",
                    rusqlite::params![tag, id],
                )?)
            })
            .await?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self
            .conn
            .call(|conn| {
                let photos: u64 =
                    conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
                let faces: u64 =
                    conn.query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT event_tag FROM photos
                     WHERE event_tag IS NOT NULL ORDER BY event_tag",
                )?;
                let event_tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(StoreStats {
                    photos,
                    faces,
                    event_tags,
                })
            })
            .await?)
    }

    /// Rank primary faces against a query embedding.
    ///
    /// Only primary faces take part in search; secondary faces exist for
    /// record-keeping. Candidates below `threshold` are dropped, the rest
    /// are ordered by similarity descending with ties broken by photo id,
    /// and the list is cut to `top_k`.
    pub async fn search_primary(
        &self,
        query: &Embedding,
        top_k: usize,
        threshold: f32,
        event_tag: Option<&str>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let query = query.clone();
        let event_tag = event_tag.map(|t| t.to_string());
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt;
                let rows = if let Some(tag) = &event_tag {
                    stmt = conn.prepare(
                        "SELECT p.id, p.path, p.width, p.height, p.event_tag, f.embedding
                         FROM faces f JOIN photos p ON p.id = f.photo_id
                         WHERE f.is_primary = 1 AND p.event_tag = ?1",
                    )?;
                    stmt.query_map([tag.as_str()], candidate_from_row)?
                } else {
                    stmt = conn.prepare(
                        "SELECT p.id, p.path, p.width, p.height, p.event_tag, f.embedding
                         FROM faces f JOIN photos p ON p.id = f.photo_id
                         WHERE f.is_primary = 1",
                    )?;
                    stmt.query_map([], candidate_from_row)?
                };
                let candidates = rows.collect::<rusqlite::Result<Vec<_>>>()?;

                let mut hits: Vec<SearchHit> = candidates
                    .into_iter()
                    .map(|c| {
                        let similarity = query.cosine(&embedding_from_blob(&c.embedding));
                        SearchHit {
                            photo_id: c.photo_id,
                            path: c.path,
                            similarity,
                            event_tag: c.event_tag,
                            width: c.width,
                            height: c.height,
                        }
                    })
                    .filter(|hit| hit.similarity >= threshold)
                    .collect();

                hits.sort_by(|a, b| {
                    b.similarity
                        .partial_cmp(&a.similarity)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.photo_id.cmp(&b.photo_id))
                });
                hits.truncate(top_k);
                Ok(hits)
            })
            .await?)
    }
}

struct Candidate {
    photo_id: String,
    path: String,
    width: u32,
    height: u32,
    event_tag: Option<String>,
    embedding: Vec<u8>,
}

fn candidate_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        photo_id: row.get("id")?,
        path: row.get("path")?,
        width: row.get("width")?,
        height: row.get("height")?,
        event_tag: row.get("event_tag")?,
        embedding: row.get("embedding")?,
    })
}

fn photo_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    let created_raw: String = row.get("created_at")?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);
    Ok(Photo {
        id: row.get("id")?,
        path: row.get("path")?,
        fingerprint: row.get("fingerprint")?,
        width: row.get("width")?,
        height: row.get("height")?,
        event_tag: row.get("event_tag")?,
        created_at,
    })
}

fn face_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Face> {
    let blob: Vec<u8> = row.get("embedding")?;
    Ok(Face {
        id: row.get("id")?,
        photo_id: row.get("photo_id")?,
        bbox: mien_core::BoundingBox {
            x1: row.get("x1")?,
            y1: row.get("y1")?,
            x2: row.get("x2")?,
            y2: row.get("y2")?,
        },
        embedding: embedding_from_blob(&blob),
        is_primary: row.get("is_primary")?,
    })
}

fn insert_face(conn: &rusqlite::Connection, face: &Face) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO faces (id, photo_id, x1, y1, x2, y2, embedding, is_primary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            face.id,
            face.photo_id,
            face.bbox.x1,
            face.bbox.y1,
            face.bbox.x2,
            face.bbox.y2,
            embedding_to_blob(&face.embedding),
            face.is_primary,
        ],
    )
}

/// Embeddings are stored as little-endian f32 blobs.
fn embedding_to_blob(embedding: &Embedding) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.values.len() * 4);
    for v in &embedding.values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn embedding_from_blob(blob: &[u8]) -> Embedding {
    Embedding {
        values: blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

/// Unique-index violations (the fingerprint column) are expected and mapped
/// to [`StoreError::DuplicateFingerprint`]; other constraint failures and
/// storage errors stay fatal.
fn is_unique_violation(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
