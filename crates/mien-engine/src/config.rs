use std::path::PathBuf;

use crate::ingest::DEFAULT_FACES_PER_PHOTO;

/// Pipeline configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root directory holding the ingested image files.
    pub images_root: PathBuf,
    /// Base URL of the detection sidecar.
    pub detector_endpoint: String,
    /// Per-request timeout for sidecar calls, in seconds.
    pub detector_timeout_secs: u64,
    /// Faces retained per photo at ingest time.
    pub faces_per_photo: usize,
    /// Result count used when the caller does not ask for one.
    pub default_top_k: usize,
    /// Similarity threshold used when the caller does not supply one.
    pub default_threshold: f32,
}

impl Config {
    /// Load configuration from `MIEN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("mien");

        let db_path = std::env::var("MIEN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("catalog.db"));

        let images_root = std::env::var("MIEN_IMAGES_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("images"));

        Self {
            db_path,
            images_root,
            detector_endpoint: std::env::var("MIEN_DETECTOR_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:8500".to_string()),
            detector_timeout_secs: env_u64("MIEN_DETECTOR_TIMEOUT_SECS", 30),
            faces_per_photo: env_usize("MIEN_FACES_PER_PHOTO", DEFAULT_FACES_PER_PHOTO),
            default_top_k: env_usize("MIEN_DEFAULT_TOP_K", 30),
            default_threshold: env_f32("MIEN_DEFAULT_THRESHOLD", 0.6),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
