//! Image decoding and folder scanning.

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions eligible for batch ingest, matched case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Decode an image file to an RGB pixel grid.
pub fn decode_file(path: &Path) -> Result<RgbImage, MediaError> {
    let bytes = std::fs::read(path).map_err(|source| MediaError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(&bytes)
}

/// Decode raw image bytes to an RGB pixel grid.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbImage, MediaError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Enumerate supported image files under `root` in sorted order.
///
/// With `recursive` false only the top level is scanned. Unreadable entries
/// are skipped; a missing root is an error.
pub fn scan_folder(root: &Path, recursive: bool) -> Result<Vec<PathBuf>, MediaError> {
    if !root.is_dir() {
        return Err(MediaError::NotADirectory(root.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_image(path))
        .collect();

    files.sort();
    Ok(files)
}

/// Storage path for `file`: relative to `root` with forward slashes, or the
/// absolute path when the file lives outside the root.
pub fn storage_relative_path(file: &Path, root: &Path) -> String {
    let file = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let stored = file.strip_prefix(&root).unwrap_or(&file);
    stored.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::fs;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 40])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_decode_roundtrip_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        write_png(&path, 32, 20);

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.dimensions(), (32, 20));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_bytes(b"definitely not an image"),
            Err(MediaError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_missing_file_is_read_error() {
        let err = decode_file(Path::new("/nonexistent/img.png")).unwrap_err();
        assert!(matches!(err, MediaError::Read { .. }));
    }

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported_image(Path::new("a.jpg")));
        assert!(is_supported_image(Path::new("a.JPG")));
        assert!(is_supported_image(Path::new("a.Jpeg")));
        assert!(is_supported_image(Path::new("a.webp")));
        assert!(!is_supported_image(Path::new("a.txt")));
        assert!(!is_supported_image(Path::new("noextension")));
    }

    #[test]
    fn test_scan_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 4, 4);
        write_png(&dir.path().join("a.png"), 4, 4);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let files = scan_folder(dir.path(), true).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_scan_recursion_flag() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        write_png(&dir.path().join("top.png"), 4, 4);
        write_png(&nested.join("deep.png"), 4, 4);

        assert_eq!(scan_folder(dir.path(), true).unwrap().len(), 2);
        assert_eq!(scan_folder(dir.path(), false).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_missing_root() {
        let err = scan_folder(Path::new("/nonexistent/folder"), true).unwrap_err();
        assert!(matches!(err, MediaError::NotADirectory(_)));
    }

    #[test]
    fn test_storage_path_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("events");
        fs::create_dir(&sub).unwrap();
        let file = sub.join("photo.png");
        write_png(&file, 4, 4);

        assert_eq!(storage_relative_path(&file, dir.path()), "events/photo.png");
    }

    #[test]
    fn test_storage_path_outside_root_stays_absolute() {
        let root = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let file = elsewhere.path().join("photo.png");
        write_png(&file, 4, 4);

        let stored = storage_relative_path(&file, root.path());
        assert!(stored.ends_with("photo.png"));
        assert!(Path::new(&stored).is_absolute());
    }
}
