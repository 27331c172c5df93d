//! Content fingerprinting for duplicate detection.
//!
//! The digest is a dedup key, not a security primitive: equal bytes map to
//! equal digests, unequal bytes to different digests with overwhelming
//! probability.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// Stream `reader` through SHA-256 in fixed-size chunks and return the
/// lowercase hex digest. Memory use is independent of input length.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint a file's full content.
pub fn digest_file(path: &Path) -> io::Result<String> {
    digest_reader(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_equal_bytes_equal_digest() {
        let a = digest_reader(&b"hello world"[..]).unwrap();
        let b = digest_reader(&b"hello world"[..]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_byte_difference_changes_digest() {
        let a = digest_reader(&b"hello world"[..]).unwrap();
        let b = digest_reader(&b"hello worle"[..]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_is_hex_of_fixed_length() {
        let d = digest_reader(&b""[..]).unwrap();
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_input_longer_than_chunk_size() {
        let long = vec![0xabu8; CHUNK_SIZE * 3 + 17];
        let a = digest_reader(&long[..]).unwrap();
        let b = digest_reader(&long[..]).unwrap();
        assert_eq!(a, b);

        let mut tweaked = long.clone();
        tweaked[CHUNK_SIZE * 2] = 0xac;
        assert_ne!(a, digest_reader(&tweaked[..]).unwrap());
    }

    #[test]
    fn test_file_digest_matches_reader_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        let content = b"some file content";
        File::create(&path).unwrap().write_all(content).unwrap();

        assert_eq!(
            digest_file(&path).unwrap(),
            digest_reader(&content[..]).unwrap()
        );
    }

    #[test]
    fn test_missing_file_propagates_error() {
        assert!(digest_file(Path::new("/nonexistent/file.bin")).is_err());
    }
}
