// src/hash.rs

//! SHA-256 hashing for schema snapshots.
//!
//! Pure byte-in, hex-out: identical bytes always produce an identical,
//! lowercase, 64-character digest. No errors except the I/O that can occur
//! while streaming bytes in from a file or reader.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::Path;

/// Compute the lowercase hex SHA-256 digest of an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute the lowercase hex SHA-256 digest of a reader's contents, without
/// buffering the whole stream into memory.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the lowercase hex SHA-256 digest of a file's contents.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    hash_reader(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // SHA-256("abc"), a standard NIST test vector.
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn identical_bytes_identical_digest() {
        let a = hash_bytes(b"entity User { id: uuid primary }");
        let b = hash_bytes(b"entity User { id: uuid primary }");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_bytes_different_digest() {
        let a = hash_bytes(b"schema a");
        let b = hash_bytes(b"schema b");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.cham");
        std::fs::write(&path, b"entity Post { id: uuid primary }").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            hash_bytes(b"entity Post { id: uuid primary }")
        );
    }
}
