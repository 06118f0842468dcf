// Hashing module using SHA-256
//
// Content digests drive dedup and the on-disk layout. Assets that get
// transformed before storage carry two digests: the bytes as received and
// the bytes actually persisted.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::constants::HASH_CHUNK_SIZE;
use crate::error::{Result, VaultError};

/// Compute the SHA-256 digest of an in-memory byte buffer as lowercase hex.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 digest of a file as lowercase hex, reading in chunks.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| VaultError::Other(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| VaultError::Other(format!("Failed to read {}: {}", path.display(), e)))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
