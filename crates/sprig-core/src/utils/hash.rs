//! Hashing utilities for package integrity.
//!
//! Package content is identified by its base64-encoded SHA-512 digest, the
//! value stored in hash markers and pinned in lock manifests. Blake3 is used
//! where a short, fast, filesystem-safe digest is enough.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha512};

use crate::error::{SprigError, SprigResult};

/// Base64 SHA-512 digest of data
pub fn sha512_base64(data: &[u8]) -> String {
    let digest = Sha512::digest(data);
    general_purpose::STANDARD.encode(digest)
}

/// Compute Blake3 hash of data as hex
pub fn blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Verify data integrity against an expected SHA-512 digest
pub fn verify_integrity(package: &str, data: &[u8], expected_hash: &str) -> SprigResult<()> {
    let actual_hash = sha512_base64(data);
    if actual_hash == expected_hash {
        Ok(())
    } else {
        Err(SprigError::IntegrityFailure {
            package: package.to_string(),
            expected: expected_hash.to_string(),
            actual: actual_hash,
        })
    }
}
