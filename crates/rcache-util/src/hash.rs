//! SHA-256 helpers for fingerprints and sidecar digests.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex(hasher)
}

/// Combine several strings into one digest.
///
/// Each part is length-prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn sha256_multi(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex(hasher)
}

/// Finish `hasher` as a lowercase hex string.
pub fn hex(hasher: Sha256) -> String {
    format!("{:x}", hasher.finalize())
}
