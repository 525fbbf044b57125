use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of an in-memory buffer.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
