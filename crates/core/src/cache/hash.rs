//! Storage key derivation for partition entries.

use sha2::{Digest, Sha256};

/// Digest a request identity (method + canonical URL) into a storage key.
pub fn request_digest(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
