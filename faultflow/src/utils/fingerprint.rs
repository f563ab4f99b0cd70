//! Stable fingerprints for cache keys.

use sha2::{Digest, Sha256};

/// Hashes an ordered list of key parts into a stable cache fingerprint.
///
/// Parts are length-prefixed before hashing so `["ab", "c"]` and
/// `["a", "bc"]` produce distinct keys.
#[must_use]
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Hashes a JSON value into a stable cache fingerprint.
#[must_use]
pub fn fingerprint_json(value: &serde_json::Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
