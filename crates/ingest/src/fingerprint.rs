//! Chunk fingerprints.
//!
//! A fingerprint is the hex SHA-256 of the owning `doc_id`, the chunk's
//! position, and its text. Identical text at another position (or in another
//! document) is a different chunk.

use sha2::{Digest, Sha256};

pub fn fingerprint(doc_id: &str, position: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update([0u8]);
    hasher.update((position as u64).to_le_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
