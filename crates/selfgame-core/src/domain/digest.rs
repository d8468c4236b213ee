//! SHA-256 helpers for audit artifacts and seeded simulation.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Deterministic value in `0.0..=1.0` derived from `seed` and `parts`.
///
/// Used wherever a simulated fallback needs a reproducible "random" number:
/// the same seed and inputs always produce the same value.
pub fn seeded_unit(seed: u64, parts: &[&[u8]]) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word) as f64 / u64::MAX as f64
}
