//! Server seed generation for the commit-reveal scheme

use rand::rngs::OsRng;
use rand::RngCore;
use crate::error::{CryptoError, SettlementResult};
use crate::fairness::seed_hash;

/// Length of a server seed in bytes before hex encoding
pub const SEED_BYTES: usize = 32;

/// Generate a cryptographically secure 32-byte seed as lowercase hex
pub fn generate_seed() -> SettlementResult<String> {
    let mut bytes = [0u8; SEED_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| CryptoError::Entropy {
        message: e.to_string(),
    })?;
    Ok(hex::encode(bytes))
}

/// Fresh `(seed, sha256(seed))` pair ready to be committed
pub fn generate_commit_pair() -> SettlementResult<(String, String)> {
    let seed = generate_seed()?;
    let hash = seed_hash(&seed);
    Ok((seed, hash))
}
