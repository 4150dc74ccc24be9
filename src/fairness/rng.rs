//! Deterministic reel stop derivation

use hmac::{Hmac, Mac};
use sha2::Sha256;
use crate::error::{SettlementError, SettlementResult};

type HmacSha256 = Hmac<Sha256>;

/// Derive three reel stops and the auditable commitment digest.
///
/// The digest is `HMAC-SHA256(key = hex_decode(server_seed), msg = "{client_seed}:{spin_nonce}")`.
/// Stop `i` is the big-endian u32 at bytes `4i..4i+4`, modulo `reel_length`.
pub fn derive_outcome(
    server_seed: &str,
    client_seed: &str,
    spin_nonce: u64,
    reel_length: usize,
) -> SettlementResult<([usize; 3], String)> {
    if reel_length == 0 {
        return Err(SettlementError::InvalidSeed("reel length must be positive".to_string()));
    }

    let key = hex::decode(server_seed)
        .map_err(|e| SettlementError::InvalidSeed(format!("invalid server seed hex: {}", e)))?;

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| SettlementError::InvalidSeed(format!("unusable server seed: {}", e)))?;
    mac.update(format!("{}:{}", client_seed, spin_nonce).as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut stops = [0usize; 3];
    for (i, stop) in stops.iter_mut().enumerate() {
        let word = u32::from_be_bytes([digest[i * 4], digest[i * 4 + 1], digest[i * 4 + 2], digest[i * 4 + 3]]);
        *stop = word as usize % reel_length;
    }

    Ok((stops, hex::encode(digest)))
}
