//! Provably-fair slot engine
//!
//! Outcomes are a pure function of `(server_seed, client_seed, spin_nonce)`.
//! The server seed is committed by publishing its SHA-256 before the spin and
//! revealed afterwards, so any third party can re-run [`calculate_spin`] and
//! [`leaf_hash`] to audit a settled spin.

pub mod reels;
pub mod rng;

pub use reels::{Symbol, MAIN_REEL_STRIP, PAYLINES};
pub use rng::derive_outcome;

use std::sync::OnceLock;
use regex::Regex;
use crate::domain::{Lamports, Spin, SpinOutcome};
use crate::error::{utils, SettlementError, SettlementResult};

const CLIENT_SEED_PATTERN: &str = r"^[A-Za-z0-9_.:\-]{1,64}$";

/// Result of evaluating one spin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinResult {
    pub matrix: [[Symbol; 3]; 3],
    pub winning_lines: Vec<usize>,
    pub payout: Lamports,
    /// Hex HMAC digest the stops were drawn from
    pub commitment: String,
}

impl SpinResult {
    /// Symbol codes, row-major
    pub fn matrix_codes(&self) -> [[u8; 3]; 3] {
        self.matrix.map(|row| row.map(Symbol::code))
    }

    pub fn to_outcome(&self) -> SpinOutcome {
        SpinOutcome {
            matrix: self.matrix_codes(),
            winning_lines: self.winning_lines.clone(),
            is_win: self.payout > 0,
        }
    }
}

/// Run the full slot logic for one spin
pub fn calculate_spin(
    server_seed: &str,
    client_seed: &str,
    spin_nonce: u64,
    bet: Lamports,
) -> SettlementResult<SpinResult> {
    let (stops, commitment) = derive_outcome(server_seed, client_seed, spin_nonce, MAIN_REEL_STRIP.len())?;
    let matrix = reels::window(&stops);
    let (winning_lines, multiplier) = reels::evaluate_lines(&matrix);

    let payout = bet.checked_mul(multiplier).ok_or_else(|| SettlementError::InvalidBet {
        message: format!("payout for bet {} overflows", bet),
    })?;

    Ok(SpinResult {
        matrix,
        winning_lines,
        payout,
        commitment,
    })
}

/// Canonical commitment of every fact about a settled spin; this is the
/// Merkle leaf that gets anchored
#[allow(clippy::too_many_arguments)]
pub fn leaf_hash(
    wallet_address: &str,
    spin_nonce: u64,
    server_seed: &str,
    client_seed: &str,
    bet: Lamports,
    matrix: &[[u8; 3]; 3],
    payout: Lamports,
) -> SettlementResult<String> {
    let matrix_json = serde_json::to_string(matrix)?;
    let canonical = format!(
        "{}:{}:{}:{}:{}:{}:{}",
        wallet_address, spin_nonce, server_seed, client_seed, bet, matrix_json, payout
    );
    Ok(utils::sha256_hex(canonical.as_bytes()))
}

/// Public commitment for a server seed
pub fn seed_hash(server_seed: &str) -> String {
    utils::sha256_hex(server_seed.as_bytes())
}

/// Reject client seeds that cannot be canonically embedded in a leaf
pub fn validate_client_seed(client_seed: &str) -> SettlementResult<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(CLIENT_SEED_PATTERN).expect("static pattern compiles"));

    if pattern.is_match(client_seed) {
        Ok(())
    } else {
        Err(SettlementError::InvalidSeed(format!(
            "client seed must be 1-64 characters of [A-Za-z0-9_.:-], got {:?}",
            client_seed
        )))
    }
}

/// Re-derive a stored spin from its revealed seed and confirm every recorded fact
pub fn verify_spin(spin: &Spin) -> SettlementResult<bool> {
    if seed_hash(&spin.server_seed) != spin.server_seed_hash {
        return Ok(false);
    }

    let result = calculate_spin(&spin.server_seed, &spin.client_seed, spin.spin_nonce, spin.bet_amount)?;
    if result.to_outcome() != spin.outcome || result.payout != spin.payout_amount {
        return Ok(false);
    }

    let expected_leaf = leaf_hash(
        &spin.wallet_address,
        spin.spin_nonce,
        &spin.server_seed,
        &spin.client_seed,
        spin.bet_amount,
        &spin.outcome.matrix,
        spin.payout_amount,
    )?;
    Ok(expected_leaf == spin.leaf_hash)
}
