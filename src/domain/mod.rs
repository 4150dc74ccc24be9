//! Domain model shared by the session, wallet and anchoring components
//!
//! All amounts are integer lamports (1 SOL = 10^9 lamports) so that
//! balance arithmetic is exact and maps directly onto the on-chain units.

pub mod pubkey;

pub use pubkey::Pubkey;

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::SettlementError;

/// Smallest on-chain currency unit
pub type Lamports = u64;

pub const LAMPORTS_PER_SOL: Lamports = 1_000_000_000;

/// Player account keyed by wallet address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub wallet_address: String,
    /// Nonce the next withdrawal authorization will be signed with
    pub next_withdrawal_nonce: u64,
    pub pending_withdrawal: Option<PendingWithdrawal>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(wallet_address: &str) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            next_withdrawal_nonce: 1,
            pending_withdrawal: None,
            created_at: Utc::now(),
        }
    }
}

/// An authorized withdrawal that has not yet been confirmed or refunded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub amount: Lamports,
    /// Hex encoded 64-byte signature
    pub signature: String,
    pub recovery_id: u8,
    pub nonce: u64,
}

/// A player session holding the playable balance and the committed seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub wallet_address: String,
    pub playable_balance: Lamports,
    /// Committed but unrevealed seed; never leaves the service
    #[serde(skip_serializing, default)]
    pub next_server_seed: String,
    pub next_server_seed_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Build a new active session with a fresh commit pair
    pub fn new(wallet_address: &str, playable_balance: Lamports, seed: String, seed_hash: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            wallet_address: wallet_address.to_string(),
            playable_balance,
            next_server_seed: seed,
            next_server_seed_hash: seed_hash,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Facts about a spin's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinOutcome {
    /// 3x3 symbol codes, row-major
    pub matrix: [[u8; 3]; 3],
    pub winning_lines: Vec<usize>,
    pub is_win: bool,
}

/// One settled spin. Immutable apart from its one-time batch assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spin {
    pub spin_id: Uuid,
    pub session_id: Uuid,
    pub wallet_address: String,
    pub spin_nonce: u64,
    pub server_seed: String,
    pub client_seed: String,
    pub server_seed_hash: String,
    pub bet_amount: Lamports,
    pub payout_amount: Lamports,
    pub outcome: SpinOutcome,
    pub leaf_hash: String,
    pub batch_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Anchoring lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Open,
    Committed,
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Open => "OPEN",
            BatchStatus::Committed => "COMMITTED",
            BatchStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl FromStr for BatchStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(BatchStatus::Open),
            "COMMITTED" => Ok(BatchStatus::Committed),
            "FAILED" => Ok(BatchStatus::Failed),
            other => Err(SettlementError::Serialization {
                message: format!("unknown batch status: {}", other),
            }),
        }
    }
}

/// A group of spins committed to the ledger under one Merkle root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: u64,
    pub status: BatchStatus,
    pub merkle_root: Option<String>,
    pub ledger_tx_signature: Option<String>,
    pub submit_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(batch_id: u64) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Open,
            merkle_root: None,
            ledger_tx_signature: None,
            submit_attempts: 0,
            last_attempt_at: None,
            created_at: Utc::now(),
            committed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == BatchStatus::Open
    }
}

/// Write-once record of a credited on-chain deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub tx_signature: String,
    pub wallet_address: String,
    pub amount: Lamports,
    pub recorded_at: DateTime<Utc>,
}

/// Parse and validate a wallet address, returning its ledger key
pub fn parse_wallet(wallet_address: &str) -> Result<Pubkey, SettlementError> {
    wallet_address
        .parse::<Pubkey>()
        .map_err(|e| SettlementError::InvalidWalletAddress(format!("{}: {}", wallet_address, e)))
}
