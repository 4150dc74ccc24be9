//! Spinvault - settlement core for a provably-fair slot game
//!
//! Spinvault keeps an off-chain lamport ledger for players and ties it to an
//! on-chain vault program through:
//! - Commit-reveal server seeds with HMAC-derived reel stops
//! - Merkle batches of spin leaves anchored on the ledger by a background worker
//! - Recoverable secp256k1 withdrawal authorizations with nonce-based refunds
//! - Exactly-once crediting of on-chain deposits

pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod fairness;
pub mod ledger;
pub mod merkle;
pub mod services;
pub mod settlement;
pub mod store;
pub mod worker;

// Re-export commonly used types for convenience
pub use error::{SettlementError, SettlementResult};

pub use config::{GameConfig, LedgerConfig, SpinvaultConfig, WalletConfig, WorkerConfig};

pub use domain::{Batch, BatchStatus, DepositRecord, Lamports, Pubkey, Session, Spin, SpinOutcome, User};

pub use ledger::{LedgerClient, TransactionBalances};

pub use store::{MemoryStore, Repository};

pub use services::{RefundOutcome, SessionStart, SpinProof, SpinReceipt, WithdrawalAuthorization};

pub use settlement::SettlementCore;

pub use worker::{AnchorOutcome, BatchAnchorWorker, TickReport, WorkerStats};
