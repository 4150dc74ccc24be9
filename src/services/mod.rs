//! Settlement services
//!
//! The session and wallet managers share one [`ServiceContext`]: the store,
//! the ledger client, configuration and the per-wallet locks that serialize
//! every balance-affecting operation of a single wallet.

pub mod session_manager;
pub mod wallet_manager;

pub use session_manager::{SessionManager, SessionStart, SpinProof, SpinReceipt};
pub use wallet_manager::{RefundOutcome, WalletManager, WithdrawalAuthorization};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use crate::config::SpinvaultConfig;
use crate::crypto::generate_commit_pair;
use crate::domain::{Lamports, Session};
use crate::error::{SettlementError, SettlementResult, StoreError};
use crate::ledger::LedgerClient;
use crate::store::Repository;

/// Idle lock entries are pruned once the table grows past this size
const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// Per-wallet async mutexes
#[derive(Clone, Default)]
pub struct WalletLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `wallet`; released when the guard drops
    pub async fn acquire(&self, wallet: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if table.len() >= LOCK_TABLE_PRUNE_AT {
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table.entry(wallet.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for WalletLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletLocks").field("wallets", &self.len()).finish()
    }
}

/// Shared service context containing dependencies and configuration
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Repository>,
    pub ledger: Arc<dyn LedgerClient>,
    pub config: Arc<SpinvaultConfig>,
    pub locks: WalletLocks,
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    pub fn new(store: Arc<dyn Repository>, ledger: Arc<dyn LedgerClient>, config: SpinvaultConfig) -> Self {
        Self {
            store,
            ledger,
            config: Arc::new(config),
            locks: WalletLocks::new(),
        }
    }

    /// Playable balance of the wallet's active session, 0 without one
    pub async fn active_balance(&self, wallet: &str) -> SettlementResult<Lamports> {
        let session = self
            .store
            .get_active_session(wallet)
            .await
            .map_err(store_error("load active session"))?;
        Ok(session.map(|s| s.playable_balance).unwrap_or(0))
    }

    /// Empty session with a fresh commit pair, installed when funds arrive
    /// for a wallet without an active session
    pub(crate) fn fallback_session(&self, wallet: &str) -> SettlementResult<Session> {
        let (seed, seed_hash) = generate_commit_pair()?;
        Ok(Session::new(wallet, 0, seed, seed_hash))
    }
}

/// Wrap a store failure with the operation that hit it
pub(crate) fn store_error(context: &'static str) -> impl Fn(StoreError) -> SettlementError {
    move |err| SettlementError::storage(err, context)
}
