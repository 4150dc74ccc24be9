//! Ledger store contract
//!
//! Every method is a single atomic unit: multi-row mutations (withdrawal
//! debit, deposit credit, refund, spin settlement, batch claim) either apply
//! completely or not at all. Balance-reducing writes are conditional on
//! sufficient funds and report [`StoreError::ConditionFailed`] otherwise.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::{Batch, DepositRecord, Lamports, PendingWithdrawal, Session, Spin, User};
use crate::error::StoreError;

/// Everything needed to settle one spin against its session
#[derive(Debug, Clone)]
pub struct SpinSettlement {
    pub spin: Spin,
    /// Seed hash the session must still hold; guards against a concurrent rotation
    pub expected_seed_hash: String,
    pub next_server_seed: String,
    pub next_server_seed_hash: String,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // Users

    /// Insert the user if missing and return the stored row
    async fn ensure_user(&self, wallet: &str) -> Result<User, StoreError>;

    async fn get_user(&self, wallet: &str) -> Result<Option<User>, StoreError>;

    /// Debit the active session by `pending.amount` (only if the balance
    /// covers it), record the pending withdrawal and advance the nonce
    async fn set_pending_withdrawal(&self, wallet: &str, pending: PendingWithdrawal) -> Result<(), StoreError>;

    /// Clear the pending withdrawal without moving funds
    async fn complete_withdrawal(&self, wallet: &str) -> Result<(), StoreError>;

    /// Credit `amount` back to the active session (or to `fallback_session`,
    /// inserted as the new active session if none is active), clear the
    /// pending withdrawal and reset the nonce
    async fn refund_withdrawal(
        &self,
        wallet: &str,
        amount: Lamports,
        next_nonce: u64,
        fallback_session: Session,
    ) -> Result<(), StoreError>;

    // Deposits

    async fn deposit_processed(&self, tx_signature: &str) -> Result<bool, StoreError>;

    /// Record the deposit and credit the wallet's active session, creating
    /// `fallback_session` when none is active. Fails with
    /// [`StoreError::Duplicate`] if the signature was already recorded.
    async fn record_deposit(&self, deposit: DepositRecord, fallback_session: Session) -> Result<(), StoreError>;

    // Sessions

    /// Deactivate every session of the wallet and insert `session` as active
    async fn create_session(&self, session: Session) -> Result<(), StoreError>;

    async fn get_active_session(&self, wallet: &str) -> Result<Option<Session>, StoreError>;

    /// Most recently created session, active or not
    async fn get_latest_session(&self, wallet: &str) -> Result<Option<Session>, StoreError>;

    /// Insert the spin and apply its balance change and seed rotation
    async fn settle_spin(&self, settlement: SpinSettlement) -> Result<Session, StoreError>;

    // Spins

    async fn count_spins(&self, session_id: Uuid) -> Result<u64, StoreError>;

    async fn get_spin(&self, spin_id: Uuid) -> Result<Option<Spin>, StoreError>;

    /// Newest first
    async fn spins_by_wallet(&self, wallet: &str, limit: usize, offset: usize) -> Result<Vec<Spin>, StoreError>;

    /// Members of a batch in the order they were claimed
    async fn batch_spins(&self, batch_id: u64) -> Result<Vec<Spin>, StoreError>;

    // Batches

    /// Atomically open a batch and assign up to `limit` of the oldest
    /// unbatched spins to it. `None` when there is nothing to claim.
    async fn claim_unbatched_spins(&self, limit: usize) -> Result<Option<(Batch, Vec<Spin>)>, StoreError>;

    async fn get_batch(&self, batch_id: u64) -> Result<Option<Batch>, StoreError>;

    /// OPEN batches whose last submission attempt is older than `before`
    /// and that have been attempted fewer than `max_attempts` times, oldest first
    async fn stale_open_batches(&self, before: DateTime<Utc>, max_attempts: u32) -> Result<Vec<Batch>, StoreError>;

    /// Count a failed submission; the batch becomes FAILED once it reaches `max_attempts`
    async fn record_submit_failure(&self, batch_id: u64, max_attempts: u32) -> Result<Batch, StoreError>;

    /// Mark a batch COMMITTED with its root and ledger signature. Only OPEN
    /// batches can be closed. The signature is `None` when the commitment was
    /// found already on the ledger rather than observed landing.
    async fn close_batch(&self, batch_id: u64, merkle_root: &str, tx_signature: Option<&str>) -> Result<Batch, StoreError>;
}
