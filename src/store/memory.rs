//! In-process ledger store
//!
//! Holds all tables behind one `RwLock`; each repository call takes the
//! lock once, which gives the same all-or-nothing behavior a relational
//! transaction would.

use std::collections::{BTreeMap, HashMap, VecDeque};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;
use crate::domain::{Batch, BatchStatus, DepositRecord, Lamports, PendingWithdrawal, Session, Spin, User};
use crate::error::StoreError;
use super::{Repository, SpinSettlement};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    /// Insertion order doubles as creation order
    sessions: Vec<Session>,
    spins: Vec<Spin>,
    spin_index: HashMap<Uuid, usize>,
    spin_counts: HashMap<Uuid, u64>,
    /// Indices into `spins` not yet assigned to a batch, oldest first
    unbatched: VecDeque<usize>,
    batches: BTreeMap<u64, Batch>,
    batch_members: HashMap<u64, Vec<usize>>,
    deposits: HashMap<String, DepositRecord>,
    next_batch_id: u64,
}

impl Tables {
    fn active_session_mut(&mut self, wallet: &str) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.wallet_address == wallet && s.is_active)
    }

    fn deactivate_sessions(&mut self, wallet: &str) {
        for session in self.sessions.iter_mut().filter(|s| s.wallet_address == wallet) {
            session.is_active = false;
        }
    }

    fn ensure_user(&mut self, wallet: &str) -> &mut User {
        self.users
            .entry(wallet.to_string())
            .or_insert_with(|| User::new(wallet))
    }

    fn user_mut(&mut self, wallet: &str) -> Result<&mut User, StoreError> {
        self.users.get_mut(wallet).ok_or_else(|| StoreError::NotFound {
            entity: "user",
            key: wallet.to_string(),
        })
    }

    /// Add to the active session, or install `fallback` holding `amount`
    fn credit_or_open(&mut self, wallet: &str, amount: Lamports, mut fallback: Session) -> Result<(), StoreError> {
        if let Some(session) = self.active_session_mut(wallet) {
            session.playable_balance = session
                .playable_balance
                .checked_add(amount)
                .ok_or_else(|| StoreError::ConditionFailed {
                    message: "balance overflow".to_string(),
                })?;
            return Ok(());
        }

        self.deactivate_sessions(wallet);
        fallback.playable_balance = amount;
        fallback.is_active = true;
        self.sessions.push(fallback);
        Ok(())
    }
}

/// [`Repository`] backed by process memory
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_batch_id: 1,
                ..Default::default()
            }),
        }
    }

    /// All sessions of a wallet, oldest first
    pub async fn sessions_for(&self, wallet: &str) -> Vec<Session> {
        let tables = self.tables.read().await;
        tables
            .sessions
            .iter()
            .filter(|s| s.wallet_address == wallet)
            .cloned()
            .collect()
    }

    /// Number of spins not yet assigned to any batch
    pub async fn unbatched_count(&self) -> usize {
        self.tables.read().await.unbatched.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn ensure_user(&self, wallet: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.ensure_user(wallet).clone())
    }

    async fn get_user(&self, wallet: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(wallet).cloned())
    }

    async fn set_pending_withdrawal(&self, wallet: &str, pending: PendingWithdrawal) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        // check everything before mutating anything
        if !tables.users.contains_key(wallet) {
            return Err(StoreError::NotFound {
                entity: "user",
                key: wallet.to_string(),
            });
        }
        let session = tables
            .active_session_mut(wallet)
            .filter(|s| s.playable_balance >= pending.amount)
            .ok_or_else(|| StoreError::ConditionFailed {
                message: "insufficient funds or no active session".to_string(),
            })?;
        session.playable_balance -= pending.amount;

        let user = tables.user_mut(wallet)?;
        user.next_withdrawal_nonce += 1;
        user.pending_withdrawal = Some(pending);
        Ok(())
    }

    async fn complete_withdrawal(&self, wallet: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.user_mut(wallet)?.pending_withdrawal = None;
        Ok(())
    }

    async fn refund_withdrawal(
        &self,
        wallet: &str,
        amount: Lamports,
        next_nonce: u64,
        fallback_session: Session,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let user = tables.user_mut(wallet)?;
        if user.pending_withdrawal.as_ref().map(|p| p.amount) != Some(amount) {
            return Err(StoreError::ConditionFailed {
                message: "pending withdrawal changed before refund".to_string(),
            });
        }

        tables.credit_or_open(wallet, amount, fallback_session)?;

        let user = tables.user_mut(wallet)?;
        user.pending_withdrawal = None;
        user.next_withdrawal_nonce = next_nonce;
        Ok(())
    }

    async fn deposit_processed(&self, tx_signature: &str) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.deposits.contains_key(tx_signature))
    }

    async fn record_deposit(&self, deposit: DepositRecord, fallback_session: Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if tables.deposits.contains_key(&deposit.tx_signature) {
            return Err(StoreError::Duplicate {
                entity: "deposit",
                key: deposit.tx_signature,
            });
        }

        tables.ensure_user(&deposit.wallet_address);
        tables.credit_or_open(&deposit.wallet_address, deposit.amount, fallback_session)?;
        tables.deposits.insert(deposit.tx_signature.clone(), deposit);
        Ok(())
    }

    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.deactivate_sessions(&session.wallet_address);
        debug!(session_id = %session.session_id, wallet = %session.wallet_address, "Inserted session");
        tables.sessions.push(Session { is_active: true, ..session });
        Ok(())
    }

    async fn get_active_session(&self, wallet: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.wallet_address == wallet && s.is_active)
            .cloned())
    }

    async fn get_latest_session(&self, wallet: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .iter()
            .rev()
            .find(|s| s.wallet_address == wallet)
            .cloned())
    }

    async fn settle_spin(&self, settlement: SpinSettlement) -> Result<Session, StoreError> {
        let mut tables = self.tables.write().await;
        let SpinSettlement {
            spin,
            expected_seed_hash,
            next_server_seed,
            next_server_seed_hash,
        } = settlement;

        if tables.spin_index.contains_key(&spin.spin_id) {
            return Err(StoreError::Duplicate {
                entity: "spin",
                key: spin.spin_id.to_string(),
            });
        }

        let prior = tables.spin_counts.get(&spin.session_id).copied().unwrap_or(0);
        if spin.spin_nonce != prior + 1 {
            return Err(StoreError::ConditionFailed {
                message: format!("spin nonce {} does not follow {}", spin.spin_nonce, prior),
            });
        }

        let session = tables
            .sessions
            .iter_mut()
            .find(|s| s.session_id == spin.session_id && s.is_active)
            .ok_or_else(|| StoreError::ConditionFailed {
                message: "session is no longer active".to_string(),
            })?;

        if session.next_server_seed_hash != expected_seed_hash {
            return Err(StoreError::ConditionFailed {
                message: "session seed rotated concurrently".to_string(),
            });
        }

        let new_balance = session
            .playable_balance
            .checked_sub(spin.bet_amount)
            .and_then(|b| b.checked_add(spin.payout_amount))
            .ok_or_else(|| StoreError::ConditionFailed {
                message: "insufficient funds".to_string(),
            })?;

        session.playable_balance = new_balance;
        session.next_server_seed = next_server_seed;
        session.next_server_seed_hash = next_server_seed_hash;
        let updated = session.clone();

        let index = tables.spins.len();
        tables.spin_index.insert(spin.spin_id, index);
        tables.spin_counts.insert(spin.session_id, prior + 1);
        tables.unbatched.push_back(index);
        tables.spins.push(spin);

        Ok(updated)
    }

    async fn count_spins(&self, session_id: Uuid) -> Result<u64, StoreError> {
        Ok(self.tables.read().await.spin_counts.get(&session_id).copied().unwrap_or(0))
    }

    async fn get_spin(&self, spin_id: Uuid) -> Result<Option<Spin>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.spin_index.get(&spin_id).map(|&i| tables.spins[i].clone()))
    }

    async fn spins_by_wallet(&self, wallet: &str, limit: usize, offset: usize) -> Result<Vec<Spin>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .spins
            .iter()
            .rev()
            .filter(|s| s.wallet_address == wallet)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn batch_spins(&self, batch_id: u64) -> Result<Vec<Spin>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .batch_members
            .get(&batch_id)
            .map(|members| members.iter().map(|&i| tables.spins[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn claim_unbatched_spins(&self, limit: usize) -> Result<Option<(Batch, Vec<Spin>)>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.unbatched.is_empty() || limit == 0 {
            return Ok(None);
        }

        let batch_id = tables.next_batch_id;
        tables.next_batch_id += 1;

        let take = limit.min(tables.unbatched.len());
        let members: Vec<usize> = tables.unbatched.drain(..take).collect();

        let mut claimed = Vec::with_capacity(members.len());
        for &i in &members {
            let spin = &mut tables.spins[i];
            spin.batch_id = Some(batch_id);
            claimed.push(spin.clone());
        }

        let mut batch = Batch::new(batch_id);
        batch.last_attempt_at = Some(batch.created_at);
        tables.batches.insert(batch_id, batch.clone());
        tables.batch_members.insert(batch_id, members);

        Ok(Some((batch, claimed)))
    }

    async fn get_batch(&self, batch_id: u64) -> Result<Option<Batch>, StoreError> {
        Ok(self.tables.read().await.batches.get(&batch_id).cloned())
    }

    async fn stale_open_batches(&self, before: DateTime<Utc>, max_attempts: u32) -> Result<Vec<Batch>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .batches
            .values()
            .filter(|b| b.is_open() && b.submit_attempts < max_attempts)
            .filter(|b| b.last_attempt_at.unwrap_or(b.created_at) < before)
            .cloned()
            .collect())
    }

    async fn record_submit_failure(&self, batch_id: u64, max_attempts: u32) -> Result<Batch, StoreError> {
        let mut tables = self.tables.write().await;
        let batch = tables.batches.get_mut(&batch_id).ok_or_else(|| StoreError::NotFound {
            entity: "batch",
            key: batch_id.to_string(),
        })?;

        if !batch.is_open() {
            return Err(StoreError::ConditionFailed {
                message: format!("batch {} is {}", batch_id, batch.status),
            });
        }

        batch.submit_attempts += 1;
        batch.last_attempt_at = Some(Utc::now());
        if batch.submit_attempts >= max_attempts {
            batch.status = BatchStatus::Failed;
        }
        Ok(batch.clone())
    }

    async fn close_batch(&self, batch_id: u64, merkle_root: &str, tx_signature: Option<&str>) -> Result<Batch, StoreError> {
        let mut tables = self.tables.write().await;
        let batch = tables.batches.get_mut(&batch_id).ok_or_else(|| StoreError::NotFound {
            entity: "batch",
            key: batch_id.to_string(),
        })?;

        if !batch.is_open() {
            return Err(StoreError::ConditionFailed {
                message: format!("batch {} is {}", batch_id, batch.status),
            });
        }

        batch.status = BatchStatus::Committed;
        batch.merkle_root = Some(merkle_root.to_string());
        batch.ledger_tx_signature = tx_signature.map(str::to_string);
        batch.committed_at = Some(Utc::now());
        Ok(batch.clone())
    }
}
