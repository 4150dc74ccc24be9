//! Session lifecycle and spin execution

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use chrono::Utc;
use crate::crypto::generate_commit_pair;
use crate::domain::{parse_wallet, BatchStatus, Lamports, Session, Spin};
use crate::error::{SettlementError, SettlementResult, StoreError};
use crate::fairness::{self, calculate_spin, validate_client_seed};
use crate::merkle;
use crate::store::SpinSettlement;
use super::{store_error, ServiceContext};

/// Identifier and public seed commitment of a new session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStart {
    pub session_id: Uuid,
    pub server_seed_hash: String,
}

/// A settled spin with the commitment for the following one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpinReceipt {
    pub spin: Spin,
    pub next_server_seed_hash: String,
    pub balance: Lamports,
}

/// Inclusion proof of a spin in an anchored batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpinProof {
    pub spin: Spin,
    pub batch_id: u64,
    pub merkle_root: String,
    pub ledger_tx_signature: Option<String>,
    pub proof: Vec<String>,
    pub leaf_index: usize,
}

impl SpinProof {
    /// Check the proof against the anchored root
    pub fn verify(&self) -> bool {
        merkle::verify_proof(&self.spin.leaf_hash, self.leaf_index, &self.proof, &self.merkle_root)
    }
}

/// Service responsible for sessions and spins
#[derive(Debug, Clone)]
pub struct SessionManager {
    context: ServiceContext,
}

impl SessionManager {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Open a fresh session, carrying over the balance of the latest one
    pub async fn init_session(&self, wallet: &str) -> SettlementResult<SessionStart> {
        parse_wallet(wallet)?;
        let _guard = self.context.locks.acquire(wallet).await;
        let store = &self.context.store;

        store.ensure_user(wallet).await.map_err(store_error("ensure user"))?;

        let carried = store
            .get_latest_session(wallet)
            .await
            .map_err(store_error("load latest session"))?
            .map(|s| s.playable_balance)
            .unwrap_or(0);

        let (seed, seed_hash) = generate_commit_pair()?;
        let session = Session::new(wallet, carried, seed, seed_hash);
        let start = SessionStart {
            session_id: session.session_id,
            server_seed_hash: session.next_server_seed_hash.clone(),
        };

        store.create_session(session).await.map_err(store_error("create session"))?;

        info!(
            wallet = %wallet,
            session_id = %start.session_id,
            balance = carried,
            "Session started"
        );
        Ok(start)
    }

    /// Play one spin against the active session
    pub async fn execute_spin(&self, wallet: &str, bet: Lamports, client_seed: &str) -> SettlementResult<SpinReceipt> {
        parse_wallet(wallet)?;
        validate_client_seed(client_seed)?;
        self.check_bet(bet)?;

        let _guard = self.context.locks.acquire(wallet).await;
        let store = &self.context.store;

        let session = store
            .get_active_session(wallet)
            .await
            .map_err(store_error("load active session"))?
            .ok_or(SettlementError::SessionInactive)?;

        if session.playable_balance < bet {
            return Err(SettlementError::InsufficientFunds);
        }

        let spin_nonce = store
            .count_spins(session.session_id)
            .await
            .map_err(store_error("count spins"))?
            + 1;

        // reveal the committed seed
        let server_seed = session.next_server_seed.clone();
        let result = calculate_spin(&server_seed, client_seed, spin_nonce, bet)?;
        let outcome = result.to_outcome();
        let leaf_hash = fairness::leaf_hash(
            wallet,
            spin_nonce,
            &server_seed,
            client_seed,
            bet,
            &outcome.matrix,
            result.payout,
        )?;

        let (next_server_seed, next_server_seed_hash) = generate_commit_pair()?;

        let spin = Spin {
            spin_id: Uuid::new_v4(),
            session_id: session.session_id,
            wallet_address: wallet.to_string(),
            spin_nonce,
            server_seed,
            client_seed: client_seed.to_string(),
            server_seed_hash: session.next_server_seed_hash.clone(),
            bet_amount: bet,
            payout_amount: result.payout,
            outcome,
            leaf_hash,
            batch_id: None,
            created_at: Utc::now(),
        };

        let settlement = SpinSettlement {
            spin: spin.clone(),
            expected_seed_hash: session.next_server_seed_hash.clone(),
            next_server_seed,
            next_server_seed_hash: next_server_seed_hash.clone(),
        };

        let updated = store.settle_spin(settlement).await.map_err(|err| match err {
            StoreError::ConditionFailed { message } => {
                warn!(wallet = %wallet, session_id = %session.session_id, reason = %message, "Spin settlement lost a race");
                SettlementError::Conflict { message }
            }
            other => SettlementError::storage(other, "settle spin"),
        })?;

        info!(
            wallet = %wallet,
            spin_id = %spin.spin_id,
            spin_nonce,
            bet,
            payout = spin.payout_amount,
            balance = updated.playable_balance,
            "Spin settled"
        );

        Ok(SpinReceipt {
            spin,
            next_server_seed_hash,
            balance: updated.playable_balance,
        })
    }

    /// Most recent spins of the wallet, newest first
    pub async fn history(&self, wallet: &str) -> SettlementResult<Vec<Spin>> {
        self.history_page(wallet, self.context.config.game.history_limit, 0).await
    }

    pub async fn history_page(&self, wallet: &str, limit: usize, offset: usize) -> SettlementResult<Vec<Spin>> {
        parse_wallet(wallet)?;
        self.context
            .store
            .spins_by_wallet(wallet, limit, offset)
            .await
            .map_err(store_error("load spin history"))
    }

    pub async fn balance(&self, wallet: &str) -> SettlementResult<Lamports> {
        parse_wallet(wallet)?;
        self.context.active_balance(wallet).await
    }

    /// Merkle inclusion proof for a spin whose batch has been anchored
    pub async fn spin_proof(&self, spin_id: Uuid) -> SettlementResult<SpinProof> {
        let store = &self.context.store;

        let spin = store
            .get_spin(spin_id)
            .await
            .map_err(store_error("load spin"))?
            .ok_or_else(|| SettlementError::SpinNotFound(spin_id.to_string()))?;

        let not_anchored = || SettlementError::NotAnchoredYet {
            spin_id: spin_id.to_string(),
        };

        let batch_id = spin.batch_id.ok_or_else(not_anchored)?;
        let batch = store
            .get_batch(batch_id)
            .await
            .map_err(store_error("load batch"))?
            .ok_or_else(not_anchored)?;

        if batch.status != BatchStatus::Committed {
            debug!(spin_id = %spin_id, batch_id, status = %batch.status, "Batch not committed");
            return Err(not_anchored());
        }
        let merkle_root = batch.merkle_root.clone().ok_or_else(not_anchored)?;

        let leaves: Vec<String> = store
            .batch_spins(batch_id)
            .await
            .map_err(store_error("load batch members"))?
            .into_iter()
            .map(|s| s.leaf_hash)
            .collect();

        let leaf_index = leaves
            .iter()
            .position(|leaf| *leaf == spin.leaf_hash)
            .ok_or_else(|| SettlementError::NotFoundInBatch {
                spin_id: spin_id.to_string(),
                batch_id,
            })?;

        let proof = merkle::generate_proof(&leaves, leaf_index)?;

        Ok(SpinProof {
            spin,
            batch_id,
            merkle_root,
            ledger_tx_signature: batch.ledger_tx_signature,
            proof,
            leaf_index,
        })
    }

    fn check_bet(&self, bet: Lamports) -> SettlementResult<()> {
        let game = &self.context.config.game;
        if bet == 0 {
            return Err(SettlementError::InvalidBet {
                message: "bet must be greater than 0".to_string(),
            });
        }
        if bet < game.min_bet || bet > game.max_bet {
            return Err(SettlementError::InvalidBet {
                message: format!("bet {} outside [{}, {}]", bet, game.min_bet, game.max_bet),
            });
        }
        Ok(())
    }
}
