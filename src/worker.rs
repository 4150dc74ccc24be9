//! Batch anchoring worker
//!
//! On every tick the worker first retries at most one stale OPEN batch, then
//! claims the oldest unbatched spins into a new batch, computes their Merkle
//! root and submits `commit_batch_root` to the vault program. The commitment
//! account address is derived from the batch id, so before submitting the
//! worker looks that account up: a commitment that landed earlier without a
//! confirmation is recognised instead of being sent twice.

use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::config::WorkerConfig;
use crate::domain::{Batch, BatchStatus, Pubkey, Spin};
use crate::error::{CryptoError, ErrorContext, LedgerError, SettlementError, SettlementResult, StoreError};
use crate::ledger::{batch_commit_address, commit_batch_root_instruction, BatchCommitAccount, LedgerClient};
use crate::merkle;
use crate::services::{store_error, ServiceContext};
use crate::store::Repository;

/// What happened to one batch during a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnchorOutcome {
    Committed {
        batch_id: u64,
        spins: usize,
        /// `None` when the commitment was already on the ledger
        tx_signature: Option<String>,
    },
    SubmitFailed {
        batch_id: u64,
        attempts: u32,
        status: BatchStatus,
    },
}

/// Work done by one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub redriven: Option<AnchorOutcome>,
    pub claimed: Option<AnchorOutcome>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.redriven.is_none() && self.claimed.is_none()
    }
}

/// Running totals since the worker was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub ticks: u64,
    pub batches_committed: u64,
    pub spins_anchored: u64,
    pub submit_failures: u64,
    pub batches_failed: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

pub struct BatchAnchorWorker {
    store: Arc<dyn Repository>,
    ledger: Arc<dyn LedgerClient>,
    settings: WorkerConfig,
    program_id: Pubkey,
    vault: Pubkey,
    authority: Pubkey,
    stats: Mutex<WorkerStats>,
}

impl std::fmt::Debug for BatchAnchorWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAnchorWorker")
            .field("settings", &self.settings)
            .field("program_id", &self.program_id)
            .field("vault", &self.vault)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

impl BatchAnchorWorker {
    /// Build a worker from the shared context; requires `ledger.authority_address`
    pub fn new(context: &ServiceContext) -> SettlementResult<Self> {
        context.config.validate()?;
        let ledger_config = &context.config.ledger;
        let authority = ledger_config.authority_address.ok_or_else(|| SettlementError::Configuration {
            message: "Batch worker needs an operational authority".to_string(),
            field: "ledger.authority_address".to_string(),
        })?;

        Ok(Self {
            store: context.store.clone(),
            ledger: context.ledger.clone(),
            settings: context.config.worker.clone(),
            program_id: ledger_config.program_id,
            vault: ledger_config.vault()?,
            authority,
            stats: Mutex::new(WorkerStats::default()),
        })
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Tick until `shutdown` is cancelled. Tick failures are logged and the
    /// loop carries on.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.settings.interval_secs,
            batch_size = self.settings.batch_size,
            "Batch anchoring worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "Batch anchoring tick failed");
                    }
                }
            }
        }

        info!("Batch anchoring worker stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// One anchoring pass
    pub async fn tick(&self) -> SettlementResult<TickReport> {
        let mut report = TickReport::default();

        let cutoff = chrono::Duration::from_std(self.settings.retry_backoff())
            .ok()
            .and_then(|backoff| Utc::now().checked_sub_signed(backoff))
            .ok_or_else(|| SettlementError::Configuration {
                message: format!("Retry backoff of {}s is out of range", self.settings.retry_backoff_secs),
                field: "worker.retry_backoff_secs".to_string(),
            })?;
        let stale = self
            .store
            .stale_open_batches(cutoff, self.settings.max_submit_attempts)
            .await
            .map_err(store_error("list stale batches"))?;

        if let Some(batch) = stale.into_iter().next() {
            let spins = self
                .store
                .batch_spins(batch.batch_id)
                .await
                .map_err(store_error("load batch members"))?;
            info!(batch_id = batch.batch_id, attempts = batch.submit_attempts, "Re-driving open batch");
            report.redriven = Some(self.anchor(&batch, &spins).await?);
        }

        let claimed = self
            .store
            .claim_unbatched_spins(self.settings.batch_size)
            .await
            .map_err(store_error("claim unbatched spins"))?;

        match claimed {
            Some((batch, spins)) => {
                debug!(batch_id = batch.batch_id, spins = spins.len(), "Claimed spins into batch");
                report.claimed = Some(self.anchor(&batch, &spins).await?);
            }
            None => debug!("No unbatched spins"),
        }

        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.ticks += 1;
        stats.last_tick_at = Some(Utc::now());
        Ok(report)
    }

    /// Commit one batch, recording a failed attempt instead of erroring
    async fn anchor(&self, batch: &Batch, spins: &[Spin]) -> SettlementResult<AnchorOutcome> {
        let leaves: Vec<String> = spins.iter().map(|s| s.leaf_hash.clone()).collect();
        let root_hex = merkle::compute_root(&leaves)?;
        let root = root_bytes(&root_hex)?;

        match self.submit(batch.batch_id, &root).await {
            Ok(tx_signature) => {
                self.store
                    .close_batch(batch.batch_id, &root_hex, tx_signature.as_deref())
                    .await
                    .map_err(batch_update_error(batch.batch_id, "close batch"))?;

                info!(
                    batch_id = batch.batch_id,
                    spins = spins.len(),
                    merkle_root = %root_hex,
                    tx_signature = tx_signature.as_deref().unwrap_or("<already on ledger>"),
                    "Batch committed"
                );

                let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                stats.batches_committed += 1;
                stats.spins_anchored += spins.len() as u64;

                Ok(AnchorOutcome::Committed {
                    batch_id: batch.batch_id,
                    spins: spins.len(),
                    tx_signature,
                })
            }
            Err(err) => {
                let updated = self
                    .store
                    .record_submit_failure(batch.batch_id, self.settings.max_submit_attempts)
                    .await
                    .map_err(batch_update_error(batch.batch_id, "record submit failure"))?;

                let context = ErrorContext::new("batch_worker", "commit_batch_root")
                    .with_metadata("batch_id", &batch.batch_id.to_string())
                    .with_metadata("merkle_root", &root_hex);
                warn!(
                    correlation_id = %context.correlation_id,
                    component = %context.component,
                    operation = %context.operation,
                    metadata = ?context.metadata,
                    attempts = updated.submit_attempts,
                    status = %updated.status,
                    error = %err,
                    "Batch submission failed"
                );

                let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                stats.submit_failures += 1;
                if updated.status == BatchStatus::Failed {
                    stats.batches_failed += 1;
                    error!(batch_id = batch.batch_id, "Batch abandoned after repeated submission failures");
                }

                Ok(AnchorOutcome::SubmitFailed {
                    batch_id: batch.batch_id,
                    attempts: updated.submit_attempts,
                    status: updated.status,
                })
            }
        }
    }

    /// Submit the commitment unless it is already on the ledger. Returns the
    /// new transaction signature, or `None` for an existing commitment.
    async fn submit(&self, batch_id: u64, root: &[u8; 32]) -> Result<Option<String>, LedgerError> {
        let (commit_address, _) = batch_commit_address(batch_id, &self.program_id)?;

        if let Some(data) = self.ledger.get_account_data(&commit_address).await? {
            let existing = BatchCommitAccount::parse(&data)?;
            if existing.merkle_root != *root {
                return Err(LedgerError::Rejected {
                    message: format!(
                        "batch {} already committed with root {}",
                        batch_id,
                        hex::encode(existing.merkle_root)
                    ),
                });
            }
            return Ok(None);
        }

        let instruction =
            commit_batch_root_instruction(&self.program_id, &self.vault, &self.authority, batch_id, root)?;
        let blockhash = self.ledger.get_latest_blockhash().await?;
        let signature = self.ledger.submit_instruction(instruction, &blockhash).await?;
        Ok(Some(signature))
    }
}

/// A batch another tick already closed surfaces as `BatchClosed`
fn batch_update_error(batch_id: u64, context: &'static str) -> impl Fn(StoreError) -> SettlementError {
    move |err| match err {
        StoreError::ConditionFailed { .. } => SettlementError::BatchClosed { batch_id },
        other => SettlementError::storage(other, context),
    }
}

fn root_bytes(root_hex: &str) -> SettlementResult<[u8; 32]> {
    let bytes = hex::decode(root_hex)?;
    bytes.try_into().map_err(|_| {
        SettlementError::from(CryptoError::Merkle {
            message: format!("root {:?} is not 32 bytes", root_hex),
        })
    })
}
