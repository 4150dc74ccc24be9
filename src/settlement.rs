//! Single entry point for an API layer

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use crate::config::SpinvaultConfig;
use crate::crypto::WithdrawalSigner;
use crate::domain::{DepositRecord, Lamports, Spin};
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::LedgerClient;
use crate::services::{
    RefundOutcome, ServiceContext, SessionManager, SessionStart, SpinProof, SpinReceipt, WalletManager,
    WithdrawalAuthorization,
};
use crate::store::Repository;
use crate::worker::BatchAnchorWorker;

/// Settlement core wired to one store and one ledger
#[derive(Debug, Clone)]
pub struct SettlementCore {
    context: ServiceContext,
    sessions: SessionManager,
    wallets: WalletManager,
}

impl SettlementCore {
    /// Validate `config` and build the services. A signer key is required.
    pub fn new(
        store: Arc<dyn Repository>,
        ledger: Arc<dyn LedgerClient>,
        config: SpinvaultConfig,
    ) -> SettlementResult<Self> {
        config.validate()?;

        let signer_key = config.wallet.signer_key.as_deref().ok_or_else(|| SettlementError::Configuration {
            message: "Withdrawal signer key is not configured".to_string(),
            field: "wallet.signer_key".to_string(),
        })?;
        let signer = WithdrawalSigner::from_hex(signer_key)?;
        info!(
            signing_authority = %hex::encode(signer.signing_authority()),
            program_id = %config.ledger.program_id,
            "Settlement core initialized"
        );

        let context = ServiceContext::new(store, ledger, config);
        Ok(Self {
            sessions: SessionManager::new(context.clone()),
            wallets: WalletManager::new(context.clone(), signer),
            context,
        })
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Worker anchoring this core's spins
    pub fn batch_worker(&self) -> SettlementResult<BatchAnchorWorker> {
        BatchAnchorWorker::new(&self.context)
    }

    pub async fn init_session(&self, wallet: &str) -> SettlementResult<SessionStart> {
        self.sessions.init_session(wallet).await
    }

    pub async fn spin(&self, wallet: &str, bet: Lamports, client_seed: &str) -> SettlementResult<SpinReceipt> {
        self.sessions.execute_spin(wallet, bet, client_seed).await
    }

    pub async fn history(&self, wallet: &str) -> SettlementResult<Vec<Spin>> {
        self.sessions.history(wallet).await
    }

    pub async fn spin_proof(&self, spin_id: Uuid) -> SettlementResult<SpinProof> {
        self.sessions.spin_proof(spin_id).await
    }

    pub async fn balance(&self, wallet: &str) -> SettlementResult<Lamports> {
        self.wallets.balance(wallet).await
    }

    pub async fn withdraw(&self, wallet: &str, amount: Lamports) -> SettlementResult<WithdrawalAuthorization> {
        self.wallets.authorize_withdrawal(wallet, amount).await
    }

    pub async fn complete_withdrawal(&self, wallet: &str) -> SettlementResult<()> {
        self.wallets.complete_withdrawal(wallet).await
    }

    pub async fn refund(&self, wallet: &str) -> SettlementResult<RefundOutcome> {
        self.wallets.attempt_refund(wallet).await
    }

    pub async fn sync_deposit(&self, wallet: &str, tx_signature: &str) -> SettlementResult<DepositRecord> {
        self.wallets.sync_deposit(wallet, tx_signature).await
    }
}
