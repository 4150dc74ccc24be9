//! Withdrawals, refunds and deposit crediting
//!
//! A withdrawal is authorized off-chain: the balance is debited and a
//! recoverable signature over `(user, amount, nonce)` is handed to the player,
//! who submits it to the vault program. The service never learns directly
//! whether that submission landed, so it keeps the authorization pending until
//! the player confirms it or a refund proves from on-chain state that the
//! nonce was never consumed.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::crypto::{WithdrawalSignature, WithdrawalSigner};
use crate::domain::{parse_wallet, DepositRecord, Lamports, PendingWithdrawal};
use crate::error::{SettlementError, SettlementResult, StoreError};
use crate::ledger::{user_balance_address, UserBalanceAccount};
use super::{store_error, ServiceContext};

/// Everything the player needs to call the vault's `withdraw`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalAuthorization {
    pub signature: WithdrawalSignature,
    pub nonce: u64,
    pub amount: Lamports,
}

/// Result of a successful refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub amount: Lamports,
    /// Nonce the next authorization will use
    pub next_nonce: u64,
}

/// Service responsible for moving funds between the ledger and sessions
#[derive(Debug, Clone)]
pub struct WalletManager {
    context: ServiceContext,
    signer: WithdrawalSigner,
}

impl WalletManager {
    pub fn new(context: ServiceContext, signer: WithdrawalSigner) -> Self {
        Self { context, signer }
    }

    /// Debit `amount` and sign a withdrawal for it. Retrying while the
    /// authorization is pending returns the identical signature.
    pub async fn authorize_withdrawal(&self, wallet: &str, amount: Lamports) -> SettlementResult<WithdrawalAuthorization> {
        if amount == 0 {
            return Err(SettlementError::InvalidAmount {
                message: "withdrawal amount must be greater than 0".to_string(),
            });
        }
        let user_key = parse_wallet(wallet)?;

        let _guard = self.context.locks.acquire(wallet).await;
        let store = &self.context.store;

        let user = store
            .get_user(wallet)
            .await
            .map_err(store_error("load user"))?
            .ok_or_else(|| SettlementError::UserNotFound(wallet.to_string()))?;

        if let Some(pending) = user.pending_withdrawal {
            if pending.amount != amount {
                return Err(SettlementError::PendingWithdrawalMismatch { pending: pending.amount });
            }
            debug!(wallet = %wallet, nonce = pending.nonce, "Replaying pending withdrawal");
            return replay(pending);
        }

        let session = store
            .get_active_session(wallet)
            .await
            .map_err(store_error("load active session"))?
            .ok_or(SettlementError::SessionInactive)?;
        if session.playable_balance < amount {
            return Err(SettlementError::InsufficientFunds);
        }

        let nonce = user.next_withdrawal_nonce;
        let signature = self.signer.sign_withdrawal(&user_key, amount, nonce)?;

        let pending = PendingWithdrawal {
            amount,
            signature: signature.signature_hex(),
            recovery_id: signature.recovery_id,
            nonce,
        };
        store.set_pending_withdrawal(wallet, pending).await.map_err(|err| match err {
            StoreError::ConditionFailed { .. } => SettlementError::InsufficientFunds,
            other => SettlementError::storage(other, "record pending withdrawal"),
        })?;

        info!(wallet = %wallet, amount, nonce, "Withdrawal authorized");
        Ok(WithdrawalAuthorization { signature, nonce, amount })
    }

    /// Forget the pending withdrawal after the player reports it landed
    pub async fn complete_withdrawal(&self, wallet: &str) -> SettlementResult<()> {
        parse_wallet(wallet)?;
        let _guard = self.context.locks.acquire(wallet).await;

        self.context.store.complete_withdrawal(wallet).await.map_err(|err| match err {
            StoreError::NotFound { .. } => SettlementError::UserNotFound(wallet.to_string()),
            other => SettlementError::storage(other, "complete withdrawal"),
        })?;

        info!(wallet = %wallet, "Withdrawal completed");
        Ok(())
    }

    /// Return a pending withdrawal to the balance if the ledger shows its
    /// nonce was never consumed
    pub async fn attempt_refund(&self, wallet: &str) -> SettlementResult<RefundOutcome> {
        let user_key = parse_wallet(wallet)?;
        let _guard = self.context.locks.acquire(wallet).await;
        let store = &self.context.store;

        let user = store
            .get_user(wallet)
            .await
            .map_err(store_error("load user"))?
            .ok_or_else(|| SettlementError::UserNotFound(wallet.to_string()))?;
        let pending = user.pending_withdrawal.ok_or(SettlementError::NoPendingWithdrawal)?;

        let last_on_chain = self.last_consumed_nonce(&user_key).await?;
        let next_nonce = last_on_chain.checked_add(1).ok_or_else(|| {
            SettlementError::ledger(
                crate::error::LedgerError::InvalidAccountData {
                    message: format!("withdrawal nonce {} cannot advance", last_on_chain),
                },
                "read user balance account",
            )
        })?;

        if user.next_withdrawal_nonce <= next_nonce {
            warn!(
                wallet = %wallet,
                pending_nonce = pending.nonce,
                last_on_chain,
                "Refund refused, withdrawal already consumed on ledger"
            );
            return Err(SettlementError::RefundRefused { nonce: last_on_chain });
        }

        let fallback = self.context.fallback_session(wallet)?;
        store
            .refund_withdrawal(wallet, pending.amount, next_nonce, fallback)
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed { message } => SettlementError::Conflict { message },
                other => SettlementError::storage(other, "refund withdrawal"),
            })?;

        info!(wallet = %wallet, amount = pending.amount, next_nonce, "Withdrawal refunded");
        Ok(RefundOutcome {
            amount: pending.amount,
            next_nonce,
        })
    }

    /// Credit a confirmed on-chain deposit into the vault, exactly once
    pub async fn sync_deposit(&self, wallet: &str, tx_signature: &str) -> SettlementResult<DepositRecord> {
        let user_key = parse_wallet(wallet)?;
        let tx_signature = tx_signature.trim();
        if tx_signature.is_empty() {
            return Err(invalid_deposit("missing transaction signature"));
        }

        let _guard = self.context.locks.acquire(wallet).await;
        let store = &self.context.store;

        if store.deposit_processed(tx_signature).await.map_err(store_error("check deposit"))? {
            return Err(SettlementError::DepositAlreadyProcessed(tx_signature.to_string()));
        }

        let tx = self
            .context
            .ledger
            .get_transaction(tx_signature)
            .await
            .map_err(|e| SettlementError::ledger(e, "fetch deposit transaction"))?
            .ok_or_else(|| invalid_deposit("transaction not found"))?;

        if let Some(error) = &tx.error {
            return Err(invalid_deposit(&format!("transaction failed: {}", error)));
        }

        let vault = self.context.config.ledger.vault()?;
        if !tx.account_keys.contains(&vault) {
            return Err(invalid_deposit("vault not involved in transaction"));
        }
        if !tx.account_keys.contains(&user_key) {
            return Err(invalid_deposit("depositor not involved in transaction"));
        }

        let delta = tx
            .balance_delta(&vault)
            .ok_or_else(|| invalid_deposit("transaction metadata mismatch"))?;
        if delta <= 0 {
            return Err(invalid_deposit("vault balance did not increase"));
        }
        let amount = Lamports::try_from(delta).map_err(|_| invalid_deposit("deposit amount out of range"))?;

        let record = DepositRecord {
            tx_signature: tx_signature.to_string(),
            wallet_address: wallet.to_string(),
            amount,
            recorded_at: Utc::now(),
        };
        let fallback = self.context.fallback_session(wallet)?;

        store
            .record_deposit(record.clone(), fallback)
            .await
            .map_err(|err| match err {
                StoreError::Duplicate { .. } => SettlementError::DepositAlreadyProcessed(tx_signature.to_string()),
                other => SettlementError::storage(other, "record deposit"),
            })?;

        info!(wallet = %wallet, tx_signature = %tx_signature, amount, "Deposit credited");
        Ok(record)
    }

    pub async fn balance(&self, wallet: &str) -> SettlementResult<Lamports> {
        parse_wallet(wallet)?;
        self.context.active_balance(wallet).await
    }

    /// Last withdrawal nonce the vault accepted for `user`; 0 without an account
    async fn last_consumed_nonce(&self, user: &crate::domain::Pubkey) -> SettlementResult<u64> {
        let program_id = &self.context.config.ledger.program_id;
        let (address, _) = user_balance_address(user, program_id)?;

        let data = self
            .context
            .ledger
            .get_account_data(&address)
            .await
            .map_err(|e| SettlementError::ledger(e, "fetch user balance account"))?;

        match data {
            None => Ok(0),
            Some(bytes) => {
                let account = UserBalanceAccount::parse(&bytes)
                    .map_err(|e| SettlementError::ledger(e, "parse user balance account"))?;
                if account.owner != *user {
                    return Err(SettlementError::ledger(
                        crate::error::LedgerError::InvalidAccountData {
                            message: format!("balance account belongs to {}", account.owner),
                        },
                        "parse user balance account",
                    ));
                }
                Ok(account.last_withdrawal_nonce)
            }
        }
    }
}

fn invalid_deposit(message: &str) -> SettlementError {
    SettlementError::InvalidDeposit {
        message: message.to_string(),
    }
}

/// Rebuild the stored authorization, including the nonce it was signed for
fn replay(pending: PendingWithdrawal) -> SettlementResult<WithdrawalAuthorization> {
    let bytes = hex::decode(&pending.signature)?;
    let signature: [u8; 64] = bytes.try_into().map_err(|raw: Vec<u8>| SettlementError::Serialization {
        message: format!("stored signature has {} bytes", raw.len()),
    })?;

    Ok(WithdrawalAuthorization {
        signature: WithdrawalSignature {
            signature,
            recovery_id: pending.recovery_id,
        },
        nonce: pending.nonce,
        amount: pending.amount,
    })
}
