//! In-memory ledger used by tests and local development

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use crate::domain::{Lamports, Pubkey};
use crate::error::LedgerError;
use super::{
    parse_commit_batch_root_data, user_balance_address, BatchCommitAccount, Instruction, LedgerClient,
    TransactionBalances, UserBalanceAccount,
};

#[derive(Debug, Default)]
struct MockState {
    transactions: HashMap<String, TransactionBalances>,
    accounts: HashMap<Pubkey, Vec<u8>>,
    submitted: Vec<Instruction>,
    /// Accounts created by a landed instruction (second account meta)
    initialized: HashSet<Pubkey>,
    failures_remaining: u32,
    /// Submissions that land but whose confirmation never reaches the caller
    lost_confirmations: u32,
    rpc_down: bool,
    tx_counter: u64,
}

/// Mock ledger that records submitted instructions and serves canned data
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<MockState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a confirmed transfer of `amount` lamports from `from` into `to`
    pub fn add_transfer(&self, signature: &str, from: Pubkey, to: Pubkey, amount: Lamports) {
        self.add_transaction(
            signature,
            TransactionBalances {
                account_keys: vec![from, to],
                pre_balances: vec![amount * 2, 10_000],
                post_balances: vec![amount, 10_000 + amount],
                error: None,
            },
        );
    }

    pub fn add_transaction(&self, signature: &str, balances: TransactionBalances) {
        self.lock().transactions.insert(signature.to_string(), balances);
    }

    /// Publish a `UserBalance` account with the given last consumed nonce
    pub fn set_user_balance(&self, program_id: &Pubkey, user: &Pubkey, amount: Lamports, last_nonce: u64) {
        let (address, bump) = match user_balance_address(user, program_id) {
            Ok(found) => found,
            Err(_) => return,
        };
        let account = UserBalanceAccount {
            owner: *user,
            amount,
            last_withdrawal_nonce: last_nonce,
            bump,
        };
        self.lock().accounts.insert(address, account.encode());
    }

    pub fn set_account_data(&self, address: Pubkey, data: Vec<u8>) {
        self.lock().accounts.insert(address, data);
    }

    /// Make the next `count` submissions fail
    pub fn fail_next_submissions(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    /// Let the next `count` submissions land while reporting a timeout
    pub fn lose_next_confirmations(&self, count: u32) {
        self.lock().lost_confirmations = count;
    }

    /// Make every RPC call fail until cleared
    pub fn set_rpc_down(&self, down: bool) {
        self.lock().rpc_down = down;
    }

    /// Instructions that landed, in order
    pub fn submitted(&self) -> Vec<Instruction> {
        self.lock().submitted.clone()
    }

    fn check_up(state: &MockState) -> Result<(), LedgerError> {
        if state.rpc_down {
            return Err(LedgerError::Rpc {
                message: "mock ledger unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionBalances>, LedgerError> {
        let state = self.lock();
        Self::check_up(&state)?;
        Ok(state.transactions.get(signature).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<String, LedgerError> {
        let state = self.lock();
        Self::check_up(&state)?;
        Ok(bs58::encode([state.tx_counter as u8; 32]).into_string())
    }

    async fn submit_instruction(&self, instruction: Instruction, _recent_blockhash: &str) -> Result<String, LedgerError> {
        let mut state = self.lock();
        Self::check_up(&state)?;

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(LedgerError::Rpc {
                message: "simulated submission failure".to_string(),
            });
        }

        // the vault program initializes the commitment account; a second init fails
        if let Some(target) = instruction.accounts.get(1).map(|m| m.pubkey) {
            if !state.initialized.insert(target) {
                return Err(LedgerError::Rejected {
                    message: format!("account {} already in use", target),
                });
            }
        }

        // mirror what the program writes into the new commitment account
        if let (Some((batch_id, merkle_root)), Some(target), Some(authority)) = (
            parse_commit_batch_root_data(&instruction.data),
            instruction.accounts.get(1),
            instruction.accounts.get(2),
        ) {
            let account = BatchCommitAccount {
                authority: authority.pubkey,
                batch_id,
                merkle_root,
            };
            state.accounts.insert(target.pubkey, account.encode());
        }

        state.tx_counter += 1;
        let signature = bs58::encode(state.tx_counter.to_le_bytes()).into_string();
        state.submitted.push(instruction);

        if state.lost_confirmations > 0 {
            state.lost_confirmations -= 1;
            return Err(LedgerError::Rpc {
                message: "confirmation timed out".to_string(),
            });
        }
        Ok(signature)
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let state = self.lock();
        Self::check_up(&state)?;
        Ok(state.accounts.get(address).cloned())
    }
}
