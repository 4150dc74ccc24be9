//! Contract with the external ledger and the vault program
//!
//! The RPC transport itself lives behind [`LedgerClient`]; this module owns
//! the byte layouts the vault program expects and the addresses it derives.

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::domain::{Lamports, Pubkey};
use crate::error::{LedgerError, utils};

pub const VAULT_SEED: &[u8] = b"casino_vault";
pub const USER_BALANCE_SEED: &[u8] = b"user_balance";
pub const BATCH_COMMIT_SEED: &[u8] = b"batch_commit";
pub const COMMIT_BATCH_ROOT_IX: &str = "commit_batch_root";
pub const USER_BALANCE_ACCOUNT: &str = "UserBalance";
pub const BATCH_COMMIT_ACCOUNT: &str = "BatchCommit";

/// Size of a serialized `UserBalance` account
pub const USER_BALANCE_LEN: usize = 8 + 32 + 8 + 8 + 1;
/// Size of a serialized `BatchCommit` account
pub const BATCH_COMMIT_LEN: usize = 8 + 32 + 8 + 32;

/// Account reference carried by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: true }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: false }
    }
}

/// A single program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Per-account lamport balances before and after a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBalances {
    pub account_keys: Vec<Pubkey>,
    pub pre_balances: Vec<Lamports>,
    pub post_balances: Vec<Lamports>,
    /// Execution error reported by the ledger, if the transaction failed
    pub error: Option<String>,
}

impl TransactionBalances {
    /// Signed lamport change of `account`, or `None` if the account is absent
    /// or the balance arrays do not cover it
    pub fn balance_delta(&self, account: &Pubkey) -> Option<i128> {
        let index = self.account_keys.iter().position(|k| k == account)?;
        let pre = *self.pre_balances.get(index)?;
        let post = *self.post_balances.get(index)?;
        Some(post as i128 - pre as i128)
    }
}

/// RPC surface of the external ledger consumed by the settlement core
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch a confirmed transaction's balance metadata; `None` if unknown
    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionBalances>, LedgerError>;

    /// Latest finalized blockhash, base58
    async fn get_latest_blockhash(&self) -> Result<String, LedgerError>;

    /// Sign with the service's fee payer and submit; returns the transaction signature
    async fn submit_instruction(&self, instruction: Instruction, recent_blockhash: &str) -> Result<String, LedgerError>;

    /// Raw account data; `None` if the account does not exist
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError>;
}

/// Anchor-style 8-byte discriminator: `sha256("{namespace}:{name}")[..8]`
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let hash = utils::sha256(format!("{}:{}", namespace, name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// Instruction data for `commit_batch_root(batch_id, merkle_root)`
pub fn commit_batch_root_data(batch_id: u64, merkle_root: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 8 + 32);
    data.extend_from_slice(&discriminator("global", COMMIT_BATCH_ROOT_IX));
    data.extend_from_slice(&batch_id.to_le_bytes());
    data.extend_from_slice(merkle_root);
    data
}

/// Address of the program's vault account
pub fn vault_address(program_id: &Pubkey) -> Result<(Pubkey, u8), LedgerError> {
    Pubkey::find_program_address(&[VAULT_SEED], program_id)
}

/// Address of the per-user balance account
pub fn user_balance_address(user: &Pubkey, program_id: &Pubkey) -> Result<(Pubkey, u8), LedgerError> {
    Pubkey::find_program_address(&[USER_BALANCE_SEED, user.as_bytes()], program_id)
}

/// Address of a batch commitment account. Derived from the batch id, so a
/// resubmitted commitment targets the same account and can land at most once.
pub fn batch_commit_address(batch_id: u64, program_id: &Pubkey) -> Result<(Pubkey, u8), LedgerError> {
    Pubkey::find_program_address(&[BATCH_COMMIT_SEED, &batch_id.to_le_bytes()], program_id)
}

/// Full `commit_batch_root` instruction with its account list
pub fn commit_batch_root_instruction(
    program_id: &Pubkey,
    vault: &Pubkey,
    authority: &Pubkey,
    batch_id: u64,
    merkle_root: &[u8; 32],
) -> Result<Instruction, LedgerError> {
    let (batch_commit, _) = batch_commit_address(batch_id, program_id)?;

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::writable(*vault, false),
            AccountMeta::writable(batch_commit, false),
            AccountMeta::writable(*authority, true),
            AccountMeta::readonly(Pubkey::system_program(), false),
        ],
        data: commit_batch_root_data(batch_id, merkle_root),
    })
}

/// Decoded on-chain `UserBalance` account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBalanceAccount {
    pub owner: Pubkey,
    pub amount: Lamports,
    pub last_withdrawal_nonce: u64,
    pub bump: u8,
}

impl UserBalanceAccount {
    pub fn parse(data: &[u8]) -> Result<Self, LedgerError> {
        if data.len() < USER_BALANCE_LEN {
            return Err(LedgerError::InvalidAccountData {
                message: format!("expected at least {} bytes, got {}", USER_BALANCE_LEN, data.len()),
            });
        }

        if data[..8] != discriminator("account", USER_BALANCE_ACCOUNT) {
            return Err(LedgerError::InvalidAccountData {
                message: "account discriminator mismatch".to_string(),
            });
        }

        let mut owner = [0u8; 32];
        owner.copy_from_slice(&data[8..40]);
        let read_u64 = |start: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[start..start + 8]);
            u64::from_le_bytes(buf)
        };

        Ok(Self {
            owner: Pubkey::new(owner),
            amount: read_u64(40),
            last_withdrawal_nonce: read_u64(48),
            bump: data[56],
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(USER_BALANCE_LEN);
        data.extend_from_slice(&discriminator("account", USER_BALANCE_ACCOUNT));
        data.extend_from_slice(self.owner.as_bytes());
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&self.last_withdrawal_nonce.to_le_bytes());
        data.push(self.bump);
        data
    }
}

/// Decoded on-chain `BatchCommit` account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommitAccount {
    pub authority: Pubkey,
    pub batch_id: u64,
    pub merkle_root: [u8; 32],
}

impl BatchCommitAccount {
    pub fn parse(data: &[u8]) -> Result<Self, LedgerError> {
        if data.len() < BATCH_COMMIT_LEN {
            return Err(LedgerError::InvalidAccountData {
                message: format!("expected at least {} bytes, got {}", BATCH_COMMIT_LEN, data.len()),
            });
        }

        if data[..8] != discriminator("account", BATCH_COMMIT_ACCOUNT) {
            return Err(LedgerError::InvalidAccountData {
                message: "account discriminator mismatch".to_string(),
            });
        }

        let mut authority = [0u8; 32];
        authority.copy_from_slice(&data[8..40]);
        let mut batch_id = [0u8; 8];
        batch_id.copy_from_slice(&data[40..48]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&data[48..80]);

        Ok(Self {
            authority: Pubkey::new(authority),
            batch_id: u64::from_le_bytes(batch_id),
            merkle_root,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(BATCH_COMMIT_LEN);
        data.extend_from_slice(&discriminator("account", BATCH_COMMIT_ACCOUNT));
        data.extend_from_slice(self.authority.as_bytes());
        data.extend_from_slice(&self.batch_id.to_le_bytes());
        data.extend_from_slice(&self.merkle_root);
        data
    }
}

/// Split `commit_batch_root` instruction data back into `(batch_id, root)`
pub fn parse_commit_batch_root_data(data: &[u8]) -> Option<(u64, [u8; 32])> {
    if data.len() != 48 || data[..8] != discriminator("global", COMMIT_BATCH_ROOT_IX) {
        return None;
    }
    let mut batch_id = [0u8; 8];
    batch_id.copy_from_slice(&data[8..16]);
    let mut root = [0u8; 32];
    root.copy_from_slice(&data[16..48]);
    Some((u64::from_le_bytes(batch_id), root))
}
