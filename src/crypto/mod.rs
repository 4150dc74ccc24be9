//! Seed generation and withdrawal authorization signing

pub mod random;
pub mod signer;

pub use random::{generate_seed, generate_commit_pair};
pub use signer::{WithdrawalSignature, WithdrawalSigner};
