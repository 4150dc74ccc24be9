//! Recoverable secp256k1 signatures over withdrawal messages
//!
//! The vault program rebuilds `user_key || amount_le || nonce_le`, hashes it
//! with Keccak-256, recovers the signer's public key and compares
//! `keccak256(pubkey)` against its stored signing authority.

use std::fmt;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use crate::domain::{Lamports, Pubkey};
use crate::error::{CryptoError, SettlementResult};

/// Signature bytes plus the recovery id the verifier needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalSignature {
    pub signature: [u8; 64],
    pub recovery_id: u8,
}

impl WithdrawalSignature {
    pub fn signature_hex(&self) -> String {
        hex::encode(self.signature)
    }
}

/// Build the exact byte message the vault program verifies
pub fn withdrawal_message(user: &Pubkey, amount: Lamports, nonce: u64) -> [u8; 48] {
    let mut message = [0u8; 48];
    message[..32].copy_from_slice(user.as_bytes());
    message[32..40].copy_from_slice(&amount.to_le_bytes());
    message[40..].copy_from_slice(&nonce.to_le_bytes());
    message
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Holds the service's withdrawal signing key
#[derive(Clone)]
pub struct WithdrawalSigner {
    key: SigningKey,
}

impl fmt::Debug for WithdrawalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithdrawalSigner")
            .field("authority", &hex::encode(self.signing_authority()))
            .finish()
    }
}

impl WithdrawalSigner {
    /// Load a signer from a 32-byte hex private key
    pub fn from_hex(private_key_hex: &str) -> SettlementResult<Self> {
        let bytes = hex::decode(private_key_hex.trim()).map_err(|e| CryptoError::InvalidKey {
            message: format!("invalid private key hex: {}", e),
        })?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidKey {
            message: format!("failed to parse secp256k1 key: {}", e),
        })?;
        Ok(Self { key })
    }

    /// `keccak256` of the uncompressed public key without its 0x04 prefix;
    /// the value the vault stores as its signing authority
    pub fn signing_authority(&self) -> [u8; 32] {
        let public = k256::PublicKey::from(self.key.verifying_key());
        let encoded = public.to_encoded_point(false);
        keccak256(&encoded.as_bytes()[1..])
    }

    /// Sign a withdrawal of `amount` lamports to `user` at `nonce`
    pub fn sign_withdrawal(&self, user: &Pubkey, amount: Lamports, nonce: u64) -> SettlementResult<WithdrawalSignature> {
        let digest = keccak256(&withdrawal_message(user, amount, nonce));
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::SigningFailed { message: e.to_string() })?;

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&signature.to_bytes());

        Ok(WithdrawalSignature {
            signature: bytes,
            recovery_id: recovery_id.to_byte(),
        })
    }
}

/// Recover the signing authority from a withdrawal signature, mirroring the
/// on-chain check
pub fn recover_authority(
    user: &Pubkey,
    amount: Lamports,
    nonce: u64,
    signature: &WithdrawalSignature,
) -> SettlementResult<[u8; 32]> {
    let digest = keccak256(&withdrawal_message(user, amount, nonce));
    let sig = Signature::from_slice(&signature.signature).map_err(|e| CryptoError::InvalidKey {
        message: format!("malformed signature: {}", e),
    })?;
    let recid = RecoveryId::from_byte(signature.recovery_id).ok_or_else(|| CryptoError::InvalidKey {
        message: format!("invalid recovery id {}", signature.recovery_id),
    })?;
    let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recid).map_err(|e| CryptoError::InvalidKey {
        message: format!("recovery failed: {}", e),
    })?;

    let public = k256::PublicKey::from(&recovered);
    let encoded = public.to_encoded_point(false);
    Ok(keccak256(&encoded.as_bytes()[1..]))
}
