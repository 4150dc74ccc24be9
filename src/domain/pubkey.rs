//! 32-byte ledger account keys and program-derived addresses

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use crate::error::LedgerError;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Account key on the external ledger, rendered as base58
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The system program id (all zero bytes)
    pub const fn system_program() -> Self {
        Self([0u8; 32])
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the key is a valid ed25519 point. Program-derived addresses
    /// must not be.
    pub fn is_on_curve(&self) -> bool {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).is_ok()
    }

    /// Hash seeds and a bump byte into a candidate address, rejecting
    /// candidates that land on the curve
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey, LedgerError> {
        if seeds.len() > 16 || seeds.iter().any(|s| s.len() > 32) {
            return Err(LedgerError::InvalidPubkey {
                message: "too many seeds or seed longer than 32 bytes".to_string(),
            });
        }

        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());

        if candidate.is_on_curve() {
            return Err(LedgerError::InvalidPubkey {
                message: "derived address lies on the ed25519 curve".to_string(),
            });
        }
        Ok(candidate)
    }

    /// Find the first off-curve address searching bump seeds from 255 down to 1
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), LedgerError> {
        for bump in (1..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);

            match Self::create_program_address(&with_bump, program_id) {
                Ok(address) => return Ok((address, bump)),
                Err(_) => continue,
            }
        }

        Err(LedgerError::InvalidPubkey {
            message: "no viable bump seed found".to_string(),
        })
    }
}

impl FromStr for Pubkey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|e| LedgerError::InvalidPubkey {
            message: format!("invalid base58: {}", e),
        })?;

        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| LedgerError::InvalidPubkey {
            message: format!("expected 32 bytes, got {}", v.len()),
        })?;

        Ok(Pubkey(array))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}
