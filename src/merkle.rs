//! Binary SHA-256 Merkle tree over hex-encoded leaf hashes
//!
//! At every level an unpaired trailing node is paired with itself. Roots
//! and proofs produced here must be reproducible by external verifiers, so
//! the duplication rule and the `left || right` concatenation order are fixed.

use crate::error::{utils, CryptoError, SettlementError, SettlementResult};

fn decode_leaves(leaf_hashes: &[String]) -> SettlementResult<Vec<Vec<u8>>> {
    leaf_hashes
        .iter()
        .map(|h| {
            hex::decode(h).map_err(|e| {
                SettlementError::from(CryptoError::Merkle {
                    message: format!("leaf {:?} is not valid hex: {}", h, e),
                })
            })
        })
        .collect()
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    utils::sha256(&combined).to_vec()
}

fn next_level(level: &[Vec<u8>]) -> Vec<Vec<u8>> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Compute the hex root over ordered leaves. An empty leaf set yields an
/// empty root.
pub fn compute_root(leaf_hashes: &[String]) -> SettlementResult<String> {
    if leaf_hashes.is_empty() {
        return Ok(String::new());
    }

    let mut level = decode_leaves(leaf_hashes)?;
    while level.len() > 1 {
        level = next_level(&level);
    }

    Ok(hex::encode(&level[0]))
}

/// Sibling path from leaf `index` up to the root, bottom first
pub fn generate_proof(leaf_hashes: &[String], index: usize) -> SettlementResult<Vec<String>> {
    if index >= leaf_hashes.len() {
        return Err(CryptoError::Merkle {
            message: format!("index {} out of bounds for {} leaves", index, leaf_hashes.len()),
        }
        .into());
    }

    let mut level = decode_leaves(leaf_hashes)?;
    let mut position = index;
    let mut proof = Vec::new();

    while level.len() > 1 {
        let sibling = if position % 2 == 0 {
            // last node on an odd level is its own sibling
            level.get(position + 1).unwrap_or(&level[position])
        } else {
            &level[position - 1]
        };
        proof.push(hex::encode(sibling));

        level = next_level(&level);
        position /= 2;
    }

    Ok(proof)
}

/// Fold a proof back up to a root and compare
pub fn verify_proof(leaf_hash: &str, index: usize, proof: &[String], root: &str) -> bool {
    let Ok(mut current) = hex::decode(leaf_hash) else {
        return false;
    };
    let mut position = index;

    for sibling_hex in proof {
        let Ok(sibling) = hex::decode(sibling_hex) else {
            return false;
        };
        current = if position % 2 == 0 {
            hash_pair(&current, &sibling)
        } else {
            hash_pair(&sibling, &current)
        };
        position /= 2;
    }

    hex::encode(current) == root
}
