//! Property-based tests for Merkle proofs and spin derivation

use proptest::prelude::*;
use spinvault::fairness::{calculate_spin, rng::derive_outcome};
use spinvault::merkle::{compute_root, generate_proof, verify_proof};

/// Generate hex-encoded 32-byte leaves
fn arb_leaves(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(any::<[u8; 32]>().prop_map(hex::encode), 1..=max)
}

/// Generate hex server seeds
fn arb_seed() -> impl Strategy<Value = String> {
    any::<[u8; 32]>().prop_map(hex::encode)
}

proptest! {
    #[test]
    fn prop_every_leaf_proves_against_root(leaves in arb_leaves(40)) {
        let root = compute_root(&leaves).unwrap();
        for (index, leaf) in leaves.iter().enumerate() {
            let proof = generate_proof(&leaves, index).unwrap();
            prop_assert!(verify_proof(leaf, index, &proof, &root));
        }
    }

    #[test]
    fn prop_odd_tail_equals_explicit_duplicate(leaves in arb_leaves(31)) {
        prop_assume!(leaves.len() % 2 == 1 && leaves.len() > 1);
        let mut padded = leaves.clone();
        padded.push(leaves[leaves.len() - 1].clone());

        prop_assert_eq!(compute_root(&leaves).unwrap(), compute_root(&padded).unwrap());
    }

    #[test]
    fn prop_tampered_leaf_fails(leaves in arb_leaves(20), index in any::<prop::sample::Index>(), flip in any::<u8>()) {
        let index = index.index(leaves.len());
        let root = compute_root(&leaves).unwrap();
        let proof = generate_proof(&leaves, index).unwrap();

        let mut bytes = hex::decode(&leaves[index]).unwrap();
        bytes[0] ^= flip | 1;
        prop_assert!(!verify_proof(&hex::encode(bytes), index, &proof, &root));
    }

    #[test]
    fn prop_derivation_is_deterministic(seed in arb_seed(), client in "[a-zA-Z0-9]{1,32}", nonce in 1u64..1_000_000) {
        let first = derive_outcome(&seed, &client, nonce, 32).unwrap();
        let second = derive_outcome(&seed, &client, nonce, 32).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.0.iter().all(|stop| *stop < 32));
    }

    #[test]
    fn prop_payout_scales_with_bet(seed in arb_seed(), nonce in 1u64..10_000, bet in 1u64..1_000_000) {
        let unit = calculate_spin(&seed, "scale", nonce, 1).unwrap();
        let scaled = calculate_spin(&seed, "scale", nonce, bet).unwrap();
        prop_assert_eq!(unit.matrix, scaled.matrix);
        prop_assert_eq!(unit.payout * bet, scaled.payout);
    }
}
