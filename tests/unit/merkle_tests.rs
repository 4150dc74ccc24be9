//! Known-answer tests for batch roots and proofs

use spinvault::merkle::{compute_root, generate_proof, verify_proof};

const A: &str = "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb";
const B: &str = "3e23e8160039594a33894f6564e1b1348bbd7a0088d42c4acb73eeaed59c009d";
const C: &str = "2e7d2c03a9507ae265ecf5b5356885a53393a2029d241394997265a1a25aefc6";
const ROOT_ABC: &str = "d31a37ef6ac14a2db1470c4316beb5592e6afd4465022339adafda76a18ffabe";

fn leaves(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_three_leaf_root() {
    assert_eq!(compute_root(&leaves(&[A, B, C])).unwrap(), ROOT_ABC);
}

#[test]
fn test_odd_level_matches_explicit_duplicate() {
    assert_eq!(
        compute_root(&leaves(&[A, B, C])).unwrap(),
        compute_root(&leaves(&[A, B, C, C])).unwrap()
    );
}

#[test]
fn test_single_leaf_root_is_self_paired() {
    let root = compute_root(&leaves(&[A])).unwrap();
    assert_eq!(root, compute_root(&leaves(&[A, A])).unwrap());
    assert_ne!(root, A);
}

#[test]
fn test_empty_root() {
    assert_eq!(compute_root(&[]).unwrap(), "");
}

#[test]
fn test_proof_for_unpaired_leaf() {
    let set = leaves(&[A, B, C]);
    let proof = generate_proof(&set, 2).unwrap();
    assert_eq!(proof.len(), 2);
    assert_eq!(proof[0], C);
    assert!(verify_proof(C, 2, &proof, ROOT_ABC));
}

#[test]
fn test_proof_rejects_wrong_position_or_leaf() {
    let set = leaves(&[A, B, C]);
    let proof = generate_proof(&set, 0).unwrap();
    assert!(verify_proof(A, 0, &proof, ROOT_ABC));
    assert!(!verify_proof(A, 1, &proof, ROOT_ABC));
    assert!(!verify_proof(B, 0, &proof, ROOT_ABC));
}

#[test]
fn test_proof_errors() {
    let set = leaves(&[A, B]);
    assert!(generate_proof(&set, 2).is_err());
    assert!(compute_root(&leaves(&[A, "xyz"])).is_err());
}
