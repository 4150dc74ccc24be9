//! Reference vectors for the slot engine

use spinvault::fairness::{self, calculate_spin, derive_outcome, Symbol, MAIN_REEL_STRIP};
use spinvault::SettlementError;

const WALLET: &str = "AMyC4nrskq9PERnZfFZv3KRhEm23VUpRV4VrggAjYiiU";

fn seed() -> String {
    format!("{}00", "aa".repeat(31))
}

#[test]
fn test_reference_spin() {
    let bet = 1_000_000_000; // 1 SOL
    let (stops, commitment) = derive_outcome(&seed(), "player1", 1, MAIN_REEL_STRIP.len()).unwrap();
    assert_eq!(stops, [30, 1, 23]);
    assert_eq!(commitment, "9fbfbc1e28cb7ea1230a8a77b75a12d5ab103a03156e479e89deba18ebea62a5");

    let result = calculate_spin(&seed(), "player1", 1, bet).unwrap();
    assert_eq!(result.matrix_codes(), [[4, 1, 2], [5, 2, 1], [8, 3, 4]]);
    assert!(result.winning_lines.is_empty());
    assert_eq!(result.payout, 0);

    let leaf = fairness::leaf_hash(WALLET, 1, &seed(), "player1", bet, &result.matrix_codes(), result.payout).unwrap();
    assert_eq!(leaf, "52655938befc054d043c33d5e331b69c3cb311aa3344ce050e02f46419f74207");
}

#[test]
fn test_reference_spin_is_reproducible() {
    let a = calculate_spin(&seed(), "player1", 1, 1_000_000_000).unwrap();
    let b = calculate_spin(&seed(), "player1", 1, 1_000_000_000).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_reference_winning_spin() {
    let result = calculate_spin(&seed(), "player1", 4, 7).unwrap();
    assert_eq!(result.matrix[0], [Symbol::Cherry; 3]);
    assert_eq!(result.winning_lines, vec![0]);
    assert_eq!(result.payout, 14);
    assert!(result.to_outcome().is_win);
}

#[test]
fn test_each_input_changes_commitment() {
    let (_, base) = derive_outcome(&seed(), "player1", 1, 32).unwrap();
    let (_, other_nonce) = derive_outcome(&seed(), "player1", 2, 32).unwrap();
    let (_, other_client) = derive_outcome(&seed(), "player2", 1, 32).unwrap();
    let (_, other_server) = derive_outcome(&"bb".repeat(32), "player1", 1, 32).unwrap();

    assert_ne!(base, other_nonce);
    assert_ne!(base, other_client);
    assert_ne!(base, other_server);
}

#[test]
fn test_malformed_seed_is_rejected() {
    assert!(matches!(
        calculate_spin("zz-not-hex", "player1", 1, 1),
        Err(SettlementError::InvalidSeed(_))
    ));
}

#[test]
fn test_client_seed_rules() {
    for ok in ["player1", "a", "seed_with.dots:and-dashes", &"x".repeat(64)] {
        assert!(fairness::validate_client_seed(ok).is_ok(), "{}", ok);
    }
    for bad in ["", "has space", "semi;colon", &"x".repeat(65)] {
        assert!(fairness::validate_client_seed(bad).is_err(), "{:?}", bad);
    }
}

#[test]
fn test_seed_hash_commits_to_hex_string() {
    assert_eq!(
        fairness::seed_hash("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
