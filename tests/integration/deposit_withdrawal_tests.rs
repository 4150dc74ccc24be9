//! Deposits, withdrawal authorization and refund reconciliation

use spinvault::crypto::signer::recover_authority;
use spinvault::crypto::WithdrawalSigner;
use spinvault::{Pubkey, Repository, SettlementError, TransactionBalances};

use crate::mocks::{wallet, Harness, SIGNER_KEY};

#[tokio::test]
async fn test_deposit_replay_does_not_change_balance() {
    let h = Harness::new();
    let player = wallet(10);
    let signature = h.fund(&player, 2_500).await;

    for _ in 0..3 {
        let err = h.core.sync_deposit(&player, &signature).await.unwrap_err();
        assert!(matches!(err, SettlementError::DepositAlreadyProcessed(_)));
    }
    assert_eq!(h.core.balance(&player).await.unwrap(), 2_500);
}

#[tokio::test]
async fn test_deposit_credits_active_session() {
    let h = Harness::new();
    let player = wallet(11);
    let start = h.core.init_session(&player).await.unwrap();

    h.fund(&player, 700).await;
    h.fund(&player, 300).await;

    let session = h.store.get_active_session(&player).await.unwrap().unwrap();
    assert_eq!(session.session_id, start.session_id);
    assert_eq!(session.playable_balance, 1_000);
}

#[tokio::test]
async fn test_deposit_claimed_by_wrong_wallet() {
    let h = Harness::new();
    let owner = wallet(12);
    let thief = wallet(13);
    let signature = h.publish_deposit(&owner, 900);

    let err = h.core.sync_deposit(&thief, &signature).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidDeposit { .. }));

    h.core.sync_deposit(&owner, &signature).await.unwrap();
    assert_eq!(h.core.balance(&owner).await.unwrap(), 900);
    assert_eq!(h.core.balance(&thief).await.unwrap(), 0);
}

#[tokio::test]
async fn test_deposit_with_vault_outflow_rejected() {
    let h = Harness::new();
    let player = wallet(14);
    let player_key: Pubkey = player.parse().unwrap();
    h.ledger.add_transaction(
        "outflow",
        TransactionBalances {
            account_keys: vec![player_key, h.vault()],
            pre_balances: vec![0, 1_000],
            post_balances: vec![500, 500],
            error: None,
        },
    );

    let err = h.core.sync_deposit(&player, "outflow").await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidDeposit { .. }));
}

#[tokio::test]
async fn test_deposit_when_ledger_unreachable() {
    let h = Harness::new();
    let player = wallet(15);
    let signature = h.publish_deposit(&player, 100);
    h.ledger.set_rpc_down(true);

    let err = h.core.sync_deposit(&player, &signature).await.unwrap_err();
    assert!(!err.is_domain_error());

    h.ledger.set_rpc_down(false);
    h.core.sync_deposit(&player, &signature).await.unwrap();
    assert_eq!(h.core.balance(&player).await.unwrap(), 100);
}

#[tokio::test]
async fn test_withdrawal_retry_returns_same_authorization() {
    let h = Harness::new();
    let player = wallet(16);
    h.fund(&player, 5_000).await;

    let first = h.core.withdraw(&player, 2_000).await.unwrap();
    let second = h.core.withdraw(&player, 2_000).await.unwrap();

    assert_eq!(first.signature, second.signature);
    assert_eq!(first.nonce, second.nonce);
    assert_eq!(h.core.balance(&player).await.unwrap(), 3_000);

    let user = h.store.get_user(&player).await.unwrap().unwrap();
    assert_eq!(user.next_withdrawal_nonce, 2);
}

#[tokio::test]
async fn test_withdrawal_signature_verifies_on_chain_style() {
    let h = Harness::new();
    let player = wallet(17);
    h.fund(&player, 5_000).await;

    let auth = h.core.withdraw(&player, 1_234).await.unwrap();
    let player_key: Pubkey = player.parse().unwrap();
    let authority = WithdrawalSigner::from_hex(SIGNER_KEY).unwrap().signing_authority();

    assert_eq!(
        recover_authority(&player_key, auth.amount, auth.nonce, &auth.signature).unwrap(),
        authority
    );
}

#[tokio::test]
async fn test_withdraw_complete_withdraw_advances_nonce() {
    let h = Harness::new();
    let player = wallet(18);
    h.fund(&player, 5_000).await;

    let first = h.core.withdraw(&player, 1_000).await.unwrap();
    h.core.complete_withdrawal(&player).await.unwrap();
    let second = h.core.withdraw(&player, 1_000).await.unwrap();

    assert_eq!(first.nonce, 1);
    assert_eq!(second.nonce, 2);
    assert_ne!(first.signature, second.signature);
    assert_eq!(h.core.balance(&player).await.unwrap(), 3_000);
}

#[tokio::test]
async fn test_refund_after_unsubmitted_withdrawal() {
    let h = Harness::new();
    let player = wallet(19);
    let player_key: Pubkey = player.parse().unwrap();
    h.fund(&player, 5_000).await;

    // nonce 1 landed on chain
    h.core.withdraw(&player, 1_000).await.unwrap();
    h.ledger.set_user_balance(&h.config.ledger.program_id, &player_key, 0, 1);
    h.core.complete_withdrawal(&player).await.unwrap();

    // nonce 2 never submitted
    h.core.withdraw(&player, 500).await.unwrap();
    assert_eq!(h.core.balance(&player).await.unwrap(), 3_500);

    let outcome = h.core.refund(&player).await.unwrap();
    assert_eq!(outcome.amount, 500);
    assert_eq!(outcome.next_nonce, 2);
    assert_eq!(h.core.balance(&player).await.unwrap(), 4_000);

    // the freed nonce is reused by the next authorization
    let next = h.core.withdraw(&player, 100).await.unwrap();
    assert_eq!(next.nonce, 2);
}

#[tokio::test]
async fn test_refund_refused_when_nonce_consumed() {
    let h = Harness::new();
    let player = wallet(20);
    let player_key: Pubkey = player.parse().unwrap();
    h.fund(&player, 5_000).await;

    h.core.withdraw(&player, 1_000).await.unwrap();
    h.ledger.set_user_balance(&h.config.ledger.program_id, &player_key, 0, 1);

    assert!(matches!(
        h.core.refund(&player).await,
        Err(SettlementError::RefundRefused { nonce: 1 })
    ));
    assert_eq!(h.core.balance(&player).await.unwrap(), 4_000);

    // the player can still close it out
    h.core.complete_withdrawal(&player).await.unwrap();
    assert!(matches!(h.core.refund(&player).await, Err(SettlementError::NoPendingWithdrawal)));
}

#[tokio::test]
async fn test_withdraw_more_than_balance() {
    let h = Harness::new();
    let player = wallet(22);
    h.fund(&player, 100).await;

    assert!(matches!(h.core.withdraw(&player, 101).await, Err(SettlementError::InsufficientFunds)));
    assert_eq!(h.core.balance(&player).await.unwrap(), 100);
    let user = h.store.get_user(&player).await.unwrap().unwrap();
    assert_eq!(user.next_withdrawal_nonce, 1);
}
