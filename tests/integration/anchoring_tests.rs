//! Batch anchoring end to end: spins, worker, ledger, proofs

use std::sync::Arc;
use spinvault::ledger::{parse_commit_batch_root_data, BatchCommitAccount, batch_commit_address};
use spinvault::merkle::verify_proof;
use spinvault::{AnchorOutcome, BatchStatus, LedgerClient, Repository, SettlementError};
use tokio_util::sync::CancellationToken;

use crate::mocks::{wallet, Harness};

#[tokio::test]
async fn test_spins_from_many_wallets_anchor_and_prove() {
    let h = Harness::new();
    let players: Vec<String> = (30..34).map(wallet).collect();
    for player in &players {
        h.fund(player, 10_000).await;
        for _ in 0..3 {
            h.core.spin(player, 25, "anchor").await.unwrap();
        }
    }

    let worker = h.core.batch_worker().unwrap();
    let report = worker.tick().await.unwrap();
    assert!(matches!(report.claimed, Some(AnchorOutcome::Committed { spins: 12, .. })));

    // the commitment the ledger holds matches the stored root
    let submitted = h.ledger.submitted();
    let (batch_id, root) = parse_commit_batch_root_data(&submitted[0].data).unwrap();
    let batch = h.store.get_batch(batch_id).await.unwrap().unwrap();
    assert_eq!(batch.merkle_root.as_deref(), Some(hex::encode(root).as_str()));

    let (commit_address, _) = batch_commit_address(batch_id, &h.config.ledger.program_id).unwrap();
    let account = h.ledger.get_account_data(&commit_address).await.unwrap().unwrap();
    assert_eq!(BatchCommitAccount::parse(&account).unwrap().merkle_root, root);

    for player in &players {
        for spin in h.core.history(player).await.unwrap() {
            let proof = h.core.spin_proof(spin.spin_id).await.unwrap();
            assert_eq!(proof.batch_id, batch_id);
            assert_eq!(proof.ledger_tx_signature, batch.ledger_tx_signature);
            assert!(verify_proof(&spin.leaf_hash, proof.leaf_index, &proof.proof, &hex::encode(root)));
        }
    }
}

#[tokio::test]
async fn test_proof_before_anchoring() {
    let h = Harness::new();
    let player = wallet(35);
    h.fund(&player, 1_000).await;
    let receipt = h.core.spin(&player, 10, "early").await.unwrap();

    assert!(matches!(
        h.core.spin_proof(receipt.spin.spin_id).await,
        Err(SettlementError::NotAnchoredYet { .. })
    ));
}

#[tokio::test]
async fn test_spins_after_claim_go_to_next_batch() {
    let h = Harness::new();
    let player = wallet(36);
    h.fund(&player, 1_000).await;
    let worker = h.core.batch_worker().unwrap();

    let first = h.core.spin(&player, 10, "a").await.unwrap().spin;
    worker.tick().await.unwrap();
    let second = h.core.spin(&player, 10, "a").await.unwrap().spin;
    worker.tick().await.unwrap();

    let first_proof = h.core.spin_proof(first.spin_id).await.unwrap();
    let second_proof = h.core.spin_proof(second.spin_id).await.unwrap();
    assert_eq!(first_proof.batch_id + 1, second_proof.batch_id);
    assert_ne!(first_proof.merkle_root, second_proof.merkle_root);
}

#[tokio::test]
async fn test_failed_batch_is_retried_and_keeps_its_spins() {
    let h = Harness::new();
    let player = wallet(37);
    h.fund(&player, 1_000).await;
    let spin = h.core.spin(&player, 10, "retry").await.unwrap().spin;

    let worker = h.core.batch_worker().unwrap();
    h.ledger.fail_next_submissions(1);
    let failed = worker.tick().await.unwrap();
    let Some(AnchorOutcome::SubmitFailed { batch_id, .. }) = failed.claimed else {
        panic!("expected failure, got {:?}", failed);
    };
    assert_eq!(h.store.get_batch(batch_id).await.unwrap().unwrap().status, BatchStatus::Open);

    // a new spin lands in a new batch, the failed batch is re-driven first
    let later = h.core.spin(&player, 10, "retry").await.unwrap().spin;
    let report = worker.tick().await.unwrap();
    assert!(matches!(report.redriven, Some(AnchorOutcome::Committed { batch_id: id, .. }) if id == batch_id));
    assert!(matches!(report.claimed, Some(AnchorOutcome::Committed { .. })));

    assert_eq!(h.core.spin_proof(spin.spin_id).await.unwrap().batch_id, batch_id);
    assert_ne!(h.core.spin_proof(later.spin_id).await.unwrap().batch_id, batch_id);
}

#[tokio::test]
async fn test_background_worker_anchors_until_cancelled() {
    let h = Harness::with_config(|c| c.worker.interval_secs = 1);
    let player = wallet(38);
    h.fund(&player, 1_000).await;
    let spin = h.core.spin(&player, 10, "bg").await.unwrap().spin;

    let worker = Arc::new(h.core.batch_worker().unwrap());
    let shutdown = CancellationToken::new();
    let handle = worker.clone().spawn(shutdown.clone());

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(h.core.spin_proof(spin.spin_id).await.unwrap().verify());
    assert_eq!(worker.stats().spins_anchored, 1);
}

#[tokio::test]
async fn test_lost_confirmation_is_not_resubmitted() {
    let h = Harness::new();
    let player = wallet(39);
    h.fund(&player, 1_000).await;
    let spin = h.core.spin(&player, 10, "lost").await.unwrap().spin;

    let worker = h.core.batch_worker().unwrap();
    h.ledger.lose_next_confirmations(1);
    let first = worker.tick().await.unwrap();
    assert!(matches!(first.claimed, Some(AnchorOutcome::SubmitFailed { attempts: 1, .. })));

    // the commitment already landed, so the re-drive only closes the batch
    let second = worker.tick().await.unwrap();
    assert!(matches!(second.redriven, Some(AnchorOutcome::Committed { tx_signature: None, .. })));
    assert_eq!(h.ledger.submitted().len(), 1);

    let proof = h.core.spin_proof(spin.spin_id).await.unwrap();
    assert!(proof.verify());
    assert!(proof.ledger_tx_signature.is_none());
}

#[tokio::test]
async fn test_batch_abandoned_after_max_attempts() {
    let h = Harness::with_config(|c| c.worker.max_submit_attempts = 2);
    let player = wallet(40);
    h.fund(&player, 1_000).await;
    let spin = h.core.spin(&player, 10, "doomed").await.unwrap().spin;

    let worker = h.core.batch_worker().unwrap();
    h.ledger.fail_next_submissions(10);
    worker.tick().await.unwrap();
    let second = worker.tick().await.unwrap();
    assert!(matches!(
        second.redriven,
        Some(AnchorOutcome::SubmitFailed { attempts: 2, status: BatchStatus::Failed, .. })
    ));

    let third = worker.tick().await.unwrap();
    assert!(third.is_idle());
    assert_eq!(worker.stats().batches_failed, 1);
    assert!(matches!(
        h.core.spin_proof(spin.spin_id).await,
        Err(SettlementError::NotAnchoredYet { .. })
    ));
}
