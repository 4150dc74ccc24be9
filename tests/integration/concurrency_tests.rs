//! Concurrent requests against one wallet

use std::collections::HashSet;
use spinvault::{SettlementError, SpinReceipt};

use crate::mocks::{wallet, Harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spins_get_unique_nonces() {
    let h = Harness::new();
    let player = wallet(50);
    h.fund(&player, 100_000).await;
    h.core.init_session(&player).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let core = h.core.clone();
            let player = player.clone();
            tokio::spawn(async move { core.spin(&player, 100, &format!("client-{}", i)).await })
        })
        .collect();

    let mut receipts: Vec<SpinReceipt> = Vec::new();
    for handle in handles {
        receipts.push(handle.await.unwrap().unwrap());
    }

    let nonces: HashSet<u64> = receipts.iter().map(|r| r.spin.spin_nonce).collect();
    assert_eq!(nonces, (1..=20).collect::<HashSet<u64>>());

    let payouts: u64 = receipts.iter().map(|r| r.spin.payout_amount).sum();
    assert_eq!(h.core.balance(&player).await.unwrap(), 100_000 - 2_000 + payouts);

    // every spin revealed a distinct seed
    let seeds: HashSet<&str> = receipts.iter().map(|r| r.spin.server_seed.as_str()).collect();
    assert_eq!(seeds.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_withdrawal_racing_spins_never_overdraws() {
    let h = Harness::new();
    let player = wallet(51);
    h.fund(&player, 1_000).await;
    h.core.init_session(&player).await.unwrap();

    let withdraw = {
        let core = h.core.clone();
        let player = player.clone();
        tokio::spawn(async move { core.withdraw(&player, 1_000).await })
    };
    let spins: Vec<_> = (0..10)
        .map(|_| {
            let core = h.core.clone();
            let player = player.clone();
            tokio::spawn(async move { core.spin(&player, 100, "race").await })
        })
        .collect();

    let withdrawn = match withdraw.await.unwrap() {
        Ok(auth) => auth.amount,
        Err(SettlementError::InsufficientFunds) => 0,
        Err(other) => panic!("unexpected withdrawal error: {}", other),
    };

    let mut net = 0i64;
    for handle in spins {
        match handle.await.unwrap() {
            Ok(receipt) => net += receipt.spin.payout_amount as i64 - 100,
            Err(SettlementError::InsufficientFunds) => {}
            Err(other) => panic!("unexpected spin error: {}", other),
        }
    }

    let balance = h.core.balance(&player).await.unwrap() as i64;
    assert_eq!(balance, 1_000 - withdrawn as i64 + net);
    assert!(balance >= 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_deposit_synced_concurrently_credits_once() {
    let h = Harness::new();
    let player = wallet(52);
    let signature = h.publish_deposit(&player, 4_000);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let core = h.core.clone();
            let player = player.clone();
            let signature = signature.clone();
            tokio::spawn(async move { core.sync_deposit(&player, &signature).await })
        })
        .collect();

    let mut credited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => credited += 1,
            Err(SettlementError::DepositAlreadyProcessed(_)) => {}
            Err(other) => panic!("unexpected deposit error: {}", other),
        }
    }

    assert_eq!(credited, 1);
    assert_eq!(h.core.balance(&player).await.unwrap(), 4_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spins_on_different_wallets_run_independently() {
    let h = Harness::new();
    let players: Vec<String> = (53..58).map(wallet).collect();
    for player in &players {
        h.fund(player, 1_000).await;
    }

    let handles: Vec<_> = players
        .iter()
        .flat_map(|player| {
            (0..4).map(move |_| player.clone())
        })
        .map(|player| {
            let core = h.core.clone();
            tokio::spawn(async move { core.spin(&player, 10, "parallel").await.map(|r| r.spin) })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for player in &players {
        let nonces: HashSet<u64> = h.core.history(player).await.unwrap().iter().map(|s| s.spin_nonce).collect();
        assert_eq!(nonces, (1..=4).collect::<HashSet<u64>>());
    }
}
