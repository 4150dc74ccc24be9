//! Property-based tests for balance accounting across random player activity

use proptest::prelude::*;
use spinvault::{Repository, SettlementError};

use crate::mocks::{wallet, Harness};

#[derive(Debug, Clone)]
enum Action {
    Deposit(u64),
    Spin(u64),
    Withdraw(u64),
    Complete,
    Refund,
    NewSession,
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        1 => (1u64..5_000).prop_map(Action::Deposit),
        4 => (1u64..800).prop_map(Action::Spin),
        1 => (1u64..3_000).prop_map(Action::Withdraw),
        1 => Just(Action::Complete),
        1 => Just(Action::Refund),
        1 => Just(Action::NewSession),
    ]
}

/// Expected player state, mirrored alongside the core
#[derive(Debug, Default)]
struct Model {
    balance: u64,
    pending: Option<u64>,
    next_nonce: u64,
}

async fn replay(actions: Vec<Action>) -> Result<(), TestCaseError> {
    let h = Harness::new();
    let player = wallet(90);
    h.fund(&player, 1_000).await;
    let mut model = Model {
        balance: 1_000,
        pending: None,
        next_nonce: 1,
    };

    for action in actions {
        match action {
            Action::Deposit(amount) => {
                h.fund(&player, amount).await;
                model.balance += amount;
            }
            Action::Spin(bet) => match h.core.spin(&player, bet, "prop").await {
                Ok(receipt) => {
                    prop_assert!(model.balance >= bet);
                    model.balance = model.balance - bet + receipt.spin.payout_amount;
                    prop_assert_eq!(receipt.balance, model.balance);
                }
                Err(SettlementError::InsufficientFunds) => prop_assert!(model.balance < bet),
                Err(other) => return Err(TestCaseError::fail(format!("spin: {}", other))),
            },
            Action::Withdraw(amount) => match h.core.withdraw(&player, amount).await {
                Ok(auth) => match model.pending {
                    Some(pending) => prop_assert_eq!(pending, amount),
                    None => {
                        prop_assert_eq!(auth.nonce, model.next_nonce);
                        model.balance -= amount;
                        model.pending = Some(amount);
                        model.next_nonce += 1;
                    }
                },
                Err(SettlementError::PendingWithdrawalMismatch { pending }) => {
                    prop_assert_eq!(Some(pending), model.pending)
                }
                Err(SettlementError::InsufficientFunds) => {
                    prop_assert!(model.pending.is_none() && model.balance < amount)
                }
                Err(other) => return Err(TestCaseError::fail(format!("withdraw: {}", other))),
            },
            Action::Complete => {
                h.core
                    .complete_withdrawal(&player)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("complete: {}", e)))?;
                model.pending = None;
            }
            // the mock ledger never consumed a nonce, so any pending amount comes back
            Action::Refund => match h.core.refund(&player).await {
                Ok(outcome) => {
                    prop_assert_eq!(Some(outcome.amount), model.pending);
                    model.balance += outcome.amount;
                    model.pending = None;
                    model.next_nonce = 1;
                }
                Err(SettlementError::NoPendingWithdrawal) => prop_assert!(model.pending.is_none()),
                Err(other) => return Err(TestCaseError::fail(format!("refund: {}", other))),
            },
            Action::NewSession => {
                h.core
                    .init_session(&player)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("init session: {}", e)))?;
            }
        }

        prop_assert_eq!(h.core.balance(&player).await.unwrap(), model.balance);
        let active = h.store.sessions_for(&player).await.iter().filter(|s| s.is_active).count();
        prop_assert_eq!(active, 1);
    }

    let user = h.store.get_user(&player).await.unwrap().unwrap();
    prop_assert_eq!(user.next_withdrawal_nonce, model.next_nonce);
    prop_assert_eq!(user.pending_withdrawal.map(|p| p.amount), model.pending);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_balance_tracks_every_action(actions in prop::collection::vec(arb_action(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(replay(actions))?;
    }
}
