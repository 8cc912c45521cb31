use std::time::Duration as StdDuration;

use chrono::Duration;
use payout_engine::{
    db_types::{Cents, OrderId, PayoutStatus, TransferAction},
    events::AlertKind,
    payout_objects::{SettlementConfig, TransferLogFilter},
    traits::{PaymentRail, PayoutQueries, RailError, RailTransferRequest, SettlementDatabase, TransferPlan},
    PayoutOutcome,
    SettlementError,
};

use crate::support::prepare_env::{no_fees, TestEnv};

mod support;

#[tokio::test]
async fn overrides_in_the_wrong_state_change_nothing() {
    let mut env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("1001", &[(alice.id, 1_000)], 0).await;
    let id = payouts[0].id;

    let err = env.admin.retry(id).await.unwrap_err();
    assert!(err.is_conflict(), "{err}");

    env.admin.force_pay(id).await.unwrap();
    env.events.take();
    let before = env.payout(id).await;
    let vendor_before = env.vendor(alice.id).await;

    let err = env.admin.force_pay(id).await.unwrap_err();
    assert!(err.is_conflict(), "{err}");
    let err = env.admin.retry(id).await.unwrap_err();
    assert!(err.is_conflict(), "{err}");
    let err = env.admin.mark_paid_without_transfer(id, "paid by cheque").await.unwrap_err();
    assert!(err.is_conflict(), "{err}");
    let err = env.admin.force_pay(9_999).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotFound(_)), "{err}");

    assert_eq!(env.payout(id).await, before);
    assert_eq!(env.vendor(alice.id).await, vendor_before);
    assert_eq!(env.rail.transfers().len(), 1);
    assert!(env.events.take().is_empty());
    env.tear_down().await;
}

#[tokio::test]
async fn mark_paid_without_transfer() {
    let mut env = TestEnv::with_config(no_fees()).await;
    let alice = env.vendor_without_account("Alice").await;
    let payouts = env.paid_order("2001", &[(alice.id, 4_200)], 0).await;
    let id = payouts[0].id;

    let err = env.admin.mark_paid_without_transfer(id, "  ").await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)), "{err}");
    assert_eq!(env.payout(id).await.status, PayoutStatus::Pending);

    let settlement = env.admin.mark_paid_without_transfer(id, "Paid by bank transfer, ref 8812").await.unwrap();
    let expected_reference = format!("manual-{id}-{}", env.now().timestamp());
    assert_eq!(settlement.payout.status, PayoutStatus::Paid);
    assert_eq!(settlement.payout.rail_transfer_id.as_deref(), Some(expected_reference.as_str()));
    assert_eq!(settlement.payout.note.as_deref(), Some("Paid by bank transfer, ref 8812"));
    assert_eq!(settlement.payout.payment_date, Some(env.now()));
    assert_eq!(settlement.vendor.pending_earnings, Cents::ZERO);
    assert_eq!(settlement.vendor.paid_earnings, Cents::from(4_200));
    assert!(env.rail.transfers().is_empty());

    let recorded = env.events.take();
    assert_eq!(recorded.paid.len(), 1);
    assert_eq!(recorded.paid[0].transferred, Cents::from(4_200));

    let log = env.db.fetch_transfer_log(TransferLogFilter::default().with_payout_id(id)).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, TransferAction::ManuallySettled);
    assert_eq!(log[0].message.as_deref(), Some("Paid by bank transfer, ref 8812"));
    env.tear_down().await;
}

#[tokio::test]
async fn debt_entries_cannot_be_paid_out() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("3001", &[(alice.id, 1_500)], 0).await;
    env.admin.force_pay(payouts[0].id).await.unwrap();
    let refund = env.refunds.refund_order(&OrderId::from("3001"), "damaged in transit").await.unwrap();
    let debt_id = refund.debts[0].0.id;

    let err = env.admin.mark_paid_without_transfer(debt_id, "written off").await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)), "{err}");
    let err = env.admin.force_pay(debt_id).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)), "{err}");
    let debt = env.payout(debt_id).await;
    assert_eq!(debt.status, PayoutStatus::Pending);
    assert_eq!(env.vendor(alice.id).await.debt_balance, Cents::from(1_500));
    env.tear_down().await;
}

#[tokio::test]
async fn force_pay_needs_an_onboarded_vendor() {
    let mut env = TestEnv::with_config(no_fees()).await;
    let bob = env.vendor_without_account("Bob").await;
    let payouts = env.paid_order("4001", &[(bob.id, 2_000)], 0).await;
    let id = payouts[0].id;

    let err = env.admin.force_pay(id).await.unwrap_err();
    match err {
        SettlementError::Validation(msg) => assert!(msg.starts_with("rail account not ready"), "{msg}"),
        other => panic!("Expected a validation error, got {other}"),
    }
    let payout = env.payout(id).await;
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.attempts, 0);
    assert_eq!(env.vendor(bob.id).await.pending_earnings, Cents::from(2_000));
    assert!(env.events.take().is_empty());

    // Onboarding fixes it
    let bob = env.admin.onboard_vendor(bob.id).await.unwrap();
    assert!(bob.rail_account_id.is_some());
    let again = env.admin.onboard_vendor(bob.id).await.unwrap();
    assert_eq!(again.rail_account_id, bob.rail_account_id);
    let outcome = env.admin.force_pay(id).await.unwrap();
    assert!(outcome.is_paid());
    env.tear_down().await;
}

#[tokio::test]
async fn rejected_transfer_can_be_retried() {
    let mut env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("5001", &[(alice.id, 3_300)], 0).await;
    let id = payouts[0].id;
    env.advance_days(14);
    env.rail.fail_next_transfers(1, RailError::Rejected("card_declined".into()));

    let summary = env.settlement.run_settlement().await.unwrap();
    assert_eq!(summary.failed, 1);
    let failed = env.payout(id).await;
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert!(failed.failure_reason.as_deref().unwrap().contains("card_declined"));
    assert_eq!(env.vendor(alice.id).await.pending_earnings, Cents::ZERO);
    env.events.take();

    let outcome = env.admin.retry(id).await.unwrap();
    let PayoutOutcome::Transferred(settlement) = outcome else { panic!("Expected a transfer, got {outcome:?}") };
    assert_eq!(settlement.payout.status, PayoutStatus::Paid);
    assert_eq!(settlement.payout.attempts, 2);
    assert!(settlement.payout.failure_reason.is_none());
    assert_eq!(settlement.vendor.pending_earnings, Cents::ZERO);
    assert_eq!(settlement.vendor.paid_earnings, Cents::from(3_300));
    let transfers = env.rail.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].request.idempotency_key(), format!("payout-{id}-attempt-2"));
    let recorded = env.events.take();
    assert_eq!(recorded.paid.len(), 1);
    env.tear_down().await;
}

#[tokio::test]
async fn slow_rail_fails_the_payout() {
    let config = SettlementConfig { rail_timeout: StdDuration::from_millis(50), ..no_fees() };
    let mut env = TestEnv::with_config(config).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("6001", &[(alice.id, 800)], 0).await;
    let id = payouts[0].id;
    env.rail.set_transfer_delay(Some(StdDuration::from_millis(200)));

    let outcome = env.admin.force_pay(id).await.unwrap();
    let PayoutOutcome::Failed { payout, reason } = outcome else { panic!("Expected a failure, got {outcome:?}") };
    assert_eq!(payout.status, PayoutStatus::Failed);
    assert!(reason.contains("did not respond within 50ms"), "{reason}");
    assert!(env.rail.transfers().is_empty());
    let recorded = env.events.take();
    assert_eq!(recorded.alerts.len(), 1);
    assert_eq!(recorded.alerts[0].kind, AlertKind::TransferFailed);

    env.rail.set_transfer_delay(None);
    let outcome = env.admin.retry(id).await.unwrap();
    assert!(matches!(outcome, PayoutOutcome::Transferred(_)));
    let paid = env.payout(id).await;
    assert_eq!(paid.status, PayoutStatus::Paid);
    assert_eq!(paid.attempts, 2);
    assert_eq!(env.rail.transfers().len(), 1);
    env.tear_down().await;
}

#[tokio::test]
async fn retry_after_lost_response_does_not_pay_twice() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("7001", &[(alice.id, 5_000)], 0).await;
    let id = payouts[0].id;
    env.rail.lose_next_responses(1);

    let outcome = env.admin.force_pay(id).await.unwrap();
    assert!(!outcome.is_paid());
    assert_eq!(env.rail.transfers().len(), 1);
    assert_eq!(env.payout(id).await.status, PayoutStatus::Failed);

    let outcome = env.admin.retry(id).await.unwrap();
    let PayoutOutcome::Reconciled(settlement) = outcome else { panic!("Expected reconciliation, got {outcome:?}") };
    let transfers = env.rail.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(settlement.payout.rail_transfer_id, Some(transfers[0].transfer.transfer_id.clone()));
    assert_eq!(settlement.vendor.paid_earnings, Cents::from(5_000));
    assert_eq!(env.rail.total_transferred(), Cents::from(5_000));

    let log = env.db.fetch_transfer_log(TransferLogFilter::default().with_payout_id(id)).await.unwrap();
    let actions = log.iter().map(|e| e.action).collect::<Vec<_>>();
    assert_eq!(actions, vec![TransferAction::Failed, TransferAction::Reconciled]);
    env.tear_down().await;
}

#[tokio::test]
async fn stuck_payout_without_transfer_is_failed() {
    let mut env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("8001", &[(alice.id, 1_000)], 0).await;
    let id = payouts[0].id;
    // A run that crashed straight after the checkpoint
    let plan = env.db.begin_transfer(id, PayoutStatus::Pending, env.now()).await.unwrap();
    assert!(matches!(plan, TransferPlan::Transfer { .. }));

    env.clock.advance(Duration::minutes(30));
    let summary = env.settlement.run_settlement().await.unwrap();
    assert_eq!(summary.reconciled, 0);
    assert_eq!(env.payout(id).await.status, PayoutStatus::Processing);

    env.clock.advance(Duration::minutes(31));
    let summary = env.settlement.run_settlement().await.unwrap();
    assert_eq!(summary.reconciled, 1);
    let payout = env.payout(id).await;
    assert_eq!(payout.status, PayoutStatus::Failed);
    assert!(payout.failure_reason.as_deref().unwrap().starts_with("no transfer found"));
    assert_eq!(env.vendor(alice.id).await.pending_earnings, Cents::ZERO);
    let recorded = env.events.take();
    assert_eq!(recorded.alerts.len(), 1);
    assert_eq!(recorded.alerts[0].kind, AlertKind::StuckPayout);
    assert_eq!(recorded.alerts[0].payout_id, Some(id));
    assert_eq!(recorded.failed.len(), 1);
    env.tear_down().await;
}

#[tokio::test]
async fn stuck_payout_with_transfer_is_recorded() {
    let mut env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let payouts = env.paid_order("9001", &[(alice.id, 1_750)], 0).await;
    let id = payouts[0].id;
    let TransferPlan::Transfer { payout, amount, .. } =
        env.db.begin_transfer(id, PayoutStatus::Pending, env.now()).await.unwrap()
    else {
        panic!("Expected a transfer plan");
    };
    // The transfer went out, but the process died before recording it
    let request = RailTransferRequest {
        destination: alice.rail_account_id.clone().unwrap(),
        amount,
        currency: "EUR".into(),
        payout_id: id,
        order_id: payout.order_id.clone(),
        vendor_id: alice.id,
        attempt: payout.attempts,
    };
    let transfer = env.rail.transfer(request).await.unwrap();

    env.clock.advance(Duration::minutes(61));
    let summary = env.settlement.run_settlement().await.unwrap();
    assert_eq!(summary.reconciled, 1);
    let payout = env.payout(id).await;
    assert_eq!(payout.status, PayoutStatus::Paid);
    assert_eq!(payout.rail_transfer_id, Some(transfer.transfer_id));
    let vendor = env.vendor(alice.id).await;
    assert_eq!(vendor.pending_earnings, Cents::ZERO);
    assert_eq!(vendor.paid_earnings, Cents::from(1_750));
    assert_eq!(env.rail.transfers().len(), 1);
    let recorded = env.events.take();
    assert!(recorded.alerts.is_empty());
    assert_eq!(recorded.paid.len(), 1);
    env.tear_down().await;
}

#[tokio::test]
async fn retry_adopting_an_earlier_transfer_keeps_the_debt() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let big = env.paid_order("7101", &[(alice.id, 5_000)], 0).await[0].id;
    let small = env.paid_order("7102", &[(alice.id, 1_000)], 0).await[0].id;

    // The full 50.00 reaches alice, but the response is lost
    env.rail.lose_next_responses(1);
    assert!(!env.admin.force_pay(big).await.unwrap().is_paid());
    // Alice picks up 10.00 of debt before the retry
    assert!(env.admin.force_pay(small).await.unwrap().is_paid());
    env.refunds.refund_order(&OrderId::from("7102"), "returned").await.unwrap();
    assert_eq!(env.vendor(alice.id).await.debt_balance, Cents::from(1_000));

    let outcome = env.admin.retry(big).await.unwrap();
    let PayoutOutcome::Reconciled(settlement) = outcome else { panic!("Expected reconciliation, got {outcome:?}") };
    assert_eq!(settlement.payout.debt_offset, Cents::ZERO);
    assert_eq!(env.rail.transfers().len(), 2);
    assert_eq!(env.rail.total_transferred(), Cents::from(6_000));
    let vendor = env.vendor(alice.id).await;
    assert_eq!(vendor.debt_balance, Cents::from(1_000));
    assert_eq!(vendor.paid_earnings, Cents::from(6_000));
    assert_eq!(vendor.pending_earnings, Cents::ZERO);
    env.assert_pending_earnings_consistent(alice.id).await;

    let log = env.db.fetch_transfer_log(TransferLogFilter::default().with_payout_id(big)).await.unwrap();
    let actions = log.iter().map(|e| e.action).collect::<Vec<_>>();
    assert_eq!(actions, vec![TransferAction::Failed, TransferAction::Reconciled]);
    env.tear_down().await;
}

#[tokio::test]
async fn retry_leaves_the_payout_alone_when_the_rail_cannot_be_checked() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let id = env.paid_order("7201", &[(alice.id, 2_500)], 0).await[0].id;
    env.rail.lose_next_responses(1);
    assert!(!env.admin.force_pay(id).await.unwrap().is_paid());
    let before = env.payout(id).await;
    let vendor_before = env.vendor(alice.id).await;

    env.rail.fail_next_lookups(1, RailError::Unavailable("lookup timed out".into()));
    let err = env.admin.retry(id).await.unwrap_err();
    assert!(matches!(err, SettlementError::Rail(_)), "{err}");
    assert_eq!(env.payout(id).await, before);
    assert_eq!(env.vendor(alice.id).await, vendor_before);
    assert_eq!(env.rail.transfers().len(), 1);

    // Once the rail answers again the earlier transfer is adopted
    let outcome = env.admin.retry(id).await.unwrap();
    assert!(matches!(outcome, PayoutOutcome::Reconciled(_)), "{outcome:?}");
    assert_eq!(env.rail.total_transferred(), Cents::from(2_500));
    env.tear_down().await;
}

#[tokio::test]
async fn registered_vendors_are_visible_straight_away() {
    let env = TestEnv::new().await;
    for i in 0..20 {
        let vendor = env.vendor_without_account(&format!("Vendor{i}")).await;
        let stored = env.db.fetch_vendor(vendor.id).await.unwrap();
        assert_eq!(stored.as_ref(), Some(&vendor));
        let onboarded = env.admin.onboard_vendor(vendor.id).await.unwrap();
        let account = onboarded.rail_account_id.clone();
        assert!(account.is_some());
        assert_eq!(env.vendor(vendor.id).await.rail_account_id, account);
    }
    env.tear_down().await;
}
