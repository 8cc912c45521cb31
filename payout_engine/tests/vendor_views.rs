use chrono::Duration;
use payout_engine::{
    db_types::{Cents, OrderId, PayoutStatus},
    payout_objects::{Pagination, PayoutQueryFilter, TransferLogFilter},
    traits::RailError,
    SettlementError,
};

use crate::support::prepare_env::{no_fees, start_time, TestEnv};

mod support;

#[tokio::test]
async fn earnings_summary_tracks_balances() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let bob = env.vendor_without_account("Bob").await;

    let summary = env.vendors.earnings_summary(bob.id).await.unwrap();
    assert!(!summary.onboarded);
    assert_eq!(summary.pending_earnings, Cents::ZERO);

    env.paid_order("1001", &[(alice.id, 1_000), (bob.id, 700)], 0).await;
    env.paid_order("1002", &[(alice.id, 2_000)], 0).await;
    let summary = env.vendors.earnings_summary(alice.id).await.unwrap();
    assert!(summary.onboarded);
    assert_eq!(summary.pending_earnings, Cents::from(3_000));
    assert_eq!(summary.paid_earnings, Cents::ZERO);

    env.advance_days(14);
    env.settlement.run_settlement().await.unwrap();
    let summary = env.vendors.earnings_summary(alice.id).await.unwrap();
    assert_eq!(summary.pending_earnings, Cents::ZERO);
    assert_eq!(summary.paid_earnings, Cents::from(3_000));
    assert_eq!(summary.debt_balance, Cents::ZERO);

    let err = env.vendors.earnings_summary(4_040).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotFound(_)), "{err}");
    env.tear_down().await;
}

#[tokio::test]
async fn pending_sales_count_down_to_eligibility() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let first = env.paid_order("2001", &[(alice.id, 1_000)], 0).await;
    env.clock.advance(Duration::days(3) + Duration::hours(1));
    let second = env.paid_order("2002", &[(alice.id, 500)], 0).await;

    let sales = env.vendors.pending_sales(alice.id).await.unwrap();
    assert_eq!(sales.len(), 2);
    assert_eq!(sales[0].payout_id, first[0].id);
    assert_eq!(sales[0].eligible_at, start_time() + Duration::days(14));
    assert_eq!(sales[0].days_remaining, 11);
    assert_eq!(sales[1].payout_id, second[0].id);
    assert_eq!(sales[1].days_remaining, 14);
    assert_eq!(sales[1].amount, Cents::from(500));

    // The first sale becomes eligible and is paid; only the second is left
    env.clock.advance(Duration::days(11));
    env.settlement.run_settlement().await.unwrap();
    let sales = env.vendors.pending_sales(alice.id).await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].order_id, OrderId::from("2002"));
    assert_eq!(sales[0].days_remaining, 3);

    let err = env.vendors.pending_sales(777).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotFound(_)), "{err}");
    env.tear_down().await;
}

#[tokio::test]
async fn pending_sales_include_every_unpaid_sale() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let oldest = env.paid_order("4000", &[(alice.id, 700)], 0).await[0].id;
    for i in 1..=520 {
        env.clock.advance(Duration::minutes(1));
        env.paid_order(&format!("4{i:03}"), &[(alice.id, 100)], 0).await;
    }

    let sales = env.vendors.pending_sales(alice.id).await.unwrap();
    assert_eq!(sales.len(), 521);
    assert_eq!(sales[0].payout_id, oldest);
    assert_eq!(sales[0].amount, Cents::from(700));
    assert_eq!(sales[520].order_id, OrderId::from("4520"));
    let total = sales.iter().map(|s| s.amount).sum::<Cents>();
    assert_eq!(total, env.vendor(alice.id).await.pending_earnings);
    env.tear_down().await;
}

#[tokio::test]
async fn payout_history_is_paged_newest_first() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let bob = env.onboarded_vendor("Bob").await;
    for i in 0..5 {
        env.paid_order(&format!("30{i:02}"), &[(alice.id, 100 * (i + 1))], 0).await;
        env.clock.advance(Duration::hours(1));
    }
    env.paid_order("3100", &[(bob.id, 999)], 0).await;

    let page = env.vendors.payout_history(alice.id, Pagination::new(0, 2)).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.count, 2);
    assert_eq!(page.offset, 0);
    assert_eq!(page.payouts[0].order_id, OrderId::from("3004"));
    assert_eq!(page.payouts[1].order_id, OrderId::from("3003"));

    let page = env.vendors.payout_history(alice.id, Pagination::new(4, 2)).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.payouts[0].order_id, OrderId::from("3000"));
    assert_eq!(page.payouts[0].amount, Cents::from(100));
    assert!(page.payouts.iter().all(|p| p.status == PayoutStatus::Pending));
    env.tear_down().await;
}

#[tokio::test]
async fn admin_listing_and_stats() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    let bob = env.vendor_without_account("Bob").await;
    env.paid_order("4001", &[(alice.id, 1_000)], 0).await;
    env.paid_order("4002", &[(bob.id, 2_000)], 0).await;
    env.advance_days(10);
    env.paid_order("4003", &[(alice.id, 3_000)], 0).await;
    env.advance_days(4);

    let eligible = env.admin.eligible_payouts(Pagination::default()).await.unwrap();
    assert_eq!(eligible.total, 2);
    let orders = eligible.payouts.iter().map(|p| p.order_id.clone()).collect::<Vec<_>>();
    assert!(orders.contains(&OrderId::from("4001")));
    assert!(orders.contains(&OrderId::from("4002")));

    env.settlement.run_settlement().await.unwrap();
    let stats = env.admin.payment_stats().await.unwrap();
    assert_eq!(stats.paid_count, 1);
    assert_eq!(stats.paid_amount, Cents::from(1_000));
    assert_eq!(stats.transferred_amount, Cents::from(1_000));
    assert_eq!(stats.failed_count, 1);
    assert_eq!(stats.failed_amount, Cents::from(2_000));
    assert_eq!(stats.pending_count, 1);
    assert_eq!(stats.pending_amount, Cents::from(3_000));
    assert_eq!(stats.processing_count, 0);

    let failed = env
        .admin
        .list_payouts(PayoutQueryFilter::default().with_status(PayoutStatus::Failed), Pagination::default())
        .await
        .unwrap();
    assert_eq!(failed.total, 1);
    assert_eq!(failed.payouts[0].vendor_id, bob.id);
    let alice_payouts = env
        .admin
        .list_payouts(PayoutQueryFilter::default().with_vendor_id(alice.id), Pagination::default())
        .await
        .unwrap();
    assert_eq!(alice_payouts.total, 2);
    assert!(env.admin.payout_by_id(failed.payouts[0].id).await.unwrap().is_some());
    assert!(env.admin.payout_by_id(12_345).await.unwrap().is_none());
    assert_eq!(env.admin.vendor_by_id(bob.id).await.unwrap().map(|v| v.name), Some("Bob".to_string()));
    env.tear_down().await;
}

#[tokio::test]
async fn transfer_log_exports_as_csv() {
    let env = TestEnv::with_config(no_fees()).await;
    let alice = env.onboarded_vendor("Alice").await;
    env.paid_order("5001", &[(alice.id, 9_806)], 0).await;
    env.paid_order("5002", &[(alice.id, 150)], 0).await;
    env.advance_days(14);
    env.settlement.run_settlement().await.unwrap();
    let csv = env.admin.export_transfer_log(TransferLogFilter::default().with_vendor_id(alice.id)).await.unwrap();
    let lines = csv.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "id,created_at,payout_id,vendor_id,order_id,action,amount,rail_transfer_id,message");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",5001,Transferred,98.06,tr_sim_"), "{}", lines[1]);
    assert!(lines[2].contains(",5002,Transferred,1.50,tr_sim_"), "{}", lines[2]);

    env.paid_order("5003", &[(alice.id, 100)], 0).await;
    env.rail.fail_next_transfers(1, RailError::Unavailable("maintenance window".into()));
    env.admin.force_pay(env.payouts_for_vendor(alice.id).await[0].id).await.unwrap();
    let csv = env.admin.export_transfer_log(TransferLogFilter::default()).await.unwrap();
    let last = csv.lines().last().unwrap();
    assert!(last.contains(",5003,Failed,1.00,,"), "{last}");
    assert!(last.contains("maintenance window"), "{last}");
    env.tear_down().await;
}
