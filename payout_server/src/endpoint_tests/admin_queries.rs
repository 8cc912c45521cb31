use std::sync::Arc;

use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, TimeZone, Utc};
use payout_engine::{
    db_types::{Cents, OrderId, PayoutStatus, TransferAction, TransferLogEntry},
    events::EventProducers,
    helpers::{ManualClock, SimulatedRail},
    payout_objects::{PaymentStats, PayoutQueryFilter, SettlementConfig},
    AdminApi,
    SettlementApi,
};
use serde_json::Value;

use super::helpers::{get_request, now, payout};
use crate::{
    endpoint_tests::mocks::MockLedger,
    routes::{health, EligiblePayoutsRoute, ListPayoutsRoute, PaymentStatsRoute, PayoutByIdRoute, TransferLogRoute},
};

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/health", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn fetch_payout_by_id() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/admin/payouts/3", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let payout: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(payout["id"], 3);
    assert_eq!(payout["status"], "paid");
    assert_eq!(payout["amount"], 4850);
    assert_eq!(payout["rail_transfer_id"], "tr_sim_0003");
}

#[actix_web::test]
async fn fetch_missing_payout() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/admin/payouts/99", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Payout #99"}"#);
}

#[actix_web::test]
async fn list_failed_payouts_for_a_vendor() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        get_request("/admin/payouts?vendor_id=7&status=failed&count=5", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["count"], 1);
    assert_eq!(page["payouts"][0]["status"], "failed");
}

#[actix_web::test]
async fn unknown_query_parameters_are_rejected() {
    let _ = env_logger::try_init().ok();
    let (status, _) = get_request("/admin/payouts?colour=red", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn eligible_payouts_respect_the_holding_period() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/admin/payouts/eligible", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["payouts"][0]["id"], 8);
    assert_eq!(page["payouts"][0]["status"], "pending");
}

#[actix_web::test]
async fn fetch_payment_stats() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/admin/stats", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stats["paid_count"], 3);
    assert_eq!(stats["paid_amount"], 14550);
    assert_eq!(stats["outstanding_debt"], 1500);
    assert_eq!(stats["failed_count"], 0);
}

#[actix_web::test]
async fn export_transfer_log_as_csv() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/admin/transfer_log?vendor_id=7", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("id,created_at,payout_id,vendor_id,order_id,action,amount,rail_transfer_id,message"));
    assert_eq!(lines.next(), Some("1,2024-06-15T12:00:00+00:00,3,7,order-3,Transferred,48.50,tr_sim_0003,"));
    assert_eq!(lines.next(), None);
}

fn is_failed_for_vendor(filter: &PayoutQueryFilter) -> bool {
    filter.vendor_id == Some(7) && filter.status == Some(vec![PayoutStatus::Failed])
}

fn is_eligible(filter: &PayoutQueryFilter) -> bool {
    filter.status == Some(vec![PayoutStatus::Pending]) &&
        filter.refund_debt == Some(false) &&
        filter.until == Some(now() - Duration::days(14))
}

fn configure(cfg: &mut ServiceConfig) {
    let mut ledger = MockLedger::new();
    ledger.expect_payout_by_id().returning(|id| {
        Ok((id == 3).then(|| payout(3, PayoutStatus::Paid, Utc.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap())))
    });
    ledger.expect_count_payouts().withf(is_failed_for_vendor).returning(|_| Ok(1));
    ledger.expect_count_payouts().withf(is_eligible).returning(|_| Ok(1));
    ledger
        .expect_search_payouts()
        .withf(|filter, pagination| is_failed_for_vendor(filter) && pagination.count() == 5)
        .returning(|_, _| {
            let mut p = payout(6, PayoutStatus::Failed, Utc.with_ymd_and_hms(2024, 5, 28, 10, 0, 0).unwrap());
            p.failure_reason = Some("Payment rail unavailable: connection reset".into());
            p.attempts = 1;
            Ok(vec![p])
        });
    ledger.expect_search_payouts().withf(|filter, _| is_eligible(filter)).returning(|_, _| {
        Ok(vec![payout(8, PayoutStatus::Pending, Utc.with_ymd_and_hms(2024, 5, 30, 9, 0, 0).unwrap())])
    });
    ledger.expect_payment_stats().returning(|| {
        Ok(PaymentStats {
            paid_count: 3,
            paid_amount: Cents::from(14_550),
            transferred_amount: Cents::from(14_550),
            outstanding_debt: Cents::from(1_500),
            ..Default::default()
        })
    });
    ledger.expect_fetch_transfer_log().withf(|filter| filter.vendor_id == Some(7)).returning(|_| {
        Ok(vec![TransferLogEntry {
            id: 1,
            payout_id: 3,
            vendor_id: 7,
            order_id: OrderId::from("order-3"),
            action: TransferAction::Transferred,
            amount: Cents::from(4_850),
            rail_transfer_id: Some("tr_sim_0003".into()),
            message: None,
            created_at: now(),
        }])
    });
    let settlement = SettlementApi::new(
        ledger,
        SimulatedRail::default(),
        EventProducers::default(),
        SettlementConfig::default(),
        Arc::new(ManualClock::new(now())),
    );
    let api = AdminApi::new(settlement);
    cfg.service(health)
        .service(EligiblePayoutsRoute::<MockLedger, SimulatedRail>::new())
        .service(ListPayoutsRoute::<MockLedger, SimulatedRail>::new())
        .service(PayoutByIdRoute::<MockLedger, SimulatedRail>::new())
        .service(PaymentStatsRoute::<MockLedger, SimulatedRail>::new())
        .service(TransferLogRoute::<MockLedger, SimulatedRail>::new())
        .app_data(web::Data::new(api));
}
