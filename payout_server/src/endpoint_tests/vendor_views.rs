use std::sync::Arc;

use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, TimeZone, Utc};
use payout_engine::{
    db_types::PayoutStatus,
    helpers::ManualClock,
    payout_objects::{Pagination, PayoutQueryFilter},
    VendorApi,
};
use serde_json::Value;

use super::helpers::{get_request, now, payout, vendor};
use crate::{
    endpoint_tests::mocks::MockLedger,
    routes::{VendorEarningsRoute, VendorPayoutsRoute, VendorPendingSalesRoute},
};

const EARNINGS_JSON: &str =
    r#"{"vendor_id":7,"pending_earnings":4850,"paid_earnings":120000,"debt_balance":1500,"onboarded":true}"#;

#[actix_web::test]
async fn fetch_earnings_summary() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/vendors/7/earnings", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, EARNINGS_JSON);
}

#[actix_web::test]
async fn unknown_vendor_gets_a_plain_not_found() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/vendors/404/earnings", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. No such vendor"}"#);
    let (status, _) = get_request("/vendors/404/pending_sales", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn payout_history_hides_rail_references() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/vendors/7/payouts?count=10", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["offset"], 0);
    assert_eq!(page["count"], 2);
    assert_eq!(page["payouts"][0]["id"], 2);
    assert_eq!(page["payouts"][1]["status"], "paid");
    assert!(!body.contains("tr_sim"));
    assert!(!body.contains("rail_transfer_id"));
    assert!(!body.contains("failure_reason"));
}

#[actix_web::test]
async fn pending_sales_count_down_to_eligibility() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/vendors/7/pending_sales", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let sales: Value = serde_json::from_str(&body).unwrap();
    let sales = sales.as_array().unwrap();
    assert_eq!(sales.len(), 2);
    // Sorted by eligibility, not by sale date
    assert_eq!(sales[0]["payout_id"], 5);
    assert_eq!(sales[0]["days_remaining"], 4);
    assert_eq!(sales[0]["eligible_at"], "2024-06-19T12:00:00Z");
    assert_eq!(sales[1]["payout_id"], 4);
    assert_eq!(sales[1]["days_remaining"], 9);
}

fn is_pending_earnings(filter: &PayoutQueryFilter) -> bool {
    filter.vendor_id == Some(7) &&
        filter.status == Some(vec![PayoutStatus::Pending, PayoutStatus::Processing]) &&
        filter.refund_debt == Some(false)
}

fn configure(cfg: &mut ServiceConfig) {
    let mut ledger = MockLedger::new();
    ledger.expect_vendor_by_id().returning(|id| Ok((id == 7).then(vendor)));
    ledger.expect_count_payouts().returning(|_| Ok(2));
    ledger
        .expect_search_payouts()
        .withf(|filter, _| is_pending_earnings(filter))
        .returning(|_, _| {
            Ok(vec![
                payout(4, PayoutStatus::Pending, Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()),
                payout(5, PayoutStatus::Processing, Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap()),
            ])
        });
    ledger
        .expect_search_payouts()
        .withf(|filter: &PayoutQueryFilter, pagination: &Pagination| {
            filter.vendor_id == Some(7) && filter.status.is_none() && pagination.count() == 10
        })
        .returning(|_, _| {
            Ok(vec![
                payout(2, PayoutStatus::Pending, Utc.with_ymd_and_hms(2024, 6, 12, 8, 30, 0).unwrap()),
                payout(1, PayoutStatus::Paid, Utc.with_ymd_and_hms(2024, 5, 2, 16, 0, 0).unwrap()),
            ])
        });
    let api = VendorApi::new(ledger, Duration::days(14), Arc::new(ManualClock::new(now())));
    cfg.service(VendorEarningsRoute::<MockLedger>::new())
        .service(VendorPayoutsRoute::<MockLedger>::new())
        .service(VendorPendingSalesRoute::<MockLedger>::new())
        .app_data(web::Data::new(api));
}
