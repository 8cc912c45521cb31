use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use payout_engine::db_types::{Cents, OrderId, Payout, PayoutStatus, Vendor};

pub async fn get_request(path: &str, configure: fn(&mut ServiceConfig)) -> Result<(StatusCode, String), String> {
    let req = TestRequest::get().uri(path).to_request();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request to {path}");
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub fn vendor() -> Vendor {
    Vendor {
        id: 7,
        name: "Harbour Ceramics".into(),
        email: Some("hello@harbourceramics.example".into()),
        rail_account_id: Some("acct_sim_0007".into()),
        pending_earnings: Cents::from(4_850),
        paid_earnings: Cents::from(120_000),
        debt_balance: Cents::from(1_500),
        created_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    }
}

pub fn payout(id: i64, status: PayoutStatus, sale_date: DateTime<Utc>) -> Payout {
    let paid = status == PayoutStatus::Paid;
    Payout {
        id,
        order_id: OrderId::from(format!("order-{id}")),
        vendor_id: 7,
        amount: Cents::from(4_850),
        gross_amount: Cents::from(5_000),
        processing_fee: Cents::from(95),
        transfer_fee: Cents::from(55),
        debt_offset: Cents::ZERO,
        sale_date,
        payment_date: paid.then(|| sale_date + chrono::Duration::days(14)),
        status,
        rail_transfer_id: paid.then(|| format!("tr_sim_{id:04}")),
        failure_reason: None,
        note: None,
        attempts: if paid { 1 } else { 0 },
        is_refund_debt: false,
        refunded_payout_id: None,
        created_at: sale_date,
        updated_at: sale_date,
    }
}
