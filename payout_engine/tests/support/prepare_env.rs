use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use payout_engine::{
    db_types::{Cents, NewOrder, NewOrderItem, NewVendor, OrderId, Payout, PayoutStatus, Vendor},
    earnings::FeeSchedule,
    helpers::{Clock, ManualClock, SimulatedRail},
    payout_objects::{Pagination, PayoutQueryFilter, SettlementConfig},
    traits::{PayoutQueries, SettlementDatabase},
    AdminApi,
    RefundApi,
    SettlementApi,
    SqliteDatabase,
    VendorApi,
};
use rust_decimal::Decimal;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use super::events::EventRecorder;

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("🚀️ Could not drop database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    info!("🚀️ Test database ready at {url}");
    db
}

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir().join("vps_test_dbs");
    std::fs::create_dir_all(&dir).expect("Error creating test database directory");
    format!("sqlite://{}/test_ledger_{}.db", dir.display(), rand::random::<u64>())
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

/// Fee schedule that charges nothing, so that net amounts equal line totals.
pub fn no_fees() -> SettlementConfig {
    SettlementConfig { fees: FeeSchedule::new(Decimal::ZERO, Cents::ZERO, Cents::ZERO), ..SettlementConfig::default() }
}

pub struct TestEnv {
    pub db: SqliteDatabase,
    pub rail: SimulatedRail,
    pub clock: ManualClock,
    pub config: SettlementConfig,
    pub events: EventRecorder,
    pub settlement: SettlementApi<SqliteDatabase, SimulatedRail>,
    pub admin: AdminApi<SqliteDatabase, SimulatedRail>,
    pub refunds: RefundApi<SqliteDatabase>,
    pub vendors: VendorApi<SqliteDatabase>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(SettlementConfig::default()).await
    }

    pub async fn with_config(config: SettlementConfig) -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        let rail = SimulatedRail::default();
        let clock = ManualClock::new(start_time());
        let events = EventRecorder::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let settlement =
            SettlementApi::new(db.clone(), rail.clone(), events.producers(), config.clone(), shared_clock.clone());
        let admin = AdminApi::new(settlement.clone());
        let refunds = RefundApi::new(db.clone(), events.producers(), shared_clock.clone());
        let vendors = VendorApi::new(db.clone(), config.holding_period, shared_clock);
        Self { db, rail, clock, config, events, settlement, admin, refunds, vendors }
    }

    pub async fn vendor_without_account(&self, name: &str) -> Vendor {
        let email = format!("{}@vendors.example", name.to_lowercase());
        self.admin.register_vendor(NewVendor::new(name).with_email(email)).await.expect("Error registering vendor")
    }

    pub async fn onboarded_vendor(&self, name: &str) -> Vendor {
        let vendor = self.vendor_without_account(name).await;
        self.admin.onboard_vendor(vendor.id).await.expect("Error onboarding vendor")
    }

    /// Records a paid order with one line per `(vendor_id, price_in_cents)` and returns the new payouts.
    pub async fn paid_order(&self, order_id: &str, lines: &[(i64, i64)], shipping: i64) -> Vec<Payout> {
        let total = lines.iter().map(|(_, price)| *price).sum::<i64>() + shipping;
        let mut order = NewOrder::new(OrderId::from(order_id), "customer-1", Cents::from(total));
        for (i, (vendor_id, price)) in lines.iter().enumerate() {
            order = order.with_item(NewOrderItem::new(*vendor_id, format!("product {i}"), Cents::from(*price), 1));
        }
        let (_, payouts, _) = self.settlement.process_paid_order(order).await.expect("Error processing paid order");
        payouts
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn vendor(&self, vendor_id: i64) -> Vendor {
        self.db.fetch_vendor(vendor_id).await.unwrap().expect("vendor should exist")
    }

    pub async fn payout(&self, payout_id: i64) -> Payout {
        self.db.fetch_payout(payout_id).await.unwrap().expect("payout should exist")
    }

    pub async fn payouts_for_vendor(&self, vendor_id: i64) -> Vec<Payout> {
        let filter = PayoutQueryFilter::default().with_vendor_id(vendor_id);
        self.db.search_payouts(filter, Pagination::new(0, 500)).await.unwrap()
    }

    /// The vendor's pending earnings must equal the sum of their pending and processing earnings payouts.
    pub async fn assert_pending_earnings_consistent(&self, vendor_id: i64) {
        let vendor = self.vendor(vendor_id).await;
        let expected: Cents = self
            .payouts_for_vendor(vendor_id)
            .await
            .iter()
            .filter(|p| !p.is_refund_debt && matches!(p.status, PayoutStatus::Pending | PayoutStatus::Processing))
            .map(|p| p.amount)
            .sum();
        assert_eq!(vendor.pending_earnings, expected, "pending earnings out of step for vendor #{vendor_id}");
        assert!(!vendor.debt_balance.is_negative());
    }

    pub async fn tear_down(mut self) {
        let url = self.db.url().to_string();
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not remove test database {url}: {e}");
        }
    }
}
