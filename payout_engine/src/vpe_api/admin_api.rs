//! Manual operations on the payout ledger.
//!
//! The three overrides (`force_pay`, `retry` and `mark_paid_without_transfer`) re-check the payout's state themselves
//! and go through the same atomic transitions as the settlement scheduler. Asking for an override on a payout that
//! is not in the required starting state is a `Conflict`, and nothing changes.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    db_types::{NewVendor, Payout, PayoutStatus, TransferLogEntry, Vendor},
    events::PayoutPaidEvent,
    helpers::Clock,
    payout_objects::{Pagination, PaymentStats, PayoutPage, PayoutQueryFilter, RunSummary, TransferLogFilter},
    traits::{PaymentRail, PayoutQueries, PayoutSettlement, RailError, SettlementDatabase, VendorManagement},
    vpe_api::{
        payout_executor::{PayoutOutcome, Trigger},
        settlement_api::SettlementApi,
    },
    SettlementError,
};

pub struct AdminApi<B, R> {
    settlement: SettlementApi<B, R>,
}

impl<B, R> Debug for AdminApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AdminApi")
    }
}

impl<B, R> AdminApi<B, R> {
    pub fn new(settlement: SettlementApi<B, R>) -> Self {
        Self { settlement }
    }

    fn now(&self) -> DateTime<Utc> {
        self.settlement.executor().clock().now()
    }
}

impl<B, R> AdminApi<B, R>
where
    B: SettlementDatabase,
    R: PaymentRail,
{
    /// Pays a `pending` payout now, ignoring the holding period. Debt is deducted first, exactly as in a settlement
    /// run.
    pub async fn force_pay(&self, payout_id: i64) -> Result<PayoutOutcome, SettlementError> {
        info!("🛠️ Force-paying payout #{payout_id}");
        self.settlement.executor().execute(payout_id, PayoutStatus::Pending, Trigger::Operator).await
    }

    /// Tries a `failed` payout again. If an earlier attempt did reach the rail, that transfer is recorded instead of
    /// sending the money a second time.
    pub async fn retry(&self, payout_id: i64) -> Result<PayoutOutcome, SettlementError> {
        info!("🛠️ Retrying payout #{payout_id}");
        self.settlement.executor().execute(payout_id, PayoutStatus::Failed, Trigger::Operator).await
    }

    /// Records that a `pending` payout was settled outside the payment rail (a manual bank transfer, say).
    ///
    /// `note` is mandatory. The payout gets a synthetic transfer reference of the form `manual-<id>-<timestamp>`.
    pub async fn mark_paid_without_transfer(
        &self,
        payout_id: i64,
        note: &str,
    ) -> Result<PayoutSettlement, SettlementError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(SettlementError::Validation("A note explaining the manual settlement is required".into()));
        }
        let db = self.settlement.db();
        let payout =
            db.fetch_payout(payout_id).await?.ok_or_else(|| SettlementError::NotFound(format!("Payout #{payout_id}")))?;
        if payout.is_refund_debt {
            return Err(SettlementError::Validation(format!(
                "Payout #{payout_id} is a refund debt entry and cannot be marked as paid"
            )));
        }
        if payout.status != PayoutStatus::Pending {
            return Err(SettlementError::Conflict(format!(
                "Payout #{payout_id} is {}. Only pending payouts can be marked as paid.",
                payout.status
            )));
        }
        let now = self.now();
        let reference = format!("manual-{payout_id}-{}", now.timestamp());
        let settlement = db.settle_without_transfer(payout_id, &reference, note, now).await?;
        info!("🛠️ Payout #{payout_id} marked as paid without a transfer ({reference}). Note: {note}");
        let event =
            PayoutPaidEvent::new(settlement.payout.clone(), settlement.vendor.clone(), settlement.payout.amount);
        self.settlement.executor().producers().publish_payout_paid(event).await;
        Ok(settlement)
    }

    /// Runs the settlement scheduler once, right now.
    pub async fn run_settlement_now(&self) -> Result<RunSummary, SettlementError> {
        info!("🛠️ Settlement run requested by an operator");
        self.settlement.run_settlement().await
    }
}

impl<B, R> AdminApi<B, R>
where
    B: SettlementDatabase + VendorManagement,
    R: PaymentRail,
{
    pub async fn register_vendor(&self, vendor: NewVendor) -> Result<Vendor, SettlementError> {
        let vendor = self.settlement.db().insert_vendor(vendor, self.now()).await?;
        info!("🛠️ Vendor #{} ({}) registered", vendor.id, vendor.name);
        Ok(vendor)
    }

    /// Creates the vendor's destination account on the payment rail and links it. Vendors that already have an
    /// account are returned unchanged.
    pub async fn onboard_vendor(&self, vendor_id: i64) -> Result<Vendor, SettlementError> {
        let db = self.settlement.db();
        let vendor =
            db.fetch_vendor(vendor_id).await?.ok_or_else(|| SettlementError::NotFound(format!("Vendor #{vendor_id}")))?;
        if let Some(account) = &vendor.rail_account_id {
            debug!("🛠️ Vendor #{vendor_id} is already linked to rail account {account}");
            return Ok(vendor);
        }
        let executor = self.settlement.executor();
        let timeout = executor.config().rail_timeout;
        let account_id = tokio::time::timeout(timeout, executor.rail().create_destination_account(&vendor))
            .await
            .unwrap_or_else(|_| Err(RailError::Timeout(timeout.as_millis() as u64)))?;
        let vendor = db.link_rail_account(vendor_id, &account_id, self.now()).await?;
        info!("🛠️ Vendor #{vendor_id} onboarded with rail account {account_id}");
        Ok(vendor)
    }
}

impl<B, R> AdminApi<B, R>
where B: PayoutQueries
{
    pub async fn payout_by_id(&self, payout_id: i64) -> Result<Option<Payout>, SettlementError> {
        let payout = self.settlement.db().payout_by_id(payout_id).await?;
        Ok(payout)
    }

    pub async fn vendor_by_id(&self, vendor_id: i64) -> Result<Option<Vendor>, SettlementError> {
        let vendor = self.settlement.db().vendor_by_id(vendor_id).await?;
        Ok(vendor)
    }

    pub async fn list_payouts(
        &self,
        filter: PayoutQueryFilter,
        pagination: Pagination,
    ) -> Result<PayoutPage, SettlementError> {
        trace!("🛠️ Listing payouts. {filter}");
        let db = self.settlement.db();
        let total = db.count_payouts(filter.clone()).await?;
        let payouts = db.search_payouts(filter, pagination).await?;
        Ok(PayoutPage { total, offset: pagination.offset(), count: payouts.len() as i64, payouts })
    }

    /// `pending` earnings whose holding period has elapsed, i.e. what the next settlement run would pick up.
    pub async fn eligible_payouts(&self, pagination: Pagination) -> Result<PayoutPage, SettlementError> {
        let cutoff = self.now() - self.settlement.config().holding_period;
        let filter = PayoutQueryFilter::default().with_status(PayoutStatus::Pending).earnings_only().until(cutoff);
        self.list_payouts(filter, pagination).await
    }

    pub async fn payment_stats(&self) -> Result<PaymentStats, SettlementError> {
        let stats = self.settlement.db().payment_stats().await?;
        Ok(stats)
    }

    /// The transfer log as CSV, oldest entry first. Amounts are in major units.
    pub async fn export_transfer_log(&self, filter: TransferLogFilter) -> Result<String, SettlementError> {
        let entries = self.settlement.db().fetch_transfer_log(filter).await?;
        debug!("🛠️ Exporting {} transfer log entries", entries.len());
        transfer_log_to_csv(&entries)
    }
}

#[derive(Serialize)]
struct TransferLogRow<'a> {
    id: i64,
    created_at: String,
    payout_id: i64,
    vendor_id: i64,
    order_id: &'a str,
    action: String,
    amount: String,
    rail_transfer_id: &'a str,
    message: &'a str,
}

impl<'a> From<&'a TransferLogEntry> for TransferLogRow<'a> {
    fn from(entry: &'a TransferLogEntry) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at.to_rfc3339(),
            payout_id: entry.payout_id,
            vendor_id: entry.vendor_id,
            order_id: entry.order_id.as_str(),
            action: entry.action.to_string(),
            amount: entry.amount.to_string(),
            rail_transfer_id: entry.rail_transfer_id.as_deref().unwrap_or_default(),
            message: entry.message.as_deref().unwrap_or_default(),
        }
    }
}

pub fn transfer_log_to_csv(entries: &[TransferLogEntry]) -> Result<String, SettlementError> {
    let csv_error = |e: String| SettlementError::Database(format!("Could not export the transfer log: {e}"));
    let mut writer = csv::Writer::from_writer(Vec::new());
    if entries.is_empty() {
        writer
            .write_record([
                "id",
                "created_at",
                "payout_id",
                "vendor_id",
                "order_id",
                "action",
                "amount",
                "rail_transfer_id",
                "message",
            ])
            .map_err(|e| csv_error(e.to_string()))?;
    }
    for entry in entries {
        writer.serialize(TransferLogRow::from(entry)).map_err(|e| csv_error(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| csv_error(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| csv_error(e.to_string()))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::db_types::{Cents, OrderId, TransferAction};

    fn entry(id: i64, action: TransferAction, amount: i64, message: Option<&str>) -> TransferLogEntry {
        TransferLogEntry {
            id,
            payout_id: 7,
            vendor_id: 3,
            order_id: OrderId::from("1001"),
            action,
            amount: Cents::from(amount),
            rail_transfer_id: None,
            message: message.map(String::from),
            created_at: Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn csv_has_header_and_major_units() {
        let entries = vec![
            entry(1, TransferAction::Transferred, 9806, None),
            entry(2, TransferAction::Failed, 9806, Some("insufficient funds, try again")),
        ];
        let csv = transfer_log_to_csv(&entries).unwrap();
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,created_at,payout_id,vendor_id,order_id,action,amount,rail_transfer_id,message");
        assert_eq!(lines[1], "1,2024-06-15T09:30:00+00:00,7,3,1001,Transferred,98.06,,");
        assert_eq!(lines[2], "2,2024-06-15T09:30:00+00:00,7,3,1001,Failed,98.06,,\"insufficient funds, try again\"");
    }

    #[test]
    fn empty_log_still_has_header() {
        let csv = transfer_log_to_csv(&[]).unwrap();
        assert_eq!(csv.trim_end(), "id,created_at,payout_id,vendor_id,order_id,action,amount,rail_transfer_id,message");
    }
}
