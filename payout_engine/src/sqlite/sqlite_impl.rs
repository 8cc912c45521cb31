//! `SqliteDatabase` is the SQLite implementation of the payout ledger. It implements all of the storage traits in
//! [`crate::traits`].
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{
    db_url,
    new_pool,
    orders,
    payouts::{self, PaidDetails},
    transfer_log,
    vendors,
};
use crate::{
    db_types::{
        Cents,
        NewOrder,
        NewPayout,
        NewVendor,
        Order,
        OrderId,
        OrderItem,
        Payout,
        PayoutStatus,
        TransferAction,
        TransferLogEntry,
        Vendor,
    },
    payout_objects::{Pagination, PaymentStats, PayoutQueryFilter, TransferLogFilter},
    traits::{
        PayoutQueries,
        PayoutSettlement,
        RefundResult,
        SettlementDatabase,
        SettlementDbError,
        TransferPlan,
        VendorManagement,
    },
};

pub const FULLY_OFFSET_NOTE: &str = "Fully offset by outstanding debt";
pub const NOTHING_TO_TRANSFER_NOTE: &str = "Nothing to transfer";

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_paid_order(
        &self,
        order: NewOrder,
        payouts: Vec<NewPayout>,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<Payout>), SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let stored = orders::insert_order(&order, now, &mut tx).await?;
        let mut result = Vec::with_capacity(payouts.len());
        for new_payout in payouts {
            if new_payout.order_id != order.order_id {
                return Err(SettlementDbError::InvariantViolation(format!(
                    "payout for order {} cannot be stored with order {}",
                    new_payout.order_id, order.order_id
                )));
            }
            vendors::adjust_balances(new_payout.vendor_id, new_payout.amount, Cents::ZERO, Cents::ZERO, now, &mut tx)
                .await?;
            let payout = payouts::insert_payout(new_payout, now, &mut tx).await?;
            result.push(payout);
        }
        orders::insert_items(&order.order_id, &order.items, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} saved with {} pending payouts", stored.order_id, result.len());
        Ok((stored, result))
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_vendor(&self, vendor_id: i64) -> Result<Option<Vendor>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let vendor = vendors::fetch_vendor(vendor_id, &mut conn).await?;
        Ok(vendor)
    }

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(payout_id, &mut conn).await?;
        Ok(payout)
    }

    async fn fetch_payouts_for_order(&self, order_id: &OrderId) -> Result<Vec<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let payouts = payouts::fetch_payouts_for_order(order_id, &mut conn).await?;
        Ok(payouts)
    }

    async fn fetch_eligible_payouts(&self, sold_before: DateTime<Utc>) -> Result<Vec<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let payouts = payouts::fetch_eligible_payouts(sold_before, &mut conn).await?;
        Ok(payouts)
    }

    async fn fetch_stuck_payouts(&self, not_updated_since: DateTime<Utc>) -> Result<Vec<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let payouts = payouts::fetch_stuck_payouts(not_updated_since, &mut conn).await?;
        Ok(payouts)
    }

    async fn begin_transfer(
        &self,
        payout_id: i64,
        expected: PayoutStatus,
        now: DateTime<Utc>,
    ) -> Result<TransferPlan, SettlementDbError> {
        if !matches!(expected, PayoutStatus::Pending | PayoutStatus::Failed) {
            return Err(SettlementDbError::InvariantViolation(format!(
                "a transfer cannot be started for a {expected} payout"
            )));
        }
        let mut tx = self.pool.begin().await?;
        let payout = payouts::claim(payout_id, expected, now, &mut tx).await?;
        let vendor = vendors::fetch_vendor(payout.vendor_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::VendorNotFound(payout.vendor_id))?;
        let offset = vendor.debt_balance.min(payout.amount).max(Cents::ZERO);
        let final_amount = payout.amount - offset;
        // A failed payout left pending earnings when it failed, so it comes back in now
        let pending_delta = if expected == PayoutStatus::Failed { payout.amount } else { Cents::ZERO };

        if !final_amount.is_positive() {
            let note = if offset.is_positive() { FULLY_OFFSET_NOTE } else { NOTHING_TO_TRANSFER_NOTE };
            let vendor = vendors::adjust_balances(
                vendor.id,
                pending_delta - payout.amount,
                Cents::ZERO,
                -offset,
                now,
                &mut tx,
            )
            .await?;
            let details = PaidDetails { rail_transfer_id: None, note: Some(note), debt_offset: offset };
            let payout = payouts::mark_paid(payout_id, details, now, &mut tx).await?;
            transfer_log::log_action(&payout, TransferAction::OffsetByDebt, offset, Some(note), now, &mut tx).await?;
            let recovered_debts = settle_debts_if_cleared(&vendor, now, &mut tx).await?;
            tx.commit().await?;
            info!("🗃️ Payout #{payout_id} ({}) settled without a transfer: {note}", payout.amount);
            return Ok(TransferPlan::SettledByDebt(PayoutSettlement { payout, vendor, recovered_debts }));
        }

        let vendor = vendors::adjust_balances(vendor.id, pending_delta, Cents::ZERO, -offset, now, &mut tx).await?;
        let payout = payouts::mark_processing(payout_id, offset, now, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Payout #{payout_id} is processing (attempt {}). {final_amount} to transfer, {offset} reserved from debt",
            payout.attempts
        );
        Ok(TransferPlan::Transfer { payout, vendor, amount: final_amount, debt_offset: offset })
    }

    async fn complete_transfer(
        &self,
        payout_id: i64,
        rail_transfer_id: &str,
        logged_as: TransferAction,
        now: DateTime<Utc>,
    ) -> Result<PayoutSettlement, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::claim(payout_id, PayoutStatus::Processing, now, &mut tx).await?;
        let transferred = payout.transfer_amount();
        let vendor =
            vendors::adjust_balances(payout.vendor_id, -payout.amount, transferred, Cents::ZERO, now, &mut tx).await?;
        let details = PaidDetails { rail_transfer_id: Some(rail_transfer_id), note: None, debt_offset: payout.debt_offset };
        let payout = payouts::mark_paid(payout_id, details, now, &mut tx).await?;
        transfer_log::log_action(&payout, logged_as, transferred, None, now, &mut tx).await?;
        let recovered_debts = if payout.debt_offset.is_positive() {
            let message = "Deducted from payout before transfer";
            transfer_log::log_action(&payout, TransferAction::OffsetByDebt, payout.debt_offset, Some(message), now, &mut tx)
                .await?;
            settle_debts_if_cleared(&vendor, now, &mut tx).await?
        } else {
            Vec::new()
        };
        tx.commit().await?;
        info!("🗃️ Payout #{payout_id} paid. {transferred} transferred as {rail_transfer_id}");
        Ok(PayoutSettlement { payout, vendor, recovered_debts })
    }

    async fn complete_adopted_transfer(
        &self,
        payout_id: i64,
        rail_transfer_id: &str,
        transferred: Cents,
        now: DateTime<Utc>,
    ) -> Result<PayoutSettlement, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::claim(payout_id, PayoutStatus::Failed, now, &mut tx).await?;
        let vendor = vendors::fetch_vendor(payout.vendor_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::VendorNotFound(payout.vendor_id))?;
        let deducted = (payout.amount - transferred).max(Cents::ZERO);
        let offset = deducted.min(vendor.debt_balance.max(Cents::ZERO));
        if offset != deducted {
            warn!(
                "🗃️ Transfer {rail_transfer_id} for payout #{payout_id} held back {deducted} for debt, but vendor #{} \
                 only owes {} now. Recording {offset} as the offset.",
                vendor.id, vendor.debt_balance
            );
        }
        // A failed payout is not counted in pending earnings. Paid earnings only grow by what actually moved.
        let paid = transferred;
        let vendor = vendors::adjust_balances(vendor.id, Cents::ZERO, paid, -offset, now, &mut tx).await?;
        let details = PaidDetails { rail_transfer_id: Some(rail_transfer_id), note: None, debt_offset: offset };
        let payout = payouts::mark_paid(payout_id, details, now, &mut tx).await?;
        transfer_log::log_action(&payout, TransferAction::Reconciled, paid, None, now, &mut tx).await?;
        let recovered_debts = if offset.is_positive() {
            let message = "Deducted by an earlier transfer attempt";
            transfer_log::log_action(&payout, TransferAction::OffsetByDebt, offset, Some(message), now, &mut tx).await?;
            settle_debts_if_cleared(&vendor, now, &mut tx).await?
        } else {
            Vec::new()
        };
        tx.commit().await?;
        info!("🗃️ Failed payout #{payout_id} paid by earlier transfer {rail_transfer_id} ({paid})");
        Ok(PayoutSettlement { payout, vendor, recovered_debts })
    }

    async fn fail_transfer(
        &self,
        payout_id: i64,
        expected: PayoutStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Payout, SettlementDbError> {
        if expected == PayoutStatus::Paid {
            return Err(SettlementDbError::InvariantViolation(format!("paid payout #{payout_id} cannot fail")));
        }
        let mut tx = self.pool.begin().await?;
        let payout = payouts::claim(payout_id, expected, now, &mut tx).await?;
        let (pending_delta, debt_delta) = match expected {
            PayoutStatus::Processing => (-payout.amount, payout.debt_offset),
            PayoutStatus::Pending => (-payout.amount, Cents::ZERO),
            _ => (Cents::ZERO, Cents::ZERO),
        };
        if !pending_delta.is_zero() || !debt_delta.is_zero() {
            vendors::adjust_balances(payout.vendor_id, pending_delta, Cents::ZERO, debt_delta, now, &mut tx).await?;
        }
        let payout = payouts::mark_failed(payout_id, reason, now, &mut tx).await?;
        transfer_log::log_action(&payout, TransferAction::Failed, payout.amount, Some(reason), now, &mut tx).await?;
        tx.commit().await?;
        warn!("🗃️ Payout #{payout_id} failed: {reason}");
        Ok(payout)
    }

    async fn settle_without_transfer(
        &self,
        payout_id: i64,
        reference: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<PayoutSettlement, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::claim(payout_id, PayoutStatus::Pending, now, &mut tx).await?;
        let vendor =
            vendors::adjust_balances(payout.vendor_id, -payout.amount, payout.amount, Cents::ZERO, now, &mut tx)
                .await?;
        let details = PaidDetails { rail_transfer_id: Some(reference), note: Some(note), debt_offset: Cents::ZERO };
        let payout = payouts::mark_paid(payout_id, details, now, &mut tx).await?;
        transfer_log::log_action(&payout, TransferAction::ManuallySettled, payout.amount, Some(note), now, &mut tx)
            .await?;
        tx.commit().await?;
        info!("🗃️ Payout #{payout_id} marked as paid out-of-band ({reference})");
        Ok(PayoutSettlement { payout, vendor, recovered_debts: Vec::new() })
    }

    async fn refund_order(
        &self,
        order_id: &OrderId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundResult, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::mark_refunded(order_id, reason, now, &mut tx).await? {
            Some(order) => order,
            None => {
                return match orders::fetch_order_by_order_id(order_id, &mut tx).await? {
                    Some(_) => Err(SettlementDbError::AlreadyRefunded(order_id.clone())),
                    None => Err(SettlementDbError::OrderNotFound(order_id.clone())),
                };
            },
        };
        let payouts = payouts::fetch_payouts_for_order(order_id, &mut tx).await?;
        let mut cancelled = Vec::new();
        let mut debts = Vec::new();
        for payout in payouts.into_iter().filter(|p| !p.is_refund_debt) {
            match payout.status {
                PayoutStatus::Pending | PayoutStatus::Processing | PayoutStatus::Failed => {
                    let (pending_delta, debt_delta) = match payout.status {
                        PayoutStatus::Failed => (Cents::ZERO, Cents::ZERO),
                        _ => (-payout.amount, payout.debt_offset),
                    };
                    let vendor = vendors::adjust_balances(
                        payout.vendor_id,
                        pending_delta,
                        Cents::ZERO,
                        debt_delta,
                        now,
                        &mut tx,
                    )
                    .await?;
                    payouts::delete_payout(payout.id, &mut tx).await?;
                    transfer_log::log_action(&payout, TransferAction::Cancelled, payout.amount, Some(reason), now, &mut tx)
                        .await?;
                    debug!("🗃️ Payout #{} ({}) cancelled by refund of order {order_id}", payout.id, payout.status);
                    cancelled.push((payout, vendor));
                },
                PayoutStatus::Paid if payout.amount.is_zero() => {
                    debug!("🗃️ Payout #{} for order {order_id} was zero. Nothing to recover.", payout.id);
                },
                PayoutStatus::Paid => {
                    let debt = payouts::insert_debt_entry(&payout, now, &mut tx).await?;
                    let vendor =
                        vendors::adjust_balances(payout.vendor_id, Cents::ZERO, Cents::ZERO, payout.amount, now, &mut tx)
                            .await?;
                    transfer_log::log_action(&debt, TransferAction::DebtRegistered, payout.amount, Some(reason), now, &mut tx)
                        .await?;
                    debug!(
                        "🗃️ Payout #{} was already paid. Debt entry #{} registered against vendor #{}",
                        payout.id, debt.id, payout.vendor_id
                    );
                    debts.push((debt, vendor));
                },
            }
        }
        tx.commit().await?;
        info!(
            "🗃️ Order {order_id} refunded. {} payouts cancelled, {} debts registered",
            cancelled.len(),
            debts.len()
        );
        Ok(RefundResult { order, cancelled, debts })
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Once a vendor's debt balance is back to zero, and no in-flight transfer still holds a reservation against it, the
/// vendor's open debt entries are closed.
async fn settle_debts_if_cleared(
    vendor: &Vendor,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payout>, SettlementDbError> {
    if !vendor.debt_balance.is_zero() {
        return Ok(Vec::new());
    }
    let (reserved,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payouts WHERE vendor_id = $1 AND status = $2 AND debt_offset > 0 AND is_refund_debt = \
         FALSE",
    )
    .bind(vendor.id)
    .bind(PayoutStatus::Processing)
    .fetch_one(&mut *conn)
    .await?;
    if reserved > 0 {
        trace!("🗃️ Vendor #{} has {reserved} transfers in flight holding debt. Debt entries stay open.", vendor.id);
        return Ok(Vec::new());
    }
    let settled = payouts::settle_open_debts(vendor.id, now, &mut *conn).await?;
    for debt in &settled {
        transfer_log::log_action(debt, TransferAction::DebtRecovered, -debt.amount, None, now, &mut *conn).await?;
    }
    if !settled.is_empty() {
        info!("🗃️ Vendor #{} has repaid their debt. {} debt entries closed.", vendor.id, settled.len());
    }
    Ok(settled)
}

impl PayoutQueries for SqliteDatabase {
    async fn vendor_by_id(&self, vendor_id: i64) -> Result<Option<Vendor>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let vendor = vendors::fetch_vendor(vendor_id, &mut conn).await?;
        Ok(vendor)
    }

    async fn payout_by_id(&self, payout_id: i64) -> Result<Option<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(payout_id, &mut conn).await?;
        Ok(payout)
    }

    async fn search_payouts(
        &self,
        filter: PayoutQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let payouts = payouts::search_payouts(filter, pagination, &mut conn).await?;
        Ok(payouts)
    }

    async fn count_payouts(&self, filter: PayoutQueryFilter) -> Result<i64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let count = payouts::count_payouts(filter, &mut conn).await?;
        Ok(count)
    }

    async fn payment_stats(&self) -> Result<PaymentStats, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let stats = payouts::payment_stats(&mut conn).await?;
        Ok(stats)
    }

    async fn fetch_transfer_log(&self, filter: TransferLogFilter) -> Result<Vec<TransferLogEntry>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let entries = transfer_log::fetch_transfer_log(filter, &mut conn).await?;
        Ok(entries)
    }
}

impl VendorManagement for SqliteDatabase {
    async fn insert_vendor(&self, vendor: NewVendor, now: DateTime<Utc>) -> Result<Vendor, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let vendor = vendors::insert_vendor(vendor, now, &mut tx).await?;
        tx.commit().await?;
        Ok(vendor)
    }

    async fn link_rail_account(
        &self,
        vendor_id: i64,
        rail_account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vendor, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let vendor = vendors::link_rail_account(vendor_id, rail_account_id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(vendor)
    }

    async fn fetch_vendors(&self) -> Result<Vec<Vendor>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let vendors = vendors::fetch_vendors(&mut conn).await?;
        Ok(vendors)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `VPS_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SettlementDbError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SettlementDbError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
