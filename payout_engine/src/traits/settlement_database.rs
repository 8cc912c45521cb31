use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Cents, NewOrder, NewPayout, Order, OrderId, OrderItem, Payout, PayoutStatus, TransferAction, Vendor},
    traits::data_objects::{PayoutSettlement, RefundResult, TransferPlan},
};

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} has already been recorded")]
    OrderAlreadyExists(OrderId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} has already been refunded")]
    AlreadyRefunded(OrderId),
    #[error("Vendor #{0} does not exist")]
    VendorNotFound(i64),
    #[error("Payout #{0} does not exist")]
    PayoutNotFound(i64),
    #[error("Payout #{payout_id} is {actual}, but this operation requires it to be {expected}")]
    StatusConflict { payout_id: i64, expected: PayoutStatus, actual: PayoutStatus },
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDbError::DatabaseError(e.to_string())
    }
}

/// The write side of the payout ledger.
///
/// Every method that moves a payout between statuses:
/// * runs in a single transaction,
/// * only acts if the payout is still in the status the caller expects, failing with
///   [`SettlementDbError::StatusConflict`] (and changing nothing) otherwise,
/// * applies the matching adjustment to the vendor's `pending_earnings`, `paid_earnings` and `debt_balance`,
/// * appends a row to the transfer log.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a paid order, its line items and one `pending` payout per vendor, and adds each payout's amount to its
    /// vendor's pending earnings. Fails with [`SettlementDbError::OrderAlreadyExists`] if the order id has been seen
    /// before, and with [`SettlementDbError::VendorNotFound`] if a payout names an unknown vendor.
    async fn insert_paid_order(
        &self,
        order: NewOrder,
        payouts: Vec<NewPayout>,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<Payout>), SettlementDbError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, SettlementDbError>;

    async fn fetch_vendor(&self, vendor_id: i64) -> Result<Option<Vendor>, SettlementDbError>;

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementDbError>;

    async fn fetch_payouts_for_order(&self, order_id: &OrderId) -> Result<Vec<Payout>, SettlementDbError>;

    /// `pending`, non-debt payouts whose sale happened on or before `sold_before`, oldest first.
    async fn fetch_eligible_payouts(&self, sold_before: DateTime<Utc>) -> Result<Vec<Payout>, SettlementDbError>;

    /// `processing` payouts that have not been touched since `not_updated_since`.
    async fn fetch_stuck_payouts(&self, not_updated_since: DateTime<Utc>) -> Result<Vec<Payout>, SettlementDbError>;

    /// Starts settling a payout that is currently `expected` (`pending` or `failed`).
    ///
    /// The vendor's outstanding debt is deducted first. If the debt covers the whole payout, it is marked `paid`
    /// right away with no rail transfer id, and [`TransferPlan::SettledByDebt`] is returned. Otherwise the payout
    /// moves to `processing`, the deducted portion is reserved out of the vendor's debt balance, the attempt counter
    /// is bumped and [`TransferPlan::Transfer`] tells the caller how much to send.
    ///
    /// Debt entries are refused with [`SettlementDbError::InvariantViolation`].
    async fn begin_transfer(
        &self,
        payout_id: i64,
        expected: PayoutStatus,
        now: DateTime<Utc>,
    ) -> Result<TransferPlan, SettlementDbError>;

    /// Marks a `processing` payout as `paid` with the rail's transfer id, moves its amount from pending to paid
    /// earnings and clears the failure reason. `logged_as` is either [`TransferAction::Transferred`] or
    /// [`TransferAction::Reconciled`].
    async fn complete_transfer(
        &self,
        payout_id: i64,
        rail_transfer_id: &str,
        logged_as: TransferAction,
        now: DateTime<Utc>,
    ) -> Result<PayoutSettlement, SettlementDbError>;

    /// Marks a `failed` payout as `paid` using a transfer that an earlier attempt made on the rail.
    ///
    /// Nothing is reserved from the vendor's debt beforehand. The offset recorded is whatever the earlier attempt
    /// deducted (`amount - transferred`), capped at the vendor's current debt balance. Logged as
    /// [`TransferAction::Reconciled`].
    async fn complete_adopted_transfer(
        &self,
        payout_id: i64,
        rail_transfer_id: &str,
        transferred: Cents,
        now: DateTime<Utc>,
    ) -> Result<PayoutSettlement, SettlementDbError>;

    /// Marks a payout that is currently `expected` as `failed` with the given reason.
    ///
    /// * From `processing`: the reserved debt offset goes back onto the vendor's debt balance.
    /// * From `pending`: used when the payout could not even be attempted (e.g. the vendor is not onboarded).
    /// * From `failed`: only the reason is replaced.
    ///
    /// In every case the amount leaves the vendor's pending earnings (if it was counted there).
    async fn fail_transfer(
        &self,
        payout_id: i64,
        expected: PayoutStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Payout, SettlementDbError>;

    /// Marks a `pending` payout as `paid` without going through the rail, recording `reference` as the transfer id
    /// and `note` as the operator's explanation.
    async fn settle_without_transfer(
        &self,
        payout_id: i64,
        reference: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<PayoutSettlement, SettlementDbError>;

    /// Refunds a whole order. For each vendor in the order, independently:
    /// * a payout that has not been paid (`pending`, `processing` or `failed`) is deleted and its amount leaves the
    ///   vendor's pending earnings;
    /// * a `paid` payout is left alone, and a new `pending` debt entry for the negated amount is created against it,
    ///   increasing the vendor's debt balance.
    async fn refund_order(
        &self,
        order_id: &OrderId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundResult, SettlementDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDbError> {
        Ok(())
    }
}
