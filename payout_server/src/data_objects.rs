use chrono::{DateTime, Utc};
use payout_engine::{
    db_types::{Cents, Order, Payout, PayoutStatus, Vendor},
    earnings::EarningsBreakdown,
    payout_objects::{Pagination, PayoutQueryFilter, TransferLogFilter},
    traits::RefundResult,
    PayoutOutcome,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPaidRequest {
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
}

/// Query parameters for `GET /admin/payouts`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayoutListParams {
    pub vendor_id: Option<i64>,
    pub order_id: Option<String>,
    pub status: Option<PayoutStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl PayoutListParams {
    pub fn filter(&self) -> PayoutQueryFilter {
        let mut filter = PayoutQueryFilter::default();
        if let Some(id) = self.vendor_id {
            filter = filter.with_vendor_id(id);
        }
        if let Some(order_id) = &self.order_id {
            filter = filter.with_order_id(order_id.as_str().into());
        }
        if let Some(status) = self.status {
            filter = filter.with_status(status);
        }
        if let Some(since) = self.since {
            filter = filter.since(since);
        }
        if let Some(until) = self.until {
            filter = filter.until(until);
        }
        filter
    }

    pub fn pagination(&self) -> Pagination {
        Pagination { offset: self.offset, count: self.count }
    }
}

/// Query parameters for `GET /admin/transfer_log`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferLogParams {
    pub vendor_id: Option<i64>,
    pub payout_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl From<TransferLogParams> for TransferLogFilter {
    fn from(p: TransferLogParams) -> Self {
        Self { vendor_id: p.vendor_id, payout_id: p.payout_id, since: p.since, until: p.until }
    }
}

/// The result of a `force_pay` or `retry` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutOutcomeResponse {
    /// One of "transferred", "settled_by_debt", "reconciled"
    pub outcome: String,
    pub payout: Payout,
    pub vendor: Vendor,
    /// The part of the payout that went towards the vendor's debt
    pub debt_offset: Cents,
    pub transferred: Cents,
}

impl PayoutOutcomeResponse {
    /// Converts a successful outcome. A failed outcome is returned as the failure reason.
    pub fn try_from_outcome(outcome: PayoutOutcome) -> Result<Self, (Payout, String)> {
        let (label, settlement) = match outcome {
            PayoutOutcome::Transferred(s) => ("transferred", s),
            PayoutOutcome::SettledByDebt(s) => ("settled_by_debt", s),
            PayoutOutcome::Reconciled(s) => ("reconciled", s),
            PayoutOutcome::Failed { payout, reason } => return Err((payout, reason)),
        };
        let debt_offset = settlement.payout.debt_offset;
        let transferred = settlement.payout.transfer_amount();
        Ok(Self {
            outcome: label.to_string(),
            payout: settlement.payout,
            vendor: settlement.vendor,
            debt_offset,
            transferred,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntakeResponse {
    pub order: Order,
    pub payouts: Vec<Payout>,
    pub breakdown: EarningsBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    pub order_id: String,
    /// Payouts that were cancelled before any money moved
    pub cancelled: Vec<Payout>,
    /// Debt entries for vendors who had already been paid
    pub debts: Vec<Payout>,
    pub total_cancelled: Cents,
    pub total_debt: Cents,
}

impl From<RefundResult> for RefundResponse {
    fn from(result: RefundResult) -> Self {
        let total_cancelled = result.total_cancelled();
        let total_debt = result.total_debt();
        Self {
            order_id: result.order.order_id.as_str().to_string(),
            cancelled: result.cancelled.into_iter().map(|(p, _)| p).collect(),
            debts: result.debts.into_iter().map(|(p, _)| p).collect(),
            total_cancelled,
            total_debt,
        }
    }
}
