use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cents, OrderId, Payout, PayoutStatus},
    earnings::FeeSchedule,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

//--------------------------------------   SettlementConfig    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Time between a sale and the earliest moment its payout may be transferred
    pub holding_period: Duration,
    pub fees: FeeSchedule,
    pub currency: String,
    /// Upper bound on any single payment rail call
    pub rail_timeout: std::time::Duration,
    /// A payout that has been `processing` for longer than this is treated as stuck
    pub stuck_after: Duration,
    /// Raise an alert if the aggregator's available balance drops below this
    pub low_balance_threshold: Cents,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            holding_period: Duration::days(14),
            fees: FeeSchedule::default(),
            currency: payout_common::DEFAULT_CURRENCY_CODE.to_string(),
            rail_timeout: std::time::Duration::from_secs(30),
            stuck_after: Duration::minutes(60),
            low_balance_threshold: Cents::ZERO,
        }
    }
}

//--------------------------------------   PayoutQueryFilter   ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayoutQueryFilter {
    pub vendor_id: Option<i64>,
    pub order_id: Option<OrderId>,
    pub status: Option<Vec<PayoutStatus>>,
    /// Only payouts whose sale happened at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Only payouts whose sale happened at or before this time
    pub until: Option<DateTime<Utc>>,
    /// `Some(false)` excludes debt entries, `Some(true)` returns only debt entries
    pub refund_debt: Option<bool>,
}

impl PayoutQueryFilter {
    pub fn with_vendor_id(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_status(mut self, status: PayoutStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn earnings_only(mut self) -> Self {
        self.refund_debt = Some(false);
        self
    }

    pub fn debts_only(mut self) -> Self {
        self.refund_debt = Some(true);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vendor_id.is_none() &&
            self.order_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.refund_debt.is_none()
    }
}

impl Display for PayoutQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(vendor_id) = self.vendor_id {
            write!(f, "vendor_id: {vendor_id}. ")?;
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: {statuses}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(debt) = self.refund_debt {
            write!(f, "refund_debt: {debt}. ")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl Pagination {
    pub fn new(offset: i64, count: i64) -> Self {
        Self { offset: Some(offset), count: Some(count) }
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// The page size, clamped to `1..=MAX_PAGE_SIZE`
    pub fn count(&self) -> i64 {
        self.count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPage {
    pub total: i64,
    pub offset: i64,
    pub count: i64,
    pub payouts: Vec<Payout>,
}

//--------------------------------------    TransferLogFilter  ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferLogFilter {
    pub vendor_id: Option<i64>,
    pub payout_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TransferLogFilter {
    pub fn with_vendor_id(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_payout_id(mut self, payout_id: i64) -> Self {
        self.payout_id = Some(payout_id);
        self
    }
}

//--------------------------------------      Summaries        ---------------------------------------------------------
/// The result of one settlement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Eligible payouts the run attempted
    pub processed: usize,
    /// Payouts that ended up `paid`, with or without a rail transfer
    pub succeeded: usize,
    pub failed: usize,
    /// Payouts that another actor moved on while the run was in progress
    pub skipped: usize,
    /// Stuck `processing` payouts that were resolved before the run started
    pub reconciled: usize,
    /// Of `succeeded`, how many were settled entirely out of debt
    pub offset_by_debt: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            reconciled: 0,
            offset_by_debt: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} succeeded ({} by debt offset), {} failed, {} skipped, {} reconciled",
            self.processed, self.succeeded, self.offset_by_debt, self.failed, self.skipped, self.reconciled
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub pending_count: i64,
    pub pending_amount: Cents,
    pub processing_count: i64,
    pub processing_amount: Cents,
    pub paid_count: i64,
    pub paid_amount: Cents,
    pub failed_count: i64,
    pub failed_amount: Cents,
    /// Sum of what actually left the aggregator account for paid payouts
    pub transferred_amount: Cents,
    /// Debt recovered by offsetting it against payouts
    pub debt_recovered: Cents,
    /// Sum of every vendor's outstanding debt balance
    pub outstanding_debt: Cents,
    pub vendors_with_debt: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub vendor_id: i64,
    pub pending_earnings: Cents,
    pub paid_earnings: Cents,
    pub debt_balance: Cents,
    pub onboarded: bool,
}

/// A payout as the vendor gets to see it: no rail references, no error internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorPayout {
    pub id: i64,
    pub order_id: OrderId,
    pub amount: Cents,
    pub gross_amount: Cents,
    pub processing_fee: Cents,
    pub transfer_fee: Cents,
    pub debt_offset: Cents,
    pub sale_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub status: PayoutStatus,
    pub is_refund_debt: bool,
}

impl From<Payout> for VendorPayout {
    fn from(p: Payout) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            amount: p.amount,
            gross_amount: p.gross_amount,
            processing_fee: p.processing_fee,
            transfer_fee: p.transfer_fee,
            debt_offset: p.debt_offset,
            sale_date: p.sale_date,
            payment_date: p.payment_date,
            status: p.status,
            is_refund_debt: p.is_refund_debt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorPayoutPage {
    pub total: i64,
    pub offset: i64,
    pub count: i64,
    pub payouts: Vec<VendorPayout>,
}

/// A sale that has not been paid out yet, with a countdown to the end of its holding period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSale {
    pub payout_id: i64,
    pub order_id: OrderId,
    pub amount: Cents,
    pub sale_date: DateTime<Utc>,
    pub eligible_at: DateTime<Utc>,
    pub days_remaining: i64,
}

impl PendingSale {
    pub fn new(payout: &Payout, holding_period: Duration, now: DateTime<Utc>) -> Self {
        let eligible_at = payout.sale_date + holding_period;
        Self {
            payout_id: payout.id,
            order_id: payout.order_id.clone(),
            amount: payout.amount,
            sale_date: payout.sale_date,
            eligible_at,
            days_remaining: days_until(now, eligible_at),
        }
    }
}

/// Whole days from `now` until `then`, rounded up. Zero if `then` has passed.
pub fn days_until(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    let remaining = then - now;
    if remaining <= Duration::zero() {
        return 0;
    }
    let day_ms = Duration::days(1).num_milliseconds();
    let ms = remaining.num_milliseconds();
    (ms + day_ms - 1) / day_ms
}
