use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, OrderId, Payout, Vendor};

/// A payout reached `paid`. `transferred` is what actually moved over the payment rail; it is zero when the payout
/// was settled entirely out of the vendor's debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPaidEvent {
    pub payout: Payout,
    pub vendor: Vendor,
    pub transferred: Cents,
}

impl PayoutPaidEvent {
    pub fn new(payout: Payout, vendor: Vendor, transferred: Cents) -> Self {
        Self { payout, vendor, transferred }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutFailedEvent {
    pub payout: Payout,
    pub reason: String,
}

impl PayoutFailedEvent {
    pub fn new<S: Into<String>>(payout: Payout, reason: S) -> Self {
        Self { payout, reason: reason.into() }
    }
}

/// Some of a vendor's outstanding debt was recovered by deducting it from a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtOffsetEvent {
    pub vendor: Vendor,
    pub payout_id: i64,
    pub order_id: OrderId,
    pub offset: Cents,
}

impl DebtOffsetEvent {
    pub fn new(vendor: Vendor, payout_id: i64, order_id: OrderId, offset: Cents) -> Self {
        Self { vendor, payout_id, order_id, offset }
    }

    pub fn remaining_debt(&self) -> Cents {
        self.vendor.debt_balance
    }
}

/// A not-yet-transferred payout was removed because its order was refunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsCancelledEvent {
    pub vendor: Vendor,
    pub order_id: OrderId,
    pub amount: Cents,
}

impl EarningsCancelledEvent {
    pub fn new(vendor: Vendor, order_id: OrderId, amount: Cents) -> Self {
        Self { vendor, order_id, amount }
    }
}

/// A refund landed after the vendor had been paid. `amount` is the (positive) sum now owed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtRegisteredEvent {
    pub vendor: Vendor,
    pub order_id: OrderId,
    pub amount: Cents,
    pub debt_payout: Payout,
}

impl DebtRegisteredEvent {
    pub fn new(vendor: Vendor, order_id: OrderId, amount: Cents, debt_payout: Payout) -> Self {
        Self { vendor, order_id, amount, debt_payout }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    TransferFailed,
    SchedulerRunFailed,
    LowAggregatorBalance,
    /// The payment rail moved money but the ledger could not record it. Needs a human, now.
    PersistenceFailure,
    StuckPayout,
}

impl Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertKind::TransferFailed => "transfer failed",
            AlertKind::SchedulerRunFailed => "settlement run failed",
            AlertKind::LowAggregatorBalance => "low aggregator balance",
            AlertKind::PersistenceFailure => "ledger write failed after transfer",
            AlertKind::StuckPayout => "stuck payout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlertEvent {
    pub kind: AlertKind,
    pub context: String,
    pub payout_id: Option<i64>,
    pub raised_at: DateTime<Utc>,
}

impl OperatorAlertEvent {
    pub fn new<S: Into<String>>(kind: AlertKind, context: S, raised_at: DateTime<Utc>) -> Self {
        Self { kind, context: context.into(), payout_id: None, raised_at }
    }

    pub fn for_payout(mut self, payout_id: i64) -> Self {
        self.payout_id = Some(payout_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    PayoutPaid(PayoutPaidEvent),
    PayoutFailed(PayoutFailedEvent),
    DebtOffset(DebtOffsetEvent),
    EarningsCancelled(EarningsCancelledEvent),
    DebtRegistered(DebtRegisteredEvent),
    OperatorAlert(OperatorAlertEvent),
}
