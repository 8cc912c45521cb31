use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, Order, Payout, Vendor};

/// The state of a payout and its vendor straight after a settling transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSettlement {
    pub payout: Payout,
    pub vendor: Vendor,
    /// Debt entries that were closed because this settlement brought the vendor's debt balance to zero
    pub recovered_debts: Vec<Payout>,
}

/// What [`crate::traits::SettlementDatabase::begin_transfer`] decided to do with a payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// The vendor's debt covered the whole payout. It is already `paid`; nothing goes to the rail.
    SettledByDebt(PayoutSettlement),
    /// The payout is now `processing`. `amount` must be sent to the vendor; `debt_offset` has been reserved out of
    /// their debt balance and is restored if the transfer fails.
    Transfer { payout: Payout, vendor: Vendor, amount: Cents, debt_offset: Cents },
}

impl TransferPlan {
    pub fn payout(&self) -> &Payout {
        match self {
            TransferPlan::SettledByDebt(s) => &s.payout,
            TransferPlan::Transfer { payout, .. } => payout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub order: Order,
    /// Payouts that were removed before any money moved, with the vendor's balances after the removal
    pub cancelled: Vec<(Payout, Vendor)>,
    /// New debt entries, one per vendor that had already been paid
    pub debts: Vec<(Payout, Vendor)>,
}

impl RefundResult {
    pub fn total_cancelled(&self) -> Cents {
        self.cancelled.iter().map(|(p, _)| p.amount).sum()
    }

    /// Total registered as debt, as a positive amount
    pub fn total_debt(&self) -> Cents {
        -self.debts.iter().map(|(p, _)| p.amount).sum::<Cents>()
    }
}
