use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::OrderId,
    events::{DebtRegisteredEvent, EarningsCancelledEvent, EventProducers},
    helpers::Clock,
    traits::{RefundResult, SettlementDatabase},
    SettlementError,
};

/// The refund reconciler.
///
/// A refund covers a whole order. Each vendor in the order is handled on its own, because their payouts can be at
/// different stages:
/// * if the vendor has not been paid yet, their payout is deleted and their pending earnings go down;
/// * if they have, the paid payout is left alone and a debt entry for the same amount is created. The debt is
///   recovered from the vendor's future payouts.
pub struct RefundApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
}

impl<B> Debug for RefundApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B> RefundApi<B> {
    pub fn new(db: B, producers: EventProducers, clock: Arc<dyn Clock>) -> Self {
        Self { db, producers, clock }
    }
}

impl<B> RefundApi<B>
where B: SettlementDatabase
{
    /// Refunds the order. A second refund of the same order is a `Conflict`; an unknown order is `NotFound`.
    pub async fn refund_order(&self, order_id: &OrderId, reason: &str) -> Result<RefundResult, SettlementError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SettlementError::Validation("A refund reason is required".into()));
        }
        let result = self.db.refund_order(order_id, reason, self.clock.now()).await?;
        for (payout, vendor) in &result.cancelled {
            debug!("↩️ Vendor #{} loses {} of pending earnings for order {order_id}", vendor.id, payout.amount);
            let event = EarningsCancelledEvent::new(vendor.clone(), order_id.clone(), payout.amount);
            self.producers.publish_earnings_cancelled(event).await;
        }
        for (debt, vendor) in &result.debts {
            let amount = -debt.amount;
            debug!("↩️ Vendor #{} now owes {amount} for order {order_id}. Total debt: {}", vendor.id, vendor.debt_balance);
            let event = DebtRegisteredEvent::new(vendor.clone(), order_id.clone(), amount, debt.clone());
            self.producers.publish_debt_registered(event).await;
        }
        info!(
            "↩️ Order {order_id} refunded ({reason}). {} cancelled from pending earnings, {} registered as debt.",
            result.total_cancelled(),
            result.total_debt()
        );
        Ok(result)
    }
}
