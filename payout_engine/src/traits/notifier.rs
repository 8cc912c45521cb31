use std::future::Future;

use thiserror::Error;

use crate::{
    db_types::{Cents, OrderId, Vendor},
    events::AlertKind,
};

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Could not deliver notification: {0}")]
    DeliveryFailed(String),
    #[error("Notifier is not configured: {0}")]
    NotConfigured(String),
}

/// Delivers vendor-facing messages and operator alerts (email, SMS, a chat webhook...).
///
/// Failures are reported back to the caller, who logs them. They never affect the state of the ledger.
pub trait Notifier: Clone + Send + Sync + 'static {
    /// Money arrived in the vendor's account.
    fn payment_received(
        &self,
        vendor: &Vendor,
        amount: Cents,
        payout_id: i64,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;

    /// Part or all of a payout went towards the vendor's outstanding debt.
    fn debt_offset(
        &self,
        vendor: &Vendor,
        amount: Cents,
        payout_id: i64,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;

    /// An order the vendor had already been paid for was refunded. `amount` will be deducted from future payouts.
    fn debt_registered(
        &self,
        vendor: &Vendor,
        amount: Cents,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;

    /// An order was refunded before the vendor was paid for it.
    fn earnings_cancelled(
        &self,
        vendor: &Vendor,
        amount: Cents,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;

    fn alert_operator(&self, kind: AlertKind, context: &str) -> impl Future<Output = Result<(), NotificationError>> + Send;
}
