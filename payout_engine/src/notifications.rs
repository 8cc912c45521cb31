//! Bridges settlement events to a [`Notifier`].
//!
//! Vendor-facing messages:
//! * `payment_received` when money actually moved over the payment rail,
//! * `debt_offset` whenever part (or all) of a payout went towards the vendor's debt,
//! * `earnings_cancelled` and `debt_registered` for the two refund paths.
//!
//! A payout that was settled entirely from debt therefore produces a single "debt reduced" message, never a
//! "payment received" one. Operator alerts are forwarded as they are.
//!
//! Notification failures are logged and otherwise ignored. The ledger has already been updated by the time any of
//! these hooks run.
use std::{future::Future, pin::Pin};

use log::*;

use crate::{
    events::{
        DebtOffsetEvent,
        DebtRegisteredEvent,
        EarningsCancelledEvent,
        EventHandlers,
        EventHooks,
        OperatorAlertEvent,
        PayoutPaidEvent,
    },
    traits::Notifier,
};

pub const NOTIFIER_EVENT_BUFFER_SIZE: usize = 50;

/// Builds event hooks that forward every vendor-facing event and operator alert to `notifier`.
pub fn notifier_hooks<N: Notifier>(notifier: N) -> EventHooks {
    let mut hooks = EventHooks::default();

    let n = notifier.clone();
    hooks.on_payout_paid(move |ev: PayoutPaidEvent| {
        if !ev.transferred.is_positive() {
            trace!("📬️ Payout #{} moved no money. No payment notification.", ev.payout.id);
            return no_op();
        }
        let n = n.clone();
        Box::pin(async move {
            if let Err(e) = n.payment_received(&ev.vendor, ev.transferred, ev.payout.id).await {
                warn!("📬️ Could not tell vendor #{} about payout #{}. {e}", ev.vendor.id, ev.payout.id);
            }
        })
    });

    let n = notifier.clone();
    hooks.on_debt_offset(move |ev: DebtOffsetEvent| {
        let n = n.clone();
        Box::pin(async move {
            if let Err(e) = n.debt_offset(&ev.vendor, ev.offset, ev.payout_id).await {
                warn!("📬️ Could not tell vendor #{} about the debt offset on payout #{}. {e}", ev.vendor.id, ev.payout_id);
            }
        })
    });

    let n = notifier.clone();
    hooks.on_earnings_cancelled(move |ev: EarningsCancelledEvent| {
        let n = n.clone();
        Box::pin(async move {
            if let Err(e) = n.earnings_cancelled(&ev.vendor, ev.amount, &ev.order_id).await {
                warn!("📬️ Could not tell vendor #{} that earnings for {} were cancelled. {e}", ev.vendor.id, ev.order_id);
            }
        })
    });

    let n = notifier.clone();
    hooks.on_debt_registered(move |ev: DebtRegisteredEvent| {
        let n = n.clone();
        Box::pin(async move {
            if let Err(e) = n.debt_registered(&ev.vendor, ev.amount, &ev.order_id).await {
                warn!("📬️ Could not tell vendor #{} about the debt for {}. {e}", ev.vendor.id, ev.order_id);
            }
        })
    });

    hooks.on_operator_alert(move |ev: OperatorAlertEvent| {
        let n = notifier.clone();
        Box::pin(async move {
            let context = match ev.payout_id {
                Some(id) => format!("[payout #{id}] {}", ev.context),
                None => ev.context,
            };
            if let Err(e) = n.alert_operator(ev.kind, &context).await {
                error!("🚨️ Operator alert ({}) could not be delivered: {e}. Alert was: {context}", ev.kind);
            }
        })
    });

    hooks
}

/// Convenience wrapper around [`notifier_hooks`] that returns ready-to-start handlers.
pub fn create_notifier_event_handlers<N: Notifier>(notifier: N) -> EventHandlers {
    EventHandlers::new(NOTIFIER_EVENT_BUFFER_SIZE, notifier_hooks(notifier))
}

fn no_op() -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async {})
}
