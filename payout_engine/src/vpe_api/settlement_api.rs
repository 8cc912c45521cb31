use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{Cents, NewOrder, NewPayout, Order, Payout, PayoutStatus},
    earnings::{calculate_earnings, EarningsBreakdown},
    events::{AlertKind, EventProducers},
    helpers::Clock,
    payout_objects::{RunSummary, SettlementConfig},
    traits::{PaymentRail, SettlementDatabase},
    vpe_api::payout_executor::{PayoutExecutor, PayoutOutcome, Trigger},
    SettlementError,
};

/// `SettlementApi` takes paid orders in, and pays vendors out.
///
/// * [`Self::process_paid_order`] turns a paid order into one `pending` payout per vendor.
/// * [`Self::run_settlement`] is one run of the settlement scheduler. It has no timer of its own: call it from a
///   worker loop, a test, or an admin endpoint.
pub struct SettlementApi<B, R> {
    executor: PayoutExecutor<B, R>,
}

impl<B, R> Debug for SettlementApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B: Clone, R: Clone> Clone for SettlementApi<B, R> {
    fn clone(&self) -> Self {
        Self { executor: self.executor.clone() }
    }
}

impl<B, R> SettlementApi<B, R> {
    pub fn new(db: B, rail: R, producers: EventProducers, config: SettlementConfig, clock: Arc<dyn Clock>) -> Self {
        Self { executor: PayoutExecutor::new(db, rail, producers, config, clock) }
    }

    pub fn config(&self) -> &SettlementConfig {
        self.executor.config()
    }

    pub fn db(&self) -> &B {
        self.executor.db()
    }

    pub(crate) fn executor(&self) -> &PayoutExecutor<B, R> {
        &self.executor
    }
}

impl<B, R> SettlementApi<B, R>
where
    B: SettlementDatabase,
    R: PaymentRail,
{
    /// Records a paid order and creates a `pending` payout for every vendor in it.
    ///
    /// Every vendor must exist, the order must be in the settlement currency and its id must not have been seen
    /// before (that is a `Conflict`). The order, its items, the payouts and the pending-earnings increments are
    /// written in one transaction.
    pub async fn process_paid_order(
        &self,
        order: NewOrder,
    ) -> Result<(Order, Vec<Payout>, EarningsBreakdown), SettlementError> {
        let config = self.executor.config();
        if !order.currency.eq_ignore_ascii_case(&config.currency) {
            return Err(SettlementError::Validation(format!(
                "Order {} is in {}, but payouts are settled in {}",
                order.order_id, order.currency, config.currency
            )));
        }
        let breakdown = calculate_earnings(&order, &config.fees)?;
        for earnings in &breakdown.vendors {
            if self.executor.db().fetch_vendor(earnings.vendor_id).await?.is_none() {
                return Err(SettlementError::Validation(format!(
                    "Order {} has items from vendor #{}, who is not registered",
                    order.order_id, earnings.vendor_id
                )));
            }
        }
        let now = self.executor.clock().now();
        let payouts = breakdown
            .vendors
            .iter()
            .map(|v| NewPayout {
                order_id: order.order_id.clone(),
                vendor_id: v.vendor_id,
                amount: v.net_amount,
                gross_amount: v.gross_amount,
                processing_fee: v.processing_fee,
                transfer_fee: v.transfer_fee,
                sale_date: now,
            })
            .collect::<Vec<_>>();
        let order_id = order.order_id.clone();
        let (order, payouts) = self.executor.db().insert_paid_order(order, payouts, now).await?;
        info!(
            "🧮️ Order {order_id} ({}) recorded. {} paid out to {} vendors, {} in fees.",
            order.total_price,
            breakdown.total_net(),
            payouts.len(),
            breakdown.processing_fee + breakdown.transfer_fees
        );
        Ok((order, payouts, breakdown))
    }

    /// Runs the settlement scheduler once.
    ///
    /// 1. Payouts stuck in `processing` for longer than `stuck_after` are resolved against the payment rail.
    /// 2. `pending` earnings whose holding period has elapsed are selected, oldest first.
    /// 3. The aggregator balance is checked against what is about to be paid out.
    /// 4. Each payout is settled in turn. A failure never stops the run.
    ///
    /// Only a failure to read the list of payouts aborts the run. That raises a `SchedulerRunFailed` alert.
    pub async fn run_settlement(&self) -> Result<RunSummary, SettlementError> {
        let started_at = self.executor.clock().now();
        info!("💸️ Settlement run started at {started_at}");
        let mut summary = RunSummary::new(started_at);
        match self.settle_all(&mut summary).await {
            Ok(()) => {
                summary.finished_at = self.executor.clock().now();
                info!("💸️ Settlement run complete. {summary}");
                Ok(summary)
            },
            Err(e) => {
                let context = format!("settlement run started at {started_at} was aborted: {e}. Progress: {summary}");
                self.executor.alert(AlertKind::SchedulerRunFailed, context, None).await;
                Err(e)
            },
        }
    }

    async fn settle_all(&self, summary: &mut RunSummary) -> Result<(), SettlementError> {
        let config = self.executor.config();
        let now = summary.started_at;
        let stuck = self.executor.db().fetch_stuck_payouts(now - config.stuck_after).await?;
        if !stuck.is_empty() {
            warn!("💸️ {} payouts have been processing for more than {}", stuck.len(), config.stuck_after);
        }
        for payout in stuck {
            match self.executor.reconcile_stuck(&payout).await {
                Ok(_) => summary.reconciled += 1,
                Err(e) => warn!("💸️ Stuck payout #{} could not be resolved. {e}", payout.id),
            }
        }

        let eligible = self.executor.db().fetch_eligible_payouts(now - config.holding_period).await?;
        debug!("💸️ {} payouts are eligible for settlement", eligible.len());
        self.check_aggregator_balance(&eligible).await;

        for payout in eligible {
            summary.processed += 1;
            match self.executor.execute(payout.id, PayoutStatus::Pending, Trigger::Scheduler).await {
                Ok(PayoutOutcome::SettledByDebt(_)) => {
                    summary.succeeded += 1;
                    summary.offset_by_debt += 1;
                },
                Ok(PayoutOutcome::Failed { .. }) => summary.failed += 1,
                Ok(_) => summary.succeeded += 1,
                Err(e @ (SettlementError::Conflict(_) | SettlementError::NotFound(_))) => {
                    info!("💸️ Payout #{} changed during the run and was skipped. {e}", payout.id);
                    summary.skipped += 1;
                },
                Err(e) => {
                    error!("💸️ Payout #{} could not be settled. {e}", payout.id);
                    summary.failed += 1;
                },
            }
        }
        Ok(())
    }

    async fn check_aggregator_balance(&self, eligible: &[Payout]) {
        let config = self.executor.config();
        let required: Cents = eligible.iter().map(|p| p.amount).sum();
        let balance = match tokio::time::timeout(config.rail_timeout, self.executor.rail().aggregator_balance()).await {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                warn!("💸️ Could not read the aggregator balance. {e}");
                return;
            },
            Err(_) => {
                warn!("💸️ Timed out reading the aggregator balance");
                return;
            },
        };
        trace!("💸️ Aggregator balance: {} available, {} pending", balance.available, balance.pending);
        if balance.available < required {
            let context = format!(
                "{} is available in the aggregator account, but {required} is due to {} eligible payouts",
                balance.available,
                eligible.len()
            );
            self.executor.alert(AlertKind::LowAggregatorBalance, context, None).await;
        } else if balance.available < config.low_balance_threshold {
            let context = format!(
                "{} is available in the aggregator account, below the threshold of {}",
                balance.available, config.low_balance_threshold
            );
            self.executor.alert(AlertKind::LowAggregatorBalance, context, None).await;
        }
    }
}
