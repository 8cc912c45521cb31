//! The debt-offset-then-transfer procedure shared by the settlement scheduler and the admin overrides.
//!
//! For a single payout:
//! 1. The vendor must have a destination account on the payment rail that can receive transfers.
//! 2. [`SettlementDatabase::begin_transfer`] deducts outstanding debt and either settles the payout outright or
//!    checkpoints it as `processing`. This is the last write before the rail is called.
//! 3. The rail is called with a bounded timeout. Success is recorded with
//!    [`SettlementDatabase::complete_transfer`]; any failure (including a timeout) with
//!    [`SettlementDatabase::fail_transfer`].
//!
//! If the rail reports success and the ledger cannot record it, the payout is left `processing` and an operator alert
//! is raised. The stuck-payout reconciler picks it up on the next run.
use std::{fmt::Debug, future::Future, sync::Arc};

use log::*;

use crate::{
    db_types::{Cents, Payout, PayoutStatus, TransferAction, Vendor},
    events::{AlertKind, DebtOffsetEvent, EventProducers, OperatorAlertEvent, PayoutFailedEvent, PayoutPaidEvent},
    helpers::Clock,
    payout_objects::SettlementConfig,
    traits::{
        PaymentRail,
        PayoutSettlement,
        RailError,
        RailTransferRequest,
        SettlementDatabase,
        SettlementDbError,
        TransferPlan,
    },
    SettlementError,
};

/// Who asked for the payout to be settled. Decides what happens when the vendor cannot receive money yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A settlement run. The payout is failed and the run moves on.
    Scheduler,
    /// An operator. The request is refused and the payout is left as it was.
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    /// Money moved over the payment rail
    Transferred(PayoutSettlement),
    /// The vendor's debt covered the whole payout, so nothing was sent
    SettledByDebt(PayoutSettlement),
    /// A transfer from an earlier attempt was found on the rail and recorded instead of sending a new one
    Reconciled(PayoutSettlement),
    Failed { payout: Payout, reason: String },
}

impl PayoutOutcome {
    pub fn payout(&self) -> &Payout {
        match self {
            PayoutOutcome::Transferred(s) | PayoutOutcome::SettledByDebt(s) | PayoutOutcome::Reconciled(s) => &s.payout,
            PayoutOutcome::Failed { payout, .. } => payout,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, PayoutOutcome::Failed { .. })
    }
}

#[derive(Clone)]
pub struct PayoutExecutor<B, R> {
    db: B,
    rail: R,
    producers: EventProducers,
    config: SettlementConfig,
    clock: Arc<dyn Clock>,
}

impl<B, R> Debug for PayoutExecutor<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutExecutor")
    }
}

impl<B, R> PayoutExecutor<B, R> {
    pub fn new(db: B, rail: R, producers: EventProducers, config: SettlementConfig, clock: Arc<dyn Clock>) -> Self {
        Self { db, rail, producers, config, clock }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn rail(&self) -> &R {
        &self.rail
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn producers(&self) -> &EventProducers {
        &self.producers
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Logs an operator alert and hands it to any subscribers.
    pub async fn alert(&self, kind: AlertKind, context: String, payout_id: Option<i64>) {
        match payout_id {
            Some(id) => error!("🚨️ {kind} [payout #{id}]: {context}"),
            None => error!("🚨️ {kind}: {context}"),
        }
        let mut event = OperatorAlertEvent::new(kind, context, self.clock.now());
        if let Some(id) = payout_id {
            event = event.for_payout(id);
        }
        self.producers.publish_operator_alert(event).await;
    }
}

impl<B, R> PayoutExecutor<B, R>
where
    B: SettlementDatabase,
    R: PaymentRail,
{
    /// Runs a rail call with the configured timeout. A timeout is reported as [`RailError::Timeout`].
    async fn with_timeout<T, F>(&self, call: F) -> Result<T, RailError>
    where F: Future<Output = Result<T, RailError>> {
        match tokio::time::timeout(self.config.rail_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RailError::Timeout(self.config.rail_timeout.as_millis() as u64)),
        }
    }

    /// Returns the reason the vendor cannot receive transfers, if there is one.
    async fn readiness_problem(&self, vendor: &Vendor) -> Option<String> {
        let Some(account_id) = vendor.rail_account_id.as_deref() else {
            return Some("rail account not ready: the vendor has not been onboarded".to_string());
        };
        match self.with_timeout(self.rail.account_status(account_id)).await {
            Ok(status) if status.is_ready() => None,
            Ok(status) => Some(format!(
                "rail account not ready: chargeable={}, transfers_enabled={}",
                status.chargeable, status.transfers_enabled
            )),
            Err(e) => Some(format!("rail account not ready: could not check account {account_id}. {e}")),
        }
    }

    /// Settles the payout, which must currently be `expected` (`pending` for a normal or forced payment, `failed` for
    /// a retry).
    ///
    /// Returns `Ok(PayoutOutcome::Failed)` when the payout was attempted and failed. Errors mean nothing was
    /// attempted (`Conflict`, `Validation`, `NotFound`, or `Rail` when a retry could not check for an earlier
    /// transfer), or that the rail moved money the ledger could not record (`Persistence`).
    pub async fn execute(
        &self,
        payout_id: i64,
        expected: PayoutStatus,
        trigger: Trigger,
    ) -> Result<PayoutOutcome, SettlementError> {
        let payout = self
            .db
            .fetch_payout(payout_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Payout #{payout_id}")))?;
        if payout.is_refund_debt {
            return Err(SettlementError::Validation(format!(
                "Payout #{payout_id} is a refund debt entry. Debt entries are settled out of future earnings."
            )));
        }
        if payout.status != expected {
            return Err(SettlementError::Conflict(format!(
                "Payout #{payout_id} is {}, but this operation requires it to be {expected}",
                payout.status
            )));
        }
        let vendor = self
            .db
            .fetch_vendor(payout.vendor_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Vendor #{}", payout.vendor_id)))?;

        // A retry must not send money twice, and must not reserve debt that an earlier transfer never deducted
        if expected == PayoutStatus::Failed && payout.attempts > 0 {
            match self.with_timeout(self.rail.find_transfer(payout_id)).await {
                Ok(Some(transfer)) => {
                    info!(
                        "💸️ Payout #{payout_id} already has transfer {} on the rail. Recording it instead of \
                         transferring again.",
                        transfer.transfer_id
                    );
                    let settlement = self.record_adopted(&payout, &transfer.transfer_id, transfer.amount).await?;
                    return Ok(PayoutOutcome::Reconciled(settlement));
                },
                Ok(None) => trace!("💸️ No earlier transfer for payout #{payout_id} on the rail"),
                Err(e) => {
                    warn!("💸️ Could not verify earlier attempts for payout #{payout_id}. {e}");
                    return Err(SettlementError::Rail(e));
                },
            }
        }

        if let Some(reason) = self.readiness_problem(&vendor).await {
            return match trigger {
                Trigger::Operator => {
                    info!("💸️ Payout #{payout_id} cannot be paid yet. {reason}");
                    Err(SettlementError::Validation(reason))
                },
                Trigger::Scheduler => {
                    let payout = self.db.fail_transfer(payout_id, expected, &reason, self.clock.now()).await?;
                    warn!("💸️ Payout #{payout_id} failed before transfer. {reason}");
                    self.producers.publish_payout_failed(PayoutFailedEvent::new(payout.clone(), reason.clone())).await;
                    Ok(PayoutOutcome::Failed { payout, reason })
                },
            };
        }

        let plan = self.db.begin_transfer(payout_id, expected, self.clock.now()).await?;
        let (payout, vendor, amount) = match plan {
            TransferPlan::SettledByDebt(settlement) => {
                info!(
                    "💸️ Payout #{payout_id} ({}) was settled entirely out of vendor #{}'s debt",
                    settlement.payout.amount, settlement.vendor.id
                );
                self.publish_settled(&settlement, Cents::ZERO).await;
                return Ok(PayoutOutcome::SettledByDebt(settlement));
            },
            TransferPlan::Transfer { payout, vendor, amount, .. } => (payout, vendor, amount),
        };

        let Some(destination) = vendor.rail_account_id.clone() else {
            let reason = "rail account not ready: the vendor has not been onboarded".to_string();
            return self.record_failure(payout_id, reason).await;
        };
        let request = RailTransferRequest {
            destination,
            amount,
            currency: self.config.currency.clone(),
            payout_id,
            order_id: payout.order_id.clone(),
            vendor_id: vendor.id,
            attempt: payout.attempts,
        };
        debug!("💸️ Transferring {amount} to vendor #{} for payout #{payout_id} [{}]", vendor.id, request.idempotency_key());
        match self.with_timeout(self.rail.transfer(request)).await {
            Ok(transfer) => {
                let settlement = self.record_success(&payout, &transfer.transfer_id, TransferAction::Transferred).await?;
                Ok(PayoutOutcome::Transferred(settlement))
            },
            Err(e) => self.record_failure(payout_id, e.to_string()).await,
        }
    }

    /// Resolves a payout that has been `processing` for too long by asking the rail whether its transfer happened.
    pub async fn reconcile_stuck(&self, payout: &Payout) -> Result<PayoutOutcome, SettlementError> {
        let payout_id = payout.id;
        match self.with_timeout(self.rail.find_transfer(payout_id)).await {
            Ok(Some(transfer)) => {
                info!("💸️ Stuck payout #{payout_id} was transferred as {}. Recording it.", transfer.transfer_id);
                let settlement = self.record_success(payout, &transfer.transfer_id, TransferAction::Reconciled).await?;
                Ok(PayoutOutcome::Reconciled(settlement))
            },
            Ok(None) => {
                let reason = format!(
                    "no transfer found on the payment rail after being processing since {}",
                    payout.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
                let failed = self.db.fail_transfer(payout_id, PayoutStatus::Processing, &reason, self.clock.now()).await?;
                self.alert(AlertKind::StuckPayout, reason.clone(), Some(payout_id)).await;
                self.producers.publish_payout_failed(PayoutFailedEvent::new(failed.clone(), reason.clone())).await;
                Ok(PayoutOutcome::Failed { payout: failed, reason })
            },
            Err(e) => {
                self.alert(
                    AlertKind::StuckPayout,
                    format!("could not look up the transfer on the payment rail: {e}. The payout stays processing."),
                    Some(payout_id),
                )
                .await;
                Err(SettlementError::Rail(e))
            },
        }
    }

    async fn record_success(
        &self,
        payout: &Payout,
        transfer_id: &str,
        logged_as: TransferAction,
    ) -> Result<PayoutSettlement, SettlementError> {
        let payout_id = payout.id;
        match self.db.complete_transfer(payout_id, transfer_id, logged_as, self.clock.now()).await {
            Ok(settlement) => {
                info!(
                    "💸️ Payout #{payout_id} paid to vendor #{}. {} sent as {transfer_id}",
                    settlement.vendor.id,
                    settlement.payout.transfer_amount()
                );
                let transferred = settlement.payout.transfer_amount();
                self.publish_settled(&settlement, transferred).await;
                Ok(settlement)
            },
            Err(e) => {
                let context = format!(
                    "transfer {transfer_id} of {} succeeded on the payment rail but could not be recorded: {e}",
                    payout.transfer_amount()
                );
                self.alert(AlertKind::PersistenceFailure, context.clone(), Some(payout_id)).await;
                Err(SettlementError::Persistence(context))
            },
        }
    }

    async fn record_adopted(
        &self,
        payout: &Payout,
        transfer_id: &str,
        transferred: Cents,
    ) -> Result<PayoutSettlement, SettlementError> {
        let payout_id = payout.id;
        match self.db.complete_adopted_transfer(payout_id, transfer_id, transferred, self.clock.now()).await {
            Ok(settlement) => {
                let paid = settlement.payout.transfer_amount();
                self.publish_settled(&settlement, paid).await;
                Ok(settlement)
            },
            Err(e @ SettlementDbError::StatusConflict { .. }) => Err(e.into()),
            Err(e) => {
                let context = format!(
                    "earlier transfer {transfer_id} of {transferred} was found on the payment rail but could not be \
                     recorded: {e}"
                );
                self.alert(AlertKind::PersistenceFailure, context.clone(), Some(payout_id)).await;
                Err(SettlementError::Persistence(context))
            },
        }
    }

    async fn record_failure(&self, payout_id: i64, reason: String) -> Result<PayoutOutcome, SettlementError> {
        let payout = self.db.fail_transfer(payout_id, PayoutStatus::Processing, &reason, self.clock.now()).await?;
        self.alert(AlertKind::TransferFailed, reason.clone(), Some(payout_id)).await;
        self.producers.publish_payout_failed(PayoutFailedEvent::new(payout.clone(), reason.clone())).await;
        Ok(PayoutOutcome::Failed { payout, reason })
    }

    async fn publish_settled(&self, settlement: &PayoutSettlement, transferred: Cents) {
        let PayoutSettlement { payout, vendor, .. } = settlement;
        if payout.debt_offset.is_positive() {
            let event = DebtOffsetEvent::new(vendor.clone(), payout.id, payout.order_id.clone(), payout.debt_offset);
            self.producers.publish_debt_offset(event).await;
        }
        self.producers.publish_payout_paid(PayoutPaidEvent::new(payout.clone(), vendor.clone(), transferred)).await;
    }
}
