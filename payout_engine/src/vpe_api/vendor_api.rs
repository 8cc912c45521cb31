use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::PayoutStatus,
    helpers::Clock,
    payout_objects::{
        EarningsSummary,
        Pagination,
        PayoutQueryFilter,
        PendingSale,
        VendorPayout,
        VendorPayoutPage,
        MAX_PAGE_SIZE,
    },
    traits::PayoutQueries,
    SettlementError,
};

/// What a vendor can see of their own earnings. Rail references and failure details are never exposed here.
pub struct VendorApi<B> {
    db: B,
    holding_period: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<B> Debug for VendorApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VendorApi")
    }
}

impl<B> VendorApi<B> {
    pub fn new(db: B, holding_period: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self { db, holding_period, clock }
    }
}

impl<B> VendorApi<B>
where B: PayoutQueries
{
    pub async fn earnings_summary(&self, vendor_id: i64) -> Result<EarningsSummary, SettlementError> {
        let vendor = self
            .db
            .vendor_by_id(vendor_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Vendor #{vendor_id}")))?;
        Ok(EarningsSummary {
            vendor_id,
            pending_earnings: vendor.pending_earnings,
            paid_earnings: vendor.paid_earnings,
            debt_balance: vendor.debt_balance,
            onboarded: vendor.rail_account_id.is_some(),
        })
    }

    /// All of the vendor's payouts, including debt entries, newest sale first.
    pub async fn payout_history(
        &self,
        vendor_id: i64,
        pagination: Pagination,
    ) -> Result<VendorPayoutPage, SettlementError> {
        self.ensure_vendor(vendor_id).await?;
        let filter = PayoutQueryFilter::default().with_vendor_id(vendor_id);
        let total = self.db.count_payouts(filter.clone()).await?;
        let payouts = self.db.search_payouts(filter, pagination).await?;
        let payouts = payouts.into_iter().map(VendorPayout::from).collect::<Vec<_>>();
        trace!("Vendor #{vendor_id} payout history: {} of {total}", payouts.len());
        Ok(VendorPayoutPage { total, offset: pagination.offset(), count: payouts.len() as i64, payouts })
    }

    /// Sales that have not been paid out yet, with the number of days left until each becomes eligible. Sorted by
    /// how soon they become eligible.
    pub async fn pending_sales(&self, vendor_id: i64) -> Result<Vec<PendingSale>, SettlementError> {
        self.ensure_vendor(vendor_id).await?;
        let filter = PayoutQueryFilter::default()
            .with_vendor_id(vendor_id)
            .with_status(PayoutStatus::Pending)
            .with_status(PayoutStatus::Processing)
            .earnings_only();
        let mut payouts = Vec::new();
        loop {
            let page =
                self.db.search_payouts(filter.clone(), Pagination::new(payouts.len() as i64, MAX_PAGE_SIZE)).await?;
            let done = (page.len() as i64) < MAX_PAGE_SIZE;
            payouts.extend(page);
            if done {
                break;
            }
        }
        trace!("Vendor #{vendor_id} has {} unpaid sales", payouts.len());
        let now = self.clock.now();
        let mut sales = payouts.iter().map(|p| PendingSale::new(p, self.holding_period, now)).collect::<Vec<_>>();
        sales.sort_by(|a, b| a.eligible_at.cmp(&b.eligible_at).then(a.payout_id.cmp(&b.payout_id)));
        Ok(sales)
    }

    async fn ensure_vendor(&self, vendor_id: i64) -> Result<(), SettlementError> {
        match self.db.vendor_by_id(vendor_id).await? {
            Some(_) => Ok(()),
            None => Err(SettlementError::NotFound(format!("Vendor #{vendor_id}"))),
        }
    }
}
