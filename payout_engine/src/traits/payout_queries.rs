use crate::{
    db_types::{Payout, TransferLogEntry, Vendor},
    payout_objects::{Pagination, PaymentStats, PayoutQueryFilter, TransferLogFilter},
    traits::SettlementDbError,
};

/// Read-only queries over the payout ledger, used by the admin and vendor surfaces.
#[allow(async_fn_in_trait)]
pub trait PayoutQueries {
    async fn vendor_by_id(&self, vendor_id: i64) -> Result<Option<Vendor>, SettlementDbError>;

    async fn payout_by_id(&self, payout_id: i64) -> Result<Option<Payout>, SettlementDbError>;

    /// Payouts matching the filter, newest sale first.
    async fn search_payouts(
        &self,
        filter: PayoutQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<Payout>, SettlementDbError>;

    async fn count_payouts(&self, filter: PayoutQueryFilter) -> Result<i64, SettlementDbError>;

    async fn payment_stats(&self) -> Result<PaymentStats, SettlementDbError>;

    /// Transfer log entries matching the filter, oldest first.
    async fn fetch_transfer_log(&self, filter: TransferLogFilter) -> Result<Vec<TransferLogEntry>, SettlementDbError>;
}
