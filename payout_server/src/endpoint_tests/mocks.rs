use mockall::mock;
use payout_engine::{
    db_types::{Payout, TransferLogEntry, Vendor},
    payout_objects::{Pagination, PaymentStats, PayoutQueryFilter, TransferLogFilter},
    traits::{PayoutQueries, SettlementDbError},
};

mock! {
    pub Ledger {}
    impl PayoutQueries for Ledger {
        async fn vendor_by_id(&self, vendor_id: i64) -> Result<Option<Vendor>, SettlementDbError>;
        async fn payout_by_id(&self, payout_id: i64) -> Result<Option<Payout>, SettlementDbError>;
        async fn search_payouts(
            &self,
            filter: PayoutQueryFilter,
            pagination: Pagination,
        ) -> Result<Vec<Payout>, SettlementDbError>;
        async fn count_payouts(&self, filter: PayoutQueryFilter) -> Result<i64, SettlementDbError>;
        async fn payment_stats(&self) -> Result<PaymentStats, SettlementDbError>;
        async fn fetch_transfer_log(&self, filter: TransferLogFilter) -> Result<Vec<TransferLogEntry>, SettlementDbError>;
    }
}
