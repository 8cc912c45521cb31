use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewVendor, Vendor},
    traits::SettlementDbError,
};

#[allow(async_fn_in_trait)]
pub trait VendorManagement {
    async fn insert_vendor(&self, vendor: NewVendor, now: DateTime<Utc>) -> Result<Vendor, SettlementDbError>;

    /// Records the vendor's destination account on the payment rail.
    async fn link_rail_account(
        &self,
        vendor_id: i64,
        rail_account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vendor, SettlementDbError>;

    async fn fetch_vendors(&self) -> Result<Vec<Vendor>, SettlementDbError>;
}
