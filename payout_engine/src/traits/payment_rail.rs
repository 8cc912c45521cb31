use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Cents, OrderId, Vendor};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RailError {
    #[error("The payment rail rejected the request: {0}")]
    Rejected(String),
    #[error("The payment rail is unavailable: {0}")]
    Unavailable(String),
    #[error("The payment rail did not respond within {0}ms")]
    Timeout(u64),
    #[error("Account {0} does not exist on the payment rail")]
    AccountNotFound(String),
    #[error("Unexpected response from the payment rail: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailAccountStatus {
    pub chargeable: bool,
    pub transfers_enabled: bool,
}

impl RailAccountStatus {
    /// A destination account can receive transfers only once it is both chargeable and has transfers enabled.
    pub fn is_ready(&self) -> bool {
        self.chargeable && self.transfers_enabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailTransferRequest {
    pub destination: String,
    pub amount: Cents,
    pub currency: String,
    pub payout_id: i64,
    pub order_id: OrderId,
    pub vendor_id: i64,
    /// The attempt number. Together with `payout_id` this makes the idempotency key for the transfer.
    pub attempt: i64,
}

impl RailTransferRequest {
    pub fn idempotency_key(&self) -> String {
        format!("payout-{}-attempt-{}", self.payout_id, self.attempt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailTransfer {
    pub transfer_id: String,
    pub destination: String,
    pub amount: Cents,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorBalance {
    pub available: Cents,
    pub pending: Cents,
}

/// The payment processor that holds the aggregator's funds and moves them to vendors.
///
/// Implementations attach the payout id to every transfer so that [`PaymentRail::find_transfer`] can find it again
/// after a crash or a timeout.
pub trait PaymentRail: Clone + Send + Sync + 'static {
    /// Creates a destination account for the vendor and returns its id.
    fn create_destination_account(&self, vendor: &Vendor) -> impl Future<Output = Result<String, RailError>> + Send;

    fn account_status(&self, account_id: &str) -> impl Future<Output = Result<RailAccountStatus, RailError>> + Send;

    fn transfer(&self, request: RailTransferRequest) -> impl Future<Output = Result<RailTransfer, RailError>> + Send;

    /// Looks for a transfer that was made for the given payout.
    fn find_transfer(&self, payout_id: i64) -> impl Future<Output = Result<Option<RailTransfer>, RailError>> + Send;

    fn aggregator_balance(&self) -> impl Future<Output = Result<AggregatorBalance, RailError>> + Send;
}
