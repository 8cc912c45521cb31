use chrono::{DateTime, Utc};
use payout_common::Cents;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub display_name: String,
    /// Our own identifier for the account holder, echoed back by the rail in its dashboards.
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailAccount {
    pub id: String,
    #[serde(default)]
    pub chargeable: bool,
    #[serde(default)]
    pub transfers_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub chargeable: bool,
    pub transfers_enabled: bool,
}

impl AccountStatus {
    pub fn is_ready(&self) -> bool {
        self.chargeable && self.transfers_enabled
    }
}

impl From<&RailAccount> for AccountStatus {
    fn from(account: &RailAccount) -> Self {
        Self { chargeable: account.chargeable, transfers_enabled: account.transfers_enabled }
    }
}

/// Identifiers attached to every transfer so that a transfer can be traced back to the payout that caused it, and
/// looked up again if our side lost track of the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub payout_id: i64,
    pub order_id: String,
    pub vendor_id: i64,
}

impl TransferMetadata {
    /// The idempotency key for a transfer attempt. The rail collapses repeated requests with the same key.
    pub fn idempotency_key(&self, attempt: i64) -> String {
        format!("payout-{}-attempt-{attempt}", self.payout_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination: String,
    pub amount: Cents,
    pub currency: String,
    pub metadata: TransferMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub destination: String,
    pub amount: Cents,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<TransferMetadata>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Cents,
    pub pending: Cents,
}
