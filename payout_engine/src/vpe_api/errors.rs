use thiserror::Error;

use crate::{
    earnings::EarningsError,
    traits::{RailError, SettlementDbError},
};

/// The error taxonomy of the settlement engine's public API.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    /// The request or the vendor is not in a state that allows the operation, e.g. the vendor has not finished
    /// onboarding. Needs someone to fix something; retrying as-is will not help.
    #[error("{0}")]
    Validation(String),
    /// The payment rail refused or failed the transfer. Can be retried explicitly.
    #[error("Payment rail error: {0}")]
    Rail(#[from] RailError),
    /// The payout (or order) is not in the state this operation requires. Nothing was changed.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Money moved on the payment rail but the ledger could not record it. Requires operator reconciliation.
    #[error("Ledger write failed after a successful transfer: {0}")]
    Persistence(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] EarningsError),
}

impl From<SettlementDbError> for SettlementError {
    fn from(e: SettlementDbError) -> Self {
        match e {
            SettlementDbError::StatusConflict { .. } |
            SettlementDbError::AlreadyRefunded(_) |
            SettlementDbError::OrderAlreadyExists(_) => Self::Conflict(e.to_string()),
            SettlementDbError::OrderNotFound(_) |
            SettlementDbError::VendorNotFound(_) |
            SettlementDbError::PayoutNotFound(_) => Self::NotFound(e.to_string()),
            SettlementDbError::InvariantViolation(_) => Self::Validation(e.to_string()),
            SettlementDbError::DatabaseError(s) => Self::Database(s),
        }
    }
}

impl SettlementError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
