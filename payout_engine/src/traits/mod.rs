//! # Capability traits
//!
//! The settlement engine is storage- and provider-agnostic. This module defines what a backend has to offer.
//!
//! ## Storage
//! * [`SettlementDatabase`] is the write side. Every method that changes a payout's status does so atomically together
//!   with the matching vendor balance adjustments and a transfer-log entry, and refuses to act if the payout is no
//!   longer in the status the caller expected.
//! * [`PayoutQueries`] is the read side used by the admin and vendor surfaces.
//! * [`VendorManagement`] registers vendors and links them to their payment rail accounts.
//!
//! ## External collaborators
//! * [`PaymentRail`] is the payment processor that actually moves money.
//! * [`Notifier`] delivers vendor-facing messages and operator alerts.
mod data_objects;
mod notifier;
mod payment_rail;
mod payout_queries;
mod settlement_database;
mod vendor_management;

pub use data_objects::{PayoutSettlement, RefundResult, TransferPlan};
pub use notifier::{NotificationError, Notifier};
pub use payment_rail::{AggregatorBalance, PaymentRail, RailAccountStatus, RailError, RailTransfer, RailTransferRequest};
pub use payout_queries::PayoutQueries;
pub use settlement_database::{SettlementDatabase, SettlementDbError};
pub use vendor_management::VendorManagement;
