//! Thin REST client for the payment rail (the external processor that holds the aggregator account and performs
//! transfers to vendor destination accounts).
//!
//! The client knows nothing about payouts or vendors beyond the identifiers it is asked to attach as transfer
//! metadata. Mapping rail responses onto settlement state is the job of the payout engine.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::RailApi;
pub use config::RailConfig;
pub use data_objects::{AccountStatus, Balance, NewAccount, RailAccount, Transfer, TransferMetadata, TransferRequest};
pub use error::RailApiError;
