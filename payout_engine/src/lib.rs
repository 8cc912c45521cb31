//! Vendor Payout Settlement Engine
//!
//! A multi-vendor marketplace collects every payment into one aggregator account. This library works out what each
//! vendor is owed, holds it for the configured holding period, and then moves it to the vendor's own account on the
//! payment rail. It also deals with the messy parts: transfers that fail or time out, operators stepping in by hand,
//! and refunds that arrive after a vendor has already been paid.
//!
//! The library is divided into these sections:
//! 1. The payout ledger. [`db_types`] has the data types, [`traits`] the storage and provider traits, and
//!    [`SqliteDatabase`] the SQLite backend. Every payout status change is a single compare-and-set transaction that
//!    also adjusts the vendor's balances and appends to the transfer log.
//! 2. The [`earnings`] calculator, a pure function from a paid order to per-vendor net amounts.
//! 3. The public API ([`SettlementApi`], [`AdminApi`], [`RefundApi`], [`VendorApi`]).
//!
//! The engine emits events (a payout was paid, a debt was registered, an operator needs to look at something) that
//! can be subscribed to through [`events::EventHooks`]. [`notifications::notifier_hooks`] wires them to a
//! [`traits::Notifier`].
pub mod db_types;
pub mod earnings;
pub mod events;
pub mod helpers;
pub mod notifications;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;
mod vpe_api;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use vpe_api::{
    admin_api::{transfer_log_to_csv, AdminApi},
    errors::SettlementError,
    payout_executor::{PayoutExecutor, PayoutOutcome, Trigger},
    payout_objects,
    refund_api::RefundApi,
    settlement_api::SettlementApi,
    vendor_api::VendorApi,
};
