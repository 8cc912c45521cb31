//! # Settlement engine public API
//!
//! The `vpe_api` module exposes the programmatic API of the settlement engine. Like the storage traits it is built
//! on, it is split by audience:
//!
//! * [`settlement_api`] takes paid orders in and runs the settlement scheduler.
//! * [`admin_api`] holds the operator overrides (force-pay, retry, mark-paid), vendor onboarding and the reporting
//!   queries.
//! * [`refund_api`] is the refund reconciler.
//! * [`vendor_api`] is what vendors get to see of their own earnings.
//!
//! [`payout_executor`] is the shared debt-offset-then-transfer procedure behind both the scheduler and the overrides.
//!
//! # API usage
//!
//! Every API is created from a database backend that implements the traits it needs, plus the payment rail, event
//! producers and a clock where relevant:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use payout_engine::{helpers::{SimulatedRail, SystemClock}, payout_objects::SettlementConfig, SettlementApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = SettlementApi::new(db, SimulatedRail::default(), producers, SettlementConfig::default(), Arc::new(SystemClock));
//! let summary = api.run_settlement().await?;
//! ```
pub mod admin_api;
pub mod errors;
pub mod payout_executor;
pub mod payout_objects;
pub mod refund_api;
pub mod settlement_api;
pub mod vendor_api;
