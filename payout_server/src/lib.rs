//! # Vendor payout server
//! This crate hosts the HTTP front end of the vendor payout settlement engine. It is responsible for:
//! * Accepting paid orders and refunds from the checkout flow.
//! * Running the settlement scheduler on a timer (see [settlement_worker]).
//! * Giving operators a way to inspect the payout ledger and to step in by hand.
//! * Showing vendors their own earnings.
//!
//! The server does no authentication of its own. It is meant to sit behind a gateway that does.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/admin/...`: The operator surface. See [routes] for the full list.
//! * `/vendors/{id}/...`: Read-only views for a single vendor.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod routes;
pub mod server;
pub mod settlement_worker;

#[cfg(test)]
mod endpoint_tests;
