//! The server's concrete collaborators for the settlement engine: which payment rail to talk to, and where vendor
//! messages and operator alerts go.
mod notifiers;
mod rail;

pub use notifiers::{LogNotifier, WebhookNotifier};
pub use rail::ConfiguredRail;
