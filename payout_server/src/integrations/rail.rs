use std::fmt::Debug;

use log::*;
use payout_engine::{
    db_types::Vendor,
    helpers::SimulatedRail,
    traits::{AggregatorBalance, PaymentRail, RailAccountStatus, RailError, RailTransfer, RailTransferRequest},
};
use rail_tools::{NewAccount, RailApi, RailApiError, Transfer, TransferMetadata, TransferRequest};

/// The payment rail selected by `VPS_RAIL_MODE`.
#[derive(Clone)]
pub enum ConfiguredRail {
    Rest(RailApi),
    Simulated(SimulatedRail),
}

impl Debug for ConfiguredRail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rest(api) => write!(f, "ConfiguredRail::Rest({})", api.url("")),
            Self::Simulated(_) => write!(f, "ConfiguredRail::Simulated"),
        }
    }
}

fn to_rail_error(e: RailApiError) -> RailError {
    match e {
        RailApiError::QueryError { status, message } if (400..500).contains(&status) => {
            RailError::Rejected(format!("{status}: {message}"))
        },
        RailApiError::QueryError { status, message } => RailError::Unavailable(format!("{status}: {message}")),
        RailApiError::RestRequestError(s) | RailApiError::Initialization(s) => RailError::Unavailable(s),
        RailApiError::RestResponseError(s) | RailApiError::JsonError(s) => RailError::InvalidResponse(s),
        RailApiError::EmptyResponse => RailError::InvalidResponse("empty response".into()),
    }
}

fn account_error(account_id: &str, e: RailApiError) -> RailError {
    if e.is_not_found() {
        RailError::AccountNotFound(account_id.to_string())
    } else {
        to_rail_error(e)
    }
}

fn to_rail_transfer(t: Transfer) -> RailTransfer {
    RailTransfer { transfer_id: t.id, destination: t.destination, amount: t.amount }
}

fn transfer_request(request: &RailTransferRequest) -> TransferRequest {
    TransferRequest {
        destination: request.destination.clone(),
        amount: request.amount,
        currency: request.currency.clone(),
        metadata: TransferMetadata {
            payout_id: request.payout_id,
            order_id: request.order_id.as_str().to_string(),
            vendor_id: request.vendor_id,
        },
    }
}

/// Picks the most recent of the transfers the rail holds for a payout.
fn latest_transfer(mut transfers: Vec<Transfer>) -> Option<RailTransfer> {
    transfers.sort_by_key(|t| t.created_at);
    transfers.pop().map(to_rail_transfer)
}

impl PaymentRail for ConfiguredRail {
    async fn create_destination_account(&self, vendor: &Vendor) -> Result<String, RailError> {
        match self {
            Self::Rest(api) => {
                let account = NewAccount {
                    email: vendor.email.clone().unwrap_or_default(),
                    display_name: vendor.name.clone(),
                    reference: format!("vendor-{}", vendor.id),
                };
                let account = api.create_account(account).await.map_err(to_rail_error)?;
                Ok(account.id)
            },
            Self::Simulated(rail) => rail.create_destination_account(vendor).await,
        }
    }

    async fn account_status(&self, account_id: &str) -> Result<RailAccountStatus, RailError> {
        match self {
            Self::Rest(api) => {
                let status = api.account_status(account_id).await.map_err(|e| account_error(account_id, e))?;
                Ok(RailAccountStatus { chargeable: status.chargeable, transfers_enabled: status.transfers_enabled })
            },
            Self::Simulated(rail) => rail.account_status(account_id).await,
        }
    }

    async fn transfer(&self, request: RailTransferRequest) -> Result<RailTransfer, RailError> {
        match self {
            Self::Rest(api) => {
                let transfer = api
                    .create_transfer(transfer_request(&request), request.attempt)
                    .await
                    .map_err(|e| account_error(&request.destination, e))?;
                if transfer.amount != request.amount {
                    warn!(
                        "💸️ The rail reports {} for transfer {}, but {} was requested for payout #{}",
                        transfer.amount, transfer.id, request.amount, request.payout_id
                    );
                }
                Ok(to_rail_transfer(transfer))
            },
            Self::Simulated(rail) => rail.transfer(request).await,
        }
    }

    async fn find_transfer(&self, payout_id: i64) -> Result<Option<RailTransfer>, RailError> {
        match self {
            Self::Rest(api) => {
                let transfers = api.find_transfers_for_payout(payout_id).await.map_err(to_rail_error)?;
                Ok(latest_transfer(transfers))
            },
            Self::Simulated(rail) => rail.find_transfer(payout_id).await,
        }
    }

    async fn aggregator_balance(&self) -> Result<AggregatorBalance, RailError> {
        match self {
            Self::Rest(api) => {
                let balance = api.balance().await.map_err(to_rail_error)?;
                Ok(AggregatorBalance { available: balance.available, pending: balance.pending })
            },
            Self::Simulated(rail) => rail.aggregator_balance().await,
        }
    }
}
