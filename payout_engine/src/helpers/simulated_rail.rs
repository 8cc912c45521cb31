//! An in-memory payment rail.
//!
//! Used when the server runs without a real payment processor, and by the test suites, which can make it reject
//! transfers, stall transfers, or "lose" responses for transfers that actually went through. Transfer lookups can be
//! made to fail as well.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::*;

use crate::{
    db_types::{Cents, Vendor},
    traits::{AggregatorBalance, PaymentRail, RailAccountStatus, RailError, RailTransfer, RailTransferRequest},
};

#[derive(Debug, Clone)]
pub struct SimulatedTransfer {
    pub transfer: RailTransfer,
    pub request: RailTransferRequest,
}

#[derive(Debug)]
struct RailState {
    accounts: HashMap<String, RailAccountStatus>,
    transfers: Vec<SimulatedTransfer>,
    balance: AggregatorBalance,
    new_accounts_ready: bool,
    failures: Vec<RailError>,
    lookup_failures: Vec<RailError>,
    lost_responses: usize,
    delay: Option<Duration>,
    next_id: u64,
}

#[derive(Debug, Clone)]
pub struct SimulatedRail {
    state: Arc<Mutex<RailState>>,
}

impl Default for SimulatedRail {
    fn default() -> Self {
        Self::new(Cents::from_major(1_000_000))
    }
}

impl SimulatedRail {
    /// A rail whose aggregator account holds `available` funds.
    pub fn new(available: Cents) -> Self {
        let state = RailState {
            accounts: HashMap::new(),
            transfers: Vec::new(),
            balance: AggregatorBalance { available, pending: Cents::ZERO },
            new_accounts_ready: true,
            failures: Vec::new(),
            lookup_failures: Vec::new(),
            lost_responses: 0,
            delay: None,
            next_id: 1,
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, RailState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether accounts created from now on can receive transfers straight away.
    pub fn set_new_accounts_ready(&self, ready: bool) {
        self.state().new_accounts_ready = ready;
    }

    pub fn set_account_status(&self, account_id: &str, status: RailAccountStatus) {
        self.state().accounts.insert(account_id.to_string(), status);
    }

    pub fn set_available_balance(&self, available: Cents) {
        self.state().balance.available = available;
    }

    /// The next `n` transfers fail with `error`.
    pub fn fail_next_transfers(&self, n: usize, error: RailError) {
        let mut state = self.state();
        for _ in 0..n {
            state.failures.push(error.clone());
        }
    }

    /// The next `n` transfer lookups fail with `error`.
    pub fn fail_next_lookups(&self, n: usize, error: RailError) {
        let mut state = self.state();
        for _ in 0..n {
            state.lookup_failures.push(error.clone());
        }
    }

    /// The next `n` transfers go through, but the caller gets an error back as if the connection dropped.
    pub fn lose_next_responses(&self, n: usize) {
        self.state().lost_responses = n;
    }

    /// Transfers wait this long before they are processed.
    pub fn set_transfer_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    pub fn transfers(&self) -> Vec<SimulatedTransfer> {
        self.state().transfers.clone()
    }

    pub fn total_transferred(&self) -> Cents {
        self.state().transfers.iter().map(|t| t.transfer.amount).sum()
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record_transfer(&self, request: RailTransferRequest) -> Result<RailTransfer, RailError> {
        let mut state = self.state();
        if !state.failures.is_empty() {
            let error = state.failures.remove(0);
            debug!("💸️ [simulated rail] Rejecting transfer for payout #{}: {error}", request.payout_id);
            return Err(error);
        }
        let status = state
            .accounts
            .get(&request.destination)
            .copied()
            .ok_or_else(|| RailError::AccountNotFound(request.destination.clone()))?;
        if !status.is_ready() {
            return Err(RailError::Rejected(format!("account {} cannot receive transfers", request.destination)));
        }
        if !request.amount.is_positive() {
            return Err(RailError::Rejected(format!("invalid transfer amount {}", request.amount)));
        }
        if state.balance.available < request.amount {
            return Err(RailError::Rejected("insufficient funds in the aggregator account".into()));
        }
        let key = request.idempotency_key();
        if let Some(existing) = state.transfers.iter().find(|t| t.request.idempotency_key() == key) {
            return Ok(existing.transfer.clone());
        }
        let transfer = RailTransfer {
            transfer_id: format!("tr_sim_{:06}", state.next_id),
            destination: request.destination.clone(),
            amount: request.amount,
        };
        state.next_id += 1;
        state.balance.available -= request.amount;
        state.transfers.push(SimulatedTransfer { transfer: transfer.clone(), request });
        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(RailError::Unavailable("connection reset before the response arrived".into()));
        }
        Ok(transfer)
    }
}

impl PaymentRail for SimulatedRail {
    async fn create_destination_account(&self, vendor: &Vendor) -> Result<String, RailError> {
        let mut state = self.state();
        let account_id = format!("acct_sim_{:04}", state.next_id);
        state.next_id += 1;
        let ready = state.new_accounts_ready;
        state.accounts.insert(account_id.clone(), RailAccountStatus { chargeable: ready, transfers_enabled: ready });
        debug!("💸️ [simulated rail] Created account {account_id} for vendor #{}", vendor.id);
        Ok(account_id)
    }

    async fn account_status(&self, account_id: &str) -> Result<RailAccountStatus, RailError> {
        self.state().accounts.get(account_id).copied().ok_or_else(|| RailError::AccountNotFound(account_id.to_string()))
    }

    async fn transfer(&self, request: RailTransferRequest) -> Result<RailTransfer, RailError> {
        self.pause().await;
        self.record_transfer(request)
    }

    async fn find_transfer(&self, payout_id: i64) -> Result<Option<RailTransfer>, RailError> {
        let mut state = self.state();
        if !state.lookup_failures.is_empty() {
            return Err(state.lookup_failures.remove(0));
        }
        let found = state.transfers.iter().rev().find(|t| t.request.payout_id == payout_id).map(|t| t.transfer.clone());
        Ok(found)
    }

    async fn aggregator_balance(&self) -> Result<AggregatorBalance, RailError> {
        Ok(self.state().balance)
    }
}
