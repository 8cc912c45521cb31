use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::RailConfig,
    data_objects::{AccountStatus, Balance, NewAccount, RailAccount, Transfer, TransferRequest},
    RailApiError,
};

#[derive(Clone)]
pub struct RailApi {
    config: RailConfig,
    client: Arc<Client>,
}

impl RailApi {
    pub fn new(config: RailConfig) -> Result<Self, RailApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.api_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| RailApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client =
            Client::builder().default_headers(headers).build().map_err(|e| RailApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn currency(&self) -> &str {
        self.config.currency.as_str()
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
        idempotency_key: Option<String>,
    ) -> Result<T, RailApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| RailApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| RailApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| RailApiError::RestResponseError(e.to_string()))?;
            Err(RailApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    pub async fn create_account(&self, account: NewAccount) -> Result<RailAccount, RailApiError> {
        debug!("Creating destination account for {}", account.reference);
        let result =
            self.rest_query::<RailAccount, NewAccount>(Method::POST, "/accounts", &[], Some(account), None).await?;
        info!("Created destination account {}", result.id);
        Ok(result)
    }

    pub async fn get_account(&self, account_id: &str) -> Result<RailAccount, RailApiError> {
        let path = format!("/accounts/{account_id}");
        let result = self.rest_query::<RailAccount, ()>(Method::GET, &path, &[], None, None).await?;
        trace!("Account {account_id}: chargeable={} transfers_enabled={}", result.chargeable, result.transfers_enabled);
        Ok(result)
    }

    pub async fn account_status(&self, account_id: &str) -> Result<AccountStatus, RailApiError> {
        self.get_account(account_id).await.map(|a| AccountStatus::from(&a))
    }

    pub async fn create_transfer(&self, request: TransferRequest, attempt: i64) -> Result<Transfer, RailApiError> {
        let key = request.metadata.idempotency_key(attempt);
        debug!("Transferring {} {} to {} [{key}]", request.amount, request.currency, request.destination);
        let result =
            self.rest_query::<Transfer, TransferRequest>(Method::POST, "/transfers", &[], Some(request), Some(key)).await?;
        info!("Transfer {} created", result.id);
        Ok(result)
    }

    /// Searches the rail for transfers that were tagged with the given payout id.
    pub async fn find_transfers_for_payout(&self, payout_id: i64) -> Result<Vec<Transfer>, RailApiError> {
        #[derive(Deserialize)]
        struct TransferList {
            data: Vec<Transfer>,
        }
        let payout_id = payout_id.to_string();
        let params = [("metadata[payout_id]", payout_id.as_str())];
        let result = self.rest_query::<TransferList, ()>(Method::GET, "/transfers", &params, None, None).await?;
        debug!("Found {} transfers for payout {payout_id}", result.data.len());
        Ok(result.data)
    }

    pub async fn balance(&self) -> Result<Balance, RailApiError> {
        let result = self.rest_query::<Balance, ()>(Method::GET, "/balance", &[], None, None).await?;
        debug!("Aggregator balance: {} available, {} pending", result.available, result.pending);
        Ok(result)
    }
}
