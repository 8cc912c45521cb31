use log::*;
use payout_common::{Secret, DEFAULT_CURRENCY_CODE};

const DEFAULT_RAIL_API_URL: &str = "http://127.0.0.1:12111/v1";

#[derive(Debug, Clone, Default)]
pub struct RailConfig {
    /// Base URL of the rail's REST API, without a trailing slash, e.g. "https://api.rail.example/v1"
    pub api_url: String,
    pub api_key: Secret<String>,
    pub currency: String,
}

impl RailConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("VPS_RAIL_API_URL").unwrap_or_else(|_| {
            warn!("VPS_RAIL_API_URL not set, using {DEFAULT_RAIL_API_URL} as default");
            DEFAULT_RAIL_API_URL.to_string()
        });
        let api_key = Secret::new(std::env::var("VPS_RAIL_API_KEY").unwrap_or_else(|_| {
            warn!("VPS_RAIL_API_KEY not set, using (probably useless) default");
            "sk_test_00000000000000".to_string()
        }));
        let currency = std::env::var("VPS_CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY_CODE.to_string());
        Self { api_url: api_url.trim_end_matches('/').to_string(), api_key, currency }
    }
}
