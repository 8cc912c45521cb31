use std::time::Duration;

use log::*;
use payout_engine::{
    db_types::{Cents, OrderId, Vendor},
    events::AlertKind,
    traits::{NotificationError, Notifier},
};
use reqwest::Client;
use serde::Serialize;

/// Writes every vendor message and operator alert to the log. Used when no webhook has been configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn payment_received(&self, vendor: &Vendor, amount: Cents, payout_id: i64) -> Result<(), NotificationError> {
        info!("📬️ To vendor #{} ({}): {amount} is on its way to your account (payout #{payout_id})", vendor.id, vendor.name);
        Ok(())
    }

    async fn debt_offset(&self, vendor: &Vendor, amount: Cents, payout_id: i64) -> Result<(), NotificationError> {
        info!(
            "📬️ To vendor #{} ({}): {amount} of payout #{payout_id} went towards your outstanding balance",
            vendor.id, vendor.name
        );
        Ok(())
    }

    async fn debt_registered(&self, vendor: &Vendor, amount: Cents, order_id: &OrderId) -> Result<(), NotificationError> {
        info!(
            "📬️ To vendor #{} ({}): order {order_id} was refunded after you were paid. {amount} will be deducted from \
             your next payouts",
            vendor.id, vendor.name
        );
        Ok(())
    }

    async fn earnings_cancelled(
        &self,
        vendor: &Vendor,
        amount: Cents,
        order_id: &OrderId,
    ) -> Result<(), NotificationError> {
        info!(
            "📬️ To vendor #{} ({}): order {order_id} was refunded. The pending {amount} for it has been cancelled",
            vendor.id, vendor.name
        );
        Ok(())
    }

    async fn alert_operator(&self, kind: AlertKind, context: &str) -> Result<(), NotificationError> {
        error!("🚨️ {kind}: {context}");
        Ok(())
    }
}

/// The JSON body POSTed by [`WebhookNotifier`].
#[derive(Debug, Clone, Serialize)]
struct WebhookMessage {
    /// "vendor" or "operator"
    audience: &'static str,
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor_email: Option<String>,
    /// In major units, e.g. "98.06"
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
    message: String,
}

impl WebhookMessage {
    fn for_vendor(vendor: &Vendor, event: &str, amount: Cents, message: String) -> Self {
        Self {
            audience: "vendor",
            event: event.to_string(),
            vendor_id: Some(vendor.id),
            vendor_email: vendor.email.clone(),
            amount: Some(amount.to_string()),
            message,
        }
    }

    fn for_operator(kind: AlertKind, context: &str) -> Self {
        Self {
            audience: "operator",
            event: format!("{kind:?}"),
            vendor_id: None,
            vendor_email: None,
            amount: None,
            message: format!("{kind}: {context}"),
        }
    }
}

/// POSTs vendor messages and operator alerts as JSON to a single webhook (a mail relay, a chat channel...).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new<S: Into<String>>(url: S) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::NotConfigured(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }

    async fn post(&self, message: WebhookMessage) -> Result<(), NotificationError> {
        trace!("📬️ Posting {} notification to webhook", message.event);
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotificationError::DeliveryFailed(format!("Webhook responded with {}", response.status())))
        }
    }
}

impl Notifier for WebhookNotifier {
    async fn payment_received(&self, vendor: &Vendor, amount: Cents, payout_id: i64) -> Result<(), NotificationError> {
        let message = format!("{amount} is on its way to your account (payout #{payout_id})");
        self.post(WebhookMessage::for_vendor(vendor, "payment_received", amount, message)).await
    }

    async fn debt_offset(&self, vendor: &Vendor, amount: Cents, payout_id: i64) -> Result<(), NotificationError> {
        let message = format!("{amount} of payout #{payout_id} went towards your outstanding balance");
        self.post(WebhookMessage::for_vendor(vendor, "debt_offset", amount, message)).await
    }

    async fn debt_registered(&self, vendor: &Vendor, amount: Cents, order_id: &OrderId) -> Result<(), NotificationError> {
        let message =
            format!("Order {order_id} was refunded after you were paid. {amount} will be deducted from your next payouts");
        self.post(WebhookMessage::for_vendor(vendor, "debt_registered", amount, message)).await
    }

    async fn earnings_cancelled(
        &self,
        vendor: &Vendor,
        amount: Cents,
        order_id: &OrderId,
    ) -> Result<(), NotificationError> {
        let message = format!("Order {order_id} was refunded. The pending {amount} for it has been cancelled");
        self.post(WebhookMessage::for_vendor(vendor, "earnings_cancelled", amount, message)).await
    }

    async fn alert_operator(&self, kind: AlertKind, context: &str) -> Result<(), NotificationError> {
        self.post(WebhookMessage::for_operator(kind, context)).await
    }
}
