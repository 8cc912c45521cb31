use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use payout_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The buyer has paid the aggregator, and the vendors' earnings have been recorded.
    Paid,
    /// The whole order was refunded to the buyer.
    Refunded,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Paid" => Ok(Self::Paid),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    /// What the buyer paid: line items plus shipping
    pub total_price: Cents,
    pub currency: String,
    pub status: OrderStatusType,
    pub refund_reason: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub vendor_id: i64,
    pub product: String,
    pub unit_price: Cents,
    pub quantity: i64,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub vendor_id: i64,
    pub product: String,
    pub unit_price: Cents,
    pub quantity: i64,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(vendor_id: i64, product: S, unit_price: Cents, quantity: i64) -> Self {
        Self { vendor_id, product: product.into(), unit_price, quantity }
    }

    pub fn line_total(&self) -> Cents {
        self.unit_price * self.quantity
    }
}

/// A paid order, as delivered by the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// The order_id as assigned by the storefront
    pub order_id: OrderId,
    pub customer_id: String,
    /// The total charged to the buyer, including shipping
    pub total_price: Cents,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_id: OrderId, customer_id: S, total_price: Cents) -> Self {
        Self {
            order_id,
            customer_id: customer_id.into(),
            total_price,
            currency: payout_common::DEFAULT_CURRENCY_CODE.to_string(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn items_subtotal(&self) -> Cents {
        self.items.iter().map(NewOrderItem::line_total).sum()
    }
}

//--------------------------------------        Vendor         ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    /// The vendor's destination account on the payment rail. `None` until the vendor has been onboarded.
    pub rail_account_id: Option<String>,
    /// Sum of this vendor's non-debt payouts that are `pending` or `processing`
    pub pending_earnings: Cents,
    /// Cumulative amount actually transferred to the vendor
    pub paid_earnings: Cents,
    /// Amount the vendor owes back to the aggregator after post-payment refunds. Never negative.
    pub debt_balance: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVendor {
    pub name: String,
    pub email: Option<String>,
}

impl NewVendor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), email: None }
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }
}

//--------------------------------------     PayoutStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Waiting for the holding period to elapse, or for an operator to act.
    Pending,
    /// A transfer has been requested from the payment rail and we are waiting on the result.
    Processing,
    /// Settled. Terminal.
    Paid,
    /// The last transfer attempt failed. Only an explicit retry moves the payout on.
    Failed,
}

impl PayoutStatus {
    /// Statuses whose amounts are included in a vendor's `pending_earnings`
    pub fn counts_as_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "pending"),
            PayoutStatus::Processing => write!(f, "processing"),
            PayoutStatus::Paid => write!(f, "paid"),
            PayoutStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payout status: {s}"))),
        }
    }
}

//--------------------------------------        Payout         ---------------------------------------------------------
/// One settlement unit: the money owed to one vendor for one order, or (when `is_refund_debt` is set) the money a
/// vendor owes back after that order was refunded.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub order_id: OrderId,
    pub vendor_id: i64,
    /// Net payable amount. Never negative for earnings; never positive for debt entries.
    pub amount: Cents,
    pub gross_amount: Cents,
    pub processing_fee: Cents,
    pub transfer_fee: Cents,
    /// Outstanding debt deducted from `amount` when the payout was settled (or reserved while `processing`)
    pub debt_offset: Cents,
    /// Starts the holding clock
    pub sale_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub status: PayoutStatus,
    pub rail_transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub note: Option<String>,
    /// Number of transfer attempts made so far
    pub attempts: i64,
    pub is_refund_debt: bool,
    /// For debt entries, the paid payout that this entry claws back
    pub refunded_payout_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// The amount that leaves the aggregator account when this payout is transferred.
    pub fn transfer_amount(&self) -> Cents {
        self.amount - self.debt_offset
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayout {
    pub order_id: OrderId,
    pub vendor_id: i64,
    pub amount: Cents,
    pub gross_amount: Cents,
    pub processing_fee: Cents,
    pub transfer_fee: Cents,
    pub sale_date: DateTime<Utc>,
}

//--------------------------------------     Transfer log      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransferAction {
    /// Money was sent to the vendor over the payment rail
    Transferred,
    /// The payout was settled entirely out of the vendor's outstanding debt
    OffsetByDebt,
    Failed,
    /// An operator recorded an out-of-band settlement
    ManuallySettled,
    /// A not-yet-transferred payout was removed because its order was refunded
    Cancelled,
    DebtRegistered,
    DebtRecovered,
    /// An interrupted transfer was matched against the rail's records
    Reconciled,
}

impl Display for TransferAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferAction::Transferred => "Transferred",
            TransferAction::OffsetByDebt => "OffsetByDebt",
            TransferAction::Failed => "Failed",
            TransferAction::ManuallySettled => "ManuallySettled",
            TransferAction::Cancelled => "Cancelled",
            TransferAction::DebtRegistered => "DebtRegistered",
            TransferAction::DebtRecovered => "DebtRecovered",
            TransferAction::Reconciled => "Reconciled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TransferLogEntry {
    pub id: i64,
    pub payout_id: i64,
    pub vendor_id: i64,
    pub order_id: OrderId,
    pub action: TransferAction,
    pub amount: Cents,
    pub rail_transfer_id: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
