//! # Documents
//!
//! Everything the store persists, one JSON document per record.
//!
//! Counters that must change atomically live outside the documents:
//! - product stock, keyed by product id
//! - loyalty balance, keyed by customer id
//! - voucher uses, keyed by voucher id
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::Quote;

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Rating {
    pub average: f32,
    pub count: u32,
}

impl Rating {
    pub fn from_scores(scores: impl IntoIterator<Item = u8>) -> Self {
        let (sum, count) = scores
            .into_iter()
            .fold((0u32, 0u32), |(sum, count), score| (sum + score as u32, count + 1));

        if count == 0 {
            return Self::default();
        }

        let average = (sum as f32 / count as f32 * 10.0).round() / 10.0;

        Self { average, count }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: u64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: bool,
    #[serde(default)]
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Voucher {
    pub id: String,
    pub code: String,
    pub kind: DiscountKind,
    /// Percent (1..=100) or VND depending on `kind`.
    pub value: u64,
    #[serde(default)]
    pub min_order_value: u64,
    #[serde(default)]
    pub max_discount: Option<u64>,
    #[serde(default)]
    pub usage_limit: Option<u64>,
    /// Filled from the usage counter when read, never trusted when written.
    #[serde(default)]
    pub used_count: u64,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    /// Personal discount code: only this customer may redeem it.
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Review {
    pub id: String,
    pub product_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Shipping)
                | (Confirmed, Cancelled)
                | (Shipping, Delivered)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    BankTransfer,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShippingInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderItem {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: u64,
    pub quantity: u32,
    pub line_total: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub by: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Order {
    pub id: String,
    pub number: String,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub voucher_id: Option<String>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    pub quote: Quote,
    pub status: OrderStatus,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyReason {
    Earned,
    Redeemed,
    Refunded,
    Adjusted,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoyaltyEntry {
    pub id: String,
    pub customer_id: String,
    pub delta: i64,
    pub reason: LoyaltyReason,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub balance_after: u64,
    pub at: DateTime<Utc>,
}
