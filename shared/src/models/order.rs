//! Order Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status
///
/// PENDING is the sole initial state. There is deliberately no
/// transition table: any status may follow any other (see DESIGN.md).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(
    feature = "db",
    sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Wire representation, as stored in PostgreSQL and sent over JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order entity (header row)
///
/// Shipping fields are a snapshot captured at creation time and are
/// never re-read from any user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: Uuid,
    pub idempotency_key: String,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub shipping_name: String,
    pub shipping_email: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_postal: String,
    pub shipping_country: String,
    pub created_at: DateTime<Utc>,
}

/// Order line item
///
/// Immutable after creation; `product_name` and `unit_price` are
/// snapshots decoupled from future catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderLineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// One entry in an order's append-only status history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderStatusEntry {
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
