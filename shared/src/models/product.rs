//! Product Model
//!
//! The catalog is an external collaborator. The only mutation the
//! order core performs on a product is the atomic stock decrement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product entity (the subset of catalog columns the order core reads)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    /// Purchasable units; strictly non-negative, decremented only at
    /// order creation
    pub stock: i32,
    pub is_active: bool,
}
