//! Order aggregate queries
//!
//! The order header, its line items, and its status history are one
//! aggregate: every write path here runs inside the caller's
//! transaction so the aggregate is committed (or aborted) as a unit.

use rust_decimal::Decimal;
use shared::models::{Order, OrderLineItem, OrderStatus, OrderStatusEntry};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, idempotency_key, subtotal, total, currency, status, \
     shipping_name, shipping_email, shipping_address, shipping_city, \
     shipping_state, shipping_postal, shipping_country, created_at";

/// New order header, ready for insertion
pub struct NewOrder<'a> {
    pub idempotency_key: &'a str,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: &'a str,
    pub shipping_name: &'a str,
    pub shipping_email: &'a str,
    pub shipping_address: &'a str,
    pub shipping_city: &'a str,
    pub shipping_state: &'a str,
    pub shipping_postal: &'a str,
    pub shipping_country: &'a str,
}

/// Line item snapshot captured from the locked product row
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Idempotency fast path: id of an existing order for this key, if any
pub async fn find_id_by_idempotency_key(
    pool: &PgPool,
    key: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM orders WHERE idempotency_key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

/// Insert the order header; the unique index on idempotency_key may
/// reject this under concurrent retries (handled by the caller).
pub async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &NewOrder<'_>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO orders (
            idempotency_key, subtotal, total, currency,
            shipping_name, shipping_email, shipping_address,
            shipping_city, shipping_state, shipping_postal, shipping_country
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(order.idempotency_key)
    .bind(order.subtotal)
    .bind(order.total)
    .bind(order.currency)
    .bind(order.shipping_name)
    .bind(order.shipping_email)
    .bind(order.shipping_address)
    .bind(order.shipping_city)
    .bind(order.shipping_state)
    .bind(order.shipping_postal)
    .bind(order.shipping_country)
    .fetch_one(&mut **tx)
    .await
}

pub async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    item: &NewOrderItem,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(&item.product_name)
    .bind(item.unit_price)
    .bind(item.quantity)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Append one row to the append-only status history
pub async fn append_status_history(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_status_history (order_id, status) VALUES ($1, $2)")
        .bind(order_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Update the order's status field; false when no such order exists
pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
        .bind(order_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_orders(
    pool: &PgPool,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT {ORDER_COLUMNS}
        FROM orders
        WHERE $1::order_status IS NULL OR status = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_orders(pool: &PgPool, status: Option<OrderStatus>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE $1::order_status IS NULL OR status = $1")
        .bind(status)
        .fetch_one(pool)
        .await
}

pub async fn get_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(order_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderLineItem>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, order_id, product_id, product_name, unit_price, quantity
        FROM order_items
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}

pub async fn status_history(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Vec<OrderStatusEntry>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT status, created_at
        FROM order_status_history
        WHERE order_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}
