//! Product queries used by the checkout transaction
//!
//! The catalog itself is owned by an external collaborator; the order
//! core only reads price/stock and performs the atomic stock decrement.

use shared::models::Product;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Fetch all referenced active products, taking row-level locks.
///
/// `FOR UPDATE` serializes concurrent checkouts touching the same
/// products; ids are sorted so two transactions always lock in the
/// same order and cannot deadlock each other.
pub async fn lock_for_order(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[Uuid],
) -> Result<Vec<Product>, sqlx::Error> {
    let mut sorted: Vec<Uuid> = ids.to_vec();
    sorted.sort();

    let rows: Vec<Product> = sqlx::query_as(
        r#"
        SELECT id, name, price, stock, is_active
        FROM products
        WHERE id = ANY($1) AND is_active
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(&sorted)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

/// Decrement a product's stock inside the checkout transaction.
///
/// Callers must have verified sufficiency against the locked row; the
/// `stock >= 0` CHECK constraint rejects any decrement that slips past.
pub async fn decrement_stock(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
        .bind(product_id)
        .bind(quantity)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
