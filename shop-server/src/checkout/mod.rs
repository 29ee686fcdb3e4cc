//! Order placement core
//!
//! One atomic transaction per attempt: lock the referenced products,
//! validate stock, decrement it, compute exact totals, and persist the
//! order aggregate (header, line items, initial PENDING history row).
//! Nothing survives a failure partway through.
//!
//! Two races are expected under load and handled here rather than
//! surfaced:
//! - the same idempotency key arriving twice in parallel (client
//!   retry-on-timeout): the unique index on `orders.idempotency_key`
//!   decides the winner and the loser re-resolves to the winner's id;
//! - lock/serialization conflicts between checkouts contending for the
//!   same products: retried a bounded number of times.

use std::collections::{HashMap, HashSet};

use shared::error::{AppError, ErrorCode};
use shared::models::{OrderStatus, Product};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::order::CreateOrderRequest;
use crate::db::orders::{self, NewOrder, NewOrderItem};
use crate::db::products;
use crate::error::ServiceError;

pub mod money;

/// SQLSTATE: unique constraint violation
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE: serialization failure
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE: deadlock detected
const DEADLOCK_DETECTED: &str = "40P01";

/// Unique index backing the one-order-per-key invariant
const IDEMPOTENCY_KEY_CONSTRAINT: &str = "orders_idempotency_key_key";

/// Conflict-aborted attempts are retried this many times before the
/// failure reaches the caller.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Outcome of a placement request
#[derive(Debug)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    /// false when this request replayed an existing key
    pub created: bool,
}

/// Internal per-attempt failure classification
enum PlaceError {
    /// Another transaction committed this idempotency key first
    DuplicateKey,
    /// Serialization failure / deadlock; safe to retry
    Conflict(sqlx::Error),
    /// Business-rule rejection (invalid product, insufficient stock)
    Rejected(AppError),
    /// Anything else from the store
    Db(sqlx::Error),
}

fn classify(e: sqlx::Error) -> PlaceError {
    enum Kind {
        Duplicate,
        Conflict,
        Other,
    }
    let kind = match &e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) if db.constraint() == Some(IDEMPOTENCY_KEY_CONSTRAINT) => {
                Kind::Duplicate
            }
            Some(code) if is_conflict_code(code) => Kind::Conflict,
            _ => Kind::Other,
        },
        _ => Kind::Other,
    };
    match kind {
        Kind::Duplicate => PlaceError::DuplicateKey,
        Kind::Conflict => PlaceError::Conflict(e),
        Kind::Other => PlaceError::Db(e),
    }
}

fn is_conflict_code(code: &str) -> bool {
    code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED
}

/// Requested product ids in request order; None when any id repeats.
/// Duplicate ids are rejected rather than merged.
fn requested_ids(req: &CreateOrderRequest) -> Option<Vec<Uuid>> {
    let ids: Vec<Uuid> = req.items.iter().map(|i| i.product_id).collect();
    let distinct: HashSet<Uuid> = ids.iter().copied().collect();
    (distinct.len() == ids.len()).then_some(ids)
}

/// Place an order for the given idempotency key.
///
/// The pre-check here is a fast path only; the unique index is what
/// actually guarantees exactly one order per key.
pub async fn place_order(
    pool: &PgPool,
    currency: &str,
    idempotency_key: &str,
    req: &CreateOrderRequest,
) -> Result<PlacedOrder, ServiceError> {
    if let Some(order_id) = orders::find_id_by_idempotency_key(pool, idempotency_key).await? {
        return Ok(PlacedOrder {
            order_id,
            created: false,
        });
    }

    let mut attempt: u32 = 0;
    loop {
        match try_place(pool, currency, idempotency_key, req).await {
            Ok(order_id) => {
                return Ok(PlacedOrder {
                    order_id,
                    created: true,
                });
            }
            Err(PlaceError::DuplicateKey) => {
                // Lost the race to a concurrent request bearing the same
                // key; the committed order is the authoritative one.
                let Some(order_id) =
                    orders::find_id_by_idempotency_key(pool, idempotency_key).await?
                else {
                    return Err(ServiceError::Db(
                        format!("order for idempotency key {idempotency_key} vanished after unique violation").into(),
                    ));
                };
                return Ok(PlacedOrder {
                    order_id,
                    created: false,
                });
            }
            Err(PlaceError::Conflict(e)) if attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "Checkout transaction conflict, retrying");
            }
            Err(PlaceError::Conflict(e)) | Err(PlaceError::Db(e)) => {
                return Err(ServiceError::Db(e.into()));
            }
            Err(PlaceError::Rejected(app_err)) => return Err(ServiceError::App(app_err)),
        }
    }
}

/// One placement attempt, one transaction. Dropping the transaction on
/// any early return rolls back every write of the attempt.
async fn try_place(
    pool: &PgPool,
    currency: &str,
    idempotency_key: &str,
    req: &CreateOrderRequest,
) -> Result<Uuid, PlaceError> {
    let Some(ids) = requested_ids(req) else {
        return Err(PlaceError::Rejected(AppError::with_message(
            ErrorCode::InvalidProduct,
            "Duplicate product in cart",
        )));
    };

    let mut tx = pool.begin().await.map_err(classify)?;

    let locked = products::lock_for_order(&mut tx, &ids)
        .await
        .map_err(classify)?;
    if locked.len() != ids.len() {
        return Err(PlaceError::Rejected(AppError::new(
            ErrorCode::InvalidProduct,
        )));
    }
    let by_id: HashMap<Uuid, &Product> = locked.iter().map(|p| (p.id, p)).collect();

    let mut items: Vec<NewOrderItem> = Vec::with_capacity(req.items.len());

    for line in &req.items {
        let Some(product) = by_id.get(&line.product_id) else {
            return Err(PlaceError::Rejected(AppError::new(
                ErrorCode::InvalidProduct,
            )));
        };

        if line.quantity > product.stock {
            return Err(PlaceError::Rejected(
                AppError::with_message(
                    ErrorCode::InsufficientStock,
                    format!("Insufficient stock for {}", product.name),
                )
                .with_detail("product_id", product.id.to_string()),
            ));
        }

        products::decrement_stock(&mut tx, product.id, line.quantity)
            .await
            .map_err(classify)?;

        items.push(NewOrderItem {
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity: line.quantity,
        });
    }

    let subtotal = money::subtotal(
        items
            .iter()
            .map(|i| money::line_total(i.unit_price, i.quantity)),
    );

    // No tax/shipping computation: total equals subtotal.
    let order = NewOrder {
        idempotency_key,
        subtotal,
        total: subtotal,
        currency,
        shipping_name: &req.shipping.name,
        shipping_email: &req.shipping.email,
        shipping_address: &req.shipping.address,
        shipping_city: &req.shipping.city,
        shipping_state: &req.shipping.state,
        shipping_postal: &req.shipping.postal,
        shipping_country: &req.shipping.country,
    };

    let order_id = orders::insert_order(&mut tx, &order).await.map_err(classify)?;
    for item in &items {
        orders::insert_item(&mut tx, order_id, item)
            .await
            .map_err(classify)?;
    }
    orders::append_status_history(&mut tx, order_id, OrderStatus::Pending)
        .await
        .map_err(classify)?;

    tx.commit().await.map_err(classify)?;
    Ok(order_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::order::{OrderItemInput, ShippingInput};

    fn shipping() -> ShippingInput {
        ShippingInput {
            name: "Ana Torres".into(),
            email: "ana@example.com".into(),
            address: "Calle Mayor 1".into(),
            city: "Madrid".into(),
            state: "MD".into(),
            postal: "28001".into(),
            country: "ES".into(),
        }
    }

    fn request(items: Vec<OrderItemInput>) -> CreateOrderRequest {
        CreateOrderRequest {
            items,
            shipping: shipping(),
        }
    }

    #[test]
    fn test_requested_ids_preserves_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let req = request(vec![
            OrderItemInput {
                product_id: a,
                quantity: 2,
            },
            OrderItemInput {
                product_id: b,
                quantity: 1,
            },
        ]);
        assert_eq!(requested_ids(&req), Some(vec![a, b]));
    }

    #[test]
    fn test_requested_ids_rejects_duplicates() {
        let a = Uuid::new_v4();
        let req = request(vec![
            OrderItemInput {
                product_id: a,
                quantity: 2,
            },
            OrderItemInput {
                product_id: a,
                quantity: 1,
            },
        ]);
        assert_eq!(requested_ids(&req), None);
    }

    #[test]
    fn test_conflict_codes() {
        assert!(is_conflict_code("40001"));
        assert!(is_conflict_code("40P01"));
        assert!(!is_conflict_code("23505"));
        assert!(!is_conflict_code("23514"));
    }
}
