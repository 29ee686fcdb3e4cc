//! Order endpoints: creation (idempotent checkout), listing, detail,
//! status transition
//!
//! Creation is the hot path; everything else is administrative CRUD.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, ErrorCode};
use shared::models::{Order, OrderLineItem, OrderStatus, OrderStatusEntry};
use uuid::Uuid;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::internal;
use crate::checkout;
use crate::db::orders;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Header carrying the caller-supplied idempotency token
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ==================== Request / response shapes ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "At least one item is required"), nested)]
    pub items: Vec<OrderItemInput>,
    #[validate(nested)]
    pub shipping: ShippingInput,
}

// Serialize is required: the length rule on `items` records the
// offending value as a validation param.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: i32,
}

/// Shipping address, snapshotted onto the order at creation
#[derive(Debug, Deserialize, Validate)]
pub struct ShippingInput {
    #[validate(length(min = 2, message = "Name is too short"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 3, message = "Address is too short"))]
    pub address: String,
    #[validate(length(min = 2, message = "City is too short"))]
    pub city: String,
    #[validate(length(min = 2, message = "State is too short"))]
    pub state: String,
    #[validate(length(min = 2, message = "Postal code is too short"))]
    pub postal: String,
    #[validate(length(min = 2, message = "Country is too short"))]
    pub country: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
}

#[derive(Deserialize)]
pub struct OrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<OrderStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Serialize)]
pub struct OrderPage {
    pub data: Vec<Order>,
    pub meta: PageMeta,
}

#[derive(Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
    pub status_history: Vec<OrderStatusEntry>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

// ==================== Gateway helpers ====================

/// Extract the idempotency token; the key is required, opaque, and
/// delivered out-of-band from the payload.
fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

fn flatten_field_errors(prefix: &str, errs: &ValidationErrors, out: &mut Vec<(String, String)>) {
    for (field, kind) in errs.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten_field_errors(&path, nested, out),
            ValidationErrorsKind::List(map) => {
                for (idx, nested) in map {
                    flatten_field_errors(&format!("{path}[{idx}]"), nested, out);
                }
            }
        }
    }
}

/// Resolve the listing window from caller-supplied paging params.
/// The limit is capped at 100 and the offset saturates rather than
/// overflowing on absurd page numbers.
fn page_window(query: &OrdersQuery) -> (i64, i64, i64) {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = page.saturating_sub(1).saturating_mul(limit);
    (page, limit, offset)
}

/// Ceiling division; `limit` is always >= 1 here.
fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// Turn validator output into an itemized per-field AppError
fn validation_error(errs: &ValidationErrors) -> AppError {
    let mut fields = Vec::new();
    flatten_field_errors("", errs, &mut fields);

    let mut err = AppError::new(ErrorCode::ValidationFailed);
    for (path, message) in fields {
        err = err.with_detail(path, message);
    }
    err
}

// ==================== Handlers ====================

/// POST /api/v1/orders
///
/// 201 on fresh creation, 200 when the idempotency key replays an
/// existing order; both carry the same `orderId` payload.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Response, AppError> {
    let Some(key) = idempotency_key(&headers) else {
        return Err(AppError::new(ErrorCode::MissingIdempotencyKey));
    };

    req.validate().map_err(|e| validation_error(&e))?;

    let placed = checkout::place_order(&state.pool, &state.currency, key, &req).await?;

    let status = if placed.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = ApiResponse::success(OrderCreated {
        order_id: placed.order_id,
    });
    Ok((status, Json(body)).into_response())
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> ApiResult<OrderPage> {
    let (page, limit, offset) = page_window(&query);

    let (data, total) = tokio::try_join!(
        orders::list_orders(&state.pool, query.status, limit, offset),
        orders::count_orders(&state.pool, query.status),
    )
    .map_err(internal)?;

    Ok(Json(ApiResponse::success(OrderPage {
        data,
        meta: PageMeta {
            page,
            limit,
            total,
            total_pages: total_pages(total, limit),
        },
    })))
}

/// GET /api/v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let Some(order) = orders::get_order(&state.pool, order_id)
        .await
        .map_err(internal)?
    else {
        return Err(AppError::new(ErrorCode::OrderNotFound));
    };

    let (items, status_history) = tokio::try_join!(
        orders::list_items(&state.pool, order_id),
        orders::status_history(&state.pool, order_id),
    )
    .map_err(internal)?;

    Ok(Json(ApiResponse::success(OrderDetail {
        order,
        items,
        status_history,
    })))
}

/// PATCH /api/v1/orders/{id}/status
///
/// Status update and history append commit together. Any status may
/// follow any other; only enum membership is enforced.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Order> {
    let mut tx = state.pool.begin().await.map_err(internal)?;

    if !orders::set_status(&mut tx, order_id, req.status)
        .await
        .map_err(internal)?
    {
        return Err(AppError::new(ErrorCode::OrderNotFound));
    }
    orders::append_status_history(&mut tx, order_id, req.status)
        .await
        .map_err(internal)?;

    tx.commit().await.map_err(internal)?;

    let order = orders::get_order(&state.pool, order_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;

    Ok(Json(ApiResponse::success(order)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateOrderRequest {
        serde_json::from_value(serde_json::json!({
            "items": [
                { "productId": "0c6f6b86-8b6c-4b8e-9f6a-1d2e3f405060", "quantity": 2 }
            ],
            "shipping": {
                "name": "Ana Torres",
                "email": "ana@example.com",
                "address": "Calle Mayor 1",
                "city": "Madrid",
                "state": "MD",
                "postal": "28001",
                "country": "ES"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut req = valid_request();
        req.items.clear();

        let err = validation_error(&req.validate().unwrap_err());
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.details.unwrap().contains_key("items"));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut req = valid_request();
        req.items[0].quantity = 0;

        let err = validation_error(&req.validate().unwrap_err());
        assert!(err.details.unwrap().contains_key("items[0].quantity"));
    }

    #[test]
    fn test_bad_email_rejected() {
        let mut req = valid_request();
        req.shipping.email = "not-an-email".into();

        let err = validation_error(&req.validate().unwrap_err());
        assert_eq!(
            err.details.unwrap().get("shipping.email").unwrap(),
            "Invalid email address"
        );
    }

    #[test]
    fn test_short_shipping_fields_rejected() {
        let mut req = valid_request();
        req.shipping.name = "A".into();
        req.shipping.country = "E".into();

        let err = validation_error(&req.validate().unwrap_err());
        let details = err.details.unwrap();
        assert!(details.contains_key("shipping.name"));
        assert!(details.contains_key("shipping.country"));
    }

    #[test]
    fn test_item_input_round_trips_camel_case() {
        let item = OrderItemInput {
            product_id: "0c6f6b86-8b6c-4b8e-9f6a-1d2e3f405060".parse().unwrap(),
            quantity: 2,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["productId"], "0c6f6b86-8b6c-4b8e-9f6a-1d2e3f405060");
        assert_eq!(value["quantity"], 2);
    }

    fn paging(page: Option<i64>, limit: Option<i64>) -> OrdersQuery {
        OrdersQuery {
            page,
            limit,
            status: None,
        }
    }

    #[test]
    fn test_page_window_defaults_and_bounds() {
        assert_eq!(page_window(&paging(None, None)), (1, 20, 0));
        assert_eq!(page_window(&paging(Some(3), Some(10))), (3, 10, 20));
        assert_eq!(page_window(&paging(Some(-5), Some(1000))), (1, 100, 0));
    }

    #[test]
    fn test_page_window_survives_huge_page_numbers() {
        let (page, limit, offset) = page_window(&paging(Some(i64::MAX), Some(100)));
        assert_eq!(page, i64::MAX);
        assert_eq!(limit, 100);
        assert_eq!(offset, i64::MAX);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }

    #[test]
    fn test_idempotency_key_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, "  ".parse().unwrap());
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, "checkout-123".parse().unwrap());
        assert_eq!(idempotency_key(&headers), Some("checkout-123"));
    }
}
