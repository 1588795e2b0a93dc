use axum::{extract::State, routing::get, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json as SqlJson, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{is_unique_violation, ApiError},
    extract::{Json, Path},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
}

/// Append-mostly order record; `order_id` is the client-supplied external
/// id and is unique. Items are an opaque JSON snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Uuid,
    pub items: SqlJson<serde_json::Value>,
    pub total_amount: Decimal,
    pub status: String,
    pub created_at: OffsetDateTime,
}

impl Order {
    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, order_id, user_id, items, total_amount, status, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Order>> {
        let row = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, order_id, user_id, items, total_amount, status, created_at
            FROM orders
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn create(
        db: &PgPool,
        order_id: &str,
        user_id: Uuid,
        items: &serde_json::Value,
        total_amount: Decimal,
        status: &str,
    ) -> Result<Order, sqlx::Error> {
        sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (order_id, user_id, items, total_amount, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, user_id, items, total_amount, status, created_at
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(SqlJson(items))
        .bind(total_amount)
        .bind(status)
        .fetch_one(db)
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_id: String,
    pub items: serde_json::Value,
    pub total_amount: Decimal,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "pending".into()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Uuid,
    pub items: serde_json::Value,
    pub total_amount: Decimal,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Order> for OrderDto {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            order_id: o.order_id,
            user_id: o.user_id,
            items: o.items.0,
            total_amount: o.total_amount,
            status: o.status,
            created_at: o.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: OrderDto,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<OrderDto>,
}

#[instrument(skip(state, user, payload))]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    if payload.order_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("Order id is required".into()));
    }
    let empty_items = match &payload.items {
        serde_json::Value::Array(a) => a.is_empty(),
        _ => true,
    };
    if empty_items {
        return Err(ApiError::InvalidInput("Order items are required".into()));
    }
    if payload.total_amount < Decimal::ZERO {
        return Err(ApiError::InvalidInput(
            "Total amount cannot be negative".into(),
        ));
    }

    let order = Order::create(
        &state.db,
        payload.order_id.trim(),
        user.user_id,
        &payload.items,
        payload.total_amount,
        &payload.status,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("Order already exists".into())
        } else {
            ApiError::from(e)
        }
    })?;

    info!(order_id = %order.order_id, user_id = %user.user_id, "order recorded");
    Ok(Json(OrderResponse {
        success: true,
        order: order.into(),
    }))
}

#[instrument(skip(state, user))]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = Order::list_by_user(&state.db, user.user_id).await?;
    Ok(Json(OrderListResponse {
        success: true,
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

#[instrument(skip(state, user))]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = Order::find(&state.db, user.user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
    Ok(Json(OrderResponse {
        success: true,
        order: order.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults_status_to_pending() {
        let req: CreateOrderRequest = serde_json::from_str(
            r#"{"orderId":"ORD-1","items":[{"productId":"x","quantity":1}],"totalAmount":"19.99"}"#,
        )
        .unwrap();
        assert_eq!(req.status, "pending");
        assert_eq!(req.total_amount, Decimal::new(1999, 2));
    }
}
