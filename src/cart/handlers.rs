use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    catalog::repo::Product,
    error::ApiError,
    extract::{Json, Path},
    state::AppState,
};

use super::dto::{AddItemRequest, CartResponse, UpdateItemRequest};
use super::model::{Cart, ProductSnapshot};
use super::repo;

/// Each mutation is a full read-modify-write against a versioned row; a
/// lost race surfaces as a failed conditional write and the whole
/// sequence is retried from the read.
const CAS_ATTEMPTS: u32 = 3;

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_item))
        .route("/cart/update", put(update_item))
        .route("/cart/item/:product_id", delete(remove_item))
        .route("/cart/clear", delete(clear_cart))
}

fn conflicted() -> ApiError {
    ApiError::Internal(anyhow::anyhow!("cart write kept conflicting, giving up"))
}

async fn fetch_product(state: &AppState, product_id: Uuid) -> Result<ProductSnapshot, ApiError> {
    let product = Product::find(&state.db, product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;
    Ok(ProductSnapshot::from(&product))
}

/// GET /cart — get-or-create. A first read materializes an empty active
/// cart, so even a pure "get" may write.
#[instrument(skip(state, user))]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CartResponse>, ApiError> {
    for attempt in 0..CAS_ATTEMPTS {
        if let Some(cart) = repo::find_active(&state.db, user.user_id).await? {
            return Ok(Json(CartResponse::new("Cart retrieved", cart)));
        }
        let cart = Cart::new(user.user_id, OffsetDateTime::now_utc());
        if repo::insert(&state.db, &cart).await? {
            info!(user_id = %user.user_id, cart_id = %cart.id, "cart created");
            return Ok(Json(CartResponse::new("Cart retrieved", cart)));
        }
        // Another request created the cart first; re-read it.
        warn!(user_id = %user.user_id, attempt, "cart create raced, retrying");
    }
    Err(conflicted())
}

#[instrument(skip(state, user, payload))]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    if payload.quantity <= 0 {
        return Err(ApiError::InvalidInput("Quantity must be at least 1".into()));
    }

    for attempt in 0..CAS_ATTEMPTS {
        let now = OffsetDateTime::now_utc();
        let (mut cart, is_new) = match repo::find_active(&state.db, user.user_id).await? {
            Some(c) => (c, false),
            None => (Cart::new(user.user_id, now), true),
        };
        let product = fetch_product(&state, payload.product_id).await?;

        cart.add_item(&product, payload.quantity, now)?;

        let persisted = if is_new {
            repo::insert(&state.db, &cart).await?
        } else {
            repo::replace(&state.db, &cart).await?
        };
        if persisted {
            info!(
                user_id = %user.user_id,
                product_id = %payload.product_id,
                quantity = payload.quantity,
                "item added to cart"
            );
            return Ok(Json(CartResponse::new("Item added to cart", cart)));
        }
        warn!(user_id = %user.user_id, attempt, "cart write conflicted, retrying");
    }
    Err(conflicted())
}

#[instrument(skip(state, user, payload))]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    if payload.quantity < 0 {
        return Err(ApiError::InvalidInput("Quantity cannot be negative".into()));
    }

    for attempt in 0..CAS_ATTEMPTS {
        let now = OffsetDateTime::now_utc();
        let mut cart = repo::find_active(&state.db, user.user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Cart not found".into()))?;

        if payload.quantity == 0 {
            // Zero means "remove this line"; no catalog read needed.
            cart.remove_item(payload.product_id, now)?;
        } else {
            let product = fetch_product(&state, payload.product_id).await?;
            cart.set_item_quantity(&product, payload.quantity, now)?;
        }

        if repo::replace(&state.db, &cart).await? {
            info!(
                user_id = %user.user_id,
                product_id = %payload.product_id,
                quantity = payload.quantity,
                "cart item updated"
            );
            return Ok(Json(CartResponse::new("Cart updated", cart)));
        }
        warn!(user_id = %user.user_id, attempt, "cart write conflicted, retrying");
    }
    Err(conflicted())
}

#[instrument(skip(state, user))]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartResponse>, ApiError> {
    for attempt in 0..CAS_ATTEMPTS {
        let now = OffsetDateTime::now_utc();
        let mut cart = repo::find_active(&state.db, user.user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Cart not found".into()))?;

        cart.remove_item(product_id, now)?;

        if repo::replace(&state.db, &cart).await? {
            info!(user_id = %user.user_id, %product_id, "item removed from cart");
            return Ok(Json(CartResponse::new("Item removed from cart", cart)));
        }
        warn!(user_id = %user.user_id, attempt, "cart write conflicted, retrying");
    }
    Err(conflicted())
}

#[instrument(skip(state, user))]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CartResponse>, ApiError> {
    for attempt in 0..CAS_ATTEMPTS {
        let now = OffsetDateTime::now_utc();
        let mut cart = repo::find_active(&state.db, user.user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("No active cart found".into()))?;

        cart.clear(now);

        if repo::replace(&state.db, &cart).await? {
            info!(user_id = %user.user_id, "cart cleared");
            return Ok(Json(CartResponse::new("Cart cleared", cart)));
        }
        warn!(user_id = %user.user_id, attempt, "cart write conflicted, retrying");
    }
    Err(conflicted())
}
