use axum::{
    extract::State,
    routing::{delete, get},
    Router,
};
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{is_unique_violation, ApiError},
    extract::{Json, Path},
    state::AppState,
};

use super::dto::{
    CategoryListResponse, CategoryRequest, CategoryResponse, DeletedResponse, ProductListResponse,
    ProductRequest, ProductResponse,
};
use super::repo::{Category, Product};

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", delete(delete_category))
}

fn validate(payload: &ProductRequest) -> Result<(), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Product name is required".into()));
    }
    if payload.price < Decimal::ZERO {
        return Err(ApiError::InvalidInput("Price cannot be negative".into()));
    }
    if payload.stock < 0 {
        return Err(ApiError::InvalidInput("Stock cannot be negative".into()));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let products = Product::list(&state.db).await?;
    Ok(Json(ProductListResponse {
        success: true,
        products: products.into_iter().map(Into::into).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = Product::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;
    Ok(Json(ProductResponse {
        success: true,
        product: product.into(),
    }))
}

#[instrument(skip(state, user, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    validate(&payload)?;
    let product = Product::create(
        &state.db,
        payload.name.trim(),
        payload.description.as_deref(),
        payload.price,
        payload.stock,
        payload.image_url.as_deref(),
        payload.category_id,
    )
    .await?;
    info!(product_id = %product.id, by = %user.user_id, "product created");
    Ok(Json(ProductResponse {
        success: true,
        product: product.into(),
    }))
}

#[instrument(skip(state, user, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    validate(&payload)?;
    let product = Product::update(
        &state.db,
        id,
        payload.name.trim(),
        payload.description.as_deref(),
        payload.price,
        payload.stock,
        payload.image_url.as_deref(),
        payload.category_id,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;
    info!(product_id = %product.id, by = %user.user_id, "product updated");
    Ok(Json(ProductResponse {
        success: true,
        product: product.into(),
    }))
}

#[instrument(skip(state, user))]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !Product::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Product not found".into()));
    }
    info!(product_id = %id, by = %user.user_id, "product deleted");
    Ok(Json(DeletedResponse {
        success: true,
        message: "Product deleted".into(),
    }))
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<CategoryListResponse>, ApiError> {
    let categories = Category::list(&state.db).await?;
    Ok(Json(CategoryListResponse {
        success: true,
        categories: categories.into_iter().map(Into::into).collect(),
    }))
}

#[instrument(skip(state, user, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CategoryRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Category name is required".into()));
    }
    let category = Category::create(&state.db, payload.name.trim(), payload.description.as_deref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Category already exists".into())
            } else {
                ApiError::from(e)
            }
        })?;
    info!(category_id = %category.id, by = %user.user_id, "category created");
    Ok(Json(CategoryResponse {
        success: true,
        category: category.into(),
    }))
}

#[instrument(skip(state, user))]
pub async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !Category::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Category not found".into()));
    }
    info!(category_id = %id, by = %user.user_id, "category deleted");
    Ok(Json(DeletedResponse {
        success: true,
        message: "Category deleted".into(),
    }))
}
