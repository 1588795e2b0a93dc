use axum::{extract::State, routing::post, Router};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::is_valid_email,
    error::{is_unique_violation, ApiError},
    extract::Json,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/newsletter", post(subscribe))
}

#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub email: String,
    pub created_at: OffsetDateTime,
}

impl Subscription {
    // Raw sqlx error so the handler can map the unique index on email.
    pub async fn create(db: &PgPool, email: &str) -> Result<Subscription, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO newsletter_subscriptions (email)
            VALUES ($1)
            RETURNING id, email, created_at
            "#,
        )
        .bind(email)
        .fetch_one(db)
        .await
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
    pub email: String,
}

#[instrument(skip(state, payload))]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(mut payload): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        return Err(ApiError::InvalidInput("Invalid email".into()));
    }

    let sub = Subscription::create(&state.db, &payload.email)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Email already subscribed".into())
            } else {
                ApiError::from(e)
            }
        })?;

    info!(email = %sub.email, "newsletter subscription recorded");
    Ok(Json(SubscribeResponse {
        success: true,
        message: "Subscribed to newsletter".into(),
        email: sub.email,
    }))
}
