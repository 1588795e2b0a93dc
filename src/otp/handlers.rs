use axum::{extract::State, routing::post, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{auth::is_valid_email, error::ApiError, extract::Json, state::AppState};

use super::service;
use super::store::PgOtpStore;

pub fn otp_routes() -> Router<AppState> {
    Router::new()
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub success: bool,
    pub message: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(mut payload): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        return Err(ApiError::InvalidInput("Invalid email".into()));
    }

    let store = PgOtpStore::new(state.db.clone());
    let rec = service::issue(&store, state.mailer.as_ref(), &payload.email).await?;

    Ok(Json(SendOtpResponse {
        success: true,
        message: "OTP sent to email".into(),
        email: rec.email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(mut payload): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        return Err(ApiError::InvalidInput("Invalid email".into()));
    }

    let store = PgOtpStore::new(state.db.clone());
    let now = OffsetDateTime::now_utc();
    let verified_at = service::verify(
        &store,
        &payload.email,
        &payload.otp,
        now,
        state.config.otp_ttl_minutes,
    )
    .await?;

    Ok(Json(VerifyOtpResponse {
        success: true,
        message: "Email verified successfully".into(),
        email: payload.email,
        verified_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_carries_verified_at() {
        let resp = VerifyOtpResponse {
            success: true,
            message: "Email verified successfully".into(),
            email: "a@b.co".into(),
            verified_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("verifiedAt"));
        assert!(json.contains("a@b.co"));
    }
}
