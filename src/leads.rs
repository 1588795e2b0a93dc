use axum::{extract::State, routing::get, Router};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::is_valid_email, auth::AuthUser, error::ApiError, extract::Json, state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/form-data", get(list_submissions).post(submit_form))
}

/// Lead-capture form submission. Append-only, no cross-record invariants.
#[derive(Debug, Clone, FromRow)]
pub struct FormSubmission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub created_at: OffsetDateTime,
}

impl FormSubmission {
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        phone: Option<&str>,
        message: Option<&str>,
    ) -> anyhow::Result<FormSubmission> {
        let row = sqlx::query_as::<_, FormSubmission>(
            r#"
            INSERT INTO form_submissions (name, email, phone, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, phone, message, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(message)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<FormSubmission>> {
        let rows = sqlx::query_as::<_, FormSubmission>(
            r#"
            SELECT id, name, email, phone, message, created_at
            FROM form_submissions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
pub struct FormRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<FormSubmission> for FormSubmissionDto {
    fn from(f: FormSubmission) -> Self {
        Self {
            id: f.id,
            name: f.name,
            email: f.email,
            phone: f.phone,
            message: f.message,
            created_at: f.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FormResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct FormListResponse {
    pub success: bool,
    pub submissions: Vec<FormSubmissionDto>,
}

#[instrument(skip(state, payload))]
pub async fn submit_form(
    State(state): State<AppState>,
    Json(mut payload): Json<FormRequest>,
) -> Result<Json<FormResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let name = payload.name.trim();

    if name.is_empty() {
        return Err(ApiError::InvalidInput("Name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::InvalidInput("Invalid email".into()));
    }

    let submission = FormSubmission::create(
        &state.db,
        name,
        &payload.email,
        payload.phone.as_deref(),
        payload.message.as_deref(),
    )
    .await?;

    info!(submission_id = %submission.id, "form submission recorded");
    Ok(Json(FormResponse {
        success: true,
        message: "Form submitted successfully".into(),
    }))
}

#[instrument(skip(state, _user))]
pub async fn list_submissions(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<FormListResponse>, ApiError> {
    let submissions = FormSubmission::list(&state.db).await?;
    Ok(Json(FormListResponse {
        success: true,
        submissions: submissions.into_iter().map(Into::into).collect(),
    }))
}
