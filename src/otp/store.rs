use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::OtpRecord;

/// Persistence seam for the OTP ledger, substitutable in tests the same
/// way `Mailer` is.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn delete_for_email(&self, email: &str) -> anyhow::Result<()>;
    async fn insert(&self, email: &str, code: &str) -> anyhow::Result<OtpRecord>;
    async fn find_unverified(&self, email: &str, code: &str)
        -> anyhow::Result<Option<OtpRecord>>;
    /// Flips the record to verified; false when a concurrent verify
    /// already took it.
    async fn mark_verified(&self, id: Uuid, verified_at: OffsetDateTime)
        -> anyhow::Result<bool>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}

pub struct PgOtpStore {
    db: PgPool,
}

impl PgOtpStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    /// Supersession: issuing a new code starts by dropping every prior
    /// record for the email. This and the following insert are two
    /// separate statements, not one transaction.
    async fn delete_for_email(&self, email: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM otp_codes WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn insert(&self, email: &str, code: &str) -> anyhow::Result<OtpRecord> {
        let rec = sqlx::query_as::<_, OtpRecord>(
            r#"
            INSERT INTO otp_codes (email, code)
            VALUES ($1, $2)
            RETURNING id, email, code, verified, created_at, verified_at
            "#,
        )
        .bind(email)
        .bind(code)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    /// Lookup keyed on (email, code, unverified). Wrong code, already
    /// verified, and never issued all come back as None.
    async fn find_unverified(
        &self,
        email: &str,
        code: &str,
    ) -> anyhow::Result<Option<OtpRecord>> {
        let rec = sqlx::query_as::<_, OtpRecord>(
            r#"
            SELECT id, email, code, verified, created_at, verified_at
            FROM otp_codes
            WHERE email = $1 AND code = $2 AND verified = false
            "#,
        )
        .bind(email)
        .bind(code)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn mark_verified(&self, id: Uuid, verified_at: OffsetDateTime) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE otp_codes
            SET verified = true, verified_at = $2
            WHERE id = $1 AND verified = false
            "#,
        )
        .bind(id)
        .bind(verified_at)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM otp_codes WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
