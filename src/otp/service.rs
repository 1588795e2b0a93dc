use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::mailer::Mailer;

use super::model::{generate_code, OtpRecord};
use super::store::OtpStore;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Invalid OTP")]
    Invalid,
    #[error("OTP has expired. Please request a new one")]
    Expired,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<OtpError> for ApiError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::Invalid | OtpError::Expired => ApiError::InvalidInput(e.to_string()),
            OtpError::Internal(e) => ApiError::Internal(e),
        }
    }
}

/// Issues a fresh code for the email, superseding any outstanding one.
/// The record is live from the moment it is stored: a failed dispatch is
/// reported but not rolled back, so at most one notification goes out.
pub async fn issue(
    store: &dyn OtpStore,
    mailer: &dyn Mailer,
    email: &str,
) -> Result<OtpRecord, OtpError> {
    store.delete_for_email(email).await?;
    let code = generate_code();
    let rec = store.insert(email, &code).await?;

    if let Err(e) = mailer.send_otp(&rec.email, &rec.code).await {
        error!(error = %e, email = %rec.email, "otp email dispatch failed");
        return Err(OtpError::Internal(e));
    }

    info!(email = %rec.email, "otp issued");
    Ok(rec)
}

/// Checks a submitted code and consumes it. Wrong code, already verified,
/// and never issued are deliberately indistinguishable to the caller; an
/// expired record is removed so a retry with the same code stays invalid.
pub async fn verify(
    store: &dyn OtpStore,
    email: &str,
    code: &str,
    now: OffsetDateTime,
    ttl_minutes: i64,
) -> Result<OffsetDateTime, OtpError> {
    let rec = match store.find_unverified(email, code).await? {
        Some(r) => r,
        None => {
            warn!(email, "otp verification failed");
            return Err(OtpError::Invalid);
        }
    };

    if rec.is_expired(now, ttl_minutes) {
        store.delete(rec.id).await?;
        warn!(email = %rec.email, "otp expired");
        return Err(OtpError::Expired);
    }

    // Conditional flip; a concurrent verify that got there first wins and
    // this one reports invalid.
    if !store.mark_verified(rec.id, now).await? {
        warn!(email = %rec.email, "otp already consumed");
        return Err(OtpError::Invalid);
    }

    info!(email = %rec.email, "otp verified");
    Ok(now)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::Duration;
    use uuid::Uuid;

    use super::*;

    struct MemoryStore {
        records: Mutex<Vec<OtpRecord>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }

        fn live_codes(&self, email: &str) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.email == email && !r.verified)
                .map(|r| r.code.clone())
                .collect()
        }

        fn backdate(&self, id: Uuid, minutes: i64) {
            let mut records = self.records.lock().unwrap();
            let rec = records.iter_mut().find(|r| r.id == id).unwrap();
            rec.created_at -= Duration::minutes(minutes);
        }

        fn count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OtpStore for MemoryStore {
        async fn delete_for_email(&self, email: &str) -> anyhow::Result<()> {
            self.records.lock().unwrap().retain(|r| r.email != email);
            Ok(())
        }

        async fn insert(&self, email: &str, code: &str) -> anyhow::Result<OtpRecord> {
            let rec = OtpRecord {
                id: Uuid::new_v4(),
                email: email.to_string(),
                code: code.to_string(),
                verified: false,
                created_at: OffsetDateTime::now_utc(),
                verified_at: None,
            };
            self.records.lock().unwrap().push(rec.clone());
            Ok(rec)
        }

        async fn find_unverified(
            &self,
            email: &str,
            code: &str,
        ) -> anyhow::Result<Option<OtpRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.email == email && r.code == code && !r.verified)
                .cloned())
        }

        async fn mark_verified(
            &self,
            id: Uuid,
            verified_at: OffsetDateTime,
        ) -> anyhow::Result<bool> {
            let mut records = self.records.lock().unwrap();
            match records.iter_mut().find(|r| r.id == id && !r.verified) {
                Some(rec) => {
                    rec.verified = true;
                    rec.verified_at = Some(verified_at);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
    }

    struct NullMailer;

    #[async_trait]
    impl Mailer for NullMailer {
        async fn send_otp(&self, _to: &str, _code: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_otp(&self, _to: &str, _code: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    /// Store whose conditional flip always loses, as if another request
    /// consumed the record between the lookup and the update.
    struct AlwaysBeaten {
        inner: MemoryStore,
    }

    #[async_trait]
    impl OtpStore for AlwaysBeaten {
        async fn delete_for_email(&self, email: &str) -> anyhow::Result<()> {
            self.inner.delete_for_email(email).await
        }
        async fn insert(&self, email: &str, code: &str) -> anyhow::Result<OtpRecord> {
            self.inner.insert(email, code).await
        }
        async fn find_unverified(
            &self,
            email: &str,
            code: &str,
        ) -> anyhow::Result<Option<OtpRecord>> {
            self.inner.find_unverified(email, code).await
        }
        async fn mark_verified(
            &self,
            _id: Uuid,
            _verified_at: OffsetDateTime,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
            self.inner.delete(id).await
        }
    }

    const TTL: i64 = 10;

    #[tokio::test]
    async fn reissue_supersedes_and_first_code_stops_working() {
        let store = MemoryStore::new();
        let first = issue(&store, &NullMailer, "a@b.co").await.unwrap();

        // Codes are random; re-issue until they differ.
        let mut second = issue(&store, &NullMailer, "a@b.co").await.unwrap();
        while second.code == first.code {
            second = issue(&store, &NullMailer, "a@b.co").await.unwrap();
        }

        assert_eq!(store.live_codes("a@b.co"), vec![second.code.clone()]);

        let now = OffsetDateTime::now_utc();
        let err = verify(&store, "a@b.co", &first.code, now, TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::Invalid));

        verify(&store, "a@b.co", &second.code, now, TTL)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn verify_is_single_use() {
        let store = MemoryStore::new();
        let rec = issue(&store, &NullMailer, "a@b.co").await.unwrap();

        let now = OffsetDateTime::now_utc();
        let verified_at = verify(&store, "a@b.co", &rec.code, now, TTL).await.unwrap();
        assert_eq!(verified_at, now);

        let err = verify(&store, "a@b.co", &rec.code, now, TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::Invalid));
    }

    #[tokio::test]
    async fn expired_code_is_deleted_then_invalid() {
        let store = MemoryStore::new();
        let rec = issue(&store, &NullMailer, "a@b.co").await.unwrap();
        store.backdate(rec.id, TTL + 1);

        let now = OffsetDateTime::now_utc();
        let err = verify(&store, "a@b.co", &rec.code, now, TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::Expired));
        assert_eq!(store.count(), 0);

        // The record is gone, so the same code now reads as invalid.
        let err = verify(&store, "a@b.co", &rec.code, now, TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::Invalid));
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_record_live() {
        let store = MemoryStore::new();
        let err = issue(&store, &FailingMailer, "a@b.co").await.unwrap_err();
        assert!(matches!(err, OtpError::Internal(_)));

        // Stored before dispatch; it must still be verifiable.
        let codes = store.live_codes("a@b.co");
        assert_eq!(codes.len(), 1);
        let now = OffsetDateTime::now_utc();
        verify(&store, "a@b.co", &codes[0], now, TTL).await.unwrap();
    }

    #[tokio::test]
    async fn losing_the_mark_race_reports_invalid() {
        let store = AlwaysBeaten {
            inner: MemoryStore::new(),
        };
        let rec = issue(&store, &NullMailer, "a@b.co").await.unwrap();

        let now = OffsetDateTime::now_utc();
        let err = verify(&store, "a@b.co", &rec.code, now, TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::Invalid));
    }

    #[tokio::test]
    async fn memory_mark_verified_is_conditional() {
        let store = MemoryStore::new();
        let rec = issue(&store, &NullMailer, "a@b.co").await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(store.mark_verified(rec.id, now).await.unwrap());
        assert!(!store.mark_verified(rec.id, now).await.unwrap());
    }
}
