use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// One live code per email. A record is usable for verification only
/// while `verified` is false and it is younger than the TTL; expiry is
/// computed at verification time, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub verified: bool,
    pub created_at: OffsetDateTime,
    pub verified_at: Option<OffsetDateTime>,
}

impl OtpRecord {
    pub fn is_expired(&self, now: OffsetDateTime, ttl_minutes: i64) -> bool {
        now - self.created_at > Duration::minutes(ttl_minutes)
    }
}

/// Uniformly random 6-digit code, 100000..=999999.
pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

pub fn generate_code_with<R: Rng>(rng: &mut R) -> String {
    rng.gen_range(100_000..=999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn record_aged(now: OffsetDateTime, age_minutes: i64) -> OtpRecord {
        OtpRecord {
            id: Uuid::new_v4(),
            email: "a@b.co".into(),
            code: "123456".into(),
            verified: false,
            created_at: now - Duration::minutes(age_minutes),
            verified_at: None,
        }
    }

    #[test]
    fn codes_are_six_digit_numeric() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let code = generate_code_with(&mut rng);
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[test]
    fn fresh_record_is_not_expired() {
        let now = OffsetDateTime::now_utc();
        assert!(!record_aged(now, 0).is_expired(now, 10));
        assert!(!record_aged(now, 9).is_expired(now, 10));
    }

    #[test]
    fn record_survives_exactly_ten_minutes() {
        let now = OffsetDateTime::now_utc();
        assert!(!record_aged(now, 10).is_expired(now, 10));
    }

    #[test]
    fn eleven_minute_old_record_is_expired() {
        let now = OffsetDateTime::now_utc();
        assert!(record_aged(now, 11).is_expired(now, 10));
    }
}
