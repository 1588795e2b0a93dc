use async_trait::async_trait;
use tracing::info;

/// Outbound mail is an external collaborator; this trait is the seam.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

/// Default transport: logs the dispatch instead of speaking SMTP.
/// A real transport implements the same trait and slots into `AppState`.
#[derive(Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(&self, to: &str, code: &str) -> anyhow::Result<()> {
        info!(%to, %code, "otp email dispatched");
        Ok(())
    }
}
