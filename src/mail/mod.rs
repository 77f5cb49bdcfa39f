pub mod sendgrid;

use async_trait::async_trait;
use thiserror::Error;

pub use sendgrid::SendGridMailer;

/// A templated email. `dynamic_fields` are substituted into the template by the provider.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub template_id: String,
    pub dynamic_fields: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

/// Used when no mail provider is configured. Never logs template data.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            template_id = %email.template_id,
            "Mail provider not configured, dropping email"
        );
        Ok(())
    }
}
