use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::http_client::HttpClient;

/// One plain-text email, sent in a single call to every address in `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> AppResult<()>;
}

/// Posts messages as JSON to a mail relay.
pub struct HttpEmailSender {
    http: HttpClient,
    relay_url: String,
}

impl HttpEmailSender {
    pub fn new(http: HttpClient, relay_url: String) -> Self {
        Self { http, relay_url }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        let response = self
            .http
            .post_json(&self.relay_url, message)
            .await
            .map_err(|e| AppError::Email(format!("Failed to reach mail relay: {}", e)))?;

        if response.status().is_success() {
            tracing::info!(
                "Email sent: subject={:?}, recipients={}",
                message.subject,
                message.to.len()
            );
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AppError::Email(format!(
                "Mail relay rejected message: {} - {}",
                status, body
            )))
        }
    }
}

/// Used when no relay is configured: logs instead of sending.
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        tracing::info!(
            "Mail relay not configured, skipping email: subject={:?}, to={:?}",
            message.subject,
            message.to
        );
        Ok(())
    }
}
