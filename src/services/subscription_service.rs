use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};

use crate::db::{CategoryRepository, SubscriptionRepository};
use crate::error::{AppError, AppResult};
use crate::models::Subscription;
use crate::services::email::{EmailMessage, EmailSender};

const TOKEN_BYTES: usize = 16;
pub const VERIFICATION_SUBJECT: &str = "Lost and Found Email Verification";

/// Category subscriptions and the email verification handshake that gates them.
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    categories: Arc<dyn CategoryRepository>,
    email: Arc<dyn EmailSender>,
    sender_address: String,
    rng: SystemRandom,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        categories: Arc<dyn CategoryRepository>,
        email: Arc<dyn EmailSender>,
        sender_address: String,
    ) -> Self {
        Self {
            subscriptions,
            categories,
            email,
            sender_address,
            rng: SystemRandom::new(),
        }
    }

    pub async fn list(&self, email: &str) -> AppResult<Vec<Subscription>> {
        let email = checked_email(email)?;
        self.subscriptions.list_for_email(email).await
    }

    /// Replaces the email's subscriptions and starts a fresh verification: the
    /// address stops receiving notifications until the new token is confirmed.
    pub async fn subscribe(&self, email: &str, category_ids: &[i64]) -> AppResult<()> {
        let email = checked_email(email)?;

        let known: HashSet<i64> = self
            .categories
            .list_all()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if let Some(unknown) = category_ids.iter().find(|id| !known.contains(id)) {
            return Err(AppError::InvalidInput(format!("Unknown category id {}", unknown)));
        }

        let mut unique = Vec::with_capacity(category_ids.len());
        for id in category_ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        self.subscriptions.replace_for_email(email, &unique).await?;

        let token = self.generate_token()?;
        self.subscriptions.reset_verification(email, &token).await?;
        tracing::info!(
            "Subscriptions replaced for {}: {} categories, verification pending",
            email,
            unique.len()
        );

        let message = EmailMessage {
            from: self.sender_address.clone(),
            to: vec![email.to_string()],
            subject: VERIFICATION_SUBJECT.to_string(),
            text: format!(
                "Please verify your email by pasting the code below in the Lost and Found website: \n\n{}",
                token
            ),
        };
        self.email.send(&message).await
    }

    pub async fn verify(&self, email: &str, token: &str) -> AppResult<()> {
        let email = checked_email(email)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidInput("Missing required parameters token".into()));
        }

        if self.subscriptions.verify(email, token).await? {
            tracing::info!("Email verified: {}", email);
            Ok(())
        } else {
            tracing::warn!("Rejected verification token for {}", email);
            Err(AppError::InvalidInput("Invalid token".into()))
        }
    }

    /// 16 random bytes as 32 lowercase hex characters.
    fn generate_token(&self) -> AppResult<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal("Failed to generate verification token".into()))?;

        let mut token = String::with_capacity(TOKEN_BYTES * 2);
        for byte in bytes {
            let _ = write!(token, "{:02x}", byte);
        }
        Ok(token)
    }
}

fn checked_email(email: &str) -> AppResult<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::InvalidInput("Missing required parameters email".into()));
    }
    Ok(email)
}
