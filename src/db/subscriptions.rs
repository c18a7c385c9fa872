use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::Subscription;

/// Category subscriptions and the email verification records that gate them.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn list_for_email(&self, email: &str) -> AppResult<Vec<Subscription>>;

    /// Replaces every subscription held by `email` with `category_ids`.
    async fn replace_for_email(&self, email: &str, category_ids: &[i64]) -> AppResult<()>;

    /// Stores a fresh unverified token for `email`, discarding any previous one.
    async fn reset_verification(&self, email: &str, token: &str) -> AppResult<()>;

    /// Marks `email` verified when `token` matches. Returns whether it matched.
    async fn verify(&self, email: &str, token: &str) -> AppResult<bool>;

    /// Emails subscribed to `category_id` that have a verified record.
    async fn verified_subscribers(&self, category_id: i64) -> AppResult<Vec<String>>;
}

pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn list_for_email(&self, email: &str) -> AppResult<Vec<Subscription>> {
        let subscriptions: Vec<Subscription> = sqlx::query_as(
            "SELECT id, email, category_id FROM notification_subscriptions \
             WHERE email = $1 ORDER BY category_id ASC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn replace_for_email(&self, email: &str, category_ids: &[i64]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM notification_subscriptions WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        for category_id in category_ids {
            sqlx::query(
                "INSERT INTO notification_subscriptions (email, category_id) VALUES ($1, $2) \
                 ON CONFLICT (email, category_id) DO NOTHING",
            )
            .bind(email)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            "Subscriptions replaced: email={}, categories={:?}",
            email,
            category_ids
        );
        Ok(())
    }

    async fn reset_verification(&self, email: &str, token: &str) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO email_verifications (email, token, verified) VALUES ($1, $2, FALSE) \
             ON CONFLICT (email) DO UPDATE \
             SET token = EXCLUDED.token, verified = FALSE, created_at = NOW()",
        )
        .bind(email)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn verify(&self, email: &str, token: &str) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            "UPDATE email_verifications SET verified = TRUE WHERE email = $1 AND token = $2",
        )
        .bind(email)
        .bind(token)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }

    async fn verified_subscribers(&self, category_id: i64) -> AppResult<Vec<String>> {
        let emails: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT ns.email FROM notification_subscriptions ns \
             INNER JOIN email_verifications ev ON ns.email = ev.email \
             WHERE ns.category_id = $1 AND ev.verified = TRUE \
             ORDER BY ns.email",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }
}
