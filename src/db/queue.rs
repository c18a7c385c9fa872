use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::QueueMessage;

/// Largest batch handed to a consumer in one delivery.
pub const MAX_BATCH_SIZE: i64 = 5;

/// Durable at-least-once message queue.
///
/// A received message is hidden for the visibility timeout and only disappears once
/// acknowledged; a consumer that dies mid-batch gets the messages redelivered.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, body: &str) -> AppResult<i64>;

    async fn receive(&self, max: i64, visibility: Duration) -> AppResult<Vec<QueueMessage>>;

    async fn ack(&self, ids: &[i64]) -> AppResult<()>;
}

/// Queue stored in the `notification_queue` table.
pub struct PgNotificationQueue {
    pool: PgPool,
}

impl PgNotificationQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationQueue for PgNotificationQueue {
    async fn enqueue(&self, body: &str) -> AppResult<i64> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO notification_queue (body) VALUES ($1) RETURNING id")
                .bind(body)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::Queue(format!("enqueue failed: {}", e)))?;

        tracing::debug!("Enqueued notification message: id={}", id);
        Ok(id)
    }

    async fn receive(&self, max: i64, visibility: Duration) -> AppResult<Vec<QueueMessage>> {
        let mut messages: Vec<QueueMessage> = sqlx::query_as(
            r#"
            UPDATE notification_queue q
            SET visible_at = NOW() + make_interval(secs => $2),
                receive_count = q.receive_count + 1
            WHERE q.id IN (
                SELECT id FROM notification_queue
                WHERE visible_at <= NOW()
                ORDER BY id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING q.id, q.body, q.receive_count
            "#,
        )
        .bind(max.clamp(1, MAX_BATCH_SIZE))
        .bind(visibility.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Queue(format!("receive failed: {}", e)))?;

        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn ack(&self, ids: &[i64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM notification_queue WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Queue(format!("ack failed: {}", e)))?;
        Ok(())
    }
}
