use std::sync::Arc;
use std::time::Duration;

use crate::db::NotificationQueue;
use crate::error::AppResult;
use crate::models::NotificationEvent;

/// Publishes "item created" events onto the notification queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: Arc<dyn NotificationQueue>,
    max_attempts: u32,
    backoff: Duration,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<dyn NotificationQueue>) -> Self {
        Self {
            queue,
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Enqueues `{"type": "item", "id": item_id}`, retrying transient failures.
    pub async fn notify_item_created(&self, item_id: i64) -> AppResult<()> {
        let body = NotificationEvent::item_created(item_id).to_body();
        let mut attempt = 1;

        loop {
            match self.queue.enqueue(&body).await {
                Ok(message_id) => {
                    tracing::info!(
                        "Notification queued for item {}: message_id={}",
                        item_id,
                        message_id
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        "Enqueue attempt {}/{} for item {} failed: {}",
                        attempt,
                        self.max_attempts,
                        item_id,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Giving up on notification for item {} after {} attempts: {}",
                        item_id,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}
