use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use crate::db::queue::MAX_BATCH_SIZE;
use crate::db::{CategoryRepository, ItemRepository, NotificationQueue, SubscriptionRepository};
use crate::error::AppResult;
use crate::models::{Item, NotificationEvent, QueueMessage};
use crate::services::email::{EmailMessage, EmailSender};

pub const NOTIFICATION_SUBJECT: &str = "Lost and Found Notification - New Item Added";

/// What happened to a single queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Notified { item_id: i64, recipients: usize },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Malformed(String),
    ItemMissing(i64),
    CategoryUnknown(String),
    NoSubscribers(i64),
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            poll_interval: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(60),
        }
    }
}

/// Turns "item created" events into emails for the verified subscribers of the
/// item's category.
pub struct NotificationConsumer {
    items: Arc<dyn ItemRepository>,
    categories: Arc<dyn CategoryRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    email: Arc<dyn EmailSender>,
    sender_address: String,
    site_url: String,
}

impl NotificationConsumer {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        categories: Arc<dyn CategoryRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        email: Arc<dyn EmailSender>,
        sender_address: String,
        site_url: String,
    ) -> Self {
        Self {
            items,
            categories,
            subscriptions,
            email,
            sender_address,
            site_url,
        }
    }

    /// Processes every message independently; one failure never stops the batch.
    pub async fn handle_batch(&self, messages: &[QueueMessage]) -> Vec<MessageOutcome> {
        tracing::info!("Handling notification batch of {}", messages.len());
        let mut outcomes = Vec::with_capacity(messages.len());

        for message in messages {
            let outcome = match self.process(&message.body).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Error handling message {}: {:#}", message.id, e);
                    MessageOutcome::Failed(format!("{:#}", e))
                }
            };
            if let MessageOutcome::Skipped(reason) = &outcome {
                tracing::warn!("Skipped message {}: {:?}", message.id, reason);
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn process(&self, body: &str) -> anyhow::Result<MessageOutcome> {
        tracing::debug!("Raw queue message: {}", body);
        let event = match NotificationEvent::parse(body) {
            Ok(event) => event,
            Err(e) => return Ok(MessageOutcome::Skipped(SkipReason::Malformed(e.to_string()))),
        };

        let Some(item) = self
            .items
            .find(event.id)
            .await
            .with_context(|| format!("loading item {}", event.id))?
        else {
            return Ok(MessageOutcome::Skipped(SkipReason::ItemMissing(event.id)));
        };

        if item.category.trim().is_empty() {
            return Ok(MessageOutcome::Skipped(SkipReason::CategoryUnknown(
                item.category,
            )));
        }

        let Some(category) = self
            .categories
            .find_by_name(&item.category)
            .await
            .with_context(|| format!("resolving category {:?}", item.category))?
        else {
            return Ok(MessageOutcome::Skipped(SkipReason::CategoryUnknown(
                item.category,
            )));
        };

        let recipients = self
            .subscriptions
            .verified_subscribers(category.id)
            .await
            .with_context(|| format!("loading subscribers of category {}", category.id))?;

        if recipients.is_empty() {
            return Ok(MessageOutcome::Skipped(SkipReason::NoSubscribers(category.id)));
        }

        let count = recipients.len();
        let message = self.compose(&item, &category.name, recipients);
        self.email
            .send(&message)
            .await
            .with_context(|| format!("sending notification for item {}", item.id))?;

        tracing::info!(
            "Notified {} subscriber(s) of category {} about item {}",
            count,
            category.name,
            item.id
        );
        Ok(MessageOutcome::Notified {
            item_id: item.id,
            recipients: count,
        })
    }

    fn compose(&self, item: &Item, category: &str, recipients: Vec<String>) -> EmailMessage {
        let text = format!(
            "New item added to category {}:\n\n\
             Name: {}\n\
             Description: {}\n\
             Location: {}\n\
             Found at: {}\n\n\
             Please check the Lost and Found website for more details: {}\n",
            category,
            item.item_name,
            item.description,
            item.location,
            item.found_at.format("%Y-%m-%d %H:%M"),
            self.site_url
        );

        EmailMessage {
            from: self.sender_address.clone(),
            to: recipients,
            subject: NOTIFICATION_SUBJECT.to_string(),
            text,
        }
    }

    /// Receives one batch, handles it and acknowledges it. Returns the batch size.
    pub async fn poll_once(
        &self,
        queue: &dyn NotificationQueue,
        settings: &WorkerSettings,
    ) -> AppResult<usize> {
        let messages = queue
            .receive(settings.batch_size, settings.visibility_timeout)
            .await?;
        if messages.is_empty() {
            return Ok(0);
        }

        self.handle_batch(&messages).await;

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        queue.ack(&ids).await?;
        Ok(messages.len())
    }

    /// Worker loop: drains the queue until `shutdown` flips to true.
    pub async fn run(
        &self,
        queue: Arc<dyn NotificationQueue>,
        settings: WorkerSettings,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("Notification worker started");

        while !*shutdown.borrow() {
            match self.poll_once(queue.as_ref(), &settings).await {
                Ok(0) => {}
                Ok(_) => continue,
                Err(e) => tracing::error!("Notification worker poll failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Notification worker stopped");
    }
}
