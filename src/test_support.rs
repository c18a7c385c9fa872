// In-memory collaborators shared by the unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use image::{DynamicImage, ImageFormat, RgbImage};
use sqlx::PgPool;

use crate::db::{
    create_pool, run_migrations, CategoryRepository, ItemRepository, NotificationQueue,
    SubscriptionRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Category, Item, ItemStatus, ItemUpdate, NewItem, NotificationEvent, QueueMessage, Subscription,
};
use crate::services::email::{EmailMessage, EmailSender};
use crate::services::label_classifier::LabelClassifier;
use crate::storage::StorageBackend;

fn encode(format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(8, 8, |x, y| image::Rgb([(x * 30) as u8, (y * 30) as u8, 128]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}

pub fn png_bytes() -> Vec<u8> {
    encode(ImageFormat::Png)
}

pub fn jpeg_bytes() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

pub fn sample_new_item() -> NewItem {
    NewItem {
        item_name: "Umbrella".into(),
        description: "Black folding umbrella".into(),
        location: "Library".into(),
        found_at: NaiveDate::from_ymd_opt(2024, 11, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
        image_urls: Vec::new(),
        category: "Others".into(),
        brand: "Others".into(),
        labels: Vec::new(),
    }
}

/// Migrated pool for the Postgres-backed tests, or `None` when `DATABASE_URL`
/// is unset so those tests are skipped.
pub async fn database() -> Option<PgPool> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            return None;
        }
    };
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Some(pool)
}

#[derive(Default)]
struct StorageState {
    objects: HashMap<String, Vec<u8>>,
    fail_uploads: bool,
    delay: Option<Duration>,
}

pub struct MemoryStorage {
    bucket: String,
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(StorageState::default()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.state.lock().unwrap().fail_uploads = fail;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn upload(&self, key: &str, data: &[u8], _content_type: &str) -> AppResult<()> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_uploads {
            return Err(AppError::Storage(format!("upload of {} refused", key)));
        }
        state.objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.state.lock().unwrap().objects.remove(key);
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

struct QueuedMessage {
    id: i64,
    body: String,
    visible_at: Instant,
    receive_count: i32,
}

#[derive(Default)]
struct QueueState {
    next_id: i64,
    messages: Vec<QueuedMessage>,
    failures_left: usize,
    attempts: usize,
}

#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn fail_next_enqueues(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn enqueue_attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    /// Parsed bodies of every message still in the queue.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter_map(|m| NotificationEvent::parse(&m.body).ok())
            .collect()
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn enqueue(&self, body: &str) -> AppResult<i64> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(AppError::Queue("queue unavailable".into()));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.messages.push(QueuedMessage {
            id,
            body: body.to_string(),
            visible_at: Instant::now(),
            receive_count: 0,
        });
        Ok(id)
    }

    async fn receive(&self, max: i64, visibility: Duration) -> AppResult<Vec<QueueMessage>> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let mut received = Vec::new();

        for message in state.messages.iter_mut() {
            if received.len() as i64 >= max {
                break;
            }
            if message.visible_at <= now {
                message.visible_at = now + visibility;
                message.receive_count += 1;
                received.push(QueueMessage {
                    id: message.id,
                    body: message.body.clone(),
                    receive_count: message.receive_count,
                });
            }
        }

        Ok(received)
    }

    async fn ack(&self, ids: &[i64]) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .messages
            .retain(|m| !ids.contains(&m.id));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryItemRepository {
    items: Mutex<Vec<Item>>,
    fail_writes: AtomicBool,
}

impl MemoryItemRepository {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("database unavailable".into()));
        }
        Ok(())
    }

    pub fn all(&self) -> Vec<Item> {
        self.items.lock().unwrap().clone()
    }

    fn transition(&self, id: i64, from: ItemStatus, to: ItemStatus) -> bool {
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|i| i.id == id && i.status == from) {
            Some(item) => {
                item.status = to;
                item.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn create(&self, item: &NewItem) -> AppResult<Item> {
        self.check_writable()?;
        let mut items = self.items.lock().unwrap();
        let id = items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let created = Item {
            id,
            item_name: item.item_name.clone(),
            description: item.description.clone(),
            location: item.location.clone(),
            found_at: item.found_at,
            image_urls: item.image_urls.clone(),
            category: item.category.clone(),
            brand: item.brand.clone(),
            status: ItemStatus::Unclaimed,
            labels: item.labels.clone(),
            created_at: now,
            updated_at: now,
        };
        items.push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: i64) -> AppResult<Option<Item>> {
        Ok(self.items.lock().unwrap().iter().find(|i| i.id == id).cloned())
    }

    async fn list_all(&self) -> AppResult<Vec<Item>> {
        Ok(self.all())
    }

    async fn update(&self, id: i64, update: &ItemUpdate) -> AppResult<Item> {
        self.check_writable()?;
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::NotFound("Item not found".into()))?;
        item.item_name = update.item_name.clone();
        item.description = update.description.clone();
        item.location = update.location.clone();
        item.found_at = update.found_at;
        item.image_urls = update.image_urls.clone();
        item.category = update.category.clone();
        item.brand = update.brand.clone();
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() != before)
    }

    async fn claim(&self, id: i64) -> AppResult<bool> {
        Ok(self.transition(id, ItemStatus::Unclaimed, ItemStatus::Claimed))
    }

    async fn unclaim(&self, id: i64) -> AppResult<bool> {
        Ok(self.transition(id, ItemStatus::Claimed, ItemStatus::Unclaimed))
    }
}

/// Fixed taxonomy; ids are assigned from 1 in the given order.
pub struct StaticCategories {
    categories: Vec<Category>,
}

impl StaticCategories {
    pub fn new(names: &[&str]) -> Self {
        Self {
            categories: names
                .iter()
                .enumerate()
                .map(|(i, name)| Category {
                    id: i as i64 + 1,
                    name: name.to_string(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CategoryRepository for StaticCategories {
    async fn list_all(&self) -> AppResult<Vec<Category>> {
        Ok(self.categories.clone())
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Category>> {
        Ok(self.categories.iter().find(|c| c.name.eq_ignore_ascii_case(name)).cloned())
    }
}

#[derive(Default)]
struct SubscriptionState {
    next_id: i64,
    subscriptions: Vec<Subscription>,
    // email -> (token, verified)
    verifications: HashMap<String, (String, bool)>,
}

#[derive(Default)]
pub struct MemorySubscriptions {
    state: Mutex<SubscriptionState>,
}

impl MemorySubscriptions {
    /// Adds a subscription and forces the email's verification state.
    pub fn subscribe(&self, email: &str, category_id: i64, verified: bool) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.subscriptions.push(Subscription {
            id,
            email: email.to_string(),
            category_id,
        });
        state
            .verifications
            .insert(email.to_string(), ("seeded".to_string(), verified));
    }

    pub fn token_for(&self, email: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .verifications
            .get(email)
            .map(|(token, _)| token.clone())
    }

    pub fn is_verified(&self, email: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .verifications
            .get(email)
            .is_some_and(|(_, verified)| *verified)
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptions {
    async fn list_for_email(&self, email: &str) -> AppResult<Vec<Subscription>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.email == email)
            .cloned()
            .collect())
    }

    async fn replace_for_email(&self, email: &str, category_ids: &[i64]) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.subscriptions.retain(|s| s.email != email);
        for category_id in category_ids {
            state.next_id += 1;
            let id = state.next_id;
            state.subscriptions.push(Subscription {
                id,
                email: email.to_string(),
                category_id: *category_id,
            });
        }
        Ok(())
    }

    async fn reset_verification(&self, email: &str, token: &str) -> AppResult<()> {
        self.state
            .lock()
            .unwrap()
            .verifications
            .insert(email.to_string(), (token.to_string(), false));
        Ok(())
    }

    async fn verify(&self, email: &str, token: &str) -> AppResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state.verifications.get_mut(email) {
            Some((stored, verified)) if stored == token => {
                *verified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn verified_subscribers(&self, category_id: i64) -> AppResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut emails: Vec<String> = state
            .subscriptions
            .iter()
            .filter(|s| s.category_id == category_id)
            .filter(|s| {
                state
                    .verifications
                    .get(&s.email)
                    .is_some_and(|(_, verified)| *verified)
            })
            .map(|s| s.email.clone())
            .collect();
        emails.sort();
        emails.dedup();
        Ok(emails)
    }
}

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failures_left: Mutex<usize>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures_left.lock().unwrap() = count;
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AppError::Email("relay unavailable".into()));
            }
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Returns canned labels for keys containing a given fragment.
#[derive(Default)]
pub struct StubClassifier {
    rules: Vec<(String, Vec<String>)>,
    calls: Mutex<Vec<String>>,
}

impl StubClassifier {
    pub fn with(mut self, fragment: &str, labels: &[&str]) -> Self {
        self.rules.push((
            fragment.to_string(),
            labels.iter().map(|l| l.to_string()).collect(),
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelClassifier for StubClassifier {
    async fn classify(&self, _bucket: &str, key: &str) -> Vec<String> {
        self.calls.lock().unwrap().push(key.to_string());
        self.rules
            .iter()
            .find(|(fragment, _)| key.contains(fragment.as_str()))
            .map(|(_, labels)| labels.clone())
            .unwrap_or_default()
    }
}
