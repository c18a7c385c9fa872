use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use image::ImageFormat;

use crate::db::{CategoryRepository, ItemRepository};
use crate::error::{AppError, AppResult};
use crate::models::{Item, ItemUpdate, NewItem, FALLBACK_CATEGORY};
use crate::services::category_matcher::resolve_item_category;
use crate::services::image_validator::{self, ValidatedImage};
use crate::services::label_classifier::LabelClassifier;
use crate::services::notification_dispatcher::NotificationDispatcher;
use crate::storage::{ObjectStoreGateway, StoredObject};

const DEFAULT_LOCATION: &str = "Unknown location";
const DEFAULT_TIME_FOUND: &str = "00:00";

/// A file part of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Text fields of `POST /item/create`.
#[derive(Debug, Clone, Default)]
pub struct CreateItemForm {
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date_found: Option<String>,
    pub time_found: Option<String>,
    pub brand: Option<String>,
}

/// Text fields of `PUT /item/update/{id}`. Every editable field is overwritten:
/// omitted text becomes empty, an omitted brand or category becomes "Others",
/// and a timestamp is required.
#[derive(Debug, Clone, Default)]
pub struct UpdateItemForm {
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub found_at: Option<String>,
    pub date_found: Option<String>,
    pub time_found: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    /// `image_url[]` values the client wants to keep, in order.
    pub retained_urls: Vec<String>,
}

struct AcceptedImage {
    filename: String,
    image: ValidatedImage,
}

/// Runs the write side of the item pipeline: validate, store, classify, match,
/// persist, then announce.
pub struct IngestionService {
    storage: ObjectStoreGateway,
    classifier: Arc<dyn LabelClassifier>,
    items: Arc<dyn ItemRepository>,
    categories: Arc<dyn CategoryRepository>,
    dispatcher: NotificationDispatcher,
}

impl IngestionService {
    pub fn new(
        storage: ObjectStoreGateway,
        classifier: Arc<dyn LabelClassifier>,
        items: Arc<dyn ItemRepository>,
        categories: Arc<dyn CategoryRepository>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            storage,
            classifier,
            items,
            categories,
            dispatcher,
        }
    }

    pub async fn create_item(
        &self,
        form: CreateItemForm,
        images: Vec<UploadedImage>,
    ) -> AppResult<Item> {
        let item_name = required(form.item_name, "item_name")?;
        let date_found = required(form.date_found, "date_found")?;
        let time_found = non_blank(form.time_found).unwrap_or_else(|| DEFAULT_TIME_FOUND.into());
        let found_at = parse_found_at(&date_found, &time_found)?;

        let accepted = accept_images(images)?;
        let categories = self.categories.names().await?;
        tracing::info!(
            "Creating item {:?} with {} image(s)",
            item_name,
            accepted.len()
        );

        let mut stored: Vec<StoredObject> = Vec::with_capacity(accepted.len());
        let mut labels: Vec<Vec<String>> = Vec::with_capacity(accepted.len());
        for image in &accepted {
            let object = match self.store(image).await {
                Ok(object) => object,
                Err(e) => {
                    self.storage.discard(&stored).await;
                    return Err(e);
                }
            };
            labels.push(self.classifier.classify(&object.bucket, &object.key).await);
            stored.push(object);
        }

        let category = resolve_item_category(&labels, &categories);
        tracing::info!("Resolved category for {:?}: {}", item_name, category);

        let new_item = NewItem {
            item_name,
            description: non_blank(form.description).unwrap_or_default(),
            location: non_blank(form.location).unwrap_or_else(|| DEFAULT_LOCATION.into()),
            found_at,
            image_urls: stored.iter().map(|o| o.url.clone()).collect(),
            category,
            brand: non_blank(form.brand).unwrap_or_else(|| FALLBACK_CATEGORY.into()),
            labels,
        };

        let item = match self.items.create(&new_item).await {
            Ok(item) => item,
            Err(e) => {
                self.storage.discard(&stored).await;
                return Err(e);
            }
        };
        tracing::info!("Item created: id={}, category={}", item.id, item.category);

        if let Err(e) = self.dispatcher.notify_item_created(item.id).await {
            tracing::error!(
                "Item {} was created but its notification was lost: {}",
                item.id,
                e
            );
        }

        Ok(item)
    }

    /// Overwrites every editable field of an item. New images are stored but
    /// not classified.
    pub async fn update_item(
        &self,
        id: i64,
        form: UpdateItemForm,
        images: Vec<UploadedImage>,
    ) -> AppResult<Item> {
        self.items.get(id).await?;

        let found_at = match (non_blank(form.found_at), non_blank(form.date_found)) {
            (Some(found_at), _) => parse_timestamp(&found_at)?,
            (None, Some(date)) => {
                let time = non_blank(form.time_found).unwrap_or_else(|| DEFAULT_TIME_FOUND.into());
                parse_found_at(&date, &time)?
            }
            (None, None) => {
                return Err(AppError::InvalidInput("Missing field: found_at".into()));
            }
        };

        let category = self.checked_category(form.category.unwrap_or_default()).await?;

        let accepted = accept_images(images)?;
        let mut stored: Vec<StoredObject> = Vec::with_capacity(accepted.len());
        for image in &accepted {
            match self.store(image).await {
                Ok(object) => stored.push(object),
                Err(e) => {
                    self.storage.discard(&stored).await;
                    return Err(e);
                }
            }
        }

        let mut image_urls: Vec<String> = form
            .retained_urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        image_urls.extend(stored.iter().map(|o| o.url.clone()));

        let update = ItemUpdate {
            item_name: non_blank(form.item_name).unwrap_or_default(),
            description: non_blank(form.description).unwrap_or_default(),
            location: non_blank(form.location).unwrap_or_default(),
            found_at,
            image_urls,
            category,
            brand: non_blank(form.brand).unwrap_or_else(|| FALLBACK_CATEGORY.into()),
        };

        match self.items.update(id, &update).await {
            Ok(item) => {
                tracing::info!("Item updated: id={}, images={}", id, item.image_urls.len());
                Ok(item)
            }
            Err(e) => {
                self.storage.discard(&stored).await;
                Err(e)
            }
        }
    }

    async fn store(&self, accepted: &AcceptedImage) -> AppResult<StoredObject> {
        self.storage
            .store(
                &accepted.image.data,
                accepted.image.content_type(),
                &accepted.filename,
            )
            .await
    }

    async fn checked_category(&self, category: String) -> AppResult<String> {
        let category = category.trim();
        if category.is_empty() || category.eq_ignore_ascii_case(FALLBACK_CATEGORY) {
            return Ok(FALLBACK_CATEGORY.to_string());
        }
        match self.categories.find_by_name(category).await? {
            Some(found) => Ok(found.name),
            None => Err(AppError::InvalidInput(format!(
                "Unknown category '{}'",
                category
            ))),
        }
    }
}

/// Validates every upload before anything is stored so a bad file never leaves
/// orphaned objects behind.
fn accept_images(images: Vec<UploadedImage>) -> AppResult<Vec<AcceptedImage>> {
    images
        .into_iter()
        .map(|upload| -> AppResult<AcceptedImage> {
            let name = upload.filename.trim();
            let filename = (!name.is_empty()).then_some(name);
            let image = image_validator::inspect(&upload.data, filename).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Invalid image: {}",
                    filename.unwrap_or("<unnamed>")
                ))
            })?;
            let filename = match filename {
                Some(name) => name.to_string(),
                None => format!("image.{}", extension(image.format)),
            };
            Ok(AcceptedImage { filename, image })
        })
        .collect()
}

fn extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        _ => "jpg",
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    non_blank(value).ok_or_else(|| AppError::InvalidInput(format!("Missing field: {}", field)))
}

/// Combines `YYYY-MM-DD` and `HH:MM[:SS]`.
pub fn parse_found_at(date: &str, time: &str) -> AppResult<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("Invalid date_found '{}'", date)))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M"))
        .map_err(|_| AppError::InvalidInput(format!("Invalid time_found '{}'", time)))?;
    Ok(date.and_time(time))
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` or the same with a space separator.
pub fn parse_timestamp(value: &str) -> AppResult<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid found_at '{}'", value)))
}
