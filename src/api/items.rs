use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::services::ingestion::{CreateItemForm, UpdateItemForm, UploadedImage};

use super::AppState;

const RETAINED_URL_FIELDS: &[&str] = &["image_url[]", "image_url"];

/// Text fields, retained URLs and file parts of a multipart request.
#[derive(Debug, Default)]
struct ItemPayload {
    fields: HashMap<String, String>,
    retained_urls: Vec<String>,
    images: Vec<UploadedImage>,
}

impl ItemPayload {
    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }
}

async fn read_payload(mut multipart: Multipart) -> AppResult<ItemPayload> {
    let mut payload = ItemPayload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);

        match filename {
            Some(filename) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;
                // Browsers send an empty part for an untouched file input.
                if data.is_empty() && filename.is_empty() {
                    continue;
                }
                payload.images.push(UploadedImage {
                    filename,
                    data: data.to_vec(),
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read field {}: {}", name, e)))?;
                if RETAINED_URL_FIELDS.contains(&name.as_str()) {
                    payload.retained_urls.push(value);
                } else {
                    payload.fields.insert(name, value);
                }
            }
        }
    }

    Ok(payload)
}

/// GET /items
pub async fn list_items(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let items = state
        .items
        .list_all()
        .await
        .map_err(|e| e.or_generic("Failed to fetch items"))?;
    Ok(Json(json!({ "items": items })))
}

/// GET /item/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let item = state
        .items
        .get(id)
        .await
        .map_err(|e| e.or_generic("Failed to fetch item"))?;
    Ok(Json(json!({ "item": item })))
}

/// POST /item/create
pub async fn create_item(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    const FAILURE: &str = "Failed to create item. Please try again.";

    let mut payload = read_payload(multipart)
        .await
        .map_err(|e| e.or_generic(FAILURE))?;
    let form = CreateItemForm {
        item_name: payload.take("item_name"),
        description: payload.take("description"),
        location: payload.take("location"),
        date_found: payload.take("date_found"),
        time_found: payload.take("time_found"),
        brand: payload.take("brand"),
    };

    let item = state
        .ingestion
        .create_item(form, payload.images)
        .await
        .map_err(|e| e.or_generic(FAILURE))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Item created successfully", "item": item })),
    ))
}

/// PUT /item/update/:id
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    const FAILURE: &str = "Failed to update item. Please try again.";

    let mut payload = read_payload(multipart)
        .await
        .map_err(|e| e.or_generic(FAILURE))?;
    let form = UpdateItemForm {
        item_name: payload.take("item_name"),
        description: payload.take("description"),
        location: payload.take("location"),
        found_at: payload.take("found_at"),
        date_found: payload.take("date_found"),
        time_found: payload.take("time_found"),
        category: payload.take("category"),
        brand: payload.take("brand"),
        retained_urls: std::mem::take(&mut payload.retained_urls),
    };

    let item = state
        .ingestion
        .update_item(id, form, payload.images)
        .await
        .map_err(|e| e.or_generic(FAILURE))?;

    Ok(Json(json!({ "message": "Item updated successfully", "item": item })))
}

/// DELETE /item/delete/:id
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let deleted = state
        .items
        .delete(id)
        .await
        .map_err(|e| e.or_generic("Failed to delete item"))?;
    if !deleted {
        tracing::info!("Delete of missing item {} ignored", id);
    }
    Ok(Json(json!({ "message": "Item deleted successfully" })))
}

/// PUT /item/claim/:id
pub async fn claim_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let updated = state
        .items
        .claim(id)
        .await
        .map_err(|e| e.or_generic("Failed to claim item"))?;
    Ok(Json(json!({
        "message": "Item status updated to claimed successfully",
        "updated": updated,
    })))
}

/// PUT /item/unclaim/:id
pub async fn unclaim_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let updated = state
        .items
        .unclaim(id)
        .await
        .map_err(|e| e.or_generic("Failed to unclaim item"))?;
    Ok(Json(json!({
        "message": "Item status updated to unclaimed successfully",
        "updated": updated,
    })))
}
