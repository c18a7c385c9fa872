use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppResult;

use super::AppState;

/// GET /category
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let categories = state
        .categories
        .list_all()
        .await
        .map_err(|e| e.or_generic("Failed to fetch categories"))?;
    Ok(Json(json!({ "category": categories })))
}
