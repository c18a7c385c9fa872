use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::AppError;

/// Category assigned when no label matches the taxonomy.
pub const FALLBACK_CATEGORY: &str = "Others";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Unclaimed,
    Claimed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Unclaimed => "unclaimed",
            ItemStatus::Claimed => "claimed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unclaimed" => Ok(ItemStatus::Unclaimed),
            "claimed" => Ok(ItemStatus::Claimed),
            other => Err(AppError::Internal(format!("unknown item status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub item_name: String,
    pub description: String,
    pub location: String,
    pub found_at: NaiveDateTime,
    pub image_urls: Vec<String>,
    pub category: String,
    pub brand: String,
    pub status: ItemStatus,
    /// One label list per image, in upload order.
    pub labels: Vec<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `items` table.
#[derive(Debug, Clone, FromRow)]
pub struct ItemModel {
    pub id: i64,
    pub item_name: String,
    pub description: String,
    pub location: String,
    pub found_at: NaiveDateTime,
    pub image_urls: Json<Vec<String>>,
    pub category: String,
    pub brand: String,
    pub status: String,
    pub labels: Json<Vec<Vec<String>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ItemModel> for Item {
    type Error = AppError;

    fn try_from(model: ItemModel) -> Result<Self, Self::Error> {
        Ok(Item {
            id: model.id,
            item_name: model.item_name,
            description: model.description,
            location: model.location,
            found_at: model.found_at,
            image_urls: model.image_urls.0,
            category: model.category,
            brand: model.brand,
            status: model.status.parse()?,
            labels: model.labels.0,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Fields of an item about to be inserted. Status is always `unclaimed`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub item_name: String,
    pub description: String,
    pub location: String,
    pub found_at: NaiveDateTime,
    pub image_urls: Vec<String>,
    pub category: String,
    pub brand: String,
    pub labels: Vec<Vec<String>>,
}

/// Full overwrite of the editable item fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub item_name: String,
    pub description: String,
    pub location: String,
    pub found_at: NaiveDateTime,
    pub image_urls: Vec<String>,
    pub category: String,
    pub brand: String,
}
