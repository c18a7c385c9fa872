use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{Item, ItemModel, ItemStatus, ItemUpdate, NewItem};

/// Persistence for found items and their claim state.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Inserts an unclaimed item and returns the stored row.
    async fn create(&self, item: &NewItem) -> AppResult<Item>;

    async fn find(&self, id: i64) -> AppResult<Option<Item>>;

    async fn get(&self, id: i64) -> AppResult<Item> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
    }

    async fn list_all(&self) -> AppResult<Vec<Item>>;

    /// Overwrites every editable field. `NotFound` when the id does not exist.
    async fn update(&self, id: i64, update: &ItemUpdate) -> AppResult<Item>;

    /// Hard delete. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> AppResult<bool>;

    /// `unclaimed -> claimed`. Returns false when the item was not unclaimed.
    async fn claim(&self, id: i64) -> AppResult<bool>;

    /// `claimed -> unclaimed`. Returns false when the item was not claimed.
    async fn unclaim(&self, id: i64) -> AppResult<bool>;
}

const SELECT_ITEMS: &str = "SELECT id, item_name, description, location, found_at, image_urls, \
     category, brand, status, labels, created_at, updated_at FROM items";

pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(&self, id: i64, from: ItemStatus, to: ItemStatus) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            "UPDATE items SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::info!(
            "Item status transition {} -> {}: id={}, rows_affected={}",
            from,
            to,
            id,
            rows_affected
        );
        Ok(rows_affected == 1)
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn create(&self, item: &NewItem) -> AppResult<Item> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO items (item_name, description, location, found_at, image_urls, \
             category, brand, status, labels) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'unclaimed', $8) \
             RETURNING id",
        )
        .bind(&item.item_name)
        .bind(&item.description)
        .bind(&item.location)
        .bind(item.found_at)
        .bind(Json(&item.image_urls))
        .bind(&item.category)
        .bind(&item.brand)
        .bind(Json(&item.labels))
        .fetch_one(&mut *tx)
        .await?;

        // Re-read so server-assigned columns come from the row itself.
        let sql = format!("{} WHERE id = $1", SELECT_ITEMS);
        let model: ItemModel = sqlx::query_as(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Inserted item: id={}, category={}", model.id, model.category);
        model.try_into()
    }

    async fn find(&self, id: i64) -> AppResult<Option<Item>> {
        let sql = format!("{} WHERE id = $1", SELECT_ITEMS);
        let model: Option<ItemModel> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        model.map(Item::try_from).transpose()
    }

    async fn list_all(&self) -> AppResult<Vec<Item>> {
        let sql = format!("{} ORDER BY id ASC", SELECT_ITEMS);
        let models: Vec<ItemModel> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        models.into_iter().map(Item::try_from).collect()
    }

    async fn update(&self, id: i64, update: &ItemUpdate) -> AppResult<Item> {
        let model: Option<ItemModel> = sqlx::query_as(
            "UPDATE items SET item_name = $1, description = $2, location = $3, found_at = $4, \
             image_urls = $5, category = $6, brand = $7, updated_at = NOW() \
             WHERE id = $8 \
             RETURNING id, item_name, description, location, found_at, image_urls, \
             category, brand, status, labels, created_at, updated_at",
        )
        .bind(&update.item_name)
        .bind(&update.description)
        .bind(&update.location)
        .bind(update.found_at)
        .bind(Json(&update.image_urls))
        .bind(&update.category)
        .bind(&update.brand)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match model {
            Some(m) => m.try_into(),
            None => Err(AppError::NotFound("Item not found".to_string())),
        }
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!("Deleted item: id={}, rows_affected={}", id, rows_affected);
        Ok(rows_affected > 0)
    }

    async fn claim(&self, id: i64) -> AppResult<bool> {
        self.transition(id, ItemStatus::Unclaimed, ItemStatus::Claimed)
            .await
    }

    async fn unclaim(&self, id: i64) -> AppResult<bool> {
        self.transition(id, ItemStatus::Claimed, ItemStatus::Unclaimed)
            .await
    }
}
