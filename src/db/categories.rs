use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::Category;

/// Read access to the category taxonomy.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list_all(&self) -> AppResult<Vec<Category>>;

    /// Case-insensitive lookup; returns the stored spelling.
    async fn find_by_name(&self, name: &str) -> AppResult<Option<Category>>;

    async fn names(&self) -> AppResult<Vec<String>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }
}

pub struct PgCategoryRepository {
    pool: PgPool,
}

impl PgCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn list_all(&self) -> AppResult<Vec<Category>> {
        let categories: Vec<Category> =
            sqlx::query_as("SELECT id, name FROM category ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Category>> {
        let category: Option<Category> = sqlx::query_as(
            "SELECT id, name FROM category WHERE lower(name) = lower($1) ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }
}
