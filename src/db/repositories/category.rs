//! Category repository
//!
//! Deleting a category keeps its posts and clears their category reference.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, CreateCategoryInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, input: &CreateCategoryInput) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories ordered by title
    async fn list(&self) -> Result<Vec<Category>>;

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    /// Delete a category; its posts lose their category
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based category repository
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_CATEGORY: &str =
    "SELECT id, title, description, slug, is_published, created_at FROM categories";

const INSERT_CATEGORY: &str = r#"
    INSERT INTO categories (title, description, slug, is_published, created_at)
    VALUES (?, ?, ?, ?, ?)
"#;

const SET_PUBLISHED: &str = "UPDATE categories SET is_published = ? WHERE id = ?";

const DELETE_CATEGORY: [&str; 2] = [
    "UPDATE posts SET category_id = NULL WHERE category_id = ?",
    "DELETE FROM categories WHERE id = ?",
];

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, input: &CreateCategoryInput) -> Result<Category> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT_CATEGORY)
                .bind(&input.title)
                .bind(&input.description)
                .bind(&input.slug)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(INSERT_CATEGORY)
                .bind(&input.title)
                .bind(&input.description)
                .bind(&input.slug)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create category")?;

        Ok(Category {
            id,
            title: input.title.clone(),
            description: input.description.clone(),
            slug: input.slug.clone(),
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE id = ?", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_category_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_category_mysql)),
        }
        .context("Failed to get category by ID")
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE slug = ?", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_category_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_category_mysql)),
        }
        .context("Failed to get category by slug")
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY title, id", SELECT_CATEGORY);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(row_to_category_sqlite).collect()),
            Backend::Mysql(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(row_to_category_mysql).collect()),
        }
        .context("Failed to list categories")
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(SET_PUBLISHED)
                .bind(is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
            Backend::Mysql(p) => sqlx::query(SET_PUBLISHED)
                .bind(is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to update category")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(p) => delete_category_sqlite(p, id).await,
            Backend::Mysql(p) => delete_category_mysql(p, id).await,
        }
        .context("Failed to delete category")
    }
}

async fn delete_category_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(DELETE_CATEGORY[0]).bind(id).execute(&mut *tx).await?;
    let deleted = sqlx::query(DELETE_CATEGORY[1]).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

async fn delete_category_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(DELETE_CATEGORY[0]).bind(id).execute(&mut *tx).await?;
    let deleted = sqlx::query(DELETE_CATEGORY[1]).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}
