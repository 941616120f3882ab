//! Location repository
//!
//! Deleting a location keeps its posts and clears their location reference.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateLocationInput, Location};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn create(&self, input: &CreateLocationInput) -> Result<Location>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>>;

    /// All locations ordered by name
    async fn list(&self) -> Result<Vec<Location>>;

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    /// Delete a location; its posts lose their location
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxLocationRepository {
    pool: DynDatabasePool,
}

impl SqlxLocationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LocationRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_LOCATION: &str = "SELECT id, name, is_published, created_at FROM locations";
const INSERT_LOCATION: &str =
    "INSERT INTO locations (name, is_published, created_at) VALUES (?, ?, ?)";
const SET_PUBLISHED: &str = "UPDATE locations SET is_published = ? WHERE id = ?";
const NULLIFY_POSTS: &str = "UPDATE posts SET location_id = NULL WHERE location_id = ?";
const DELETE_LOCATION: &str = "DELETE FROM locations WHERE id = ?";

#[async_trait]
impl LocationRepository for SqlxLocationRepository {
    async fn create(&self, input: &CreateLocationInput) -> Result<Location> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT_LOCATION)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(INSERT_LOCATION)
                .bind(&input.name)
                .bind(input.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create location")?;

        Ok(Location {
            id,
            name: input.name.clone(),
            is_published: input.is_published,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>> {
        let sql = format!("{} WHERE id = ?", SELECT_LOCATION);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_location_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_location_mysql)),
        }
        .context("Failed to get location by ID")
    }

    async fn list(&self) -> Result<Vec<Location>> {
        let sql = format!("{} ORDER BY name, id", SELECT_LOCATION);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(row_to_location_sqlite).collect()),
            Backend::Mysql(p) => sqlx::query(&sql)
                .fetch_all(p)
                .await
                .map(|rows| rows.iter().map(row_to_location_mysql).collect()),
        }
        .context("Failed to list locations")
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
        .context("Failed to update location")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(p) => delete_location_sqlite(p, id).await,
            Backend::Mysql(p) => delete_location_mysql(p, id).await,
        }
        .context("Failed to delete location")
    }
}

async fn delete_location_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(NULLIFY_POSTS).bind(id).execute(&mut *tx).await?;
    let deleted = sqlx::query(DELETE_LOCATION).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

async fn delete_location_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(NULLIFY_POSTS).bind(id).execute(&mut *tx).await?;
    let deleted = sqlx::query(DELETE_LOCATION).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

fn row_to_location_sqlite(row: &sqlx::sqlite::SqliteRow) -> Location {
    Location {
        id: row.get("id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_location_mysql(row: &sqlx::mysql::MySqlRow) -> Location {
    Location {
        id: row.get("id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}
