//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL
//!
//! Deleting a user removes everything they own in one transaction: comments
//! on their posts, their own comments, their posts and their sessions.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{NewUser, ProfileInput, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Insert a self-registered user. The very first account becomes an
    /// admin, any later one takes `user.role`; one statement decides both.
    async fn create_registered(&self, user: &NewUser) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Overwrite the profile fields of user `id`
    async fn update_profile(&self, id: i64, profile: &ProfileInput) -> Result<User>;

    /// Delete a user and everything they authored
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based user repository
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_USER: &str = r#"
    SELECT id, username, email, first_name, last_name, password_hash, role, created_at, updated_at
    FROM users
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users
        (username, email, first_name, last_name, password_hash, role, created_at, updated_at)
    VALUES (?, ?, '', '', ?, ?, ?, ?)
"#;

const INSERT_REGISTERED_USER: &str = r#"
    INSERT INTO users
        (username, email, first_name, last_name, password_hash, role, created_at, updated_at)
    SELECT ?, ?, '', '', ?, CASE WHEN existing.n = 0 THEN 'admin' ELSE ? END, ?, ?
    FROM (SELECT COUNT(*) AS n FROM users) AS existing
"#;

const UPDATE_PROFILE: &str = r#"
    UPDATE users
    SET first_name = ?, last_name = ?, username = ?, email = ?, updated_at = ?
    WHERE id = ?
"#;

const DELETE_USER_CASCADE: &[&str] = &[
    "DELETE FROM comments WHERE post_id IN (SELECT id FROM posts WHERE author_id = ?)",
    "DELETE FROM comments WHERE author_id = ?",
    "DELETE FROM posts WHERE author_id = ?",
    "DELETE FROM sessions WHERE user_id = ?",
    "DELETE FROM users WHERE id = ?",
];

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_user_sqlite(p, INSERT_USER, user, now).await,
            Backend::Mysql(p) => insert_user_mysql(p, INSERT_USER, user, now).await,
        }
        .context("Failed to create user")?;
        Ok(new_user_row(id, user, now))
    }

    async fn create_registered(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => insert_user_sqlite(p, INSERT_REGISTERED_USER, user, now).await,
            Backend::Mysql(p) => insert_user_mysql(p, INSERT_REGISTERED_USER, user, now).await,
        }
        .context("Failed to register user")?;
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("{} WHERE id = ?", SELECT_USER);
        match self.pool.backend() {
            Backend::Sqlite(p) => fetch_user_sqlite(p, &sql, id).await,
            Backend::Mysql(p) => fetch_user_mysql(p, &sql, id).await,
        }
        .context("Failed to get user by ID")
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("{} WHERE username = ?", SELECT_USER);
        match self.pool.backend() {
            Backend::Sqlite(p) => fetch_user_sqlite(p, &sql, username).await,
            Backend::Mysql(p) => fetch_user_mysql(p, &sql, username).await,
        }
        .context("Failed to get user by username")
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("{} WHERE email = ?", SELECT_USER);
        match self.pool.backend() {
            Backend::Sqlite(p) => fetch_user_sqlite(p, &sql, email).await,
            Backend::Mysql(p) => fetch_user_mysql(p, &sql, email).await,
        }
        .context("Failed to get user by email")
    }

    async fn update_profile(&self, id: i64, profile: &ProfileInput) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(p) => update_profile_sqlite(p, id, profile).await,
            Backend::Mysql(p) => update_profile_mysql(p, id, profile).await,
        }?;
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => delete_user_sqlite(p, id).await,
            Backend::Mysql(p) => delete_user_mysql(p, id).await,
        }
        .context("Failed to delete user")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_user_sqlite(
    pool: &SqlitePool,
    sql: &str,
    user: &NewUser,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(sql)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

async fn fetch_user_sqlite<'q, T>(pool: &SqlitePool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    let row = sqlx::query(sql).bind(key).fetch_optional(pool).await?;
    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_profile_sqlite(pool: &SqlitePool, id: i64, profile: &ProfileInput) -> Result<()> {
    sqlx::query(UPDATE_PROFILE)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update profile")?;
    Ok(())
}

async fn delete_user_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in DELETE_USER_CASCADE {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str(&role)
            .with_context(|| format!("Invalid role in database: {}", role))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_user_mysql(
    pool: &MySqlPool,
    sql: &str,
    user: &NewUser,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(sql)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.last_insert_id() as i64)
}

async fn fetch_user_mysql<'q, T>(pool: &MySqlPool, sql: &'q str, key: T) -> Result<Option<User>>
where
    T: 'q + Send + sqlx::Encode<'q, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    let row = sqlx::query(sql).bind(key).fetch_optional(pool).await?;
    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_profile_mysql(pool: &MySqlPool, id: i64, profile: &ProfileInput) -> Result<()> {
    sqlx::query(UPDATE_PROFILE)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update profile")?;
    Ok(())
}

async fn delete_user_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in DELETE_USER_CASCADE {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str(&role)
            .with_context(|| format!("Invalid role in database: {}", role))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn new_user_row(id: i64, user: &NewUser, now: DateTime<Utc>) -> User {
    User {
        id,
        username: user.username.clone(),
        email: user.email.clone(),
        first_name: String::new(),
        last_name: String::new(),
        password_hash: user.password_hash.clone(),
        role: user.role,
        created_at: now,
        updated_at: now,
    }
}
