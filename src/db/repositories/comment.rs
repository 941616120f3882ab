//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Comment, CommentWithMeta, ListParams};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments of a post, oldest first. Unpublished comments are included
    /// only when written by `viewer_id`.
    async fn list_for_post(
        &self,
        post_id: i64,
        viewer_id: Option<i64>,
    ) -> Result<Vec<CommentWithMeta>>;

    /// Every comment, newest first, for moderation
    async fn list_recent(&self, params: &ListParams) -> Result<(Vec<CommentWithMeta>, i64)>;

    async fn update_text(&self, id: i64, text: &str) -> Result<bool>;

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based comment repository
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COMMENT: &str =
    "SELECT id, text, post_id, author_id, is_published, created_at FROM comments";

const SELECT_COMMENT_WITH_AUTHOR: &str = r#"
    SELECT cm.id, cm.text, cm.post_id, cm.author_id, cm.is_published, cm.created_at,
           u.username AS author_username, u.email AS author_email
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
"#;

const INSERT_COMMENT: &str = r#"
    INSERT INTO comments (text, post_id, author_id, is_published, created_at)
    VALUES (?, ?, ?, 1, ?)
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT_COMMENT)
                .bind(text)
                .bind(post_id)
                .bind(author_id)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(INSERT_COMMENT)
                .bind(text)
                .bind(post_id)
                .bind(author_id)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create comment")?;

        Ok(Comment {
            id,
            text: text.to_string(),
            post_id,
            author_id,
            is_published: true,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE id = ?", SELECT_COMMENT);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_comment_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_comment_mysql)),
        }
        .context("Failed to get comment by ID")
    }

    async fn list_for_post(
        &self,
        post_id: i64,
        viewer_id: Option<i64>,
    ) -> Result<Vec<CommentWithMeta>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_for_post_sqlite(p, post_id, viewer_id).await,
            Backend::Mysql(p) => list_for_post_mysql(p, post_id, viewer_id).await,
        }
        .context("Failed to list comments")
    }

    async fn list_recent(&self, params: &ListParams) -> Result<(Vec<CommentWithMeta>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_recent_sqlite(p, params).await,
            Backend::Mysql(p) => list_recent_mysql(p, params).await,
        }
        .context("Failed to list recent comments")
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<bool> {
        let sql = "UPDATE comments SET text = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(text)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(text)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to update comment")
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool> {
        let sql = "UPDATE comments SET is_published = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to update comment status")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to delete comment")
    }
}

fn post_comments_sql() -> String {
    format!(
        "{} WHERE cm.post_id = ? AND (cm.is_published = 1 OR cm.author_id = ?) \
         ORDER BY cm.created_at ASC, cm.id ASC",
        SELECT_COMMENT_WITH_AUTHOR
    )
}

fn recent_comments_sql() -> String {
    format!(
        "{} ORDER BY cm.created_at DESC, cm.id DESC LIMIT ? OFFSET ?",
        SELECT_COMMENT_WITH_AUTHOR
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_for_post_sqlite(
    pool: &SqlitePool,
    post_id: i64,
    viewer_id: Option<i64>,
) -> Result<Vec<CommentWithMeta>> {
    let rows = sqlx::query(&post_comments_sql())
        .bind(post_id)
        .bind(viewer_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_comment_with_meta_sqlite).collect())
}

async fn list_recent_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
) -> Result<(Vec<CommentWithMeta>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query(&recent_comments_sql())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;
    Ok((rows.iter().map(row_to_comment_with_meta_sqlite).collect(), total))
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        text: row.get("text"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_comment_with_meta_sqlite(row: &sqlx::sqlite::SqliteRow) -> CommentWithMeta {
    let email: String = row.get("author_email");
    CommentWithMeta::new(row_to_comment_sqlite(row), row.get("author_username"), &email)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_for_post_mysql(
    pool: &MySqlPool,
    post_id: i64,
    viewer_id: Option<i64>,
) -> Result<Vec<CommentWithMeta>> {
    let rows = sqlx::query(&post_comments_sql())
        .bind(post_id)
        .bind(viewer_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_comment_with_meta_mysql).collect())
}

async fn list_recent_mysql(
    pool: &MySqlPool,
    params: &ListParams,
) -> Result<(Vec<CommentWithMeta>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query(&recent_comments_sql())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;
    Ok((rows.iter().map(row_to_comment_with_meta_mysql).collect(), total))
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    Comment {
        id: row.get("id"),
        text: row.get("text"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

fn row_to_comment_with_meta_mysql(row: &sqlx::mysql::MySqlRow) -> CommentWithMeta {
    let email: String = row.get("author_email");
    CommentWithMeta::new(row_to_comment_mysql(row), row.get("author_username"), &email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_post, insert_user, migrated_pool};

    #[tokio::test]
    async fn test_comments_listed_oldest_first() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let reader = insert_user(&pool, "reader").await;
        let post_id = insert_post(&pool, author.id, None, "Post").await;
        let repo = SqlxCommentRepository::new(pool);

        repo.create(post_id, reader.id, "first").await.unwrap();
        repo.create(post_id, author.id, "second").await.unwrap();
        repo.create(post_id, reader.id, "third").await.unwrap();

        let comments = repo.list_for_post(post_id, None).await.unwrap();
        let texts: Vec<&str> = comments.iter().map(|c| c.comment.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(comments[0].author_username, "reader");
    }

    #[tokio::test]
    async fn test_unpublished_comment_shown_only_to_its_author() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let reader = insert_user(&pool, "reader").await;
        let post_id = insert_post(&pool, author.id, None, "Post").await;
        let repo = SqlxCommentRepository::new(pool);

        let hidden = repo.create(post_id, reader.id, "held back").await.unwrap();
        assert!(repo.set_published(hidden.id, false).await.unwrap());

        assert!(repo.list_for_post(post_id, None).await.unwrap().is_empty());
        assert!(repo.list_for_post(post_id, Some(author.id)).await.unwrap().is_empty());
        assert_eq!(repo.list_for_post(post_id, Some(reader.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_delete_and_recent() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let post_id = insert_post(&pool, author.id, None, "Post").await;
        let repo = SqlxCommentRepository::new(pool);

        let comment = repo.create(post_id, author.id, "typo").await.unwrap();
        assert!(repo.update_text(comment.id, "fixed").await.unwrap());
        assert_eq!(repo.get_by_id(comment.id).await.unwrap().unwrap().text, "fixed");

        let (recent, total) = repo.list_recent(&ListParams::page(1)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(recent[0].comment.id, comment.id);

        assert!(repo.delete(comment.id).await.unwrap());
        assert!(!repo.delete(comment.id).await.unwrap());
        assert!(repo.get_by_id(comment.id).await.unwrap().is_none());
    }
}
