//! Post repository
//!
//! Listing queries apply the public visibility rule in SQL so that page
//! counts and page contents agree: a post is listed when it is published,
//! its publication date has passed and its category (if any) is published.
//! Every listed post carries the number of its published comments.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CategoryRef, ListParams, LocationRef, Post, PostDraft, PostWithMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, author_id: i64, draft: &PostDraft) -> Result<Post>;

    /// Fetch a post with its metadata regardless of visibility
    async fn get_by_id(&self, id: i64) -> Result<Option<PostWithMeta>>;

    /// Replace every editable field of post `id`
    async fn update(&self, id: i64, draft: &PostDraft) -> Result<bool>;

    /// Delete a post together with its comments
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Publicly visible posts, newest first
    async fn find_visible(
        &self,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)>;

    /// Publicly visible posts in one category, newest first
    async fn find_visible_by_category(
        &self,
        category_id: i64,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)>;

    /// Publicly visible posts by one author, newest first
    async fn find_visible_by_author(
        &self,
        author_id: i64,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)>;
}

/// SQLx-based post repository
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_visible_scoped(
        &self,
        scope: Scope,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(p) => find_visible_sqlite(p, scope, now, params).await,
            Backend::Mysql(p) => find_visible_mysql(p, scope, now, params).await,
        }
        .context("Failed to list visible posts")
    }
}

/// Narrowing applied on top of the visibility filter
#[derive(Debug, Clone, Copy)]
enum Scope {
    All,
    Category(i64),
    Author(i64),
}

impl Scope {
    fn clause(self) -> &'static str {
        match self {
            Scope::All => "",
            Scope::Category(_) => " AND p.category_id = ?",
            Scope::Author(_) => " AND p.author_id = ?",
        }
    }

    fn id(self) -> Option<i64> {
        match self {
            Scope::All => None,
            Scope::Category(id) | Scope::Author(id) => Some(id),
        }
    }
}

const SELECT_POST_WITH_META: &str = r#"
    SELECT p.id, p.title, p.text, p.pub_date, p.image, p.author_id, p.category_id,
           p.location_id, p.is_published, p.created_at,
           u.username AS author_username,
           c.slug AS category_slug, c.title AS category_title,
           c.is_published AS category_is_published,
           l.name AS location_name, l.is_published AS location_is_published,
           (SELECT COUNT(*) FROM comments cm
             WHERE cm.post_id = p.id AND cm.is_published = 1) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id
"#;

const COUNT_POSTS: &str = r#"
    SELECT COUNT(*)
    FROM posts p
    LEFT JOIN categories c ON c.id = p.category_id
"#;

const VISIBLE_FILTER: &str = r#"
    WHERE p.is_published = 1
      AND p.pub_date <= ?
      AND (p.category_id IS NULL OR c.is_published = 1)
"#;

const ORDER_AND_PAGE: &str = " ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?";

const INSERT_POST: &str = r#"
    INSERT INTO posts (title, text, pub_date, image, author_id, category_id, location_id,
                       is_published, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE posts
    SET title = ?, text = ?, pub_date = ?, image = ?, category_id = ?, location_id = ?,
        is_published = ?
    WHERE id = ?
"#;

const DELETE_POST_COMMENTS: &str = "DELETE FROM comments WHERE post_id = ?";
const DELETE_POST: &str = "DELETE FROM posts WHERE id = ?";

fn listing_sql(scope: Scope) -> (String, String) {
    let select = format!(
        "{}{}{}{}",
        SELECT_POST_WITH_META,
        VISIBLE_FILTER,
        scope.clause(),
        ORDER_AND_PAGE
    );
    let count = format!("{}{}{}", COUNT_POSTS, VISIBLE_FILTER, scope.clause());
    (select, count)
}

fn new_post(id: i64, author_id: i64, draft: &PostDraft, now: DateTime<Utc>) -> Post {
    Post {
        id,
        title: draft.title.clone(),
        text: draft.text.clone(),
        pub_date: draft.pub_date,
        image: draft.image.clone(),
        author_id,
        category_id: draft.category_id,
        location_id: draft.location_id,
        is_published: draft.is_published,
        created_at: now,
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, author_id: i64, draft: &PostDraft) -> Result<Post> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(INSERT_POST)
                .bind(&draft.title)
                .bind(&draft.text)
                .bind(draft.pub_date)
                .bind(&draft.image)
                .bind(author_id)
                .bind(draft.category_id)
                .bind(draft.location_id)
                .bind(draft.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(p) => sqlx::query(INSERT_POST)
                .bind(&draft.title)
                .bind(&draft.text)
                .bind(draft.pub_date)
                .bind(&draft.image)
                .bind(author_id)
                .bind(draft.category_id)
                .bind(draft.location_id)
                .bind(draft.is_published)
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create post")?;

        Ok(new_post(id, author_id, draft, now))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PostWithMeta>> {
        let sql = format!("{} WHERE p.id = ?", SELECT_POST_WITH_META);
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_post_sqlite)),
            Backend::Mysql(p) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .map(|row| row.as_ref().map(row_to_post_mysql)),
        }
        .context("Failed to get post by ID")
    }

    async fn update(&self, id: i64, draft: &PostDraft) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(UPDATE_POST)
                .bind(&draft.title)
                .bind(&draft.text)
                .bind(draft.pub_date)
                .bind(&draft.image)
                .bind(draft.category_id)
                .bind(draft.location_id)
                .bind(draft.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
            Backend::Mysql(p) => sqlx::query(UPDATE_POST)
                .bind(&draft.title)
                .bind(&draft.text)
                .bind(draft.pub_date)
                .bind(&draft.image)
                .bind(draft.category_id)
                .bind(draft.location_id)
                .bind(draft.is_published)
                .bind(id)
                .execute(p)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to update post")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(p) => delete_post_sqlite(p, id).await,
            Backend::Mysql(p) => delete_post_mysql(p, id).await,
        }
        .context("Failed to delete post")
    }

    async fn find_visible(
        &self,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)> {
        self.find_visible_scoped(Scope::All, now, params).await
    }

    async fn find_visible_by_category(
        &self,
        category_id: i64,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)> {
        self.find_visible_scoped(Scope::Category(category_id), now, params)
            .await
    }

    async fn find_visible_by_author(
        &self,
        author_id: i64,
        now: DateTime<Utc>,
        params: &ListParams,
    ) -> Result<(Vec<PostWithMeta>, i64)> {
        self.find_visible_scoped(Scope::Author(author_id), now, params)
            .await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_visible_sqlite(
    pool: &SqlitePool,
    scope: Scope,
    now: DateTime<Utc>,
    params: &ListParams,
) -> Result<(Vec<PostWithMeta>, i64)> {
    let (select, count) = listing_sql(scope);

    let mut total = sqlx::query_scalar::<sqlx::Sqlite, i64>(&count).bind(now);
    let mut page = sqlx::query::<sqlx::Sqlite>(&select).bind(now);
    if let Some(id) = scope.id() {
        total = total.bind(id);
        page = page.bind(id);
    }

    let total = total.fetch_one(pool).await?;
    let rows = page
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok((rows.iter().map(row_to_post_sqlite).collect(), total))
}

async fn delete_post_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(DELETE_POST_COMMENTS)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query(DELETE_POST).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> PostWithMeta {
    let category_id: Option<i64> = row.get("category_id");
    let location_id: Option<i64> = row.get("location_id");
    let category_slug: Option<String> = row.get("category_slug");
    let location_name: Option<String> = row.get("location_name");

    PostWithMeta {
        post: Post {
            id: row.get("id"),
            title: row.get("title"),
            text: row.get("text"),
            pub_date: row.get("pub_date"),
            image: row.get("image"),
            author_id: row.get("author_id"),
            category_id,
            location_id,
            is_published: row.get("is_published"),
            created_at: row.get("created_at"),
        },
        author_username: row.get("author_username"),
        category: category_id.zip(category_slug).map(|(id, slug)| CategoryRef {
            id,
            slug,
            title: row.get::<Option<String>, _>("category_title").unwrap_or_default(),
            is_published: row
                .get::<Option<bool>, _>("category_is_published")
                .unwrap_or(false),
        }),
        location: location_id.zip(location_name).map(|(id, name)| LocationRef {
            id,
            name,
            is_published: row
                .get::<Option<bool>, _>("location_is_published")
                .unwrap_or(false),
        }),
        comment_count: row.get("comment_count"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn find_visible_mysql(
    pool: &MySqlPool,
    scope: Scope,
    now: DateTime<Utc>,
    params: &ListParams,
) -> Result<(Vec<PostWithMeta>, i64)> {
    let (select, count) = listing_sql(scope);

    let mut total = sqlx::query_scalar::<sqlx::MySql, i64>(&count).bind(now);
    let mut page = sqlx::query::<sqlx::MySql>(&select).bind(now);
    if let Some(id) = scope.id() {
        total = total.bind(id);
        page = page.bind(id);
    }

    let total = total.fetch_one(pool).await?;
    let rows = page
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok((rows.iter().map(row_to_post_mysql).collect(), total))
}

async fn delete_post_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query(DELETE_POST_COMMENTS)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query(DELETE_POST).bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> PostWithMeta {
    let category_id: Option<i64> = row.get("category_id");
    let location_id: Option<i64> = row.get("location_id");
    let category_slug: Option<String> = row.get("category_slug");
    let location_name: Option<String> = row.get("location_name");

    PostWithMeta {
        post: Post {
            id: row.get("id"),
            title: row.get("title"),
            text: row.get("text"),
            pub_date: row.get("pub_date"),
            image: row.get("image"),
            author_id: row.get("author_id"),
            category_id,
            location_id,
            is_published: row.get("is_published"),
            created_at: row.get("created_at"),
        },
        author_username: row.get("author_username"),
        category: category_id.zip(category_slug).map(|(id, slug)| CategoryRef {
            id,
            slug,
            title: row.get::<Option<String>, _>("category_title").unwrap_or_default(),
            is_published: row
                .get::<Option<bool>, _>("category_is_published")
                .unwrap_or(false),
        }),
        location: location_id.zip(location_name).map(|(id, name)| LocationRef {
            id,
            name,
            is_published: row
                .get::<Option<bool>, _>("location_is_published")
                .unwrap_or(false),
        }),
        comment_count: row.get("comment_count"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{
        insert_category, insert_comment, insert_user, migrated_pool,
    };
    use chrono::Duration;

    fn draft(title: &str, pub_date: DateTime<Utc>, category_id: Option<i64>) -> PostDraft {
        PostDraft {
            title: title.to_string(),
            text: format!("{} body", title),
            pub_date,
            category_id,
            location_id: None,
            is_published: true,
            image: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_with_meta() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let category = insert_category(&pool, "travel", true).await;
        let repo = SqlxPostRepository::new(pool.clone());

        let post = repo
            .create(author.id, &draft("Trip", Utc::now(), Some(category)))
            .await
            .unwrap();
        insert_comment(&pool, post.id, author.id, true).await;
        insert_comment(&pool, post.id, author.id, false).await;

        let found = repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(found.post.title, "Trip");
        assert_eq!(found.author_username, "author");
        assert_eq!(found.category.as_ref().map(|c| c.slug.as_str()), Some("travel"));
        assert!(found.location.is_none());
        assert_eq!(found.comment_count, 1);
    }

    #[tokio::test]
    async fn test_find_visible_applies_public_rule() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let open = insert_category(&pool, "open", true).await;
        let hidden = insert_category(&pool, "hidden", false).await;
        let repo = SqlxPostRepository::new(pool);
        let now = Utc::now();

        repo.create(author.id, &draft("visible", now - Duration::hours(1), Some(open)))
            .await
            .unwrap();
        repo.create(author.id, &draft("uncategorized", now - Duration::hours(2), None))
            .await
            .unwrap();
        repo.create(author.id, &draft("future", now + Duration::hours(1), Some(open)))
            .await
            .unwrap();
        repo.create(author.id, &draft("hidden category", now - Duration::hours(1), Some(hidden)))
            .await
            .unwrap();
        let mut unpublished = draft("unpublished", now - Duration::hours(1), Some(open));
        unpublished.is_published = false;
        repo.create(author.id, &unpublished).await.unwrap();

        let (posts, total) = repo.find_visible(now, &ListParams::page(1)).await.unwrap();
        let titles: Vec<&str> = posts.iter().map(|p| p.post.title.as_str()).collect();

        assert_eq!(total, 2);
        assert_eq!(titles, vec!["visible", "uncategorized"]);
    }

    #[tokio::test]
    async fn test_find_visible_pages_newest_first() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let repo = SqlxPostRepository::new(pool);
        let now = Utc::now();

        for i in 0..13 {
            repo.create(author.id, &draft(&format!("post {}", i), now - Duration::minutes(i), None))
                .await
                .unwrap();
        }

        let (first, total) = repo.find_visible(now, &ListParams::page(1)).await.unwrap();
        let (second, _) = repo.find_visible(now, &ListParams::page(2)).await.unwrap();

        assert_eq!(total, 13);
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 3);
        assert_eq!(first[0].post.title, "post 0");
        assert_eq!(second[2].post.title, "post 12");
        let dates: Vec<_> = first.iter().chain(second.iter()).map(|p| p.post.pub_date).collect();
        assert!(dates.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_scoped_listings() {
        let pool = migrated_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let travel = insert_category(&pool, "travel", true).await;
        let food = insert_category(&pool, "food", true).await;
        let repo = SqlxPostRepository::new(pool);
        let past = Utc::now() - Duration::hours(1);

        repo.create(alice.id, &draft("a-travel", past, Some(travel))).await.unwrap();
        repo.create(alice.id, &draft("a-food", past, Some(food))).await.unwrap();
        repo.create(bob.id, &draft("b-travel", past, Some(travel))).await.unwrap();

        let now = Utc::now();
        let (by_travel, travel_total) = repo
            .find_visible_by_category(travel, now, &ListParams::page(1))
            .await
            .unwrap();
        let (by_alice, alice_total) = repo
            .find_visible_by_author(alice.id, now, &ListParams::page(1))
            .await
            .unwrap();

        assert_eq!(travel_total, 2);
        assert!(by_travel.iter().all(|p| p.post.category_id == Some(travel)));
        assert_eq!(alice_total, 2);
        assert!(by_alice.iter().all(|p| p.post.author_id == alice.id));
    }

    #[tokio::test]
    async fn test_update_and_delete_cascades_comments() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "author").await;
        let repo = SqlxPostRepository::new(pool.clone());

        let post = repo.create(author.id, &draft("Draft", Utc::now(), None)).await.unwrap();
        let mut changed = draft("Final", Utc::now(), None);
        changed.image = Some("posts/final.png".to_string());
        assert!(repo.update(post.id, &changed).await.unwrap());

        let stored = repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(stored.post.title, "Final");
        assert_eq!(stored.post.image.as_deref(), Some("posts/final.png"));

        insert_comment(&pool, post.id, author.id, true).await;
        assert!(repo.delete(post.id).await.unwrap());
        assert!(repo.get_by_id(post.id).await.unwrap().is_none());

        let Backend::Sqlite(sqlite) = pool.backend() else {
            panic!("expected sqlite");
        };
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
