//! Post service
//!
//! Listings only ever contain publicly visible posts. A single post is also
//! visible to its author. Only the author may edit or delete it.

use crate::db::repositories::{CategoryRepository, LocationRepository, PostRepository};
use crate::models::{
    ListParams, PagedResult, Post, PostDraft, PostWithMeta, User, MAX_TITLE_LEN, POSTS_PER_PAGE,
};
use crate::services::policy::{can_mutate, is_visible};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Missing, invisible to the requester, or a page past the end
    #[error("Post not found")]
    NotFound,

    /// The requester is not the author
    #[error("Only the author may change this post")]
    NotOwner,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    location_repo: Arc<dyn LocationRepository>,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        location_repo: Arc<dyn LocationRepository>,
    ) -> Self {
        Self {
            repo,
            category_repo,
            location_repo,
        }
    }

    /// One page of the public feed
    pub async fn list_index(
        &self,
        page: u32,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let params = ListParams::new(page, POSTS_PER_PAGE);
        let (items, total) = self
            .repo
            .find_visible(Utc::now(), &params)
            .await
            .context("Failed to list posts")?;
        paged(items, total, &params)
    }

    /// One page of a category feed. The caller has already checked that the
    /// category is published.
    pub async fn list_category(
        &self,
        category_id: i64,
        page: u32,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let params = ListParams::new(page, POSTS_PER_PAGE);
        let (items, total) = self
            .repo
            .find_visible_by_category(category_id, Utc::now(), &params)
            .await
            .context("Failed to list category posts")?;
        paged(items, total, &params)
    }

    /// One page of an author's public posts
    pub async fn list_profile(
        &self,
        author_id: i64,
        page: u32,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let params = ListParams::new(page, POSTS_PER_PAGE);
        let (items, total) = self
            .repo
            .find_visible_by_author(author_id, Utc::now(), &params)
            .await
            .context("Failed to list profile posts")?;
        paged(items, total, &params)
    }

    /// Fetch a post for display to `viewer`
    pub async fn get_visible(
        &self,
        id: i64,
        viewer: Option<&User>,
    ) -> Result<PostWithMeta, PostServiceError> {
        let post = self.fetch(id).await?;
        if !is_visible(&post, viewer, Utc::now()) {
            return Err(PostServiceError::NotFound);
        }
        Ok(post)
    }

    /// Fetch a post `user` is about to edit or delete
    pub async fn get_for_mutation(
        &self,
        id: i64,
        user: &User,
    ) -> Result<PostWithMeta, PostServiceError> {
        let post = self.fetch(id).await?;
        if !can_mutate(&post, user) {
            return Err(PostServiceError::NotOwner);
        }
        Ok(post)
    }

    pub async fn create(&self, author: &User, draft: PostDraft) -> Result<Post, PostServiceError> {
        let draft = self.validate_draft(draft).await?;
        let post = self
            .repo
            .create(author.id, &draft)
            .await
            .context("Failed to create post")?;

        tracing::info!("User {} created post {}", author.username, post.id);
        Ok(post)
    }

    /// Replace the fields of post `id`, returning the post as it was before
    pub async fn update(
        &self,
        id: i64,
        user: &User,
        draft: PostDraft,
    ) -> Result<PostWithMeta, PostServiceError> {
        let previous = self.get_for_mutation(id, user).await?;
        let draft = self.validate_draft(draft).await?;

        if !self
            .repo
            .update(id, &draft)
            .await
            .context("Failed to update post")?
        {
            return Err(PostServiceError::NotFound);
        }
        Ok(previous)
    }

    /// Delete post `id` and its comments, returning the deleted post
    pub async fn delete(&self, id: i64, user: &User) -> Result<PostWithMeta, PostServiceError> {
        let post = self.get_for_mutation(id, user).await?;
        if !self.repo.delete(id).await.context("Failed to delete post")? {
            return Err(PostServiceError::NotFound);
        }

        tracing::info!("User {} deleted post {}", user.username, id);
        Ok(post)
    }

    async fn fetch(&self, id: i64) -> Result<PostWithMeta, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound)
    }

    /// Trim and check a draft; category is required, location optional
    async fn validate_draft(&self, draft: PostDraft) -> Result<PostDraft, PostServiceError> {
        let draft = PostDraft {
            title: draft.title.trim().to_string(),
            text: draft.text.trim().to_string(),
            ..draft
        };

        if draft.title.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }
        if draft.title.chars().count() > MAX_TITLE_LEN {
            return Err(PostServiceError::ValidationError(format!(
                "Title is limited to {} characters",
                MAX_TITLE_LEN
            )));
        }
        if draft.text.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Text cannot be empty".to_string(),
            ));
        }

        let category_id = draft.category_id.ok_or_else(|| {
            PostServiceError::ValidationError("Choose a category".to_string())
        })?;
        if self
            .category_repo
            .get_by_id(category_id)
            .await
            .context("Failed to check category")?
            .is_none()
        {
            return Err(PostServiceError::ValidationError(
                "Selected category does not exist".to_string(),
            ));
        }

        if let Some(location_id) = draft.location_id {
            if self
                .location_repo
                .get_by_id(location_id)
                .await
                .context("Failed to check location")?
                .is_none()
            {
                return Err(PostServiceError::ValidationError(
                    "Selected location does not exist".to_string(),
                ));
            }
        }

        Ok(draft)
    }
}

fn paged(
    items: Vec<PostWithMeta>,
    total: i64,
    params: &ListParams,
) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
    let result = PagedResult::new(items, total, params);
    if result.is_out_of_range() {
        return Err(PostServiceError::NotFound);
    }
    Ok(result)
}
