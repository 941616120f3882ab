//! Comment service
//!
//! Comments can only be added to publicly visible posts; unlike the detail
//! page, the post's author gets no exception here. Edits and deletes are
//! limited to the comment's author and must name the comment's own post.

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CommentInput, CommentWithMeta, ListParams, PagedResult, User};
use crate::services::policy::{can_mutate, is_publicly_visible};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Comments per moderation page
const MODERATION_PAGE_SIZE: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    /// Comment or post missing, or the post does not accept comments
    #[error("Comment not found")]
    NotFound,

    #[error("Only the author may change this comment")]
    NotOwner,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    /// Add a comment by `author` to post `post_id`
    pub async fn create(
        &self,
        post_id: i64,
        author: &User,
        input: CommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let post = self
            .post_repo
            .get_by_id(post_id)
            .await
            .context("Failed to get post")?
            .ok_or(CommentServiceError::NotFound)?;
        if !is_publicly_visible(&post, Utc::now()) {
            return Err(CommentServiceError::NotFound);
        }

        let text = validate_text(&input.text)?;
        let comment = self
            .repo
            .create(post_id, author.id, &text)
            .await
            .context("Failed to create comment")?;

        tracing::debug!("User {} commented on post {}", author.username, post_id);
        Ok(comment)
    }

    /// Comments shown under a post, oldest first
    pub async fn list_for_post(
        &self,
        post_id: i64,
        viewer: Option<&User>,
    ) -> Result<Vec<CommentWithMeta>, CommentServiceError> {
        let comments = self
            .repo
            .list_for_post(post_id, viewer.map(|u| u.id))
            .await
            .context("Failed to list comments")?;
        Ok(comments)
    }

    /// Fetch a comment `user` is about to edit or delete
    pub async fn get_for_mutation(
        &self,
        post_id: i64,
        comment_id: i64,
        user: &User,
    ) -> Result<Comment, CommentServiceError> {
        let comment = self
            .repo
            .get_by_id(comment_id)
            .await
            .context("Failed to get comment")?
            .filter(|c| c.post_id == post_id)
            .ok_or(CommentServiceError::NotFound)?;
        if !can_mutate(&comment, user) {
            return Err(CommentServiceError::NotOwner);
        }
        Ok(comment)
    }

    pub async fn update(
        &self,
        post_id: i64,
        comment_id: i64,
        user: &User,
        input: CommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let comment = self.get_for_mutation(post_id, comment_id, user).await?;
        let text = validate_text(&input.text)?;

        if !self
            .repo
            .update_text(comment_id, &text)
            .await
            .context("Failed to update comment")?
        {
            return Err(CommentServiceError::NotFound);
        }
        Ok(Comment { text, ..comment })
    }

    pub async fn delete(
        &self,
        post_id: i64,
        comment_id: i64,
        user: &User,
    ) -> Result<(), CommentServiceError> {
        self.get_for_mutation(post_id, comment_id, user).await?;
        if !self
            .repo
            .delete(comment_id)
            .await
            .context("Failed to delete comment")?
        {
            return Err(CommentServiceError::NotFound);
        }
        Ok(())
    }

    /// Every comment, newest first, for moderation
    pub async fn list_recent(
        &self,
        page: u32,
    ) -> Result<PagedResult<CommentWithMeta>, CommentServiceError> {
        let params = ListParams::new(page, MODERATION_PAGE_SIZE);
        let (items, total) = self
            .repo
            .list_recent(&params)
            .await
            .context("Failed to list comments")?;

        let result = PagedResult::new(items, total, &params);
        if result.is_out_of_range() {
            return Err(CommentServiceError::NotFound);
        }
        Ok(result)
    }

    /// Flip a comment's published flag, returning the updated comment
    pub async fn toggle_published(&self, id: i64) -> Result<Comment, CommentServiceError> {
        let comment = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound)?;
        self.repo
            .set_published(id, !comment.is_published)
            .await
            .context("Failed to update comment")?;
        Ok(Comment {
            is_published: !comment.is_published,
            ..comment
        })
    }
}

fn validate_text(text: &str) -> Result<String, CommentServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommentServiceError::ValidationError(
            "Comment cannot be empty".to_string(),
        ));
    }
    Ok(text.to_string())
}
