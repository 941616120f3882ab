//! Visibility and ownership rules
//!
//! A post is publicly visible when it is published, its publication date has
//! passed and it has no category or a published one. Its author can always
//! see it. Only the author of a post or comment may change or delete it.
//!
//! Listing queries express the public rule in SQL (see
//! `db::repositories::post`); these functions are the single-entity form.

use chrono::{DateTime, Utc};

use crate::models::{Comment, CommentWithMeta, Post, PostWithMeta, User};

/// Entities owned by a single author
pub trait Authored {
    fn author_id(&self) -> i64;
}

impl Authored for Post {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

impl Authored for PostWithMeta {
    fn author_id(&self) -> i64 {
        self.post.author_id
    }
}

impl Authored for Comment {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

impl Authored for CommentWithMeta {
    fn author_id(&self) -> i64 {
        self.comment.author_id
    }
}

/// Visibility for anyone, author or not
pub fn is_publicly_visible(post: &PostWithMeta, now: DateTime<Utc>) -> bool {
    let category_open = post.category.as_ref().map_or(true, |c| c.is_published);
    post.post.is_published && category_open && post.post.pub_date <= now
}

/// Visibility for a particular viewer; authors see their own posts always
pub fn is_visible(post: &PostWithMeta, viewer: Option<&User>, now: DateTime<Utc>) -> bool {
    viewer.map_or(false, |user| can_mutate(post, user)) || is_publicly_visible(post, now)
}

/// Whether `user` may edit or delete `entity`
pub fn can_mutate<E: Authored + ?Sized>(entity: &E, user: &User) -> bool {
    entity.author_id() == user.id
}
