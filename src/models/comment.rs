//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub post_id: i64,
    pub author_id: i64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Comment with author details for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentWithMeta {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_username: String,
    pub avatar_url: String,
}

impl CommentWithMeta {
    pub fn new(comment: Comment, author_username: String, author_email: &str) -> Self {
        Self {
            comment,
            author_username,
            avatar_url: Self::gravatar_url(author_email),
        }
    }

    /// Gravatar URL for an email address
    pub fn gravatar_url(email: &str) -> String {
        let email = email.trim();
        if email.is_empty() {
            return "https://www.gravatar.com/avatar/?d=mp&s=48".to_string();
        }
        let hash = format!("{:x}", md5::compute(email.to_lowercase()));
        format!("https://www.gravatar.com/avatar/{}?d=mp&s=48", hash)
    }
}

/// Comment form payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentInput {
    #[serde(default)]
    pub text: String,
}
