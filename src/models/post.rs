//! Post model and pagination types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Posts shown per listing page
pub const POSTS_PER_PAGE: u32 = 10;

/// A blog post as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    /// When the post becomes publicly visible; may be in the future
    pub pub_date: DateTime<Utc>,
    /// Path of the uploaded image relative to the media directory
    pub image: Option<String>,
    pub author_id: i64,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// The parts of a category a post listing needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRef {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub is_published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRef {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
}

/// A post joined with its author, category, location and the number of
/// published comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: String,
    pub category: Option<CategoryRef>,
    pub location: Option<LocationRef>,
    pub comment_count: i64,
}

/// Field values for creating or fully replacing a post
#[derive(Debug, Clone, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub is_published: bool,
    pub image: Option<String>,
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: POSTS_PER_PAGE,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Listing page `page` at the standard post page size
    pub fn page(page: u32) -> Self {
        Self::new(page, POSTS_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// One page of results plus the total across all pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64).div_ceil(self.per_page as u64)) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// A page past the end of a non-empty listing.
    pub fn is_out_of_range(&self) -> bool {
        self.page > self.total_pages().max(1)
    }

    /// Navigation summary for templates
    pub fn pagination(&self) -> Pagination {
        Pagination {
            number: self.page,
            num_pages: self.total_pages().max(1),
            total: self.total,
            has_next: self.has_next(),
            has_previous: self.has_prev(),
            next_page_number: self.page + 1,
            previous_page_number: self.page.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub number: u32,
    pub num_pages: u32,
    pub total: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: u32,
    pub previous_page_number: u32,
}
