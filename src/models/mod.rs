//! Data models
//!
//! Database entities (User, Session, Category, Location, Post, Comment),
//! their joined display forms, form inputs and pagination types.

mod category;
mod comment;
mod location;
mod post;
mod session;
mod user;

pub use category::{is_valid_slug, Category, CreateCategoryInput, MAX_SLUG_LEN, MAX_TITLE_LEN};
pub use comment::{Comment, CommentInput, CommentWithMeta};
pub use location::{CreateLocationInput, Location};
pub use post::{
    CategoryRef, ListParams, LocationRef, PagedResult, Pagination, Post, PostDraft, PostWithMeta,
    POSTS_PER_PAGE,
};
pub use session::{Session, SESSION_LIFETIME_DAYS};
pub use user::{NewUser, ProfileInput, User, UserRole};
