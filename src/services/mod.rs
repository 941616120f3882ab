//! Services layer
//!
//! Business rules on top of the repositories: validation, visibility and
//! ownership checks, caching.

pub mod category;
pub mod comment;
pub mod location;
pub mod password;
pub mod policy;
pub mod post;
pub mod user;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use location::{LocationService, LocationServiceError};
pub use password::{hash_password, verify_password};
pub use policy::{can_mutate, is_publicly_visible, is_visible, Authored};
pub use post::{PostService, PostServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
