//! HTTP layer - page handlers and routing
//!
//! Server-rendered pages for:
//! - Post feeds, detail and the post forms
//! - Comments
//! - Profiles
//! - Login, registration and logout
//! - Static pages
//! - Admin management of categories, locations and comments

pub mod auth;
pub mod comments;
pub mod common;
pub mod manage;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod profile;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};

pub use middleware::{AppState, PageError, RequestContext};

/// Slack on top of the image size limit for the other form fields
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.config.upload.path);
    let body_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .merge(posts::router())
        .merge(comments::router())
        .merge(profile::router())
        .merge(auth::router())
        .merge(pages::router())
        .merge(manage::router())
        .nest_service("/media", media)
        .fallback(middleware::not_found)
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_guard,
        ))
        // Error pages see the viewer resolved below
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::render_error_pages,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
