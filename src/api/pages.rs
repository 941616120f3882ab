//! Static pages

use axum::{extract::State, response::Html, routing::get, Router};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, PageError, RequestContext};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pages/about/", get(about))
        .route("/pages/rules/", get(rules))
}

async fn about(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    state.render(&ctx, "pages/about.html", &TeraContext::new())
}

async fn rules(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    state.render(&ctx, "pages/rules.html", &TeraContext::new())
}
