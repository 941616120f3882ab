//! Admin pages: categories, locations and comment moderation
//!
//! Every handler here requires an admin; other signed-in users are sent to
//! the front page and anonymous users to the login page.

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::common::PageQuery;
use crate::api::middleware::{AppState, PageError, PathParams, RequestContext};
use crate::models::{CreateCategoryInput, CreateLocationInput};
use crate::services::{CategoryServiceError, LocationServiceError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/manage/categories/", get(categories).post(create_category))
        .route("/manage/categories/{id}/toggle/", post(toggle_category))
        .route("/manage/categories/{id}/delete/", post(delete_category))
        .route("/manage/locations/", get(locations).post(create_location))
        .route("/manage/locations/{id}/toggle/", post(toggle_location))
        .route("/manage/locations/{id}/delete/", post(delete_location))
        .route("/manage/comments/", get(comments))
        .route("/manage/comments/{id}/toggle/", post(toggle_comment))
}

const CATEGORIES_URL: &str = "/manage/categories/";
const LOCATIONS_URL: &str = "/manage/locations/";

/// Category form; an unchecked box is simply absent
#[derive(Debug, Default, Deserialize)]
struct CategoryForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    slug: String,
    is_published: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LocationForm {
    #[serde(default)]
    name: String,
    is_published: Option<String>,
}

async fn render_categories(
    state: &AppState,
    ctx: &RequestContext,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("categories", &state.category_service.list().await?);
    context.insert("errors", errors);
    state.render(ctx, "manage/categories.html", &context)
}

/// GET /manage/categories/
async fn categories(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    ctx.admin()?;
    render_categories(&state, &ctx, &[]).await
}

/// POST /manage/categories/
async fn create_category(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<CategoryForm>,
) -> Result<Response, PageError> {
    ctx.admin()?;
    let input = CreateCategoryInput {
        title: form.title,
        description: form.description,
        slug: form.slug,
        is_published: form.is_published.is_some(),
    };
    match state.category_service.create(input).await {
        Ok(_) => Ok(Redirect::to(CATEGORIES_URL).into_response()),
        Err(e @ CategoryServiceError::DuplicateSlug(_))
        | Err(e @ CategoryServiceError::ValidationError(_)) => {
            let page = render_categories(&state, &ctx, &[e.to_string()]).await?;
            Ok(page.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn toggle_category(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(id): PathParams<i64>,
) -> Result<Redirect, PageError> {
    let admin = ctx.admin()?;
    let category = state.category_service.toggle_published(id).await?;
    tracing::info!(
        "{} set category {} published={}",
        admin.username,
        category.slug,
        category.is_published
    );
    Ok(Redirect::to(CATEGORIES_URL))
}

async fn delete_category(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(id): PathParams<i64>,
) -> Result<Redirect, PageError> {
    let admin = ctx.admin()?;
    state.category_service.delete(id).await?;
    tracing::info!("{} deleted category {}", admin.username, id);
    Ok(Redirect::to(CATEGORIES_URL))
}

async fn render_locations(
    state: &AppState,
    ctx: &RequestContext,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("locations", &state.location_service.list().await?);
    context.insert("errors", errors);
    state.render(ctx, "manage/locations.html", &context)
}

/// GET /manage/locations/
async fn locations(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    ctx.admin()?;
    render_locations(&state, &ctx, &[]).await
}

/// POST /manage/locations/
async fn create_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<LocationForm>,
) -> Result<Response, PageError> {
    ctx.admin()?;
    let input = CreateLocationInput {
        name: form.name,
        is_published: form.is_published.is_some(),
    };
    match state.location_service.create(input).await {
        Ok(_) => Ok(Redirect::to(LOCATIONS_URL).into_response()),
        Err(LocationServiceError::ValidationError(msg)) => {
            let page = render_locations(&state, &ctx, &[msg]).await?;
            Ok(page.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn toggle_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(id): PathParams<i64>,
) -> Result<Redirect, PageError> {
    ctx.admin()?;
    state.location_service.toggle_published(id).await?;
    Ok(Redirect::to(LOCATIONS_URL))
}

async fn delete_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(id): PathParams<i64>,
) -> Result<Redirect, PageError> {
    let admin = ctx.admin()?;
    state.location_service.delete(id).await?;
    tracing::info!("{} deleted location {}", admin.username, id);
    Ok(Redirect::to(LOCATIONS_URL))
}

/// GET /manage/comments/?page=N - every comment, newest first
async fn comments(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    ctx.admin()?;
    let page = state.comment_service.list_recent(query.number()?).await?;

    let mut context = TeraContext::new();
    context.insert("comments", &page.items);
    context.insert("page_obj", &page.pagination());
    state.render(&ctx, "manage/comments.html", &context)
}

/// POST /manage/comments/{id}/toggle/ - hide or restore a comment
async fn toggle_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(id): PathParams<i64>,
) -> Result<Redirect, PageError> {
    let admin = ctx.admin()?;
    let comment = state.comment_service.toggle_published(id).await?;
    tracing::info!(
        "{} set comment {} published={}",
        admin.username,
        comment.id,
        comment.is_published
    );
    Ok(Redirect::to("/manage/comments/"))
}
