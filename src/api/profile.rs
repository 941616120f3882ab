//! Profile pages

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use tera::Context as TeraContext;

use crate::api::common::PageQuery;
use crate::api::middleware::{AppState, PageError, PathParams, RequestContext};
use crate::api::posts::profile_url;
use crate::models::ProfileInput;
use crate::services::UserServiceError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile/edit/", get(edit_form).post(update_profile))
        .route("/profile/{username}/", get(profile))
}

/// GET /profile/{username}/ - a user's public posts
async fn profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(username): PathParams<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let user = state
        .user_service
        .get_by_username(&username)
        .await?
        .ok_or(PageError::NotFound)?;
    let page = state
        .post_service
        .list_profile(user.id, query.number()?)
        .await?;

    let mut context = TeraContext::new();
    context.insert("display_name", &user.display_name());
    context.insert("profile", &user);
    context.insert("posts", &page.items);
    context.insert("page_obj", &page.pagination());
    state.render(&ctx, "blog/profile.html", &context)
}

fn render_profile_form(
    state: &AppState,
    ctx: &RequestContext,
    form: &ProfileInput,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("first_name", &form.first_name);
    context.insert("last_name", &form.last_name);
    context.insert("username", &form.username);
    context.insert("email", &form.email);
    context.insert("errors", errors);
    state.render(ctx, "blog/user.html", &context)
}

/// GET /profile/edit/
async fn edit_form(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    let user = ctx.user()?;
    let form = ProfileInput {
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
    };
    render_profile_form(&state, &ctx, &form, &[])
}

/// POST /profile/edit/
async fn update_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<ProfileInput>,
) -> Result<Response, PageError> {
    let user = ctx.user()?;
    match state.user_service.update_profile(user, form.clone()).await {
        Ok(updated) => {
            tracing::info!("User {} updated their profile", updated.id);
            Ok(Redirect::to(&profile_url(&updated.username)).into_response())
        }
        Err(UserServiceError::ValidationError(msg)) | Err(UserServiceError::UserExists(msg)) => {
            Ok(render_profile_form(&state, &ctx, &form, &[msg])?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}
