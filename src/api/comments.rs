//! Comment add/edit/delete pages

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, PageError, PathParams, RequestContext};
use crate::api::posts::detail_url;
use crate::models::{Comment, CommentInput};
use crate::services::CommentServiceError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{post_id}/comment/", post(add_comment))
        .route(
            "/posts/{post_id}/comment/{comment_id}/edit/",
            get(edit_form).post(update_comment),
        )
        .route(
            "/posts/{post_id}/comment/{comment_id}/delete/",
            get(delete_confirm).post(delete_comment),
        )
}

/// Non-owners go back to the post
fn refused(e: CommentServiceError, post_id: i64) -> PageError {
    match e {
        CommentServiceError::NotOwner => PageError::Redirect(detail_url(post_id)),
        other => other.into(),
    }
}

fn owned<T>(result: Result<T, CommentServiceError>, post_id: i64) -> Result<T, PageError> {
    result.map_err(|e| refused(e, post_id))
}

fn render_comment_form(
    state: &AppState,
    ctx: &RequestContext,
    post_id: i64,
    comment: Option<&Comment>,
    text: &str,
    deleting: bool,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("post_id", &post_id);
    context.insert("comment", &comment);
    context.insert("text", text);
    context.insert("deleting", &deleting);
    context.insert("errors", errors);
    state.render(ctx, "blog/comment.html", &context)
}

/// POST /posts/{id}/comment/
async fn add_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(post_id): PathParams<i64>,
    Form(input): Form<CommentInput>,
) -> Result<Response, PageError> {
    let user = ctx.user()?;
    let text = input.text.clone();
    match state.comment_service.create(post_id, user, input).await {
        Ok(_) => Ok(Redirect::to(&detail_url(post_id)).into_response()),
        Err(CommentServiceError::ValidationError(msg)) => {
            let page = render_comment_form(&state, &ctx, post_id, None, &text, false, &[msg])?;
            Ok(page.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /posts/{id}/comment/{comment_id}/edit/
async fn edit_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams((post_id, comment_id)): PathParams<(i64, i64)>,
) -> Result<Html<String>, PageError> {
    let user = ctx.user()?;
    let comment = owned(
        state
            .comment_service
            .get_for_mutation(post_id, comment_id, user)
            .await,
        post_id,
    )?;
    render_comment_form(&state, &ctx, post_id, Some(&comment), &comment.text, false, &[])
}

/// POST /posts/{id}/comment/{comment_id}/edit/
async fn update_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams((post_id, comment_id)): PathParams<(i64, i64)>,
    Form(input): Form<CommentInput>,
) -> Result<Response, PageError> {
    let user = ctx.user()?;
    let text = input.text.clone();
    match state
        .comment_service
        .update(post_id, comment_id, user, input)
        .await
    {
        Ok(_) => Ok(Redirect::to(&detail_url(post_id)).into_response()),
        Err(CommentServiceError::ValidationError(msg)) => {
            let comment = state
                .comment_service
                .get_for_mutation(post_id, comment_id, user)
                .await?;
            let page =
                render_comment_form(&state, &ctx, post_id, Some(&comment), &text, false, &[msg])?;
            Ok(page.into_response())
        }
        Err(e) => Err(refused(e, post_id)),
    }
}

/// GET /posts/{id}/comment/{comment_id}/delete/
async fn delete_confirm(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams((post_id, comment_id)): PathParams<(i64, i64)>,
) -> Result<Html<String>, PageError> {
    let user = ctx.user()?;
    let comment = owned(
        state
            .comment_service
            .get_for_mutation(post_id, comment_id, user)
            .await,
        post_id,
    )?;
    render_comment_form(&state, &ctx, post_id, Some(&comment), &comment.text, true, &[])
}

/// POST /posts/{id}/comment/{comment_id}/delete/
async fn delete_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams((post_id, comment_id)): PathParams<(i64, i64)>,
) -> Result<Redirect, PageError> {
    let user = ctx.user()?;
    owned(
        state.comment_service.delete(post_id, comment_id, user).await,
        post_id,
    )?;
    Ok(Redirect::to(&detail_url(post_id)))
}
