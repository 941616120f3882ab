//! Login, registration and logout pages
//!
//! - GET/POST /auth/login/
//! - GET/POST /auth/registration/
//! - POST /auth/logout/

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::common::safe_next;
use crate::api::middleware::{
    clear_session_cookie, session_cookie, session_token, AppState, PageError, RequestContext,
};
use crate::models::SESSION_LIFETIME_DAYS;
use crate::services::{LoginInput, RegisterInput, UserServiceError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login/", get(login_form).post(login))
        .route("/auth/registration/", get(registration_form).post(register))
        .route("/auth/logout/", post(logout))
}

#[derive(Debug, Default, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistrationForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password1: String,
    #[serde(default)]
    password2: String,
}

fn render_login(
    state: &AppState,
    ctx: &RequestContext,
    username: &str,
    next: Option<&str>,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("next", &next.unwrap_or(""));
    context.insert("errors", errors);
    state.render(ctx, "registration/login.html", &context)
}

/// GET /auth/login/
async fn login_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<NextQuery>,
) -> Result<Html<String>, PageError> {
    let next = safe_next(query.next.as_deref());
    render_login(&state, &ctx, "", next.as_deref(), &[])
}

/// POST /auth/login/ - open a session and set its cookie
async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let next = safe_next(form.next.as_deref());
    let input = LoginInput::new(form.username.clone(), form.password);

    match state.user_service.login(input).await {
        Ok(session) => {
            tracing::info!("User {} logged in", session.user_id);
            let cookie = session_cookie(&session.id, SESSION_LIFETIME_DAYS * 24 * 60 * 60);
            let target = next.unwrap_or_else(|| "/".to_string());
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&target)).into_response())
        }
        Err(UserServiceError::AuthenticationError(msg)) => {
            let page = render_login(&state, &ctx, &form.username, next.as_deref(), &[msg])?;
            Ok(page.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_registration(
    state: &AppState,
    ctx: &RequestContext,
    username: &str,
    email: &str,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("email", email);
    context.insert("errors", errors);
    state.render(ctx, "registration/registration_form.html", &context)
}

/// GET /auth/registration/
async fn registration_form(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    render_registration(&state, &ctx, "", "", &[])
}

/// POST /auth/registration/ - create the account, then ask for a login
async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<RegistrationForm>,
) -> Result<Response, PageError> {
    if form.password1 != form.password2 {
        let errors = ["The two password fields didn't match".to_string()];
        let page = render_registration(&state, &ctx, &form.username, &form.email, &errors)?;
        return Ok(page.into_response());
    }

    let input = RegisterInput::new(form.username.clone(), form.email.clone(), form.password1);
    match state.user_service.register(input).await {
        Ok(user) => {
            tracing::info!("Registered user {} ({})", user.username, user.id);
            Ok(Redirect::to("/auth/login/").into_response())
        }
        Err(UserServiceError::ValidationError(msg)) | Err(UserServiceError::UserExists(msg)) => {
            let page = render_registration(&state, &ctx, &form.username, &form.email, &[msg])?;
            Ok(page.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /auth/logout/ - drop the session and clear the cookie
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, PageError> {
    if let Some(token) = session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok(([(header::SET_COOKIE, clear_session_cookie())], Redirect::to("/")).into_response())
}
