//! Request plumbing shared by every page
//!
//! - Session cookie authentication
//! - Cross-site request rejection for unsafe methods
//! - `PageError` and the middleware that renders the error pages

use axum::{
    extract::{rejection::PathRejection, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::any::Any;
use std::convert::Infallible;
use std::sync::Arc;
use tera::Context as TeraContext;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxLocationRepository, SqlxPostRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    CategoryService, CommentService, LocationService, PostService, UserService,
};
use crate::theme::{CurrentUser, StandardTemplateVars, ThemeEngine};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub location_service: Arc<LocationService>,
    pub comment_service: Arc<CommentService>,
    pub theme_engine: Arc<ThemeEngine>,
}

impl AppState {
    /// Wire repositories, services, cache and templates over `pool`
    pub fn new(pool: DynDatabasePool, config: Config) -> anyhow::Result<Self> {
        let cache = create_cache(&config.cache);
        let theme_engine = ThemeEngine::new(config.theme.override_dir.as_deref())?;

        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let location_repo = SqlxLocationRepository::boxed(pool.clone());

        Ok(Self {
            user_service: Arc::new(UserService::new(
                SqlxUserRepository::boxed(pool.clone()),
                SqlxSessionRepository::boxed(pool.clone()),
            )),
            post_service: Arc::new(PostService::new(
                post_repo.clone(),
                category_repo.clone(),
                location_repo.clone(),
            )),
            category_service: Arc::new(CategoryService::new(category_repo, cache)),
            location_service: Arc::new(LocationService::new(location_repo)),
            comment_service: Arc::new(CommentService::new(
                SqlxCommentRepository::boxed(pool.clone()),
                post_repo,
            )),
            theme_engine: Arc::new(theme_engine),
            config: Arc::new(config),
            pool,
        })
    }

    /// Render `template` with the standard variables for `ctx`
    pub fn render(
        &self,
        ctx: &RequestContext,
        template: &str,
        context: &TeraContext,
    ) -> Result<Html<String>, PageError> {
        let html = self.theme_engine.render_with_standard_vars(
            template,
            context,
            &self.standard_vars(ctx.viewer.as_ref(), &ctx.path),
        )?;
        Ok(Html(html))
    }

    fn standard_vars(&self, viewer: Option<&User>, path: &str) -> StandardTemplateVars {
        let vars = StandardTemplateVars::new(
            self.config.site.name.clone(),
            self.config.site.description.clone(),
            path,
        );
        match viewer {
            Some(user) => vars.with_user(CurrentUser {
                id: user.id,
                username: user.username.clone(),
                is_admin: user.is_admin(),
            }),
            None => vars,
        }
    }
}

/// The signed-in user, placed in request extensions by [`optional_auth`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Who is asking, and for which path (with query)
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub viewer: Option<User>,
    pub path: String,
}

impl RequestContext {
    /// The signed-in user, or a redirect to the login page
    pub fn user(&self) -> Result<&User, PageError> {
        self.viewer.as_ref().ok_or_else(|| PageError::LoginRequired {
            next: self.path.clone(),
        })
    }

    /// The signed-in admin; other users are sent to the front page
    pub fn admin(&self) -> Result<&User, PageError> {
        let user = self.user()?;
        if !user.is_admin() {
            return Err(PageError::Redirect("/".to_string()));
        }
        Ok(user)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let viewer = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|au| au.0.clone());
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Ok(Self { viewer, path })
    }
}

/// `Path` whose malformed segments answer 404 instead of 400
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(PageError))]
pub struct PathParams<T>(pub T);

/// Errors a page handler can end with
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("Not found")]
    NotFound,

    #[error("Cross-site request rejected")]
    CsrfFailure,

    /// Anonymous request to a page that needs a user
    #[error("Login required")]
    LoginRequired { next: String },

    /// Send the requester elsewhere, e.g. a non-owner back to a read view
    #[error("Redirect to {0}")]
    Redirect(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Marks a response whose body [`render_error_pages`] should replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPage {
    NotFound,
    CsrfFailure,
    ServerError,
}

impl ErrorPage {
    fn template(self) -> &'static str {
        match self {
            ErrorPage::NotFound => "pages/404.html",
            ErrorPage::CsrfFailure => "pages/403csrf.html",
            ErrorPage::ServerError => "pages/500.html",
        }
    }

    fn title(self) -> &'static str {
        match self {
            ErrorPage::NotFound => "Page not found",
            ErrorPage::CsrfFailure => "Request rejected",
            ErrorPage::ServerError => "Server error",
        }
    }

    /// Page for an unmarked response, such as a miss under `/media`
    fn for_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::NOT_FOUND => Some(ErrorPage::NotFound),
            status if status.is_server_error() => Some(ErrorPage::ServerError),
            _ => None,
        }
    }

    fn respond(self, status: StatusCode) -> Response {
        let mut response = (status, self.title()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::NotFound => ErrorPage::NotFound.respond(StatusCode::NOT_FOUND),
            PageError::CsrfFailure => ErrorPage::CsrfFailure.respond(StatusCode::FORBIDDEN),
            PageError::LoginRequired { next } => Redirect::to(&format!(
                "/auth/login/?next={}",
                urlencoding::encode(&next)
            ))
            .into_response(),
            PageError::Redirect(to) => Redirect::to(&to).into_response(),
            PageError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                ErrorPage::ServerError.respond(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl From<PathRejection> for PageError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!("Unmatched path parameters: {}", rejection);
        PageError::NotFound
    }
}

/// Fallback for unmatched routes
pub async fn not_found() -> PageError {
    PageError::NotFound
}

/// Response for a panicking handler
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    ErrorPage::ServerError.respond(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Replace error responses with the rendered error page
pub async fn render_error_pages(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let viewer = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|au| au.0.clone());
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let page = response
        .extensions()
        .get::<ErrorPage>()
        .copied()
        .or_else(|| ErrorPage::for_status(response.status()));
    let Some(page) = page else {
        return response;
    };

    let vars = state.standard_vars(viewer.as_ref(), &path);
    let html = state.theme_engine.render_or_plain(
        page.template(),
        &TeraContext::new(),
        &vars,
        page.title(),
    );

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Response::from_parts(parts, Html(html).into_response().into_body())
}

/// Extract the session token from the cookie header
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// Resolve the session cookie, if any, to a user
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Reject unsafe requests that come from another site
pub async fn csrf_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, PageError> {
    let unsafe_method = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if unsafe_method && !is_same_origin(request.headers(), &state.config.server.trusted_origins) {
        tracing::warn!(
            "Rejected cross-site {} {}",
            request.method(),
            request.uri().path()
        );
        return Err(PageError::CsrfFailure);
    }
    Ok(next.run(request).await)
}

/// Whether the browser-supplied headers show a same-origin request.
///
/// Requests without `Sec-Fetch-Site` and `Origin` (non-browser clients) pass.
pub fn is_same_origin(headers: &HeaderMap, trusted_origins: &[String]) -> bool {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header_str("sec-fetch-site") == Some("cross-site") {
        return false;
    }

    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };

    if trusted_origins
        .iter()
        .any(|trusted| trusted.trim_end_matches('/').eq_ignore_ascii_case(origin))
    {
        return true;
    }

    let origin_host = origin.split_once("://").map(|(_, host)| host);
    match (origin_host, header_str(header::HOST.as_str())) {
        (Some(origin_host), Some(host)) => origin_host.eq_ignore_ascii_case(host),
        _ => false,
    }
}

/// `Set-Cookie` value opening a session
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

/// `Set-Cookie` value clearing the session
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Session token carried by a request, for logout
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    extract_session_token(headers)
}
