//! Post pages: feeds, detail, and the create/edit/delete forms

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use tera::Context as TeraContext;

use crate::api::common::{
    format_datetime_input, parse_datetime_input, remove_image, save_image, ImageUpload, PageQuery,
};
use crate::api::middleware::{AppState, PageError, PathParams, RequestContext};
use crate::models::{PostDraft, PostWithMeta, User};
use crate::services::{can_mutate, PostServiceError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/posts/create/", get(create_form).post(create_post))
        .route("/posts/{post_id}/", get(post_detail))
        .route("/posts/{post_id}/edit/", get(edit_form).post(update_post))
        .route("/posts/{post_id}/delete/", get(delete_confirm).post(delete_post))
        .route("/category/{category_slug}/", get(category_posts))
}

pub fn detail_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}

/// GET / - the public feed
async fn index(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let page = state.post_service.list_index(query.number()?).await?;

    let mut context = TeraContext::new();
    context.insert("posts", &page.items);
    context.insert("page_obj", &page.pagination());
    state.render(&ctx, "blog/index.html", &context)
}

/// GET /category/{slug}/ - one published category's feed
async fn category_posts(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(slug): PathParams<String>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, PageError> {
    let category = state.category_service.get_published_by_slug(&slug).await?;
    let page = state
        .post_service
        .list_category(category.id, query.number()?)
        .await?;

    let mut context = TeraContext::new();
    context.insert("category", &category);
    context.insert("posts", &page.items);
    context.insert("page_obj", &page.pagination());
    state.render(&ctx, "blog/category.html", &context)
}

/// GET /posts/{id}/ - a post with its comments
async fn post_detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(post_id): PathParams<i64>,
) -> Result<Html<String>, PageError> {
    let viewer = ctx.viewer.as_ref();
    let post = state.post_service.get_visible(post_id, viewer).await?;
    let comments = state.comment_service.list_for_post(post_id, viewer).await?;

    let mut context = TeraContext::new();
    context.insert("post", &post);
    context.insert("comments", &comments);
    context.insert("is_author", &viewer.map_or(false, |u| can_mutate(&post, u)));
    context.insert("errors", &Vec::<String>::new());
    state.render(&ctx, "blog/detail.html", &context)
}

/// Post form as submitted, kept as text so it can be shown again
#[derive(Debug, Default, Clone, Serialize)]
struct PostForm {
    title: String,
    text: String,
    pub_date: String,
    category: String,
    location: String,
    is_published: bool,
    clear_image: bool,
    #[serde(skip)]
    image: Option<ImageUpload>,
}

impl PostForm {
    fn blank() -> Self {
        Self {
            pub_date: format_datetime_input(Utc::now()),
            is_published: true,
            ..Self::default()
        }
    }

    fn from_post(post: &PostWithMeta) -> Self {
        let p = &post.post;
        Self {
            title: p.title.clone(),
            text: p.text.clone(),
            pub_date: format_datetime_input(p.pub_date),
            category: p.category_id.map(|id| id.to_string()).unwrap_or_default(),
            location: p.location_id.map(|id| id.to_string()).unwrap_or_default(),
            is_published: p.is_published,
            clear_image: false,
            image: None,
        }
    }

    /// Convert to a draft; the image is decided by the caller
    fn to_draft(&self, image: Option<String>) -> Result<PostDraft, Vec<String>> {
        let mut errors = Vec::new();

        let pub_date = parse_datetime_input(&self.pub_date);
        if pub_date.is_none() {
            errors.push("Enter a valid publication date and time".to_string());
        }
        let category_id = match self.category.trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push("Select a valid category".to_string());
                    None
                }
            },
        };
        let location_id = match self.location.trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push("Select a valid location".to_string());
                    None
                }
            },
        };

        match pub_date {
            Some(pub_date) if errors.is_empty() => Ok(PostDraft {
                title: self.title.clone(),
                text: self.text.clone(),
                pub_date,
                category_id,
                location_id,
                is_published: self.is_published,
                image,
            }),
            _ => Err(errors),
        }
    }
}

async fn read_post_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PostForm, String> {
    let mut multipart = multipart.map_err(|e| e.body_text())?;
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read form: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "image" {
            let has_file = field.file_name().map_or(false, |f| !f.is_empty());
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| format!("Failed to read image: {}", e))?;
            if has_file && !data.is_empty() {
                form.image = Some(ImageUpload { content_type, data });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| format!("Failed to read form: {}", e))?;
        match name.as_str() {
            "title" => form.title = value,
            "text" => form.text = value,
            "pub_date" => form.pub_date = value,
            "category" => form.category = value,
            "location" => form.location = value,
            "is_published" => form.is_published = true,
            "clear_image" => form.clear_image = true,
            _ => {}
        }
    }

    Ok(form)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum FormMode {
    Create,
    Edit,
    Delete,
}

async fn render_post_form(
    state: &AppState,
    ctx: &RequestContext,
    mode: FormMode,
    form: &PostForm,
    post: Option<&PostWithMeta>,
    errors: &[String],
) -> Result<Html<String>, PageError> {
    let mut context = TeraContext::new();
    context.insert("mode", &mode);
    context.insert("form", form);
    context.insert("post", &post);
    context.insert("errors", errors);
    context.insert("categories", &state.category_service.list().await?);
    context.insert("locations", &state.location_service.list().await?);
    state.render(ctx, "blog/create.html", &context)
}

/// Map a non-owner to a redirect back to the post
fn refused(e: PostServiceError, post_id: i64) -> PageError {
    match e {
        PostServiceError::NotOwner => PageError::Redirect(detail_url(post_id)),
        other => other.into(),
    }
}

fn owned<T>(result: Result<T, PostServiceError>, post_id: i64) -> Result<T, PageError> {
    result.map_err(|e| refused(e, post_id))
}

/// Validate and store a submitted image, returning its path
async fn store_upload(state: &AppState, form: &PostForm) -> Result<Option<String>, Vec<String>> {
    let Some(upload) = &form.image else {
        return Ok(None);
    };
    upload.validate(&state.config.upload).map_err(|e| vec![e])?;
    match save_image(&state.config.upload, upload).await {
        Ok(path) => Ok(Some(path)),
        Err(e) => {
            tracing::error!("Failed to store upload: {:#}", e);
            Err(vec!["The image could not be saved".to_string()])
        }
    }
}

/// GET /posts/create/
async fn create_form(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    ctx.user()?;
    render_post_form(&state, &ctx, FormMode::Create, &PostForm::blank(), None, &[]).await
}

/// POST /posts/create/
async fn create_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, PageError> {
    let user = ctx.user()?.clone();

    let form = match read_post_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let form = PostForm::blank();
            let page = render_post_form(&state, &ctx, FormMode::Create, &form, None, &[e]).await?;
            return Ok(page.into_response());
        }
    };

    let result = match form.to_draft(None) {
        Ok(draft) => match store_upload(&state, &form).await {
            Ok(image) => submit_create(&state, &user, PostDraft { image, ..draft }).await,
            Err(errors) => Err(errors),
        },
        Err(errors) => Err(errors),
    };

    match result {
        Ok(()) => Ok(Redirect::to(&profile_url(&user.username)).into_response()),
        Err(errors) => {
            let page =
                render_post_form(&state, &ctx, FormMode::Create, &form, None, &errors).await?;
            Ok(page.into_response())
        }
    }
}

async fn submit_create(
    state: &AppState,
    user: &User,
    draft: PostDraft,
) -> Result<(), Vec<String>> {
    let image = draft.image.clone();
    match state.post_service.create(user, draft).await {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Some(path) = image {
                remove_image(&state.config.upload.path, &path).await;
            }
            match e {
                PostServiceError::ValidationError(msg) => Err(vec![msg]),
                other => {
                    tracing::error!("Failed to create post: {}", other);
                    Err(vec!["The post could not be saved".to_string()])
                }
            }
        }
    }
}

/// GET /posts/{id}/edit/
async fn edit_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(post_id): PathParams<i64>,
) -> Result<Html<String>, PageError> {
    let user = ctx.user()?;
    let post = owned(state.post_service.get_for_mutation(post_id, user).await, post_id)?;
    let form = PostForm::from_post(&post);
    render_post_form(&state, &ctx, FormMode::Edit, &form, Some(&post), &[]).await
}

/// POST /posts/{id}/edit/
async fn update_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(post_id): PathParams<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, PageError> {
    let user = ctx.user()?.clone();
    let current = owned(state.post_service.get_for_mutation(post_id, &user).await, post_id)?;

    let form = match read_post_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let form = PostForm::from_post(&current);
            let page =
                render_post_form(&state, &ctx, FormMode::Edit, &form, Some(&current), &[e]).await?;
            return Ok(page.into_response());
        }
    };

    let errors = match form.to_draft(None) {
        Err(errors) => errors,
        Ok(draft) => match store_upload(&state, &form).await {
            Err(errors) => errors,
            Ok(uploaded) => {
                let image = match (&uploaded, form.clear_image) {
                    (Some(path), _) => Some(path.clone()),
                    (None, true) => None,
                    (None, false) => current.post.image.clone(),
                };
                let draft = PostDraft {
                    image: image.clone(),
                    ..draft
                };
                match state.post_service.update(post_id, &user, draft).await {
                    Ok(previous) => {
                        let replaced = previous
                            .post
                            .image
                            .filter(|old| Some(old) != image.as_ref());
                        if let Some(old) = replaced {
                            remove_image(&state.config.upload.path, &old).await;
                        }
                        return Ok(Redirect::to(&detail_url(post_id)).into_response());
                    }
                    Err(e) => {
                        if let Some(path) = uploaded {
                            remove_image(&state.config.upload.path, &path).await;
                        }
                        match e {
                            PostServiceError::ValidationError(msg) => vec![msg],
                            other => return Err(refused(other, post_id)),
                        }
                    }
                }
            }
        },
    };

    let page =
        render_post_form(&state, &ctx, FormMode::Edit, &form, Some(&current), &errors).await?;
    Ok(page.into_response())
}

/// GET /posts/{id}/delete/ - confirmation
async fn delete_confirm(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(post_id): PathParams<i64>,
) -> Result<Html<String>, PageError> {
    let user = ctx.user()?;
    let post = owned(state.post_service.get_for_mutation(post_id, user).await, post_id)?;
    let form = PostForm::from_post(&post);
    render_post_form(&state, &ctx, FormMode::Delete, &form, Some(&post), &[]).await
}

/// POST /posts/{id}/delete/
async fn delete_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    PathParams(post_id): PathParams<i64>,
) -> Result<Redirect, PageError> {
    let user = ctx.user()?;
    let deleted = owned(state.post_service.delete(post_id, user).await, post_id)?;
    if let Some(image) = &deleted.post.image {
        remove_image(&state.config.upload.path, image).await;
    }
    Ok(Redirect::to(&profile_url(&user.username)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_to_draft() {
        let form = PostForm {
            title: "Title".to_string(),
            text: "Body".to_string(),
            pub_date: "2024-01-02T03:04".to_string(),
            category: "7".to_string(),
            location: "".to_string(),
            is_published: true,
            ..PostForm::default()
        };
        let draft = form.to_draft(Some("posts/a.png".to_string())).unwrap();
        assert_eq!(draft.category_id, Some(7));
        assert_eq!(draft.location_id, None);
        assert_eq!(draft.image.as_deref(), Some("posts/a.png"));
        assert_eq!(format_datetime_input(draft.pub_date), "2024-01-02T03:04");
    }

    #[test]
    fn test_form_to_draft_collects_errors() {
        let form = PostForm {
            pub_date: "soon".to_string(),
            category: "x".to_string(),
            location: "y".to_string(),
            ..PostForm::default()
        };
        let errors = form.to_draft(None).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_profile_url_escapes_username() {
        assert_eq!(profile_url("a b"), "/profile/a%20b/");
        assert_eq!(detail_url(5), "/posts/5/");
    }
}
