//! End-to-end tests driving the router over an in-memory database

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use scriptorium::{
    api::{build_router, AppState},
    config::Config,
    db::{create_test_pool, migrations::run_migrations},
    models::{Category, CreateCategoryInput, Post, PostDraft, User},
    services::{LoginInput, RegisterInput},
};
use tempfile::TempDir;
use tower::util::ServiceExt;

const PASSWORD: &str = "s3cret-pass";

struct TestApp {
    app: Router,
    state: AppState,
    _media: TempDir,
}

async fn setup() -> TestApp {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let media = TempDir::new().unwrap();
    let mut config = Config::default();
    config.upload.path = media.path().to_path_buf();

    let state = AppState::new(pool, config).unwrap();
    TestApp {
        app: build_router(state.clone()),
        state,
        _media: media,
    }
}

impl TestApp {
    /// Register and log in; returns the user and a cookie header value
    async fn user(&self, username: &str) -> (User, String) {
        let user = self
            .state
            .user_service
            .register(RegisterInput::new(
                username,
                format!("{}@example.com", username),
                PASSWORD,
            ))
            .await
            .unwrap();
        let session = self
            .state
            .user_service
            .login(LoginInput::new(username, PASSWORD))
            .await
            .unwrap();
        (user, format!("session={}", session.id))
    }

    async fn category(&self, slug: &str, is_published: bool) -> Category {
        self.state
            .category_service
            .create(CreateCategoryInput {
                title: slug.to_uppercase(),
                description: String::new(),
                slug: slug.to_string(),
                is_published,
            })
            .await
            .unwrap()
    }

    async fn post(
        &self,
        author: &User,
        category: &Category,
        title: &str,
        is_published: bool,
        pub_date_offset: Duration,
    ) -> Post {
        self.state
            .post_service
            .create(
                author,
                PostDraft {
                    title: title.to_string(),
                    text: format!("Body of {}", title),
                    pub_date: Utc::now() + pub_date_offset,
                    category_id: Some(category.id),
                    location_id: None,
                    is_published,
                    image: None,
                },
            )
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn past() -> Duration {
    Duration::hours(-1)
}

#[tokio::test]
async fn test_unknown_route_renders_404_page() {
    let app = setup().await;
    let response = app.get("/no/such/page/", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Page not found"));
}

#[tokio::test]
async fn test_malformed_post_id_is_404() {
    let app = setup().await;
    let response = app.get("/posts/abc/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_media_file_renders_404_page() {
    let app = setup().await;
    let posts_dir = app._media.path().join("posts");
    std::fs::create_dir_all(&posts_dir).unwrap();
    std::fs::write(posts_dir.join("here.png"), b"png").unwrap();

    let response = app.get("/media/posts/here.png", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/media/posts/nope.png", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Page not found"));
}

#[tokio::test]
async fn test_unpublished_post_visible_to_author_only() {
    let app = setup().await;
    let (author, author_cookie) = app.user("alice").await;
    let (_, other_cookie) = app.user("bob").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Draft notes", false, past()).await;
    let uri = format!("/posts/{}/", post.id);

    assert_eq!(app.get(&uri, None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get(&uri, Some(&other_cookie)).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = app.get(&uri, Some(&author_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Draft notes"));
}

#[tokio::test]
async fn test_scheduled_post_hidden_until_pub_date() {
    let app = setup().await;
    let (author, cookie) = app.user("alice").await;
    let travel = app.category("travel", true).await;
    let post = app
        .post(&author, &travel, "Tomorrow", true, Duration::days(1))
        .await;
    let uri = format!("/posts/{}/", post.id);

    assert_eq!(app.get(&uri, None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get(&uri, Some(&cookie)).await.status(), StatusCode::OK);
    assert!(!body_text(app.get("/", None).await).await.contains("Tomorrow"));
}

#[tokio::test]
async fn test_category_page_requires_published_category() {
    let app = setup().await;
    let (author, _) = app.user("alice").await;
    let hidden = app.category("hidden", false).await;
    let travel = app.category("travel", true).await;
    app.post(&author, &travel, "On the road", true, past()).await;

    let response = app.get("/category/hidden/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/category/travel/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("On the road"));

    let post = app.post(&author, &hidden, "Secret", true, past()).await;
    let response = app.get(&format!("/posts/{}/", post.id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_index_paginates_by_ten() {
    let app = setup().await;
    let (author, _) = app.user("alice").await;
    let travel = app.category("travel", true).await;
    for i in 0..12 {
        app.post(&author, &travel, &format!("Post {}", i), true, past())
            .await;
    }

    let first = body_text(app.get("/", None).await).await;
    assert_eq!(first.matches("<article class=\"card\">").count(), 10);
    assert!(first.contains("?page=2"));

    let second = body_text(app.get("/?page=2", None).await).await;
    assert_eq!(second.matches("<article class=\"card\">").count(), 2);

    assert_eq!(
        app.get("/?page=3", None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/?page=abc", None).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_empty_index_first_page_is_ok() {
    let app = setup().await;
    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Nothing has been published yet"));
}

#[tokio::test]
async fn test_non_owner_cannot_edit_or_delete() {
    let app = setup().await;
    let (author, _) = app.user("alice").await;
    let (_, mallory) = app.user("mallory").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Mine", true, past()).await;
    let detail = format!("/posts/{}/", post.id);

    let response = app
        .get(&format!("/posts/{}/edit/", post.id), Some(&mallory))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let response = app
        .post_form(&format!("/posts/{}/edit/", post.id), Some(&mallory), "")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let response = app
        .post_form(&format!("/posts/{}/delete/", post.id), Some(&mallory), "")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let response = app.get(&detail, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Mine"));
}

#[tokio::test]
async fn test_owner_deletes_post() {
    let app = setup().await;
    let (author, cookie) = app.user("alice").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Short lived", true, past()).await;

    let response = app
        .post_form(&format!("/posts/{}/delete/", post.id), Some(&cookie), "")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/alice/");

    let response = app.get(&format!("/posts/{}/", post.id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_anonymous_create_redirects_to_login() {
    let app = setup().await;
    let response = app.get("/posts/create/", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/auth/login/?next=%2Fposts%2Fcreate%2F"
    );
}

#[tokio::test]
async fn test_create_post_through_form() {
    let app = setup().await;
    let (_, cookie) = app.user("alice").await;
    let travel = app.category("travel", true).await;

    let boundary = "XBOUNDARYX";
    let fields = [
        ("title", "Mountain pass".to_string()),
        ("text", "Cold but worth it".to_string()),
        ("pub_date", "2020-01-01T10:00".to_string()),
        ("category", travel.id.to_string()),
        ("location", String::new()),
        ("is_published", "on".to_string()),
    ];
    let mut body = String::new();
    for (name, value) in &fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            boundary, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", boundary));

    let request = Request::builder()
        .method("POST")
        .uri("/posts/create/")
        .header(header::COOKIE, &cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/alice/");

    let profile = body_text(app.get("/profile/alice/", None).await).await;
    assert!(profile.contains("Mountain pass"));
}

#[tokio::test]
async fn test_comment_increments_count() {
    let app = setup().await;
    let (author, _) = app.user("alice").await;
    let (_, reader) = app.user("bob").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Discuss", true, past()).await;

    assert!(body_text(app.get("/", None).await).await.contains("Comments (0)"));

    let response = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            Some(&reader),
            "text=Nice+trip",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    assert!(body_text(app.get("/", None).await).await.contains("Comments (1)"));
    let detail = body_text(app.get(&format!("/posts/{}/", post.id), None).await).await;
    assert!(detail.contains("Nice trip"));
}

#[tokio::test]
async fn test_comment_on_hidden_post_is_404() {
    let app = setup().await;
    let (author, cookie) = app.user("alice").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Draft", false, past()).await;

    let response = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            Some(&cookie),
            "text=hello",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cross_site_post_is_rejected() {
    let app = setup().await;
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login/")
        .header(header::HOST, "blog.test")
        .header(header::ORIGIN, "https://evil.test")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=a&password=b"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("Request rejected"));
}

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let app = setup().await;
    app.user("alice").await;

    let response = app
        .post_form(
            "/auth/login/",
            None,
            &format!("username=alice&password={}&next=%2Fpages%2Fabout%2F", PASSWORD),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pages/about/");
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let response = app
        .post_form("/auth/login/", None, "username=alice&password=wrong")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Invalid username or password"));
}

#[tokio::test]
async fn test_login_ignores_offsite_next() {
    let app = setup().await;
    app.user("alice").await;

    let response = app
        .post_form(
            "/auth/login/",
            None,
            &format!("username=alice&password={}&next=%2F%2Fevil.test%2F", PASSWORD),
        )
        .await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = setup().await;
    let (_, cookie) = app.user("alice").await;

    let response = app.post_form("/auth/logout/", Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app.get("/posts/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/auth/login/"));
}

#[tokio::test]
async fn test_registration_redirects_to_login() {
    let app = setup().await;
    let response = app
        .post_form(
            "/auth/registration/",
            None,
            "username=newbie&email=newbie%40example.com&password1=pw12345&password2=pw12345",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/");

    let response = app
        .post_form(
            "/auth/registration/",
            None,
            "username=other&email=other%40example.com&password1=a&password2=b",
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("didn&#x27;t match"));
}

#[tokio::test]
async fn test_manage_pages_require_admin() {
    let app = setup().await;
    let (_, admin) = app.user("root").await;
    let (_, author) = app.user("alice").await;

    let response = app.get("/manage/categories/", Some(&author)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app.get("/manage/categories/", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_form(
            "/manage/categories/",
            Some(&admin),
            "title=Food&slug=food&description=Meals&is_published=on",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.get("/category/food/", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unpublishing_category_hides_its_page() {
    let app = setup().await;
    let (_, admin) = app.user("root").await;
    let travel = app.category("travel", true).await;
    assert_eq!(app.get("/category/travel/", None).await.status(), StatusCode::OK);

    let response = app
        .post_form(
            &format!("/manage/categories/{}/toggle/", travel.id),
            Some(&admin),
            "",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        app.get("/category/travel/", None).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_profile_lists_public_posts_only() {
    let app = setup().await;
    let (author, cookie) = app.user("alice").await;
    let travel = app.category("travel", true).await;
    app.post(&author, &travel, "Public one", true, past()).await;
    app.post(&author, &travel, "Private one", false, past()).await;

    let page = body_text(app.get("/profile/alice/", Some(&cookie)).await).await;
    assert!(page.contains("Public one"));
    assert!(!page.contains("Private one"));

    assert_eq!(
        app.get("/profile/nobody/", None).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_static_pages_render() {
    let app = setup().await;
    for uri in ["/pages/about/", "/pages/rules/"] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_non_owner_cannot_touch_comment() {
    let app = setup().await;
    let (author, author_cookie) = app.user("alice").await;
    let (_, other) = app.user("bob").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Discuss", true, past()).await;
    let detail = format!("/posts/{}/", post.id);

    app.post_form(
        &format!("/posts/{}/comment/", post.id),
        Some(&author_cookie),
        "text=First+words",
    )
    .await;
    let comments = app
        .state
        .comment_service
        .list_for_post(post.id, None)
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);
    let comment_id = comments[0].comment.id;

    for action in ["edit", "delete"] {
        let uri = format!("/posts/{}/comment/{}/{}/", post.id, comment_id, action);
        let response = app.post_form(&uri, Some(&other), "text=Defaced").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", action);
        assert_eq!(location(&response), detail);
    }

    let page = body_text(app.get(&detail, None).await).await;
    assert!(page.contains("First words"));
    assert!(!page.contains("Defaced"));

    // A comment addressed through the wrong post does not exist
    let other_post = app.post(&author, &travel, "Elsewhere", true, past()).await;
    let response = app
        .get(
            &format!("/posts/{}/comment/{}/edit/", other_post.id, comment_id),
            Some(&author_cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owner_edits_comment() {
    let app = setup().await;
    let (author, cookie) = app.user("alice").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&author, &travel, "Discuss", true, past()).await;

    app.post_form(
        &format!("/posts/{}/comment/", post.id),
        Some(&cookie),
        "text=Typo+hre",
    )
    .await;
    let comment_id = app
        .state
        .comment_service
        .list_for_post(post.id, None)
        .await
        .unwrap()[0]
        .comment
        .id;

    let uri = format!("/posts/{}/comment/{}/edit/", post.id, comment_id);
    let form = body_text(app.get(&uri, Some(&cookie)).await).await;
    assert!(form.contains("Typo hre"));

    let response = app.post_form(&uri, Some(&cookie), "text=Typo+here").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app.post_form(&uri, Some(&cookie), "text=+").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Comment cannot be empty"));

    let page = body_text(app.get(&format!("/posts/{}/", post.id), None).await).await;
    assert!(page.contains("Typo here"));
}

#[tokio::test]
async fn test_moderated_comment_hidden_from_others() {
    let app = setup().await;
    let (admin_user, admin) = app.user("root").await;
    let (_, reader) = app.user("bob").await;
    let travel = app.category("travel", true).await;
    let post = app.post(&admin_user, &travel, "Discuss", true, past()).await;

    app.post_form(
        &format!("/posts/{}/comment/", post.id),
        Some(&reader),
        "text=Spam+spam",
    )
    .await;
    let comment_id = app
        .state
        .comment_service
        .list_for_post(post.id, None)
        .await
        .unwrap()[0]
        .comment
        .id;

    let moderation = body_text(app.get("/manage/comments/", Some(&admin)).await).await;
    assert!(moderation.contains("Spam spam"));

    let response = app
        .post_form(
            &format!("/manage/comments/{}/toggle/", comment_id),
            Some(&admin),
            "",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let detail = format!("/posts/{}/", post.id);
    assert!(!body_text(app.get(&detail, None).await).await.contains("Spam spam"));
    assert!(body_text(app.get(&detail, Some(&reader)).await)
        .await
        .contains("Spam spam"));
    assert!(body_text(app.get("/", None).await).await.contains("Comments (0)"));
}
