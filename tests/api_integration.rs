//! Full-stack REST API integration tests.
//!
//! Each test builds the axum router over a fresh in-memory SQLite database
//! and a stub link prober, then drives it with `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use serde_json::{Value, json};
use tower::ServiceExt; // for `.oneshot()`

use favlinks::db::entities::{category, favourite, link_validity, prelude::{Favourite, LinkValidity}, tag};
use favlinks::db::is_unique_violation;
use favlinks::db::schema::ensure_schema;
use favlinks::db::services::link_validity_service;
use favlinks::db::services::user_service::{self, ROLE_USER};
use favlinks::server::config::ServerConfig;
use favlinks::server::jobs::{JobReport, LinkJob, LinkMaintenanceScheduler};
use favlinks::services::auth_service::{create_jwt_for_user, ensure_admin};
use favlinks::services::link_probe::{LinkProber, ProbeOutcome};
use favlinks::web::{AppError, AppState, create_axum_router};

const JWT_SECRET: &str = "test-secret";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Answers from a fixed table and counts every call. Unknown urls are valid
/// pages titled "Stub page".
#[derive(Default)]
struct StubProber {
    calls: AtomicUsize,
    pages: Mutex<HashMap<String, ProbeOutcome>>,
}

impl StubProber {
    fn set(&self, url: &str, outcome: ProbeOutcome) {
        self.pages.lock().unwrap().insert(url.to_string(), outcome);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkProber for StubProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::valid("Stub page"))
    }
}

struct TestApp {
    router: Router,
    db: DatabaseConnection,
    prober: Arc<StubProber>,
}

async fn setup() -> TestApp {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connect");
    ensure_schema(&db).await.expect("schema");

    let prober = Arc::new(StubProber::default());
    let state = Arc::new(AppState {
        db_pool: db.clone(),
        prober: prober.clone(),
        config: Arc::new(ServerConfig::new("sqlite::memory:", JWT_SECRET)),
    });
    TestApp { router: create_axum_router(state), db, prober }
}

/// Creates a user directly (cheap bcrypt cost) and returns its id and token.
async fn user_with_token(db: &DatabaseConnection, username: &str) -> (i32, String) {
    let hash = bcrypt::hash("irrelevant-pass", 4).unwrap();
    let user = user_service::create_user(db, username, &format!("{username}@example.com"), hash, ROLE_USER)
        .await
        .unwrap();
    let login = create_jwt_for_user(&user, JWT_SECRET, 1).unwrap();
    (user.id, login.token)
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(val) => builder.body(Body::from(val.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let resp = self
            .router
            .clone()
            .oneshot(json_request(method, uri, token, body))
            .await
            .unwrap();
        let status = resp.status();
        (status, body_json(resp).await)
    }

    async fn create_label(&self, kind: &str, token: &str, name: &str) -> i64 {
        let (status, body) = self
            .call(Method::POST, &format!("/api/{kind}"), Some(token), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }

    async fn create_favourite(&self, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, "/api/favourites", Some(token), Some(body)).await
    }

    async fn favourite_count(&self) -> usize {
        Favourite::find().all(&self.db).await.unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Health and auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let app = setup().await;
    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn register_login_and_me() {
    let app = setup().await;

    let register = json!({
        "username": "Alice",
        "password": "correct horse battery",
        "confirm_password": "correct horse battery",
        "email": "alice@example.com"
    });
    let (status, body) = app.call(Method::POST, "/api/auth/register", None, Some(register.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());

    // Same name in another case is still taken
    let (status, _) = app.call(Method::POST, "/api/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mismatch = json!({"username": "bob", "password": "correct horse battery", "confirm_password": "nope"});
    let (status, _) = app.call(Method::POST, "/api/auth/register", None, Some(mismatch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let weak = json!({"username": "bob", "password": "12345678", "confirm_password": "12345678"});
    let (status, _) = app.call(Method::POST, "/api/auth/register", None, Some(weak)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({"username": "nobody", "password": "whatever1"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({"username": "alice", "password": "wrong-password"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "alice", "password": "correct horse battery"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    let login = body_json(resp).await;
    let token = login["token"].as_str().unwrap().to_string();
    assert_eq!(login["email"], "alice@example.com");

    let (status, me) = app.call(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");

    // The cookie alone authenticates too
    let cookie_pair = cookie.split(';').next().unwrap().to_string();
    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/auth/me")
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = setup().await;
    for uri in ["/api/tags", "/api/categories", "/api/favourites", "/api/auth/me"] {
        let (status, body) = app.call(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert!(body["error"].is_string());
    }
    let (status, _) = app.call(Method::GET, "/api/tags", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .call(Method::POST, "/api/valid-url", None, Some(json!({"url": "https://example.com"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Tags and categories
// ---------------------------------------------------------------------------

#[tokio::test]
async fn label_names_are_unique_per_user() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let (_, bob) = user_with_token(&app.db, "bob").await;

    for kind in ["tags", "categories"] {
        app.create_label(kind, &alice, "dev").await;
        let (status, body) = app
            .call(Method::POST, &format!("/api/{kind}"), Some(&alice), Some(json!({"name": "dev"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        // Another user may reuse the name
        app.create_label(kind, &bob, "dev").await;

        let (status, list) = app.call(Method::GET, &format!("/api/{kind}"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn label_crud_and_validation() {
    let app = setup().await;
    let (alice_id, alice) = user_with_token(&app.db, "alice").await;

    let (status, _) = app.call(Method::POST, "/api/tags", Some(&alice), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call(Method::POST, "/api/categories", Some(&alice), Some(json!({"name": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = app.create_label("categories", &alice, "Reading").await;
    let uri = format!("/api/categories/{id}");

    let (status, body) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"], alice_id);
    assert_eq!(body["name"], "Reading");

    let (status, body) = app.call(Method::PUT, &uri, Some(&alice), Some(json!({"name": "Later"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Later");

    // Renaming onto an existing name collides
    app.create_label("categories", &alice, "Work").await;
    let (status, _) = app.call(Method::PUT, &uri, Some(&alice), Some(json!({"name": "Work"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_users_resources_are_not_found() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let (_, bob) = user_with_token(&app.db, "bob").await;

    let tag_id = app.create_label("tags", &alice, "dev").await;
    let category_id = app.create_label("categories", &alice, "Reading").await;
    let (status, favourite) = app.create_favourite(&alice, json!({"url": "https://example.com"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let favourite_id = favourite["id"].as_i64().unwrap();

    for uri in [
        format!("/api/tags/{tag_id}"),
        format!("/api/categories/{category_id}"),
        format!("/api/favourites/{favourite_id}"),
    ] {
        let (status, _) = app.call(Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {uri}");
        let (status, _) = app
            .call(Method::PUT, &uri, Some(&bob), Some(json!({"name": "mine", "title": "mine"})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "PUT {uri}");
        let (status, _) = app.call(Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "DELETE {uri}");
    }

    let (status, _) = app
        .call(Method::POST, &format!("/api/favourites/{favourite_id}/tags"), Some(&bob), Some(json!({"tags": []})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Still there for the owner
    let (status, body) = app.call(Method::GET, &format!("/api/tags/{tag_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "dev");
}

// ---------------------------------------------------------------------------
// Favourites
// ---------------------------------------------------------------------------

#[tokio::test]
async fn favourite_with_category_takes_the_page_title() {
    let app = setup().await;
    app.prober.set("https://example.com", ProbeOutcome::valid("Example Domain"));
    let (_, alice) = user_with_token(&app.db, "alice").await;

    let reading = app.create_label("categories", &alice, "Reading").await;
    let (status, body) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "category": reading}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["title"], "Example Domain");
    assert_eq!(body["category"]["name"], "Reading");

    let cached = link_validity_service::find_by_url(&app.db, "https://example.com").await.unwrap().unwrap();
    assert!(cached.is_valid);

    let (status, list) = app.call(Method::GET, "/api/favourites", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert!(list["next"].is_null());
    assert!(list["previous"].is_null());
    assert_eq!(list["results"][0]["category"]["id"], reading);
    assert_eq!(list["results"][0]["tags"], json!([]));
}

#[tokio::test]
async fn supplied_title_wins_over_page_title() {
    let app = setup().await;
    app.prober.set("https://example.com", ProbeOutcome::valid("Example Domain"));
    let (_, alice) = user_with_token(&app.db, "alice").await;

    let (status, body) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "title": "My bookmark"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "My bookmark");
}

#[tokio::test]
async fn favourite_input_is_validated() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;

    let (status, body) = app.create_favourite(&alice, json!({"title": "no url"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Url field is required");

    let (status, _) = app.create_favourite(&alice, json!({"url": "not a url"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.prober.set("https://down.example", ProbeOutcome::invalid());
    let (status, body) = app.create_favourite(&alice, json!({"url": "https://down.example"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Url is not valid or unreachable");
    assert_eq!(app.favourite_count().await, 0);
}

#[tokio::test]
async fn favourite_urls_are_unique_per_user() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let (_, bob) = user_with_token(&app.db, "bob").await;

    let (status, _) = app.create_favourite(&alice, json!({"url": "https://example.com"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.create_favourite(&alice, json!({"url": "https://example.com"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Favourite with this url already exists");

    let (status, _) = app.create_favourite(&bob, json!({"url": "https://example.com"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.favourite_count().await, 2);
    // Shared validity row, probed once
    assert_eq!(app.prober.calls(), 1);
}

#[tokio::test]
async fn cached_invalid_url_is_rejected_without_probing() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;

    link_validity::ActiveModel {
        url: Set("https://gone.example".to_string()),
        title: Set(None),
        is_valid: Set(false),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .unwrap();

    let (status, _) = app.create_favourite(&alice, json!({"url": "https://gone.example"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.favourite_count().await, 0);
    assert_eq!(app.prober.calls(), 0);
}

#[tokio::test]
async fn foreign_tags_and_categories_are_rejected_on_every_path() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let (_, bob) = user_with_token(&app.db, "bob").await;

    let own_tag = app.create_label("tags", &alice, "dev").await;
    let bobs_tag = app.create_label("tags", &bob, "dev").await;
    let bobs_category = app.create_label("categories", &bob, "Reading").await;

    // Direct save
    let (status, body) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "tags": [own_tag, bobs_tag]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Tag must belong to the same user.");
    let (status, body) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "category": bobs_category}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Category must belong to the same user.");
    assert_eq!(app.favourite_count().await, 0);

    // Unknown ids fail the same way
    let (status, _) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "tags": [9999]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, favourite) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "tags": [own_tag]}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/favourites/{}", favourite["id"]);

    // Incremental add and bulk set
    for method in [Method::POST, Method::PUT] {
        let (status, _) = app
            .call(method, &format!("{uri}/tags"), Some(&alice), Some(json!({"tags": [bobs_tag]})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // Update and category assignment
    let (status, _) = app.call(Method::PUT, &uri, Some(&alice), Some(json!({"tags": [bobs_tag]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .call(Method::PUT, &uri, Some(&alice), Some(json!({"category": bobs_category})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .call(Method::PUT, &format!("{uri}/category"), Some(&alice), Some(json!({"category": bobs_category})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing leaked through
    let (_, current) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(current["tags"].as_array().unwrap().len(), 1);
    assert_eq!(current["tags"][0]["id"], own_tag);
    assert!(current["category"].is_null());
}

#[tokio::test]
async fn tag_add_and_set() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let dev = app.create_label("tags", &alice, "dev").await;
    let rust = app.create_label("tags", &alice, "rust").await;
    let web = app.create_label("tags", &alice, "web").await;

    let (_, favourite) = app.create_favourite(&alice, json!({"url": "https://example.com", "tags": [dev]})).await;
    let tags_uri = format!("/api/favourites/{}/tags", favourite["id"]);

    let (status, body) = app
        .call(Method::POST, &tags_uri, Some(&alice), Some(json!({"tags": [dev, rust]})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tags"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["dev", "rust"]);

    let (status, body) = app.call(Method::PUT, &tags_uri, Some(&alice), Some(json!({"tags": [web]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"].as_array().unwrap().len(), 1);
    assert_eq!(body["tags"][0]["name"], "web");
}

#[tokio::test]
async fn update_keeps_omitted_fields_and_clears_nulls() {
    let app = setup().await;
    app.prober.set("https://example.com", ProbeOutcome::valid("Example Domain"));
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let dev = app.create_label("tags", &alice, "dev").await;
    let reading = app.create_label("categories", &alice, "Reading").await;

    let (_, favourite) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "category": reading, "tags": [dev]}))
        .await;
    let uri = format!("/api/favourites/{}", favourite["id"]);

    let (status, body) = app.call(Method::PUT, &uri, Some(&alice), Some(json!({"title": "Renamed"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Renamed");
    assert_eq!(body["category"]["id"], reading);
    assert_eq!(body["tags"][0]["id"], dev);

    let (status, body) = app
        .call(Method::PUT, &uri, Some(&alice), Some(json!({"category": null, "tags": null})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["category"].is_null());
    assert_eq!(body["tags"], json!([]));
    assert_eq!(body["title"], "Renamed");

    // Changing the url re-checks validity
    app.prober.set("https://down.example", ProbeOutcome::invalid());
    let (status, _) = app
        .call(Method::PUT, &uri, Some(&alice), Some(json!({"url": "https://down.example"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::PUT, &format!("{uri}/category"), Some(&alice), Some(json!({"category": reading})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"]["name"], "Reading");
    assert_eq!(body["url"], "https://example.com");
}

#[tokio::test]
async fn delete_favourite_removes_it() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let dev = app.create_label("tags", &alice, "dev").await;
    let (_, favourite) = app.create_favourite(&alice, json!({"url": "https://example.com", "tags": [dev]})).await;
    let uri = format!("/api/favourites/{}", favourite["id"]);

    let (status, _) = app.call(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The tag outlives the favourite
    let (status, _) = app.call(Method::GET, &format!("/api/tags/{dev}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn list_filters_and_pagination() {
    let app = setup().await;
    app.prober.set("https://rust-lang.org", ProbeOutcome::valid("Rust Programming Language"));
    app.prober.set("https://docs.rs", ProbeOutcome::valid("Docs.rs"));
    app.prober.set("https://news.example", ProbeOutcome::valid("Daily News"));
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let (_, bob) = user_with_token(&app.db, "bob").await;

    let rust = app.create_label("tags", &alice, "rust").await;
    let reading = app.create_label("categories", &alice, "Reading List").await;
    app.create_favourite(&alice, json!({"url": "https://rust-lang.org", "tags": [rust]})).await;
    app.create_favourite(&alice, json!({"url": "https://docs.rs", "tags": [rust], "category": reading})).await;
    app.create_favourite(&alice, json!({"url": "https://news.example"})).await;
    app.create_favourite(&bob, json!({"url": "https://docs.rs"})).await;

    let (_, page1) = app.call(Method::GET, "/api/favourites?page_size=2", Some(&alice), None).await;
    assert_eq!(page1["count"], 3);
    assert_eq!(page1["results"].as_array().unwrap().len(), 2);
    assert_eq!(page1["next"], "/api/favourites?page_size=2&page=2");
    assert!(page1["previous"].is_null());

    let (_, page2) = app.call(Method::GET, "/api/favourites?page_size=2&page=2", Some(&alice), None).await;
    assert_eq!(page2["results"].as_array().unwrap().len(), 1);
    assert_eq!(page2["results"][0]["url"], "https://news.example");
    assert!(page2["next"].is_null());
    assert_eq!(page2["previous"], "/api/favourites?page_size=2&page=1");

    let (_, past_end) = app.call(Method::GET, "/api/favourites?page=9", Some(&alice), None).await;
    assert_eq!(past_end["count"], 3);
    assert_eq!(past_end["results"], json!([]));

    let (_, by_title) = app.call(Method::GET, "/api/favourites?title=PROGRAMMING", Some(&alice), None).await;
    assert_eq!(by_title["count"], 1);
    assert_eq!(by_title["results"][0]["url"], "https://rust-lang.org");

    let (_, by_url) = app.call(Method::GET, "/api/favourites?url=docs", Some(&alice), None).await;
    assert_eq!(by_url["count"], 1);

    let (_, by_tag) = app.call(Method::GET, "/api/favourites?tag_name=rust", Some(&alice), None).await;
    assert_eq!(by_tag["count"], 2);
    let (_, by_tag_partial) = app.call(Method::GET, "/api/favourites?tag_name=rus", Some(&alice), None).await;
    assert_eq!(by_tag_partial["count"], 0);

    let (_, by_category) = app.call(Method::GET, "/api/favourites?category_name=reading", Some(&alice), None).await;
    assert_eq!(by_category["count"], 1);
    assert_eq!(by_category["results"][0]["url"], "https://docs.rs");

    let (_, recent) = app
        .call(Method::GET, "/api/favourites?created_after=2000-01-01T00:00:00Z", Some(&alice), None)
        .await;
    assert_eq!(recent["count"], 3);
    let (_, ancient) = app
        .call(Method::GET, "/api/favourites?updated_before=2000-01-01T00:00:00Z", Some(&alice), None)
        .await;
    assert_eq!(ancient["count"], 0);
}

#[tokio::test]
async fn huge_page_number_returns_empty_page() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    app.create_favourite(&alice, json!({"url": "https://example.com"})).await;

    let (status, body) = app
        .call(Method::GET, "/api/favourites?page=18446744073709551615", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"], json!([]));
    assert!(body["next"].is_null());
    assert!(body["previous"].is_string());

    let (status, body) = app
        .call(Method::GET, "/api/favourites?page=18446744073709551615&page_size=1", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn deleting_category_and_tag_detaches_them() {
    let app = setup().await;
    let (_, alice) = user_with_token(&app.db, "alice").await;
    let dev = app.create_label("tags", &alice, "dev").await;
    let reading = app.create_label("categories", &alice, "Reading").await;
    let (_, favourite) = app
        .create_favourite(&alice, json!({"url": "https://example.com", "category": reading, "tags": [dev]}))
        .await;
    let uri = format!("/api/favourites/{}", favourite["id"]);

    let (status, _) = app.call(Method::DELETE, &format!("/api/categories/{reading}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::DELETE, &format!("/api/tags/{dev}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["category"].is_null());
    assert_eq!(body["tags"], json!([]));
    assert_eq!(body["url"], "https://example.com");
}

// ---------------------------------------------------------------------------
// Storage-level uniqueness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unique_indexes_reject_direct_duplicates() {
    let app = setup().await;
    let (alice_id, _) = user_with_token(&app.db, "alice").await;
    let (bob_id, _) = user_with_token(&app.db, "bob").await;
    let now = Utc::now();

    let new_tag = |user_id: i32| tag::ActiveModel {
        user_id: Set(user_id),
        name: Set("dev".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    new_tag(alice_id).insert(&app.db).await.unwrap();
    let err = new_tag(alice_id).insert(&app.db).await.unwrap_err();
    assert!(is_unique_violation(&err), "{err}");
    new_tag(bob_id).insert(&app.db).await.unwrap();

    let new_category = |user_id: i32| category::ActiveModel {
        user_id: Set(user_id),
        name: Set("Reading".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    new_category(alice_id).insert(&app.db).await.unwrap();
    let err = new_category(alice_id).insert(&app.db).await.unwrap_err();
    assert!(is_unique_violation(&err), "{err}");

    let new_favourite = |user_id: i32| favourite::ActiveModel {
        user_id: Set(user_id),
        url: Set("https://example.com".to_string()),
        title: Set(String::new()),
        category_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    new_favourite(alice_id).insert(&app.db).await.unwrap();
    let err = new_favourite(alice_id).insert(&app.db).await.unwrap_err();
    assert!(is_unique_violation(&err), "{err}");
    new_favourite(bob_id).insert(&app.db).await.unwrap();

    let new_link = || link_validity::ActiveModel {
        url: Set("https://example.com".to_string()),
        title: Set(None),
        is_valid: Set(true),
        updated_at: Set(now),
        ..Default::default()
    };
    new_link().insert(&app.db).await.unwrap();
    let err = new_link().insert(&app.db).await.unwrap_err();
    assert!(is_unique_violation(&err), "{err}");
}

/// Stores a row for the url while the link check is in flight, like a
/// concurrent request that resolved the same url first.
struct RacingProber {
    db: DatabaseConnection,
}

#[async_trait]
impl LinkProber for RacingProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        link_validity::ActiveModel {
            url: Set(url.to_string()),
            title: Set(Some("First".to_string())),
            is_valid: Set(true),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap();
        ProbeOutcome::valid("Second")
    }
}

#[tokio::test]
async fn resolve_losing_insert_race_returns_existing_row() {
    let app = setup().await;
    let prober = RacingProber { db: app.db.clone() };

    let row = link_validity_service::resolve(&app.db, &prober, "https://example.com").await.unwrap();
    assert_eq!(row.title.as_deref(), Some("First"));
    assert_eq!(LinkValidity::find().all(&app.db).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Link validity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_url_resolves_through_the_cache() {
    let app = setup().await;
    app.prober.set("https://example.com", ProbeOutcome::valid("Example Domain"));
    let (_, alice) = user_with_token(&app.db, "alice").await;

    for _ in 0..2 {
        let (status, body) = app
            .call(Method::POST, "/api/valid-url", Some(&alice), Some(json!({"url": "https://example.com"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_valid"], true);
        assert_eq!(body["title"], "Example Domain");
    }
    assert_eq!(app.prober.calls(), 1);

    let (status, _) = app.call(Method::POST, "/api/valid-url", Some(&alice), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resolve_probes_each_url_once() {
    let app = setup().await;
    let first = link_validity_service::resolve(&app.db, app.prober.as_ref(), "https://a.example").await.unwrap();
    let second = link_validity_service::resolve(&app.db, app.prober.as_ref(), "https://a.example").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(app.prober.calls(), 1);

    link_validity_service::resolve(&app.db, app.prober.as_ref(), "https://b.example").await.unwrap();
    assert_eq!(app.prober.calls(), 2);
}

#[tokio::test]
async fn refresh_marks_failures_and_purge_removes_them() {
    let app = setup().await;
    app.prober.set("https://up.example", ProbeOutcome::valid("Up"));
    app.prober.set("https://flaky.example", ProbeOutcome::valid("Flaky"));
    for url in ["https://up.example", "https://flaky.example"] {
        link_validity_service::resolve(&app.db, app.prober.as_ref(), url).await.unwrap();
    }

    app.prober.set("https://flaky.example", ProbeOutcome::invalid());
    let report = LinkJob::Refresh.run(&app.db, app.prober.as_ref()).await.unwrap();
    match report {
        JobReport::Refresh(summary) => {
            assert_eq!(summary.checked, 2);
            assert_eq!(summary.valid, 1);
            assert_eq!(summary.invalid, 1);
        }
        other => panic!("unexpected report {other:?}"),
    }

    let flaky = link_validity_service::find_by_url(&app.db, "https://flaky.example").await.unwrap().unwrap();
    assert!(!flaky.is_valid);
    assert_eq!(flaky.title.as_deref(), Some("Flaky"));

    let report = LinkJob::Purge.run(&app.db, app.prober.as_ref()).await.unwrap();
    assert_eq!(report, JobReport::Purge { removed: 1 });

    let remaining = LinkValidity::find().all(&app.db).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].url, "https://up.example");
}

/// Sleeps on every link check and records how many checks overlap.
#[derive(Default)]
struct SlowProber {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl LinkProber for SlowProber {
    async fn probe(&self, _url: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ProbeOutcome::valid("Slow")
    }
}

#[tokio::test]
async fn scheduler_never_overlaps_jobs() {
    let app = setup().await;
    link_validity::ActiveModel {
        url: Set("https://slow.example".to_string()),
        title: Set(None),
        is_valid: Set(true),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .unwrap();

    let prober = Arc::new(SlowProber::default());
    let scheduler = Arc::new(LinkMaintenanceScheduler::new(app.db.clone(), prober.clone()));
    // Refresh ticks far more often than one refresh takes
    let handle = tokio::spawn(scheduler.run_periodic_tasks(Duration::from_millis(10), Duration::from_secs(3600)));
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.abort();

    assert!(prober.calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Admin account
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_password_follows_policy() {
    let app = setup().await;

    let weak = ensure_admin(&app.db, "admin", "12345678").await;
    assert!(matches!(weak, Err(AppError::ValidationFailed(_))));
    let similar = ensure_admin(&app.db, "admin", "admin-password-1").await;
    assert!(matches!(similar, Err(AppError::ValidationFailed(_))));

    assert!(ensure_admin(&app.db, "admin", "correct horse battery").await.unwrap());
    assert!(!ensure_admin(&app.db, "admin", "correct horse battery").await.unwrap());

    let admin = user_service::get_user_by_username(&app.db, "admin").await.unwrap().unwrap();
    assert_eq!(admin.role, user_service::ROLE_ADMIN);
}
