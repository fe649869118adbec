//! Shared harness: in-memory store and catalog, a temp media root and a
//! session-backed router.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Query,
    http::{header, Request, Response, StatusCode},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use serde::Deserialize;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

use vodgate::api::middleware::session::{
    AppState, SESSION_KEY_CSRF_TOKEN, SESSION_KEY_IS_ADMIN, SESSION_KEY_USER_ID,
};
use vodgate::config::VodSettings;
use vodgate::db::InMemoryEntitlementStore;
use vodgate::models::Product;
use vodgate::services::catalog::InMemoryCatalog;
use vodgate::services::delivery::DeliveryMode;
use vodgate::services::entitlement::EntitlementService;
use vodgate::services::token::TokenSigner;

pub const SECRET_KEY: &str = "test-secret-key";
pub const SITE_URL: &str = "https://shop.example.com";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Bytes of `videos/clip.mp4`: 1000 bytes, `i % 251`.
pub fn clip_bytes() -> Vec<u8> {
    (0..1000u32).map(|i| (i % 251) as u8).collect()
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryEntitlementStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub entitlements: EntitlementService,
    pub tokens: TokenSigner,
    pub media: TempDir,
}

pub fn product(id: i64, product_type: &str, locator: Option<&str>) -> Product {
    let mut meta = HashMap::new();
    if let Some(locator) = locator {
        meta.insert("_vod_stream_url".to_string(), locator.to_string());
    }
    Product {
        id,
        name: Some(format!("Film {}", id)),
        product_type: product_type.to_string(),
        meta,
        ..Default::default()
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_mode(DeliveryMode::Redirect).await
    }

    pub async fn with_mode(delivery_mode: DeliveryMode) -> Self {
        let media = tempfile::tempdir().unwrap();
        let root = media.path().join("root");
        tokio::fs::create_dir_all(root.join("videos")).await.unwrap();
        tokio::fs::write(root.join("videos/clip.mp4"), clip_bytes())
            .await
            .unwrap();
        tokio::fs::write(media.path().join("secret.txt"), b"outside the root")
            .await
            .unwrap();

        let mut parent = product(10, "variable", Some("videos/clip.mp4"));
        parent.children = vec![11];
        let mut variation = product(11, "variation", None);
        variation.parent_id = Some(10);

        let catalog = Arc::new(InMemoryCatalog::with_products([
            product(7, "vod", Some("videos/clip.mp4")),
            product(8, "vod", Some("../secret.txt")),
            product(12, "vod", None),
            parent,
            variation,
        ]));

        let store = Arc::new(InMemoryEntitlementStore::new());
        let entitlements = EntitlementService::new(store.clone());

        let settings = VodSettings {
            delivery_mode,
            storage_root: root,
            debug: true,
            ..VodSettings::default()
        };

        let state = AppState::new(
            entitlements.clone(),
            catalog.clone(),
            TokenSigner::new(SECRET_KEY, SITE_URL),
            settings,
            Secret::new(WEBHOOK_SECRET.to_string()),
            reqwest::Client::new(),
        );

        let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);

        let router = vodgate::api::router()
            .route("/test/login", get(test_login))
            .layer(session_layer)
            .with_state(state);

        Self {
            router,
            store,
            catalog,
            entitlements,
            tokens: TokenSigner::new(SECRET_KEY, SITE_URL),
            media,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, cookie: &str, form: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Logs in through the test-only route and returns the session cookie.
    pub async fn login(&self, user_id: i64, is_admin: bool) -> String {
        let response = self
            .get(
                &format!("/test/login?user_id={}&admin={}&csrf=test-csrf", user_id, is_admin),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("login sets a session cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }
}

#[derive(Deserialize)]
struct LoginQuery {
    user_id: i64,
    admin: bool,
    csrf: String,
}

/// Stands in for the platform's login bridge.
async fn test_login(session: Session, Query(query): Query<LoginQuery>) -> StatusCode {
    session.insert(SESSION_KEY_USER_ID, query.user_id).await.unwrap();
    session.insert(SESSION_KEY_IS_ADMIN, query.admin).await.unwrap();
    session.insert(SESSION_KEY_CSRF_TOKEN, query.csrf).await.unwrap();
    StatusCode::OK
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn header_str<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
}
