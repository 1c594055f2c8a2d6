//! In-process application for handler tests: in-memory SQLite, temp dirs.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::{self, token};
use crate::config::Config;
use crate::entities::SqliteStore;
use crate::services::company::CompanyInfo;
use crate::state::AppState;

/// Nothing listens here; connections are refused immediately.
pub const DEAD_UPSTREAM: &str = "http://127.0.0.1:9";

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_ollama(url: &str) -> Self {
        let url = url.to_owned();
        Self::with_config(move |c| c.ai_server_url = url).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let mut config = Config::from_lookup(|_| None);
        config.ai_server_url = DEAD_UPSTREAM.into();
        config.secret_key = "test-secret".into();
        config.company_info_dir = root.path().join("company_info");
        config.uploads_dir = root.path().join("uploads");
        config.static_dir = root.path().join("static");
        config.request_timeout = Duration::from_secs(5);
        tweak(&mut config);

        let store = SqliteStore::connect_in_memory().await.expect("store");
        let company = CompanyInfo::load(&config.company_info_dir);
        let state = Arc::new(AppState::new(config, store, company).expect("state"));
        state.files.ensure_dirs().await.expect("dirs");
        let router = crate::routes::build(state.clone());
        Self { state, router, root }
    }

    /// Create the admin account (`admin` / `admin123`).
    pub async fn seed_admin(&self) {
        auth::ensure_admin(self.state.store.as_ref(), "admin", "admin123").await.expect("admin");
    }

    pub fn token_for(&self, username: &str) -> String {
        token::issue(&self.state.config.secret_key, username, "user", Duration::from_secs(3600)).expect("token")
    }

    pub fn token(&self) -> String {
        self.token_for("alice")
    }

    pub async fn send_raw(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, axum::body::Bytes) {
        let resp = self.router.clone().oneshot(req).await.expect("infallible");
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.expect("body").to_bytes();
        (status, headers, body)
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(req).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::get(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        self.send(req.body(Body::empty()).expect("request")).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request("POST", uri, token, &body)).await
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    req.body(Body::from(body.to_string())).expect("request")
}

/// Hand-built `multipart/form-data` body.
pub fn multipart_request(uri: &str, token: &str, fields: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    const BOUNDARY: &str = "nora-test-boundary";
    let mut body = Vec::new();
    for (name, file_name, content) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body
                .extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes()),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .expect("request")
}
