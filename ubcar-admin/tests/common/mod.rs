//! Shared fixtures for the HTTP integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use ubcar_admin::{build_router, AppState};
use ubcar_common::api::auth::load_nonce_secret;
use ubcar_common::db::catalog::{create_layer, create_point};
use ubcar_common::db::init::init_database;
use ubcar_common::db::models::User;
use ubcar_common::db::settings::RuntimeSettings;
use ubcar_common::db::users::{create_session, create_user, NewUser};

pub const BOUNDARY: &str = "----ubcar-test-boundary";

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("ubcar.db")).await.unwrap();
        let secret = load_nonce_secret(&pool).await.unwrap();
        let state = AppState::new(pool, RuntimeSettings::default(), secret, dir.path().join("uploads"))
            .with_public_base_url(Some("https://map.example.org".to_string()));
        let router = build_router(state.clone());
        Self { dir, state, router }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Create a user and a session for them
    pub async fn login_as(&self, username: &str, editor: bool) -> Client {
        let user = create_user(
            self.db(),
            NewUser {
                username: username.to_string(),
                password: "pw".to_string(),
                first_name: "First".to_string(),
                last_name: "Last".to_string(),
                can_edit_pages: editor,
            },
        )
        .await
        .unwrap();
        let token = create_session(self.db(), user.id).await.unwrap();
        let mut client = Client { user, token, nonce: String::new() };
        client.nonce = self.nonce_for(&client).await;
        client
    }

    pub async fn nonce_for(&self, client: &Client) -> String {
        let response = self
            .send(
                Request::get("/api/nonce")
                    .header(header::AUTHORIZATION, client.bearer())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        json_body(response).await["nonce"].as_str().unwrap().to_string()
    }

    pub async fn post_json(&self, client: &Client, uri: &str, body: Value) -> (u16, Value) {
        let response = self
            .send(
                Request::post(uri)
                    .header(header::AUTHORIZATION, client.bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        let status = response.status().as_u16();
        (status, json_body(response).await)
    }

    pub async fn post_form(&self, client: &Client, form: &MultipartForm) -> Response<Body> {
        self.send(
            Request::post("/media")
                .header(header::AUTHORIZATION, client.bearer())
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(form.body()))
                .unwrap(),
        )
        .await
    }

    pub async fn point(&self, title: &str) -> i64 {
        create_point(self.db(), title).await.unwrap().id
    }

    pub async fn layer(&self, title: &str, password: Option<&str>) -> i64 {
        create_layer(self.db(), title, password).await.unwrap().id
    }

    pub async fn media_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM media")
            .fetch_one(self.db())
            .await
            .unwrap()
    }

    pub async fn attachment_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM attachments")
            .fetch_one(self.db())
            .await
            .unwrap()
    }

    /// Files in the uploads directory (0 if it was never created)
    pub fn stored_upload_count(&self) -> usize {
        std::fs::read_dir(&self.state.uploads_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub async fn latest_medium_id(&self) -> i64 {
        sqlx::query_scalar("SELECT MAX(id) FROM media")
            .fetch_one(self.db())
            .await
            .unwrap()
    }
}

pub struct Client {
    pub user: User,
    pub token: String,
    pub nonce: String,
}

impl Client {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Hand-built multipart/form-data body
#[derive(Default)]
pub struct MultipartForm {
    parts: Vec<u8>,
}

impl MultipartForm {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.parts.extend_from_slice(bytes);
        self.parts.extend_from_slice(b"\r\n");
        self
    }

    pub fn body(&self) -> Vec<u8> {
        let mut body = self.parts.clone();
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Should be UTF-8")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
