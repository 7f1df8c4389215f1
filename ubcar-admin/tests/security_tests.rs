//! Ownership, nonce and session enforcement

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use ubcar_common::db::index::{layer_media, point_media};
use ubcar_common::db::media::get_medium;

use common::{MultipartForm, TestApp};

/// Creates an external link owned by `client` at `point` in `layer`
async fn seed_medium(app: &TestApp, client: &common::Client, point: i64, layer: i64) -> i64 {
    let form = MultipartForm::default()
        .text("nonce", &client.nonce)
        .text("media_type", "external")
        .text("external_url", "example.org")
        .text("title", "Owned")
        .text("location", &point.to_string())
        .text("layers", &layer.to_string());
    let response = app.post_form(client, &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    app.latest_medium_id().await
}

#[tokio::test]
async fn test_contributor_cannot_touch_others_media() {
    let app = TestApp::new().await;
    let owner = app.login_as("ada", false).await;
    let other = app.login_as("mallory", false).await;
    let point = app.point("A").await;
    let layer = app.layer("Tour", None).await;
    let id = seed_medium(&app, &owner, point, layer).await;

    let (status, body) = app
        .post_json(&other, "/api/media/delete", json!({"id": id, "nonce": other.nonce, "author_name": ""}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!(1));

    let (_, body) = app
        .post_json(&other, "/api/media/edit", json!({"id": id, "nonce": other.nonce}))
        .await;
    assert_eq!(body, json!(0));

    let (_, body) = app
        .post_json(
            &other,
            "/api/media/edit-submit",
            json!({"id": id, "nonce": other.nonce, "title": "pwned", "location": 0, "layers": []}),
        )
        .await;
    assert_eq!(body, json!(0));

    let medium = get_medium(app.db(), id).await.unwrap().unwrap();
    assert_eq!(medium.title, "Owned");
    assert_eq!(point_media(app.db(), point).await.unwrap(), vec![id]);
    assert_eq!(layer_media(app.db(), layer).await.unwrap(), vec![id]);
}

#[tokio::test]
async fn test_editor_can_manage_others_media() {
    let app = TestApp::new().await;
    let owner = app.login_as("ada", false).await;
    let editor = app.login_as("boss", true).await;
    let point = app.point("A").await;
    let layer = app.layer("Tour", None).await;
    let id = seed_medium(&app, &owner, point, layer).await;

    let (_, body) = app
        .post_json(&editor, "/api/media/edit", json!({"id": id, "nonce": editor.nonce}))
        .await;
    assert_eq!(body["ID"], id);

    let (_, body) = app
        .post_json(&editor, "/api/media/delete", json!({"id": id, "nonce": editor.nonce, "author_name": ""}))
        .await;
    assert_eq!(body, json!([]));
    assert!(get_medium(app.db(), id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bad_nonce_yields_sentinels() {
    let app = TestApp::new().await;
    let owner = app.login_as("ada", false).await;
    let point = app.point("A").await;
    let layer = app.layer("Tour", None).await;
    let id = seed_medium(&app, &owner, point, layer).await;

    let (_, body) = app
        .post_json(&owner, "/api/media/delete", json!({"id": id, "nonce": "bogus", "author_name": ""}))
        .await;
    assert_eq!(body, json!(1));

    let (_, body) = app
        .post_json(&owner, "/api/media/edit", json!({"id": id, "nonce": ""}))
        .await;
    assert_eq!(body, json!(0));

    let (_, body) = app
        .post_json(
            &owner,
            "/api/media/edit-submit",
            json!({"id": id, "nonce": "0123456789abcdef0123", "title": "changed", "location": point, "layers": [layer]}),
        )
        .await;
    assert_eq!(body, json!(0));

    assert_eq!(get_medium(app.db(), id).await.unwrap().unwrap().title, "Owned");
}

#[tokio::test]
async fn test_create_with_bad_nonce_is_forbidden() {
    let app = TestApp::new().await;
    let user = app.login_as("ada", false).await;

    let form = MultipartForm::default()
        .text("nonce", "not-a-real-nonce")
        .text("media_type", "external")
        .text("external_url", "example.org")
        .text("title", "Sneaky");
    let response = app.post_form(&user, &form).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.media_count().await, 0);
}

#[tokio::test]
async fn test_nonce_bound_to_session() {
    let app = TestApp::new().await;
    let ada = app.login_as("ada", false).await;
    let mallory = app.login_as("mallory", false).await;
    let point = app.point("A").await;
    let layer = app.layer("Tour", None).await;
    let id = seed_medium(&app, &ada, point, layer).await;

    // Ada's own request carrying a nonce issued to another session
    let (_, body) = app
        .post_json(&ada, "/api/media/delete", json!({"id": id, "nonce": mallory.nonce, "author_name": ""}))
        .await;
    assert_eq!(body, json!(1));
    assert!(get_medium(app.db(), id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_contributor_cannot_use_protected_layer() {
    let app = TestApp::new().await;
    let user = app.login_as("ada", false).await;
    let open = app.layer("Open", None).await;
    let locked = app.layer("Locked", Some("secret")).await;
    let point = app.point("A").await;

    let form = MultipartForm::default()
        .text("nonce", &user.nonce)
        .text("media_type", "external")
        .text("external_url", "example.org")
        .text("title", "Locked out")
        .text("layers", &locked.to_string());
    let response = app.post_form(&user, &form).await;
    assert_eq!(common::location(&response), "/?load=failure");
    assert_eq!(app.media_count().await, 0);

    let id = seed_medium(&app, &user, point, open).await;
    let (_, body) = app
        .post_json(
            &user,
            "/api/media/edit-submit",
            json!({"id": id, "nonce": user.nonce, "title": "Owned", "location": point, "layers": [open, locked]}),
        )
        .await;
    assert_eq!(body, json!(0));
    assert!(layer_media(app.db(), locked).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_contributor_cannot_create_wiki() {
    let app = TestApp::new().await;
    let user = app.login_as("ada", false).await;

    let form = MultipartForm::default()
        .text("nonce", &user.nonce)
        .text("media_type", "wiki")
        .text("wiki_url", "https://wiki.ubc.ca/Page")
        .text("title", "Not allowed");
    let response = app.post_form(&user, &form).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(common::location(&response), "/?load=failure");
    assert_eq!(app.media_count().await, 0);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = TestApp::new().await;

    for (method, uri) in [
        ("GET", "/api/nonce"),
        ("POST", "/api/media/initial"),
        ("POST", "/api/media/delete"),
        ("POST", "/media"),
    ] {
        let response = app
            .send(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }

    let response = app
        .send(
            Request::get("/api/nonce")
                .header(header::AUTHORIZATION, "Bearer not-a-session")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let app = TestApp::new().await;
    let user = app.login_as("ada", false).await;

    let response = app
        .send(
            Request::post("/api/logout")
                .header(header::AUTHORIZATION, user.bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let (status, _) = app
        .post_json(&user, "/api/media/initial", json!({"author_name": ""}))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_idle_session_expires() {
    let app = TestApp::new().await;
    let user = app.login_as("ada", false).await;

    sqlx::query("UPDATE sessions SET last_seen_at = 0 WHERE token = ?")
        .bind(&user.token)
        .execute(app.db())
        .await
        .unwrap();

    let (status, body) = app
        .post_json(&user, "/api/media/initial", json!({"author_name": ""}))
        .await;
    assert_eq!(status, 401);
    assert!(body["error"].is_string());
}
