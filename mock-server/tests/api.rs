use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, AppState, Profile, UserSummary, GOOGLE_AUTH_URL};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes: bytes::Bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body.to_string())
        .unwrap()
}

async fn call(app: &Router, request: Request<String>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let resp = call(
        app,
        json_request(
            "POST",
            "/auth/register",
            &format!(r#"{{"username":"ana","email":"{email}","password":"Secret12!"}}"#),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = call(
        app,
        json_request(
            "POST",
            "/auth/login",
            &format!(r#"{{"email":"{email}","password":"Secret12!"}}"#),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_text(resp).await
}

// --- auth ---

#[tokio::test]
async fn duplicate_registration_is_conflict() {
    let app = app();
    register_and_login(&app, "ana@example.com").await;
    let resp = call(
        &app,
        json_request(
            "POST",
            "/auth/register",
            r#"{"username":"ana2","email":"ANA@example.com","password":"Secret12!"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["message"], "Email already registered");
}

#[tokio::test]
async fn wrong_password_is_plain_text_401() {
    let app = app();
    register_and_login(&app, "ana@example.com").await;
    let resp = call(
        &app,
        json_request(
            "POST",
            "/auth/login",
            r#"{"email":"ana@example.com","password":"nope"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(resp).await, "Invalid email or password");
}

#[tokio::test]
async fn confirm_email_with_issued_token() {
    let state = AppState::new();
    let app = app_with_state(state.clone());
    let token = register_and_login(&app, "ana@example.com").await;

    let confirmation = state.confirmation_token("ana@example.com").await.unwrap();
    let resp = call(
        &app,
        json_request("POST", &format!("/auth/confirm-email?token={confirmation}"), ""),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&app, authed("POST", "/private/user", &token, "")).await;
    let profile: Profile = body_json(resp).await;
    assert!(profile.email_verified);

    // Tokens are single use.
    let resp = call(
        &app,
        json_request("POST", &format!("/auth/confirm-email?token={confirmation}"), ""),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_password_invalidates_sessions() {
    let state = AppState::new();
    let app = app_with_state(state.clone());
    let old_session = register_and_login(&app, "ana@example.com").await;

    let resp = call(
        &app,
        json_request("POST", "/auth/forgot-password", r#"{"email":"ana@example.com"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let reset = state.reset_token("ana@example.com").await.unwrap();

    let resp = call(
        &app,
        json_request(
            "POST",
            "/auth/reset-password",
            &format!(r#"{{"token":"{reset}","newPassword":"Another12!"}}"#),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&app, authed("POST", "/private/user", &old_session, "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forgot_password_for_unknown_email_is_ok() {
    let resp = call(
        &app(),
        json_request("POST", "/auth/forgot-password", r#"{"email":"ghost@example.com"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn google_login_redirects() {
    let resp = call(
        &app(),
        Request::builder()
            .uri("/oauth/google-login")
            .body(String::new())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.headers()[http::header::LOCATION], GOOGLE_AUTH_URL);
}

// --- private ---

#[tokio::test]
async fn private_routes_require_bearer() {
    let app = app();
    let resp = call(&app, json_request("POST", "/private/user", "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = call(&app, authed("POST", "/private/user", "forged", "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_update_and_preferences() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;

    let resp = call(
        &app,
        authed(
            "PUT",
            "/private/user",
            &token,
            r#"{"username":"ana_r","navigationPreferences":{"avoidTolls":true}}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = call(
        &app,
        authed("PUT", "/private/notification/preferences", &token, r#"{"email":false}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&app, authed("POST", "/private/user", &token, "")).await;
    let profile: Profile = body_json(resp).await;
    assert_eq!(profile.username, "ana_r");
    assert!(profile.navigation_preferences.avoid_tolls);
    assert!(!profile.notification_preferences.email);
}

#[tokio::test]
async fn profile_image_checks_auth_before_payload() {
    let app = app();
    let resp = call(&app, json_request("POST", "/private/user/profile-image", "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let token = register_and_login(&app, "ana@example.com").await;
    let resp = call(&app, authed("POST", "/private/user/profile-image", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rating_out_of_range_is_rejected() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;
    let resp = call(&app, authed("POST", "/private/user/app/rate", &token, r#"{"rate":9}"#)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_account_ends_session() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;
    let resp = call(&app, authed("DELETE", "/private/user", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = call(&app, authed("POST", "/private/user", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- contact ---

#[tokio::test]
async fn newsletter_subscription_lifecycle() {
    let state = AppState::new();
    let app = app_with_state(state.clone());
    let body = r#"{"email":"reader@example.com"}"#;

    let resp = call(&app, json_request("POST", "/contact/subscribe-newsletter", body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(state.is_subscribed("reader@example.com").await);

    let resp = call(&app, json_request("POST", "/contact/subscribe-newsletter", body)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = call(&app, json_request("POST", "/contact/unsubscribe-newsletter", body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = call(&app, json_request("POST", "/contact/unsubscribe-newsletter", body)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- admin ---

#[tokio::test]
async fn admin_routes_are_forbidden_to_users() {
    let app = app();
    let token = register_and_login(&app, "ana@example.com").await;
    let resp = call(&app, authed("GET", "/private/admin/users", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = call(
        &app,
        authed(
            "POST",
            "/private/admin/contact/send-newsletter",
            &token,
            r#"{"subject":"s","content":"c"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_manages_users() {
    let state = AppState::new();
    state
        .seed_admin("admin", "admin@example.com", "Admin123!")
        .await;
    let app = app_with_state(state);
    register_and_login(&app, "ana@example.com").await;

    let resp = call(
        &app,
        json_request(
            "POST",
            "/auth/login",
            r#"{"email":"admin@example.com","password":"Admin123!"}"#,
        ),
    )
    .await;
    let admin = body_text(resp).await;

    let resp = call(&app, authed("GET", "/private/admin/users", &admin, "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let users: Vec<UserSummary> = body_json(resp).await;
    assert_eq!(users.len(), 2);
    let ana = users.iter().find(|u| u.username == "ana").unwrap().id;

    let resp = call(
        &app,
        authed(
            "POST",
            &format!("/private/admin/users/{ana}/role"),
            &admin,
            r#"{"role":"ADMIN"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: UserSummary = body_json(resp).await;
    assert_eq!(updated.role, mock_server::Role::Admin);

    let resp = call(
        &app,
        authed("DELETE", &format!("/private/admin/users/{ana}"), &admin, ""),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = call(&app, authed("GET", "/protected/user/ana", &admin, "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
