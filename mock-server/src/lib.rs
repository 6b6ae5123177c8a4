//! In-memory stand-in for the navigation site backend.
//!
//! Implements the endpoints the client calls with just enough behavior for
//! end-to-end tests: accounts, bearer sessions, email confirmation and
//! password-reset tokens, newsletter subscriptions, and admin user
//! management. Emails are never sent; tests read the issued tokens back
//! through `AppState`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NavigationPreferences {
    #[serde(default)]
    pub avoid_tolls: bool,
    #[serde(default)]
    pub avoid_highways: bool,
    #[serde(default)]
    pub avoid_traffic: bool,
    #[serde(default)]
    pub proximity_alert_distance: u32,
    #[serde(default = "default_transport_mode")]
    pub preferred_transport_mode: String,
    #[serde(default)]
    pub show_other_users: bool,
}

fn default_transport_mode() -> String {
    "DRIVING".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub formatted_address: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub reports_submitted: u64,
    pub reports_validated: u64,
    pub routes_completed: u64,
    pub distance_traveled: f64,
    pub time_saved: f64,
    pub rank: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub role: Role,
    pub profile_image: Option<String>,
    pub navigation_preferences: NavigationPreferences,
    pub notification_preferences: NotificationPreferences,
    pub favorite_locations: Vec<FavoriteLocation>,
    pub stats: Stats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
}

#[derive(Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct EmailInput {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetInput {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct SupportInput {
    pub email: String,
    pub subject: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct NewsletterInput {
    pub subject: String,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub navigation_preferences: Option<NavigationPreferences>,
    pub favorite_locations: Option<Vec<FavoriteLocation>>,
}

#[derive(Deserialize)]
pub struct RateInput {
    pub rate: u8,
}

#[derive(Deserialize)]
pub struct LocationInput {
    pub location: String,
}

#[derive(Deserialize)]
pub struct RoleInput {
    pub role: Role,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Account {
    id: Uuid,
    password: String,
    profile: Profile,
    rating: Option<u8>,
    location: Option<String>,
}

impl Account {
    fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.profile.username.clone(),
            email: self.profile.email.clone(),
            role: self.profile.role.clone(),
            email_verified: self.profile.email_verified,
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    accounts: HashMap<Uuid, Account>,
    sessions: HashMap<String, Uuid>,
    confirmations: HashMap<String, Uuid>,
    resets: HashMap<String, Uuid>,
    subscribers: BTreeSet<String>,
    support_messages: Vec<(String, String)>,
    newsletters_sent: usize,
}

impl Store {
    fn find_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.profile.email.eq_ignore_ascii_case(email))
    }

    fn issue(map: &mut HashMap<String, Uuid>, id: Uuid) -> String {
        map.retain(|_, owner| *owner != id);
        let token = Uuid::new_v4().simple().to_string();
        map.insert(token.clone(), id);
        token
    }
}

/// Shared server state. Clones share one store.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verified admin account.
    pub async fn seed_admin(&self, username: &str, email: &str, password: &str) -> Uuid {
        let mut store = self.store.write().await;
        let id = Uuid::new_v4();
        let mut profile = new_profile(username, email);
        profile.role = Role::Admin;
        profile.email_verified = true;
        store.accounts.insert(
            id,
            Account {
                id,
                password: password.to_string(),
                profile,
                rating: None,
                location: None,
            },
        );
        id
    }

    /// The outstanding confirmation token mailed to `email`.
    pub async fn confirmation_token(&self, email: &str) -> Option<String> {
        let store = self.store.read().await;
        let id = store.find_by_email(email)?.id;
        token_for(&store.confirmations, id)
    }

    /// The outstanding password-reset token mailed to `email`.
    pub async fn reset_token(&self, email: &str) -> Option<String> {
        let store = self.store.read().await;
        let id = store.find_by_email(email)?.id;
        token_for(&store.resets, id)
    }

    pub async fn is_subscribed(&self, email: &str) -> bool {
        self.store.read().await.subscribers.contains(&email.to_lowercase())
    }

    pub async fn rating(&self, email: &str) -> Option<u8> {
        self.store.read().await.find_by_email(email)?.rating
    }

    pub async fn location(&self, email: &str) -> Option<String> {
        self.store.read().await.find_by_email(email)?.location.clone()
    }

    pub async fn support_messages(&self) -> usize {
        self.store.read().await.support_messages.len()
    }

    pub async fn newsletters_sent(&self) -> usize {
        self.store.read().await.newsletters_sent
    }
}

fn token_for(map: &HashMap<String, Uuid>, id: Uuid) -> Option<String> {
    map.iter()
        .find(|(_, owner)| **owner == id)
        .map(|(token, _)| token.clone())
}

fn new_profile(username: &str, email: &str) -> Profile {
    Profile {
        username: username.to_string(),
        email: email.to_string(),
        email_verified: false,
        role: Role::User,
        profile_image: None,
        navigation_preferences: NavigationPreferences {
            preferred_transport_mode: default_transport_mode(),
            proximity_alert_distance: 500,
            ..Default::default()
        },
        notification_preferences: NotificationPreferences { email: true },
        favorite_locations: Vec::new(),
        stats: Stats::default(),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler failures. Most render as `{"message": ...}`; bad credentials
/// render as plain text, as the real backend does.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid email or password")]
    BadCredentials,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    BadRequest(&'static str),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            ServerError::Unauthorized | ServerError::BadCredentials => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        if matches!(self, ServerError::BadCredentials) {
            return (status, self.to_string()).into_response();
        }
        let body = serde_json::json!({ "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

type HandlerResult<T> = Result<T, ServerError>;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn caller(store: &Store, headers: &HeaderMap) -> HandlerResult<Uuid> {
    let token = bearer(headers).ok_or(ServerError::Unauthorized)?;
    store
        .sessions
        .get(token)
        .copied()
        .filter(|id| store.accounts.contains_key(id))
        .ok_or(ServerError::Unauthorized)
}

fn admin(store: &Store, headers: &HeaderMap) -> HandlerResult<Uuid> {
    let id = caller(store, headers)?;
    match store.accounts.get(&id) {
        Some(account) if account.profile.role == Role::Admin => Ok(id),
        _ => Err(ServerError::Forbidden),
    }
}

fn account_mut<'a>(store: &'a mut Store, id: &Uuid) -> HandlerResult<&'a mut Account> {
    store.accounts.get_mut(id).ok_or(ServerError::Unauthorized)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn app() -> Router {
    app_with_state(AppState::new())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/confirm-email", post(confirm_email))
        .route(
            "/auth/resend/register-confirmation-email",
            post(resend_confirmation),
        )
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/oauth/google-login", get(google_login))
        .route("/contact/send-support-email", post(support_email))
        .route("/contact/subscribe-newsletter", post(subscribe))
        .route("/contact/unsubscribe-newsletter", post(unsubscribe))
        .route(
            "/private/admin/contact/send-newsletter",
            post(send_newsletter),
        )
        .route(
            "/private/notification/preferences",
            put(notification_preferences),
        )
        .route(
            "/private/user",
            post(get_profile).put(update_profile).delete(delete_account),
        )
        .route("/private/user/profile-image", post(profile_image))
        .route("/private/user/app/rate", post(rate_app))
        .route("/private/user/location", put(update_location))
        .route("/private/admin/users", get(list_users))
        .route(
            "/private/admin/users/{id}",
            axum::routing::delete(delete_user),
        )
        .route("/private/admin/users/{id}/role", post(update_role))
        .route("/protected/user/{username}", get(public_user))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::new()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> HandlerResult<StatusCode> {
    if input.username.trim().is_empty() || input.password.len() < 8 {
        return Err(ServerError::BadRequest("Invalid registration data"));
    }
    let mut store = state.store.write().await;
    if store.find_by_email(&input.email).is_some() {
        return Err(ServerError::Conflict("Email already registered"));
    }
    let id = Uuid::new_v4();
    store.accounts.insert(
        id,
        Account {
            id,
            password: input.password,
            profile: new_profile(&input.username, &input.email),
            rating: None,
            location: None,
        },
    );
    Store::issue(&mut store.confirmations, id);
    tracing::info!(%id, "account registered");
    Ok(StatusCode::CREATED)
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> HandlerResult<String> {
    let mut store = state.store.write().await;
    let id = store
        .find_by_email(&input.email)
        .filter(|a| a.password == input.password)
        .map(|a| a.id)
        .ok_or(ServerError::BadCredentials)?;
    let token = Uuid::new_v4().simple().to_string();
    store.sessions.insert(token.clone(), id);
    Ok(token)
}

async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let id = store
        .confirmations
        .remove(&query.token)
        .ok_or(ServerError::BadRequest("Invalid or expired token"))?;
    account_mut(&mut store, &id)?.profile.email_verified = true;
    Ok(StatusCode::OK)
}

async fn resend_confirmation(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let account = store
        .find_by_email(&input.email)
        .ok_or(ServerError::NotFound("User not found"))?;
    if account.profile.email_verified {
        return Err(ServerError::Conflict("Email already verified"));
    }
    let id = account.id;
    Store::issue(&mut store.confirmations, id);
    Ok(StatusCode::OK)
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> StatusCode {
    let mut store = state.store.write().await;
    // Unknown addresses get the same answer so accounts cannot be probed.
    if let Some(id) = store.find_by_email(&input.email).map(|a| a.id) {
        Store::issue(&mut store.resets, id);
    }
    StatusCode::OK
}

async fn reset_password(
    State(state): State<AppState>,
    Json(input): Json<ResetInput>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let id = store
        .resets
        .remove(&input.token)
        .ok_or(ServerError::BadRequest("Invalid or expired token"))?;
    account_mut(&mut store, &id)?.password = input.new_password;
    store.sessions.retain(|_, owner| *owner != id);
    Ok(StatusCode::OK)
}

async fn google_login() -> Redirect {
    Redirect::temporary(GOOGLE_AUTH_URL)
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

async fn support_email(
    State(state): State<AppState>,
    Json(input): Json<SupportInput>,
) -> HandlerResult<StatusCode> {
    if input.subject.trim().is_empty() || input.content.trim().is_empty() {
        return Err(ServerError::BadRequest("Subject and content are required"));
    }
    state
        .store
        .write()
        .await
        .support_messages
        .push((input.email, input.subject));
    Ok(StatusCode::OK)
}

async fn subscribe(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    if !store.subscribers.insert(input.email.to_lowercase()) {
        return Err(ServerError::Conflict("Email already subscribed"));
    }
    Ok(StatusCode::OK)
}

async fn unsubscribe(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    if !store.subscribers.remove(&input.email.to_lowercase()) {
        return Err(ServerError::NotFound("Email not subscribed"));
    }
    Ok(StatusCode::OK)
}

async fn send_newsletter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<NewsletterInput>,
) -> HandlerResult<Json<serde_json::Value>> {
    let mut store = state.store.write().await;
    admin(&store, &headers)?;
    if input.subject.trim().is_empty() || input.content.trim().is_empty() {
        return Err(ServerError::BadRequest("Subject and content are required"));
    }
    store.newsletters_sent += 1;
    Ok(Json(
        serde_json::json!({ "recipients": store.subscribers.len() }),
    ))
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

async fn notification_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<NotificationPreferences>,
) -> HandlerResult<Json<NotificationPreferences>> {
    let mut store = state.store.write().await;
    let id = caller(&store, &headers)?;
    let account = account_mut(&mut store, &id)?;
    account.profile.notification_preferences = input.clone();
    Ok(Json(input))
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult<Json<Profile>> {
    let store = state.store.read().await;
    let id = caller(&store, &headers)?;
    let account = store.accounts.get(&id).ok_or(ServerError::Unauthorized)?;
    Ok(Json(account.profile.clone()))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ProfileUpdate>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let id = caller(&store, &headers)?;
    let account = account_mut(&mut store, &id)?;
    if let Some(username) = input.username {
        if username.trim().is_empty() {
            return Err(ServerError::BadRequest("Username is required"));
        }
        account.profile.username = username;
    }
    if let Some(prefs) = input.navigation_preferences {
        account.profile.navigation_preferences = prefs;
    }
    if let Some(locations) = input.favorite_locations {
        account.profile.favorite_locations = locations;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let id = caller(&store, &headers)?;
    store.accounts.remove(&id);
    store.sessions.retain(|_, owner| *owner != id);
    Ok(StatusCode::NO_CONTENT)
}

async fn profile_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult<Json<serde_json::Value>> {
    let mut store = state.store.write().await;
    let id = caller(&store, &headers)?;
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data; boundary="));
    if !is_multipart || body.is_empty() {
        return Err(ServerError::BadRequest("Expected a multipart file upload"));
    }
    let url = format!("/images/{}", Uuid::new_v4().simple());
    account_mut(&mut store, &id)?.profile.profile_image = Some(url.clone());
    Ok(Json(serde_json::json!({ "profileImage": url })))
}

async fn rate_app(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RateInput>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let id = caller(&store, &headers)?;
    if !(1..=5).contains(&input.rate) {
        return Err(ServerError::BadRequest("Rating must be between 1 and 5"));
    }
    account_mut(&mut store, &id)?.rating = Some(input.rate);
    Ok(StatusCode::OK)
}

async fn update_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LocationInput>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let id = caller(&store, &headers)?;
    account_mut(&mut store, &id)?.location = Some(input.location);
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult<Json<Vec<UserSummary>>> {
    let store = state.store.read().await;
    admin(&store, &headers)?;
    let mut users: Vec<UserSummary> = store.accounts.values().map(Account::summary).collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(Json(users))
}

async fn public_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> HandlerResult<Json<Profile>> {
    let store = state.store.read().await;
    caller(&store, &headers)?;
    let account = store
        .accounts
        .values()
        .find(|a| a.profile.username == username)
        .ok_or(ServerError::NotFound("User not found"))?;
    let mut profile = account.profile.clone();
    profile.email = String::new();
    Ok(Json(profile))
}

async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<RoleInput>,
) -> HandlerResult<Json<UserSummary>> {
    let mut store = state.store.write().await;
    admin(&store, &headers)?;
    let account = store
        .accounts
        .get_mut(&id)
        .ok_or(ServerError::NotFound("User not found"))?;
    account.profile.role = input.role;
    Ok(Json(account.summary()))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> HandlerResult<StatusCode> {
    let mut store = state.store.write().await;
    let caller_id = admin(&store, &headers)?;
    if caller_id == id {
        return Err(ServerError::BadRequest("Admins cannot delete themselves"));
    }
    store
        .accounts
        .remove(&id)
        .ok_or(ServerError::NotFound("User not found"))?;
    store.sessions.retain(|_, owner| *owner != id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_serializes_camel_case() {
        let profile = new_profile("ana", "ana@example.com");
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["emailVerified"], false);
        assert_eq!(json["role"], "USER");
        assert_eq!(json["navigationPreferences"]["preferredTransportMode"], "DRIVING");
        assert_eq!(json["notificationPreferences"]["email"], true);
    }

    #[test]
    fn profile_update_all_fields_optional() {
        let input: ProfileUpdate = serde_json::from_str("{}").unwrap();
        assert!(input.username.is_none());
        assert!(input.navigation_preferences.is_none());
        assert!(input.favorite_locations.is_none());
    }

    #[test]
    fn reset_input_reads_camel_case() {
        let input: ResetInput =
            serde_json::from_str(r#"{"token":"t","newPassword":"Secret12!"}"#).unwrap();
        assert_eq!(input.new_password, "Secret12!");
    }

    #[test]
    fn issuing_replaces_previous_token() {
        let mut map = HashMap::new();
        let id = Uuid::new_v4();
        let first = Store::issue(&mut map, id);
        let second = Store::issue(&mut map, id);
        assert_ne!(first, second);
        assert_eq!(map.len(), 1);
        assert_eq!(token_for(&map, id), Some(second));
    }

    #[test]
    fn bad_credentials_render_as_text() {
        let response = ServerError::BadCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
