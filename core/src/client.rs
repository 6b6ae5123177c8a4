//! Stateless HTTP request builder and response parser for the navigation
//! site API.
//!
//! # Design
//! `ApiClient` holds only a `base_url`. Each endpoint is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method
//! that consumes an `HttpResponse`; the caller (usually `Session`) performs
//! the round-trip in between.
//!
//! Authenticated builders take the credential store and fail with
//! `ApiError::Unauthenticated` before building anything when it holds no
//! token. Every parser goes through `check_status`, the one place non-2xx
//! responses become errors.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::types::{
    EmailRequest, ImageUpload, LocationUpdate, LoginRequest, Newsletter, NotificationPreferences,
    RateRequest, RegisterRequest, ResetPasswordRequest, Role, RoleUpdate, SupportEmail,
    UpdateProfile, UserProfile, UserSummary,
};

/// Synchronous, stateless client for the navigation site API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub fn build_register(&self, input: &RegisterRequest) -> Result<HttpRequest, ApiError> {
        json_request(HttpMethod::Post, self.url("/auth/register"), input)
    }

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest, ApiError> {
        json_request(HttpMethod::Post, self.url("/auth/login"), input)
    }

    pub fn build_confirm_email(&self, token: &str) -> HttpRequest {
        let path = format!("/auth/confirm-email?token={}", urlencoding::encode(token));
        bare_request(HttpMethod::Post, self.url(&path))
    }

    pub fn build_resend_confirmation_email(&self, email: &str) -> Result<HttpRequest, ApiError> {
        let input = EmailRequest {
            email: email.to_string(),
        };
        json_request(
            HttpMethod::Post,
            self.url("/auth/resend/register-confirmation-email"),
            &input,
        )
    }

    pub fn build_forgot_password(&self, email: &str) -> Result<HttpRequest, ApiError> {
        let input = EmailRequest {
            email: email.to_string(),
        };
        json_request(HttpMethod::Post, self.url("/auth/forgot-password"), &input)
    }

    pub fn build_reset_password(
        &self,
        input: &ResetPasswordRequest,
    ) -> Result<HttpRequest, ApiError> {
        json_request(HttpMethod::Post, self.url("/auth/reset-password"), input)
    }

    /// Where to send the browser to start Google sign-in. Never fetched by
    /// the client itself.
    pub fn google_login_url(&self) -> String {
        self.url("/oauth/google-login")
    }

    /// The login response body is the bearer token itself. A JSON string
    /// literal is unwrapped; surrounding whitespace is dropped.
    pub fn parse_login(&self, response: HttpResponse) -> Result<String, ApiError> {
        check_status(&response)?;
        let text = response.body.trim();
        let token = if text.starts_with('"') {
            serde_json::from_str::<String>(text)
                .map_err(|e| ApiError::Deserialization(e.to_string()))?
        } else {
            text.to_string()
        };
        if token.is_empty() {
            return Err(ApiError::Deserialization("login returned no token".to_string()));
        }
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Contact
    // -----------------------------------------------------------------------

    pub fn build_send_support_email(&self, input: &SupportEmail) -> Result<HttpRequest, ApiError> {
        json_request(
            HttpMethod::Post,
            self.url("/contact/send-support-email"),
            input,
        )
    }

    pub fn build_subscribe_newsletter(&self, email: &str) -> Result<HttpRequest, ApiError> {
        let input = EmailRequest {
            email: email.to_string(),
        };
        json_request(
            HttpMethod::Post,
            self.url("/contact/subscribe-newsletter"),
            &input,
        )
    }

    pub fn build_unsubscribe_newsletter(&self, email: &str) -> Result<HttpRequest, ApiError> {
        let input = EmailRequest {
            email: email.to_string(),
        };
        json_request(
            HttpMethod::Post,
            self.url("/contact/unsubscribe-newsletter"),
            &input,
        )
    }

    pub fn build_send_newsletter(
        &self,
        credentials: &dyn CredentialStore,
        input: &Newsletter,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let req = json_request(
            HttpMethod::Post,
            self.url("/private/admin/contact/send-newsletter"),
            input,
        )?;
        Ok(with_bearer(req, &token))
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub fn build_update_notification_preferences(
        &self,
        credentials: &dyn CredentialStore,
        input: &NotificationPreferences,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let req = json_request(
            HttpMethod::Put,
            self.url("/private/notification/preferences"),
            input,
        )?;
        Ok(with_bearer(req, &token))
    }

    // -----------------------------------------------------------------------
    // User
    // -----------------------------------------------------------------------

    /// The backend serves the caller's own profile on `POST /private/user`.
    pub fn build_get_profile(
        &self,
        credentials: &dyn CredentialStore,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        Ok(with_bearer(
            bare_request(HttpMethod::Post, self.url("/private/user")),
            &token,
        ))
    }

    pub fn build_update_profile(
        &self,
        credentials: &dyn CredentialStore,
        input: &UpdateProfile,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let req = json_request(HttpMethod::Put, self.url("/private/user"), input)?;
        Ok(with_bearer(req, &token))
    }

    pub fn build_delete_account(
        &self,
        credentials: &dyn CredentialStore,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        Ok(with_bearer(
            bare_request(HttpMethod::Delete, self.url("/private/user")),
            &token,
        ))
    }

    pub fn build_upload_profile_image(
        &self,
        credentials: &dyn CredentialStore,
        image: &ImageUpload,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let boundary = format!("navsite-{}", Uuid::new_v4().simple());
        let req = HttpRequest {
            method: HttpMethod::Post,
            path: self.url("/private/user/profile-image"),
            headers: vec![(
                "content-type".to_string(),
                format!("multipart/form-data; boundary={boundary}"),
            )],
            body: Some(RequestBody::Multipart(multipart_file(&boundary, image))),
        };
        Ok(with_bearer(req, &token))
    }

    pub fn build_rate_app(
        &self,
        credentials: &dyn CredentialStore,
        rate: u8,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let req = json_request(
            HttpMethod::Post,
            self.url("/private/user/app/rate"),
            &RateRequest { rate },
        )?;
        Ok(with_bearer(req, &token))
    }

    pub fn build_update_location(
        &self,
        credentials: &dyn CredentialStore,
        location: &str,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let input = LocationUpdate {
            location: location.to_string(),
        };
        let req = json_request(HttpMethod::Put, self.url("/private/user/location"), &input)?;
        Ok(with_bearer(req, &token))
    }

    pub fn parse_profile(&self, response: HttpResponse) -> Result<UserProfile, ApiError> {
        self.parse_json(response)
    }

    // -----------------------------------------------------------------------
    // Admin user management
    // -----------------------------------------------------------------------

    pub fn build_list_users(
        &self,
        credentials: &dyn CredentialStore,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        Ok(with_bearer(
            bare_request(HttpMethod::Get, self.url("/private/admin/users")),
            &token,
        ))
    }

    pub fn build_get_public_user(
        &self,
        credentials: &dyn CredentialStore,
        username: &str,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let path = format!("/protected/user/{}", urlencoding::encode(username));
        Ok(with_bearer(
            bare_request(HttpMethod::Get, self.url(&path)),
            &token,
        ))
    }

    pub fn build_update_user_role(
        &self,
        credentials: &dyn CredentialStore,
        id: Uuid,
        role: Role,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        let req = json_request(
            HttpMethod::Post,
            self.url(&format!("/private/admin/users/{id}/role")),
            &RoleUpdate { role },
        )?;
        Ok(with_bearer(req, &token))
    }

    pub fn build_delete_user(
        &self,
        credentials: &dyn CredentialStore,
        id: Uuid,
    ) -> Result<HttpRequest, ApiError> {
        let token = require_token(credentials)?;
        Ok(with_bearer(
            bare_request(HttpMethod::Delete, self.url(&format!("/private/admin/users/{id}"))),
            &token,
        ))
    }

    pub fn parse_list_users(&self, response: HttpResponse) -> Result<Vec<UserSummary>, ApiError> {
        self.parse_json(response)
    }

    // -----------------------------------------------------------------------
    // Generic parsers
    // -----------------------------------------------------------------------

    /// Parse a typed JSON body.
    pub fn parse_json<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        check_status(&response)?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Parse any JSON body; an empty body is an empty object.
    pub fn parse_value(&self, response: HttpResponse) -> Result<serde_json::Value, ApiError> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Accept any success response and discard its body.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }
}

/// Map a non-success status to `ApiError::Http`.
///
/// The message is the `message` (or `error`) field of a JSON error body,
/// else the raw body text, else `HTTP error <status>`.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let message = error_message(response.status, &response.body);
    tracing::warn!(status = response.status, %message, "request rejected");
    Err(ApiError::Http {
        status: response.status,
        message,
    })
}

fn error_message(status: u16, body: &str) -> String {
    let text = body.trim();
    if text.is_empty() {
        return format!("HTTP error {status}");
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(fields)) => ["message", "error"]
            .iter()
            .filter_map(|key| fields.get(*key).and_then(|v| v.as_str()))
            .find(|msg| !msg.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP error {status}")),
        Ok(serde_json::Value::String(msg)) if !msg.trim().is_empty() => msg.trim().to_string(),
        _ => text.to_string(),
    }
}

fn require_token(credentials: &dyn CredentialStore) -> Result<String, ApiError> {
    credentials.get_token().ok_or(ApiError::Unauthenticated)
}

fn with_bearer(mut req: HttpRequest, token: &str) -> HttpRequest {
    req.headers
        .push(("authorization".to_string(), format!("Bearer {token}")));
    req
}

fn bare_request(method: HttpMethod, path: String) -> HttpRequest {
    HttpRequest {
        method,
        path,
        headers: Vec::new(),
        body: None,
    }
}

fn json_request<T: Serialize>(
    method: HttpMethod,
    path: String,
    input: &T,
) -> Result<HttpRequest, ApiError> {
    let body = serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
    Ok(HttpRequest {
        method,
        path,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Some(RequestBody::Json(body)),
    })
}

fn multipart_file(boundary: &str, image: &ImageUpload) -> Vec<u8> {
    let file_name = image.file_name.replace('"', "");
    let mut body = Vec::with_capacity(image.bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", image.content_type).as_bytes());
    body.extend_from_slice(&image.bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
