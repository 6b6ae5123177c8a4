//! A signed-in (or signed-out) user's view of the API.
//!
//! # Design
//! `Session` owns the stateless `ApiClient`, a `Transport`, the
//! `TokenStore` and the resend cooldown, and runs each operation as
//! validate → build → execute → parse. Validation and missing-credential
//! failures return before the transport is touched. The fetched profile is
//! cached until the next mutation.

use std::sync::Arc;

use uuid::Uuid;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::cooldown::{now_millis, ResendCooldown};
use crate::credentials::{CookieCredentialStore, CredentialStore, TokenStore};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::types::{
    ImageUpload, LoginRequest, Newsletter, NotificationPreferences, RegisterRequest,
    ResetPasswordRequest, Role, SupportEmail, UpdateProfile, UserProfile, UserSummary,
};
use crate::validation;

pub struct Session<T> {
    client: ApiClient,
    transport: T,
    tokens: TokenStore,
    cooldown: ResendCooldown,
    profile: Option<UserProfile>,
}

impl<T: Transport> Session<T> {
    pub fn new(client: ApiClient, transport: T, tokens: TokenStore) -> Self {
        let cooldown = ResendCooldown::new(Arc::clone(tokens.local()));
        Self {
            client,
            transport,
            tokens,
            cooldown,
            profile: None,
        }
    }

    /// Build a session from configuration, opening the local store file if
    /// one is configured.
    pub fn from_config(config: &ClientConfig, transport: T) -> Result<Self, ApiError> {
        let local: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let tokens = TokenStore::new(local, CookieCredentialStore::new(config.cookie_ttl));
        Ok(Self::new(
            ApiClient::new(&config.api_base_url),
            transport,
            tokens,
        ))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.get_token().is_some()
    }

    /// Record the user's cookie-consent choice. Takes effect for the next
    /// token read or write.
    pub fn set_cookie_consent(&mut self, accepted: bool) -> Result<(), ApiError> {
        self.tokens.set_consent(accepted)?;
        Ok(())
    }

    /// `Set-Cookie` values for token cookie changes the host has not yet
    /// forwarded, such as the removal cookie written on logout.
    pub fn take_set_cookie_headers(&self) -> Vec<String> {
        self.tokens.cookies().take_set_cookie_headers()
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(method = %request.method, path = %request.path, "sending request");
        let response = self.transport.execute(request)?;
        tracing::debug!(status = response.status, "received response");
        if self.tokens.consent() {
            for (name, value) in &response.headers {
                if name.eq_ignore_ascii_case("set-cookie") {
                    self.tokens.cookies().absorb_set_cookie(value);
                }
            }
        }
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<(), ApiError> {
        validation::validate_registration(username, email, password, confirmation)?;
        let request = self.client.build_register(&RegisterRequest {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        })?;
        self.client.parse_empty(self.send(request)?)
    }

    /// Sign in and store the returned token in the backend chosen by the
    /// consent flag. Returns the token as received.
    pub fn login(&mut self, email: &str, password: &str) -> Result<String, ApiError> {
        validation::validate_email(email)?;
        let request = self.client.build_login(&LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        })?;
        let token = self.client.parse_login(self.send(request)?)?;
        self.tokens.set_token(&token)?;
        self.profile = None;
        tracing::info!(consent = self.tokens.consent(), "signed in");
        Ok(token)
    }

    /// Forget the credential in every backend, whatever the consent flag.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        self.profile = None;
        self.tokens.clear()?;
        tracing::info!("signed out");
        Ok(())
    }

    pub fn confirm_email(&self, token: &str) -> Result<(), ApiError> {
        validation::require("Token", token)?;
        let request = self.client.build_confirm_email(token.trim());
        self.client.parse_empty(self.send(request)?)
    }

    pub fn resend_confirmation_email(&self, email: &str) -> Result<(), ApiError> {
        self.resend_confirmation_email_at(email, now_millis())
    }

    /// Resend the confirmation email unless the cooldown is still running.
    /// The cooldown restarts only after the server accepts the request.
    pub fn resend_confirmation_email_at(&self, email: &str, now_ms: i64) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        self.cooldown.check(now_ms)?;
        let request = self.client.build_resend_confirmation_email(email.trim())?;
        self.client.parse_empty(self.send(request)?)?;
        self.cooldown.record(now_ms)?;
        Ok(())
    }

    /// Seconds to show on the resend button; 0 when it is enabled.
    pub fn resend_cooldown_secs(&self, now_ms: i64) -> u64 {
        self.cooldown.remaining_secs(now_ms)
    }

    pub fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        let request = self.client.build_forgot_password(email.trim())?;
        self.client.parse_empty(self.send(request)?)
    }

    pub fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), ApiError> {
        validation::require("Token", token)?;
        validation::validate_password(new_password, confirmation)?;
        let request = self.client.build_reset_password(&ResetPasswordRequest {
            token: token.trim().to_string(),
            new_password: new_password.to_string(),
        })?;
        self.client.parse_empty(self.send(request)?)
    }

    pub fn google_login_url(&self) -> String {
        self.client.google_login_url()
    }

    // -----------------------------------------------------------------------
    // Contact
    // -----------------------------------------------------------------------

    pub fn send_support_email(
        &self,
        email: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        validation::require("Subject", subject)?;
        validation::require("Message", content)?;
        let request = self.client.build_send_support_email(&SupportEmail {
            email: email.trim().to_string(),
            subject: subject.to_string(),
            content: content.to_string(),
        })?;
        self.client.parse_empty(self.send(request)?)
    }

    pub fn subscribe_newsletter(&self, email: &str) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        let request = self.client.build_subscribe_newsletter(email.trim())?;
        self.client.parse_empty(self.send(request)?)
    }

    pub fn unsubscribe_newsletter(&self, email: &str) -> Result<(), ApiError> {
        validation::validate_email(email)?;
        let request = self.client.build_unsubscribe_newsletter(email.trim())?;
        self.client.parse_empty(self.send(request)?)
    }

    /// Admin only.
    pub fn send_newsletter(&self, subject: &str, content: &str) -> Result<(), ApiError> {
        validation::require("Subject", subject)?;
        validation::require("Content", content)?;
        let request = self.client.build_send_newsletter(
            &self.tokens,
            &Newsletter {
                subject: subject.to_string(),
                content: content.to_string(),
            },
        )?;
        self.client.parse_empty(self.send(request)?)
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    /// The cached profile, fetched on first use.
    pub fn profile(&mut self) -> Result<&UserProfile, ApiError> {
        let profile = match self.profile.take() {
            Some(profile) => profile,
            None => self.fetch_profile()?,
        };
        Ok(&*self.profile.insert(profile))
    }

    /// Drop the cache and fetch again.
    pub fn refresh_profile(&mut self) -> Result<&UserProfile, ApiError> {
        self.profile = None;
        self.profile()
    }

    fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let request = self.client.build_get_profile(&self.tokens)?;
        self.client.parse_profile(self.send(request)?)
    }

    pub fn update_profile(
        &mut self,
        update: &UpdateProfile,
    ) -> Result<serde_json::Value, ApiError> {
        if let Some(username) = &update.username {
            if username.trim().is_empty() {
                return Err(ApiError::Validation(validation::USERNAME_REQUIRED.to_string()));
            }
        }
        let request = self.client.build_update_profile(&self.tokens, update)?;
        self.mutate(request)
    }

    pub fn update_notification_preferences(
        &mut self,
        email_enabled: bool,
    ) -> Result<serde_json::Value, ApiError> {
        let request = self.client.build_update_notification_preferences(
            &self.tokens,
            &NotificationPreferences {
                email: email_enabled,
            },
        )?;
        self.mutate(request)
    }

    pub fn upload_profile_image(
        &mut self,
        image: &ImageUpload,
    ) -> Result<serde_json::Value, ApiError> {
        if image.bytes.is_empty() {
            return Err(ApiError::Validation("Please choose an image".to_string()));
        }
        let request = self.client.build_upload_profile_image(&self.tokens, image)?;
        self.mutate(request)
    }

    pub fn rate_app(&mut self, rate: u8) -> Result<serde_json::Value, ApiError> {
        validation::validate_rating(rate)?;
        let request = self.client.build_rate_app(&self.tokens, rate)?;
        self.mutate(request)
    }

    pub fn update_location(&mut self, location: &str) -> Result<serde_json::Value, ApiError> {
        validation::require("Location", location)?;
        let request = self.client.build_update_location(&self.tokens, location.trim())?;
        self.mutate(request)
    }

    /// Delete the account, then forget the credential everywhere.
    pub fn delete_account(&mut self) -> Result<(), ApiError> {
        let request = self.client.build_delete_account(&self.tokens)?;
        self.client.parse_empty(self.send(request)?)?;
        tracing::info!("account deleted");
        self.logout()
    }

    fn mutate(&mut self, request: HttpRequest) -> Result<serde_json::Value, ApiError> {
        let response = self.send(request)?;
        let value = self.client.parse_value(response)?;
        self.profile = None;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub fn list_users(&self) -> Result<Vec<UserSummary>, ApiError> {
        let request = self.client.build_list_users(&self.tokens)?;
        self.client.parse_list_users(self.send(request)?)
    }

    pub fn get_public_user(&self, username: &str) -> Result<UserProfile, ApiError> {
        validation::require("Username", username)?;
        let request = self.client.build_get_public_user(&self.tokens, username.trim())?;
        self.client.parse_profile(self.send(request)?)
    }

    pub fn update_user_role(&self, id: Uuid, role: Role) -> Result<serde_json::Value, ApiError> {
        let request = self.client.build_update_user_role(&self.tokens, id, role)?;
        self.client.parse_value(self.send(request)?)
    }

    pub fn delete_user(&self, id: Uuid) -> Result<(), ApiError> {
        let request = self.client.build_delete_user(&self.tokens, id)?;
        self.client.parse_empty(self.send(request)?)
    }
}
