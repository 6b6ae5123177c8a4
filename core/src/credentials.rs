//! Bearer credential storage.
//!
//! # Design
//! The credential lives in exactly one of two backends, chosen by the
//! user's cookie-consent flag: an `authToken` cookie when consent is given,
//! otherwise the `authToken` key of the local key-value store. `TokenStore`
//! picks the backend once, when it is constructed or when consent changes,
//! and never falls back from one backend to the other. Reading through the
//! wrong backend yields no credential rather than a stale one.
//!
//! Clearing is the exception: `TokenStore::clear` wipes both backends and
//! leaves a removal cookie in the jar's delta for the host to forward, so a
//! token written before a consent change cannot survive logout.

use std::sync::{Arc, Mutex, MutexGuard};

use cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use crate::error::StorageError;
use crate::storage::{KeyValueStore, AUTH_TOKEN_KEY, COOKIES_ACCEPTED_KEY};

pub const DEFAULT_COOKIE_TTL: Duration = Duration::days(7);

/// Somewhere a bearer token can be read from and written to.
pub trait CredentialStore: Send + Sync {
    fn get_token(&self) -> Option<String>;
    fn set_token(&self, token: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cookie-backed credential storage.
///
/// Clones share the same jar, like tabs sharing one browser profile. Local
/// writes and clears stay in the jar's delta, one entry per cookie name,
/// until the host drains them with `take_set_cookie_headers`.
#[derive(Debug, Clone)]
pub struct CookieCredentialStore {
    jar: Arc<Mutex<CookieJar>>,
    ttl: Duration,
}

impl Default for CookieCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_TTL)
    }
}

impl CookieCredentialStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jar: Arc::new(Mutex::new(CookieJar::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_token_at(&self, now: OffsetDateTime) -> Option<String> {
        let jar = lock(&self.jar);
        let cookie = jar.get(AUTH_TOKEN_KEY)?;
        if let Some(expires) = cookie.expires_datetime() {
            if expires <= now {
                return None;
            }
        }
        Some(cookie.value().to_string())
    }

    /// Write the token cookie. A TTL that runs past the representable date
    /// range gets no `Expires` attribute and relies on `Max-Age` alone.
    pub fn set_token_at(&self, token: &str, now: OffsetDateTime) {
        let mut cookie = Cookie::build((AUTH_TOKEN_KEY, token.to_string()))
            .path("/")
            .secure(true)
            .same_site(SameSite::Strict)
            .max_age(self.ttl)
            .build();
        if let Some(expires) = now.checked_add(self.ttl) {
            cookie.set_expires(expires);
        }
        lock(&self.jar).add(cookie);
    }

    /// Take the `Set-Cookie` header values for changes made since the last
    /// call. Repeated writes to the same cookie collapse into the latest.
    pub fn take_set_cookie_headers(&self) -> Vec<String> {
        settle(&mut lock(&self.jar))
            .iter()
            .map(|cookie| cookie.to_string())
            .collect()
    }

    /// Store an `authToken` cookie received in a `Set-Cookie` response
    /// header. Other cookies and malformed headers are ignored; a removal
    /// cookie clears the token. The server's cookie supersedes any local
    /// change still pending.
    pub fn absorb_set_cookie(&self, header: &str) {
        let mut cookie = match Cookie::parse(header.to_string()) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed Set-Cookie header");
                return;
            }
        };
        if cookie.name() != AUTH_TOKEN_KEY {
            return;
        }
        let expired = cookie.max_age().is_some_and(|age| age <= Duration::ZERO)
            || cookie
                .expires_datetime()
                .is_some_and(|at| at <= OffsetDateTime::now_utc());
        if expired {
            cookie.make_removal();
        }
        let mut jar = lock(&self.jar);
        jar.add(cookie);
        settle(&mut jar);
    }
}

/// Move every pending change into the jar's settled state and return the
/// changes.
fn settle(jar: &mut CookieJar) -> Vec<Cookie<'static>> {
    let pending: Vec<Cookie<'static>> = jar.delta().cloned().collect();
    jar.reset_delta();
    for cookie in &pending {
        jar.add_original(cookie.clone());
    }
    pending
}

impl CredentialStore for CookieCredentialStore {
    fn get_token(&self) -> Option<String> {
        self.get_token_at(OffsetDateTime::now_utc())
    }

    fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.set_token_at(token, OffsetDateTime::now_utc());
        Ok(())
    }

    /// Replace the token with a removal cookie, which reads back as absent.
    fn clear(&self) -> Result<(), StorageError> {
        let mut removal = Cookie::build((AUTH_TOKEN_KEY, ""))
            .path("/")
            .secure(true)
            .same_site(SameSite::Strict)
            .build();
        removal.make_removal();
        lock(&self.jar).add(removal);
        Ok(())
    }
}

/// Credential storage in the local key-value store, with no expiry.
#[derive(Clone)]
pub struct LocalCredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl LocalCredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl CredentialStore for LocalCredentialStore {
    fn get_token(&self) -> Option<String> {
        self.store.get(AUTH_TOKEN_KEY)
    }

    fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.store.set(AUTH_TOKEN_KEY, token)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(AUTH_TOKEN_KEY)
    }
}

/// The credential store a session uses, selected by the consent flag.
pub struct TokenStore {
    local: Arc<dyn KeyValueStore>,
    cookies: CookieCredentialStore,
    active: Box<dyn CredentialStore>,
    consent: bool,
}

impl TokenStore {
    /// Select the backend from the consent flag persisted in `local`.
    pub fn new(local: Arc<dyn KeyValueStore>, cookies: CookieCredentialStore) -> Self {
        let consent = read_consent(local.as_ref());
        let active = select_backend(consent, &local, &cookies);
        Self {
            local,
            cookies,
            active,
            consent,
        }
    }

    pub fn consent(&self) -> bool {
        self.consent
    }

    /// Persist a new consent decision and switch backends.
    ///
    /// The token is not migrated: after a switch the new backend reports
    /// whatever it held before, usually nothing.
    pub fn set_consent(&mut self, accepted: bool) -> Result<(), StorageError> {
        self.local
            .set(COOKIES_ACCEPTED_KEY, if accepted { "true" } else { "false" })?;
        if accepted != self.consent {
            tracing::info!(accepted, "cookie consent changed");
            self.consent = accepted;
            self.active = select_backend(accepted, &self.local, &self.cookies);
        }
        Ok(())
    }

    pub fn cookies(&self) -> &CookieCredentialStore {
        &self.cookies
    }

    pub fn local(&self) -> &Arc<dyn KeyValueStore> {
        &self.local
    }
}

impl CredentialStore for TokenStore {
    fn get_token(&self) -> Option<String> {
        self.active.get_token()
    }

    fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.active.set_token(token)
    }

    /// Clears both backends regardless of the current consent flag.
    fn clear(&self) -> Result<(), StorageError> {
        let cookie_result = self.cookies.clear();
        let local_result = LocalCredentialStore::new(Arc::clone(&self.local)).clear();
        cookie_result.and(local_result)
    }
}

/// Read the consent flag; anything other than `"true"` means no consent.
pub fn read_consent(local: &dyn KeyValueStore) -> bool {
    local.get(COOKIES_ACCEPTED_KEY).as_deref() == Some("true")
}

fn select_backend(
    consent: bool,
    local: &Arc<dyn KeyValueStore>,
    cookies: &CookieCredentialStore,
) -> Box<dyn CredentialStore> {
    if consent {
        Box::new(cookies.clone())
    } else {
        Box::new(LocalCredentialStore::new(Arc::clone(local)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn backends() -> (Arc<dyn KeyValueStore>, CookieCredentialStore) {
        (Arc::new(MemoryStore::new()), CookieCredentialStore::default())
    }

    fn with_consent(
        local: &Arc<dyn KeyValueStore>,
        cookies: &CookieCredentialStore,
        consent: bool,
    ) -> TokenStore {
        let mut store = TokenStore::new(Arc::clone(local), cookies.clone());
        store.set_consent(consent).unwrap();
        store
    }

    #[test]
    fn consent_true_round_trips_through_cookie() {
        let (local, cookies) = backends();
        let store = with_consent(&local, &cookies, true);
        store.set_token("tok-1").unwrap();

        let reader = with_consent(&local, &cookies, true);
        assert_eq!(reader.get_token().as_deref(), Some("tok-1"));
        assert_eq!(local.get(AUTH_TOKEN_KEY), None);
    }

    #[test]
    fn consent_false_round_trips_through_local_store() {
        let (local, cookies) = backends();
        let store = with_consent(&local, &cookies, false);
        store.set_token("tok-2").unwrap();
        assert_eq!(store.get_token().as_deref(), Some("tok-2"));
        assert_eq!(local.get(AUTH_TOKEN_KEY).as_deref(), Some("tok-2"));
    }

    #[test]
    fn backends_are_isolated() {
        let (local, cookies) = backends();
        with_consent(&local, &cookies, false)
            .set_token("local-only")
            .unwrap();

        let reader = with_consent(&local, &cookies, true);
        assert_eq!(reader.get_token(), None);
    }

    #[test]
    fn consent_is_read_from_local_store() {
        let (local, cookies) = backends();
        local.set(COOKIES_ACCEPTED_KEY, "true").unwrap();
        assert!(TokenStore::new(Arc::clone(&local), cookies.clone()).consent());
        local.set(COOKIES_ACCEPTED_KEY, "yes").unwrap();
        assert!(!TokenStore::new(local, cookies).consent());
    }

    #[test]
    fn clear_removes_token_from_both_backends() {
        let (local, cookies) = backends();
        with_consent(&local, &cookies, false).set_token("old").unwrap();
        let store = with_consent(&local, &cookies, true);
        store.set_token("new").unwrap();

        store.clear().unwrap();

        assert_eq!(cookies.get_token(), None);
        assert_eq!(local.get(AUTH_TOKEN_KEY), None);
        let headers = cookies.take_set_cookie_headers();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with("authToken=;"));
        assert!(headers[0].contains("Max-Age=0"));
    }

    #[test]
    fn cookie_is_strict_and_expires() {
        let cookies = CookieCredentialStore::new(Duration::hours(1));
        let now = OffsetDateTime::now_utc();
        cookies.set_token_at("abc", now);

        let header = cookies.take_set_cookie_headers().remove(0);
        assert!(header.contains("SameSite=Strict"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=3600"));

        assert_eq!(cookies.get_token_at(now).as_deref(), Some("abc"));
        assert_eq!(cookies.get_token_at(now + Duration::minutes(61)), None);
    }

    #[test]
    fn absorbs_server_cookie() {
        let cookies = CookieCredentialStore::default();
        cookies.absorb_set_cookie("authToken=srv; Path=/");
        assert_eq!(cookies.get_token().as_deref(), Some("srv"));
        cookies.absorb_set_cookie("=");
        cookies.absorb_set_cookie("theme=dark; Path=/");
        assert_eq!(cookies.get_token().as_deref(), Some("srv"));
        assert!(cookies.take_set_cookie_headers().is_empty());

        cookies.absorb_set_cookie("authToken=; Path=/; Max-Age=0");
        assert_eq!(cookies.get_token(), None);
    }

    #[test]
    fn pending_headers_stay_bounded_across_sign_in_cycles() {
        let cookies = CookieCredentialStore::default();
        for i in 0..1000 {
            cookies.set_token(&format!("tok-{i}")).unwrap();
            cookies.clear().unwrap();
        }
        let headers = cookies.take_set_cookie_headers();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with("authToken=;"));
        assert!(cookies.take_set_cookie_headers().is_empty());
    }

    #[test]
    fn oversized_ttl_does_not_panic() {
        let cookies = CookieCredentialStore::new(Duration::days(1_000_000_000));
        cookies.set_token("tok").unwrap();
        assert_eq!(cookies.get_token().as_deref(), Some("tok"));
        let header = cookies.take_set_cookie_headers().remove(0);
        assert!(!header.contains("Expires"));
    }

    #[test]
    fn switching_consent_does_not_migrate_token() {
        let (local, cookies) = backends();
        let mut store = with_consent(&local, &cookies, true);
        store.set_token("cookie-token").unwrap();
        store.set_consent(false).unwrap();
        assert_eq!(store.get_token(), None);
        store.set_consent(true).unwrap();
        assert_eq!(store.get_token().as_deref(), Some("cookie-token"));
    }
}
