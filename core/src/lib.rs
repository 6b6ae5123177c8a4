//! Synchronous API client core for the navigation site.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). `Session` drives the
//! round-trip through a `Transport`, keeps the bearer credential in the
//! backend selected by the user's cookie consent, and applies client-side
//! validation before anything is sent.
//!
//! # Design
//! - `ApiClient` is stateless; it holds only `base_url`.
//! - Each endpoint is split into `build_*` (produces request) and
//!   `parse_*` (consumes response), so the I/O boundary is explicit.
//! - Authenticated builders fail with `ApiError::Unauthenticated` before a
//!   request exists when no credential is stored.
//! - Form, carousel and cooldown state live here too, as plain values a
//!   view layer can render from.

pub mod carousel;
pub mod client;
pub mod config;
pub mod cooldown;
pub mod credentials;
pub mod error;
pub mod http;
pub mod session;
pub mod storage;
pub mod submission;
pub mod types;
pub mod validation;

pub use carousel::{Accordion, Carousel};
pub use client::ApiClient;
pub use config::{ClientConfig, ConfigError};
pub use cooldown::ResendCooldown;
pub use credentials::{CookieCredentialStore, CredentialStore, LocalCredentialStore, TokenStore};
pub use error::{ApiError, ErrorKind, StorageError};
#[cfg(feature = "ureq")]
pub use http::UreqTransport;
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport};
pub use session::Session;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use submission::{Submission, TokenGate};
pub use types::{
    FavoriteLocation, ImageUpload, NavigationPreferences, NotificationPreferences, Role,
    TransportMode, UpdateProfile, UsageStatistics, UserProfile, UserSummary,
};
