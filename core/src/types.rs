//! Domain DTOs for the navigation site API.
//!
//! # Design
//! These types mirror the backend schema but are defined independently of
//! the mock-server crate; the integration tests catch schema drift. The
//! wire format is camelCase, and update payloads skip absent fields so the
//! server leaves them unchanged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body shared by every endpoint that only takes an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportEmail {
    pub email: String,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub email: bool,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportMode {
    #[default]
    Driving,
    Walking,
    Cycling,
    Transit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NavigationPreferences {
    #[serde(default)]
    pub avoid_tolls: bool,
    #[serde(default)]
    pub avoid_highways: bool,
    #[serde(default)]
    pub avoid_traffic: bool,
    /// Distance in meters at which proximity alerts fire.
    #[serde(default)]
    pub proximity_alert_distance: u32,
    #[serde(default)]
    pub preferred_transport_mode: TransportMode,
    #[serde(default)]
    pub show_other_users: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub formatted_address: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatistics {
    #[serde(default)]
    pub reports_submitted: u64,
    #[serde(default)]
    pub reports_validated: u64,
    #[serde(default)]
    pub routes_completed: u64,
    /// Kilometers.
    #[serde(default)]
    pub distance_traveled: f64,
    /// Minutes.
    #[serde(default)]
    pub time_saved: f64,
    #[serde(default)]
    pub rank: Option<u32>,
}

/// The authenticated user's profile as returned by `/private/user`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub navigation_preferences: NavigationPreferences,
    #[serde(default)]
    pub notification_preferences: Option<NotificationPreferences>,
    #[serde(default)]
    pub favorite_locations: Vec<FavoriteLocation>,
    #[serde(default)]
    pub stats: UsageStatistics,
}

/// Partial profile update. Only the fields present are applied.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_preferences: Option<NavigationPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_locations: Option<Vec<FavoriteLocation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRequest {
    pub rate: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub location: String,
}

/// A file to upload as the profile image.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}
