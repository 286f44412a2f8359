use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to create a paste
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePasteRequest {
    pub title: Option<String>,
    pub content: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    pub password: Option<String>,
    pub custom_url: Option<String>,
    /// Relative expiry such as "10m", "1h", "7d" or "1M"
    pub expires_at: Option<String>,
}

fn default_language() -> String {
    "text".to_string()
}

fn default_visibility() -> String {
    "public".to_string()
}

/// Response after creating a paste
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePasteResponse {
    pub id: Uuid,
    pub url: String,
    pub custom_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Optional password supplied when viewing a protected paste
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ViewPasteQuery {
    pub password: Option<String>,
}

/// A paste as returned to a viewer.
///
/// `locked` pastes carry only safe metadata: the content stays on the
/// server until the correct password is supplied.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasteViewResponse {
    pub id: Uuid,
    pub title: String,
    pub language: String,
    pub visibility: String,
    pub locked: bool,
    pub content: Option<String>,
    pub views: i64,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Summary row used by the dashboard listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasteSummary {
    pub id: Uuid,
    pub title: String,
    pub language: String,
    pub visibility: String,
    pub protected: bool,
    pub custom_url: Option<String>,
    pub views: i64,
    pub created_date: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregate stats for the dashboard header
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_pastes: i64,
    pub total_views: i64,
    pub public_pastes: i64,
    pub protected_pastes: i64,
}

/// Response for the dashboard endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub pastes: Vec<PasteSummary>,
}
