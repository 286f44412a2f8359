use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to share a clipboard entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateClipboardRequest {
    pub content: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

fn default_device_name() -> String {
    "Unknown Device".to_string()
}

/// Response after sharing a clipboard entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateClipboardResponse {
    pub id: Uuid,
    /// 6-character retrieval code
    pub clipboard_id: String,
}

/// A clipboard entry as returned to a reader
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClipboardEntry {
    pub id: Uuid,
    pub clipboard_id: String,
    pub content: String,
    pub device_name: String,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
}

/// Response for the clipboard history listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClipboardListResponse {
    pub clipboards: Vec<ClipboardEntry>,
}
