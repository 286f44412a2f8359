use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to create a collaboration room
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub room_name: String,
    #[serde(default = "default_room_language")]
    pub language: String,
    #[serde(default)]
    pub is_private: bool,
    pub password: Option<String>,
}

fn default_room_language() -> String {
    "javascript".to_string()
}

/// Room metadata as returned by the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomResponse {
    pub room_id: String,
    pub room_name: String,
    pub language: String,
    pub is_private: bool,
    pub is_active: bool,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    /// STUN servers the client should use for media negotiation
    pub ice_servers: Vec<String>,
}

/// Response for the room listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomResponse>,
}

/// Request to join a room
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct JoinRoomRequest {
    pub password: Option<String>,
}

/// Request to add a member to a room
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: String,
}

/// Request to update room privacy settings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoomSettingsRequest {
    pub is_private: bool,
    pub password: Option<String>,
}

/// A membership row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberEntry {
    pub user_id: String,
    /// "owner" or "member"
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// A saved content snapshot of a room
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VersionEntry {
    pub id: Uuid,
    pub content: String,
    pub saved_by: String,
    pub created_date: DateTime<Utc>,
}

/// Response for the version history listing, newest first
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VersionListResponse {
    pub versions: Vec<VersionEntry>,
}
