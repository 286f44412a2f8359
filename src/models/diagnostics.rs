use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Aggregated runtime diagnostics for the service
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    /// Live WebSocket connections across all rooms
    pub n_conn: u32,
    /// Rooms with an active live channel
    pub n_rooms: u32,
    /// Signaling messages waiting in mailboxes for re-delivery
    pub n_pending_signals: u32,
    /// Display names currently held in the profile cache
    pub n_cached_profiles: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
