use crate::models::*;
use utoipa::OpenApi;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Create a new paste
#[utoipa::path(
    post,
    path = "/api/v1/pastes",
    request_body = CreatePasteRequest,
    responses(
        (status = 201, description = "Paste created successfully", body = CreatePasteResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn create_paste_doc() {}

/// View a paste by id or custom URL
#[utoipa::path(
    get,
    path = "/api/v1/pastes/{id_or_slug}",
    params(
        ("id_or_slug" = String, Path, description = "Paste UUID or custom URL"),
        ("password" = Option<String>, Query, description = "Password for protected pastes")
    ),
    responses(
        (status = 200, description = "Paste contents or locked shell", body = PasteViewResponse),
        (status = 404, description = "Paste missing or expired", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_paste_doc() {}

/// Share a clipboard entry
#[utoipa::path(
    post,
    path = "/api/v1/clipboards",
    request_body = CreateClipboardRequest,
    responses(
        (status = 201, description = "Clipboard shared", body = CreateClipboardResponse)
    )
)]
#[allow(dead_code)]
pub async fn create_clipboard_doc() {}

/// The caller's pastes and aggregate stats
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "Dashboard data", body = DashboardResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn dashboard_doc() {}

/// Create a collaboration room
#[utoipa::path(
    post,
    path = "/api/v1/rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomResponse)
    )
)]
#[allow(dead_code)]
pub async fn create_room_doc() {}

/// Run a code snippet through the execution service
#[utoipa::path(
    post,
    path = "/api/v1/execute",
    request_body = ExecuteRequest,
    responses(
        (status = 200, description = "Execution output", body = ExecuteResponse),
        (status = 502, description = "Execution service failure", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn execute_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        create_paste_doc,
        get_paste_doc,
        create_clipboard_doc,
        dashboard_doc,
        create_room_doc,
        execute_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            CreatePasteRequest,
            CreatePasteResponse,
            PasteViewResponse,
            PasteSummary,
            DashboardStats,
            DashboardResponse,
            CreateClipboardRequest,
            CreateClipboardResponse,
            ClipboardEntry,
            ClipboardListResponse,
            CreateRoomRequest,
            RoomResponse,
            RoomListResponse,
            JoinRoomRequest,
            RoomSettingsRequest,
            MemberEntry,
            VersionEntry,
            VersionListResponse,
            ExecuteRequest,
            ExecuteResponse,
            UserProfile,
            UpdateProfileRequest,
            DiagnosticsResponse
        )
    ),
    tags(
        (name = "api", description = "PasteJet API endpoints")
    )
)]
pub struct ApiDoc;
