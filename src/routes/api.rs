use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use crate::handlers::{
    add_member, create_clipboard, create_paste, create_room, dashboard, delete_paste, delete_room,
    diagnostics, execute_code, get_clipboard, get_paste, get_profile, get_room, health_check,
    join_room, leave_room, list_clipboards, list_members, list_rooms, list_versions, mute_all,
    mute_user, ready_check, remove_member, restore_version, unmute_all, unmute_user,
    update_profile, update_settings,
};
use crate::routes::auth_middleware::{auth_middleware, optional_auth_middleware};
use crate::ws::handler::room_ws;
use crate::AppState;

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    // Anonymous callers may create and read pastes and clipboards; the
    // identity, when present, unlocks owner features. Owner-only
    // handlers on these routes enforce authentication themselves.
    let public_routes = Router::new()
        .route("/v1/pastes", post(create_paste))
        .route("/v1/pastes/:id", get(get_paste).delete(delete_paste))
        .route("/v1/clipboards", post(create_clipboard).get(list_clipboards))
        .route("/v1/clipboards/:code", get(get_clipboard))
        .route_layer(middleware::from_fn(optional_auth_middleware));

    let protected_routes = Router::new()
        .route("/v1/dashboard", get(dashboard))
        .route("/v1/rooms", post(create_room).get(list_rooms))
        .route("/v1/rooms/:room_id", get(get_room).delete(delete_room))
        .route("/v1/rooms/:room_id/join", post(join_room))
        .route("/v1/rooms/:room_id/leave", post(leave_room))
        .route("/v1/rooms/:room_id/members", get(list_members).post(add_member))
        .route("/v1/rooms/:room_id/members/:member_id", delete(remove_member))
        .route("/v1/rooms/:room_id/settings", patch(update_settings))
        .route("/v1/rooms/:room_id/mute/:target", post(mute_user))
        .route("/v1/rooms/:room_id/unmute/:target", post(unmute_user))
        .route("/v1/rooms/:room_id/mute-all", post(mute_all))
        .route("/v1/rooms/:room_id/unmute-all", post(unmute_all))
        .route("/v1/rooms/:room_id/versions", get(list_versions))
        .route(
            "/v1/rooms/:room_id/versions/:version_id/restore",
            post(restore_version),
        )
        .route("/v1/execute", post(execute_code))
        .route("/v1/profile", get(get_profile).put(update_profile))
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        // The live channel authenticates through its token query
        // parameter, outside the HTTP middleware
        .route("/v1/rooms/:room_id/ws", get(room_ws))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
