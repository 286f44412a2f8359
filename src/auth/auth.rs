use axum::{http::StatusCode, Json};

use crate::db::RoomRow;
use crate::models::ErrorResponse;

const ADMIN_ROLE: &str = "admin";

/// Identity extracted from a validated token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Build the identity from validated JWT claims.
    ///
    /// `sub` is required; `name` and `roles` are optional.
    pub fn from_claims(claims: &serde_json::Value) -> Result<Self, String> {
        let uid = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "JWT token does not contain 'sub' claim".to_string())?
            .to_string();

        let display_name = claims
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let roles = match claims.get("roles").and_then(|v| v.as_array()) {
            Some(roles_array) => roles_array
                .iter()
                .filter_map(|r| r.as_str().map(|s| s.to_string()))
                .collect::<Vec<String>>(),
            None => Vec::new(),
        };

        Ok(Self {
            uid,
            display_name,
            roles,
        })
    }

    /// Label used in presence and chat entries
    pub fn label(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| self.uid.clone())
    }
}

pub fn is_admin(user: &AuthUser) -> bool {
    user.roles.iter().any(|r| r == ADMIN_ROLE)
}

/// Require an authenticated caller on an optional-auth route
pub fn ensure_user(
    user: &Option<AuthUser>,
) -> Result<&AuthUser, (StatusCode, Json<ErrorResponse>)> {
    match user {
        Some(user) => Ok(user),
        None => {
            let status = StatusCode::UNAUTHORIZED;
            Err((
                status,
                Json(ErrorResponse {
                    code: status.as_u16(),
                    status: status.to_string(),
                    error: "Authentication required".to_string(),
                }),
            ))
        }
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(user) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: "Admin access required".to_string(),
        }),
    ))
}

/// Require that the caller owns the room. Owner-only actions are
/// enforced here, per-route, not in the client.
pub fn ensure_room_owner(
    room: &RoomRow,
    user: &AuthUser,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if room.created_by == user.uid {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: "Only the room owner may perform this action".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_claims_requires_sub() {
        let claims = serde_json::json!({ "name": "Alice" });
        assert!(AuthUser::from_claims(&claims).is_err());

        let claims = serde_json::json!({ "sub": "alice", "roles": ["admin", 42] });
        let user = AuthUser::from_claims(&claims).unwrap();
        assert_eq!(user.uid, "alice");
        // Non-string roles are skipped
        assert_eq!(user.roles, vec!["admin".to_string()]);
        assert!(is_admin(&user));
    }

    #[test]
    fn label_falls_back_to_uid() {
        let claims = serde_json::json!({ "sub": "bob" });
        let user = AuthUser::from_claims(&claims).unwrap();
        assert_eq!(user.label(), "bob");
    }
}
