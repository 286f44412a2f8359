use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{error, warn};

use crate::auth::auth::AuthUser;
use crate::config;
use crate::services::auth_service::{get_auth_token, validate_jwt};

fn jwt_secret() -> Result<&'static str, StatusCode> {
    match &config::get_config().auth_jwt_secret {
        Some(secret) => Ok(secret),
        None => {
            error!("Auth JWT secret not configured");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Require a valid token and load the caller identity into request
/// extensions for downstream handlers.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let secret = jwt_secret()?;
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            warn!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Build the identity from the claims
    let user = match AuthUser::from_claims(&token_data.claims) {
        Ok(user) => user,
        Err(e) => {
            warn!("JWT token rejected: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 4. Set the identity into request extensions for downstream handlers
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Like `auth_middleware`, but a missing token is fine: routes behind
/// this accept anonymous callers. A token that is present but invalid
/// is still rejected.
pub async fn optional_auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user: Option<AuthUser> = match get_auth_token(&req) {
        Ok(token) => {
            let secret = jwt_secret()?;
            let token_data = match validate_jwt(&token, secret) {
                Ok(token_data) => token_data,
                Err(e) => {
                    warn!("JWT validation failed: {}", e);
                    return Err(StatusCode::UNAUTHORIZED);
                }
            };
            match AuthUser::from_claims(&token_data.claims) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("JWT token rejected: {}", e);
                    return Err(StatusCode::UNAUTHORIZED);
                }
            }
        }
        Err(_) => None,
    };

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
