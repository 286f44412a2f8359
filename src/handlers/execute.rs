use axum::{http::StatusCode, Extension, Json};
use tracing::error;

use crate::auth::auth::AuthUser;
use crate::models::{error_response, ErrorResponse, ExecuteRequest, ExecuteResponse};
use crate::services::exec_service;

/// Forward a snippet to the code-execution service.
///
/// One POST with a hard 15-second timeout; the service is an opaque
/// collaborator and failures surface as-is, without retries.
pub async fn execute_code(
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<ExecuteResponse>), (StatusCode, Json<ErrorResponse>)> {
    if payload.code.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Code is required"));
    }

    let version = exec_service::runner_version(&payload.language)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
    let Some(version) = version else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Execution not supported for this language",
        ));
    };

    let client = exec_service::get_exec_client().ok_or_else(|| {
        error!("Execution service not configured");
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Execution service not configured",
        )
    })?;

    let output = client
        .execute(&payload.language, version, &payload.code, &payload.input)
        .await
        .map_err(|details| {
            error!("Execution failed for {}: {}", user.uid, details);
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Error executing code: {}", details),
            )
        })?;

    Ok((StatusCode::OK, Json(output)))
}
