use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to run a code snippet through the execution service
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
}

/// Output of an execution run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExecuteResponse {
    pub stdout: String,
    pub stderr: String,
}
