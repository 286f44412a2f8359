use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::models::ExecuteResponse;

static EXEC_CLIENT: OnceCell<Arc<ExecClient>> = OnceCell::const_new();

/// Languages the execution service can run, with their runner versions.
/// Markup-only languages carry no version and are rejected before the
/// network call.
const LANGUAGE_VERSIONS: &[(&str, Option<&str>)] = &[
    ("javascript", Some("18.15.0")),
    ("python", Some("3.10.0")),
    ("java", Some("15.0.2")),
    ("cpp", Some("10.2.0")),
    ("html", None),
    ("css", None),
    ("typescript", Some("5.0.3")),
];

/// Resolve the runner version for a language.
///
/// Returns `Ok(None)` for known languages without a runner.
pub fn runner_version(language: &str) -> Result<Option<&'static str>, String> {
    LANGUAGE_VERSIONS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, version)| *version)
        .ok_or_else(|| format!("Unsupported language '{}'", language))
}

#[derive(Debug, Serialize)]
struct ExecPayload<'a> {
    language: &'a str,
    version: &'a str,
    code: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecOutput {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    details: Option<String>,
}

/// Thin client for the external code-execution service. One HTTP POST,
/// a hard client-side timeout, no retries.
#[derive(Debug)]
pub struct ExecClient {
    client: Client,
    endpoint: String,
}

impl ExecClient {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest client");

        Self { client, endpoint }
    }

    /// Run a snippet and return its stdout/stderr
    pub async fn execute(
        &self,
        language: &str,
        version: &str,
        code: &str,
        input: &str,
    ) -> Result<ExecuteResponse, String> {
        let payload = ExecPayload {
            language,
            version,
            code,
            input,
        };

        info!("Executing {} snippet ({} bytes)", language, code.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Execution request failed: {}", e);
                format!("Execution request failed: {}", e)
            })?;

        let status = response.status();
        let output: ExecOutput = response.json().await.map_err(|e| {
            error!("Failed to parse execution response: {}", e);
            format!("Failed to parse execution response: {}", e)
        })?;

        if !status.is_success() {
            let details = output
                .details
                .unwrap_or_else(|| format!("Execution service returned {}", status));
            return Err(details);
        }

        Ok(ExecuteResponse {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Initialize the global execution client
pub fn init_exec_client(endpoint: String, timeout: Duration) -> Result<(), &'static str> {
    let client = ExecClient::new(endpoint, timeout);
    EXEC_CLIENT
        .set(Arc::new(client))
        .map_err(|_| "ExecClient already initialized")
}

/// Get the global execution client instance
pub fn get_exec_client() -> Option<Arc<ExecClient>> {
    EXEC_CLIENT.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_versions() {
        assert_eq!(runner_version("python").unwrap(), Some("3.10.0"));
        assert_eq!(runner_version("html").unwrap(), None);
        assert!(runner_version("cobol").is_err());
    }
}
