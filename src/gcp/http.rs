//! HTTP utilities for GCP REST API calls

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.chars().count() > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Errors returned by the GCP REST layer
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status
    #[error("{message} ({status})")]
    Status {
        status: StatusCode,
        /// Canonical code from the error envelope, e.g. `FAILED_PRECONDITION`
        code: Option<String>,
        message: String,
    },
    #[error("failed to send request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to parse response JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    /// A long-running operation finished with an error status
    #[error("operation {name} failed: {message} (code {code})")]
    Operation {
        name: String,
        code: i32,
        message: String,
    },
    #[error("operation {name} did not complete within {waited_secs}s")]
    OperationTimeout { name: String, waited_secs: u64 },
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// google.rpc.Code values we classify on
const RPC_NOT_FOUND: i32 = 5;
const RPC_FAILED_PRECONDITION: i32 = 9;

impl ApiError {
    /// The provider rejected the call because the resource is not in the required state
    pub fn is_failed_precondition(&self) -> bool {
        match self {
            ApiError::Status { status, code, .. } => {
                code.as_deref() == Some("FAILED_PRECONDITION")
                    || *status == StatusCode::PRECONDITION_FAILED
            },
            ApiError::Operation { code, .. } => *code == RPC_FAILED_PRECONDITION,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Status { status, code, .. } => {
                code.as_deref() == Some("NOT_FOUND") || *status == StatusCode::NOT_FOUND
            },
            ApiError::Operation { code, .. } => *code == RPC_NOT_FOUND,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled(_))
    }
}

/// Google API error envelope: `{"error": {"code": 400, "message": "...", "status": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ApiError::Status {
            status,
            code: envelope.error.status,
            message: if envelope.error.message.is_empty() {
                format!("API request failed: {}", status)
            } else {
                envelope.error.message
            },
        },
        Err(_) => ApiError::Status {
            status,
            code: None,
            message: format!("API request failed: {}", status),
        },
    }
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new(user_agent: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self { client })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, url, token, None).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        self.send(Method::POST, url, token, body).await
    }

    /// Make a PATCH request to a GCP API
    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::PATCH, url, token, Some(body)).await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, url, token, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::Transport)?;

        let status = response.status();
        let response_body = response.text().await.map_err(ApiError::Transport)?;

        if !status.is_success() {
            // Only the sanitized/truncated body is logged
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(status_error(status, &response_body));
        }

        // Handle empty response
        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body).map_err(ApiError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_reads_envelope() {
        let body = r#"{"error": {"code": 400, "message": "Key is in use", "status": "FAILED_PRECONDITION"}}"#;
        let err = status_error(StatusCode::BAD_REQUEST, body);

        assert!(err.is_failed_precondition());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Key is in use (400 Bad Request)");
    }

    #[test]
    fn test_status_error_without_envelope() {
        let err = status_error(StatusCode::NOT_FOUND, "<html>gone</html>");

        assert!(err.is_not_found());
        match err {
            ApiError::Status { code, message, .. } => {
                assert!(code.is_none());
                assert_eq!(message, "API request failed: 404 Not Found");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_operation_error_classification() {
        let err = ApiError::Operation {
            name: "operations/op-1".into(),
            code: 9,
            message: "precondition".into(),
        };
        assert!(err.is_failed_precondition());
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("a\nb\tc d"), "abc d");
    }
}
