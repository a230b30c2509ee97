//! Long-running operations
//!
//! Certificate Manager mutations return a `google.longrunning.Operation`.
//! [`GcpClient::wait_for_operation`] polls it until `done` and unwraps the
//! response or the error status.

use super::client::GcpClient;
use super::http::ApiError;
use crate::wait::{poll_until, PollOutcome};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationStatus>,
    #[serde(default)]
    pub response: Option<Value>,
}

/// google.rpc.Status carried by a failed operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        serde_json::from_value(value).map_err(ApiError::Decode)
    }

    /// Result of a finished operation; `None` while still running
    fn outcome(&self) -> Option<Result<Value, ApiError>> {
        if !self.done {
            return None;
        }
        Some(match &self.error {
            Some(status) => Err(ApiError::Operation {
                name: self.name.clone(),
                code: status.code,
                message: status.message.clone(),
            }),
            None => Ok(self.response.clone().unwrap_or(Value::Null)),
        })
    }
}

impl GcpClient {
    /// Poll an operation until it completes and return its response payload
    pub async fn wait_for_operation(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        if let Some(result) = operation.outcome() {
            return result;
        }
        if operation.name.is_empty() {
            return Err(ApiError::Unexpected(
                "running operation without a name".to_string(),
            ));
        }

        tracing::debug!("Waiting for operation {}", operation.name);
        let url = self.certificate_manager_url(&operation.name);
        let url = url.as_str();
        let policy = self.operation_policy;

        let outcome = poll_until(policy, cancel, || async move {
            let latest = Operation::from_value(self.get(url).await?)?;
            Ok::<_, ApiError>(latest.outcome())
        })
        .await?;

        match outcome {
            PollOutcome::Ready { value, .. } => value,
            PollOutcome::TimedOut { .. } => Err(ApiError::OperationTimeout {
                name: operation.name,
                waited_secs: policy.timeout.as_secs(),
            }),
            PollOutcome::Cancelled { .. } => Err(ApiError::Cancelled(operation.name)),
        }
    }
}
