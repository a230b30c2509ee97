//! Compute Engine instance API

use crate::gcp::{ApiError, GcpClient};
use crate::resource_name::ResourceName;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Compute Engine instance status as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Suspending,
    Suspended,
    Repairing,
    /// Fully stopped
    Terminated,
    Unknown(String),
}

impl InstanceStatus {
    pub fn from_api_status(status: &str) -> Self {
        match status.to_uppercase().as_str() {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            "REPAIRING" => Self::Repairing,
            "TERMINATED" => Self::Terminated,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provisioning => "PROVISIONING",
            Self::Staging => "STAGING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Suspending => "SUSPENDING",
            Self::Suspended => "SUSPENDED",
            Self::Repairing => "REPAIRING",
            Self::Terminated => "TERMINATED",
            Self::Unknown(other) => other,
        };
        f.write_str(s)
    }
}

/// Power operations on a single instance.
///
/// Start, stop and reset return as soon as GCP accepts the request, with
/// the name of the zonal operation when one is reported.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    async fn start_instance(&self, instance: &ResourceName) -> Result<Option<String>, ApiError>;

    async fn stop_instance(&self, instance: &ResourceName) -> Result<Option<String>, ApiError>;

    async fn reset_instance(&self, instance: &ResourceName) -> Result<Option<String>, ApiError>;

    async fn instance_status(&self, instance: &ResourceName) -> Result<InstanceStatus, ApiError>;
}

fn operation_name(response: &Value) -> Option<String> {
    response
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl InstanceApi for GcpClient {
    async fn start_instance(&self, instance: &ResourceName) -> Result<Option<String>, ApiError> {
        let url = self.compute_url(&format!("{}/start", instance));
        let response = self.post(&url, None).await?;
        Ok(operation_name(&response))
    }

    async fn stop_instance(&self, instance: &ResourceName) -> Result<Option<String>, ApiError> {
        let url = self.compute_url(&format!("{}/stop", instance));
        let response = self.post(&url, None).await?;
        Ok(operation_name(&response))
    }

    async fn reset_instance(&self, instance: &ResourceName) -> Result<Option<String>, ApiError> {
        let url = self.compute_url(&format!("{}/reset", instance));
        let response = self.post(&url, None).await?;
        Ok(operation_name(&response))
    }

    async fn instance_status(&self, instance: &ResourceName) -> Result<InstanceStatus, ApiError> {
        let url = self.compute_url(instance.as_str());
        let response = self.get(&url).await?;

        let status = response
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Unexpected(format!("instance {} has no status", instance)))?;

        Ok(InstanceStatus::from_api_status(status))
    }
}
