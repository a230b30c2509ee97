//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::{ApiError, GcpHttpClient};
use crate::config::{Endpoints, Settings};
use crate::wait::PollPolicy;
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub endpoints: Endpoints,
    /// Cadence and deadline for long-running operation waits
    pub operation_policy: PollPolicy,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new(settings: &Settings) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(credentials, settings).context("Failed to create HTTP client")
    }

    /// Create a client around existing credentials
    pub fn with_credentials(
        credentials: GcpCredentials,
        settings: &Settings,
    ) -> std::result::Result<Self, ApiError> {
        let http = GcpHttpClient::new(&settings.user_agent)?;

        Ok(Self {
            credentials,
            http,
            endpoints: settings.endpoints.clone(),
            operation_policy: settings.operation_policy(),
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> std::result::Result<String, ApiError> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| ApiError::Auth(format!("{e:#}")))
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> std::result::Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> std::result::Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    /// Make a PATCH request to a GCP API
    pub async fn patch(&self, url: &str, body: &Value) -> std::result::Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.patch(url, &token, body).await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str) -> std::result::Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    // =========================================================================
    // Certificate Manager API helpers
    // =========================================================================

    /// Build Certificate Manager API URL for a resource or operation name
    pub fn certificate_manager_url(&self, name: &str) -> String {
        join_url(&self.endpoints.certificate_manager, name)
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL for a `projects/...` path
    pub fn compute_url(&self, path: &str) -> String {
        join_url(&self.endpoints.compute, path)
    }

    // =========================================================================
    // IAM API helpers
    // =========================================================================

    /// Build IAM API URL for a `projects/...` path
    pub fn iam_url(&self, path: &str) -> String {
        join_url(&self.endpoints.iam, path)
    }
}

fn join_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        let settings = Settings::default();
        GcpClient::with_credentials(GcpCredentials::with_static_token("t"), &settings).unwrap()
    }

    #[test]
    fn test_default_endpoint_urls() {
        let client = client();
        assert_eq!(
            client.certificate_manager_url("projects/p/locations/global/certificates/c"),
            "https://certificatemanager.googleapis.com/v1/projects/p/locations/global/certificates/c"
        );
        assert_eq!(
            client.compute_url("projects/p/zones/z/instances/vm/start"),
            "https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/vm/start"
        );
        assert_eq!(
            client.iam_url("projects/p/serviceAccounts/sa@p.iam.gserviceaccount.com/keys"),
            "https://iam.googleapis.com/v1/projects/p/serviceAccounts/sa@p.iam.gserviceaccount.com/keys"
        );
    }

    #[test]
    fn test_join_url_handles_trailing_slash() {
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(join_url(&base, "/projects/p"), "http://127.0.0.1:8080/projects/p");
    }
}
