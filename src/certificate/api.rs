//! Certificate Manager API
//!
//! [`CertificateApi`] is the seam the certificate handlers call through;
//! [`GcpClient`] implements it against the Certificate Manager v1 REST API.

use super::model::{Certificate, UpdateMask};
use crate::gcp::{ApiError, GcpClient, Operation};
use crate::resource_name::ResourceName;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait CertificateApi: Send + Sync {
    /// Create a certificate and wait for the operation to finish
    async fn create_certificate(
        &self,
        parent: &ResourceName,
        certificate_id: &str,
        certificate: &Certificate,
        cancel: &CancellationToken,
    ) -> Result<Certificate, ApiError>;

    async fn get_certificate(&self, name: &ResourceName) -> Result<Certificate, ApiError>;

    /// Replace only the fields named in `mask` and wait for the operation
    async fn update_certificate(
        &self,
        certificate: &Certificate,
        mask: &UpdateMask,
        cancel: &CancellationToken,
    ) -> Result<Certificate, ApiError>;

    async fn delete_certificate(
        &self,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl CertificateApi for GcpClient {
    async fn create_certificate(
        &self,
        parent: &ResourceName,
        certificate_id: &str,
        certificate: &Certificate,
        cancel: &CancellationToken,
    ) -> Result<Certificate, ApiError> {
        let url = format!(
            "{}?certificateId={}",
            self.certificate_manager_url(&format!("{}/certificates", parent)),
            urlencoding::encode(certificate_id)
        );
        let body = serde_json::to_value(certificate).map_err(ApiError::Decode)?;

        let operation = Operation::from_value(self.post(&url, Some(&body)).await?)?;
        let response = self.wait_for_operation(operation, cancel).await?;
        certificate_or(response, certificate)
    }

    async fn get_certificate(&self, name: &ResourceName) -> Result<Certificate, ApiError> {
        let url = self.certificate_manager_url(name.as_str());
        Certificate::from_value(self.get(&url).await?)
    }

    async fn update_certificate(
        &self,
        certificate: &Certificate,
        mask: &UpdateMask,
        cancel: &CancellationToken,
    ) -> Result<Certificate, ApiError> {
        if certificate.name.is_empty() {
            return Err(ApiError::Unexpected(
                "certificate to update has no name".to_string(),
            ));
        }

        let url = format!(
            "{}?updateMask={}",
            self.certificate_manager_url(&certificate.name),
            urlencoding::encode(&mask.to_param())
        );
        let body = serde_json::to_value(certificate).map_err(ApiError::Decode)?;

        let operation = Operation::from_value(self.patch(&url, &body).await?)?;
        let response = self.wait_for_operation(operation, cancel).await?;
        certificate_or(response, certificate)
    }

    async fn delete_certificate(
        &self,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        let url = self.certificate_manager_url(name.as_str());
        let operation = Operation::from_value(self.delete(&url).await?)?;
        self.wait_for_operation(operation, cancel).await?;
        Ok(())
    }
}

/// Decode an operation response, falling back to the submitted resource when it is empty
fn certificate_or(response: Value, submitted: &Certificate) -> Result<Certificate, ApiError> {
    if response.is_null() {
        return Ok(submitted.clone());
    }
    Certificate::from_value(response)
}
