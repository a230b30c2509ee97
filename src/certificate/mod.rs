//! Certificate adapter
//!
//! Actions: `create` (managed), `create_self_uploaded`, `delete`, `get`
//! and `update`. Updates are partial: only the field paths recorded in the
//! [`UpdateMask`] are sent, and a `domains` update against a self-uploaded
//! certificate is ignored.

mod api;
mod model;

pub use api::CertificateApi;
pub use model::{
    Certificate, CertificateDetails, ManagedCertificate, SelfManagedCertificate, UpdateMask,
};

use crate::error::ActionError;
use crate::request;
use crate::resource_name::ResourceName;
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Action names accepted by this group
pub const ACTIONS: &[&str] = &["create", "create_self_uploaded", "delete", "get", "update"];

#[derive(Debug, Clone, PartialEq)]
pub enum CertificateAction {
    CreateManaged(NewCertificate),
    CreateSelfUploaded(NewCertificate),
    Delete(ResourceName),
    Get(ResourceName),
    Update(CertificateUpdate),
}

/// Where the certificate material comes from
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateSource {
    Managed {
        domains: Vec<String>,
    },
    SelfManaged {
        pem_certificate: String,
        pem_private_key: SecretString,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCertificate {
    pub parent: ResourceName,
    pub name: ResourceName,
    pub description: String,
    pub scope: String,
    pub labels: BTreeMap<String, String>,
    pub source: CertificateSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateUpdate {
    pub name: ResourceName,
    pub description: Option<String>,
    pub domains: Option<Vec<String>>,
}

/// Raw request fields before validation
#[derive(Debug, Default, Deserialize)]
struct CertificateFields {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    domains: Option<Vec<String>>,
    #[serde(default)]
    certificate: Option<String>,
    #[serde(default)]
    private_key: Option<SecretString>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

impl CertificateAction {
    /// Validate a request into a typed action
    pub fn from_request(request: &Value) -> Result<Self, ActionError> {
        let action = request::action_name(request)?;
        if !ACTIONS.contains(&action) {
            return Err(ActionError::UnknownAction(action.to_string()));
        }

        let fields: CertificateFields = request::fields(action, request)?;
        let name = ResourceName::certificate(&fields.project_id, &fields.name)
            .map_err(|e| ActionError::from_name(action, e))?;

        match action {
            "create" => {
                let domains = request::required(action, "domains", fields.domains)?;
                if domains.is_empty() {
                    return Err(ActionError::MissingField {
                        action: action.to_string(),
                        field: "domains",
                    });
                }
                Ok(CertificateAction::CreateManaged(NewCertificate {
                    parent: parent_of(action, &fields.project_id)?,
                    name,
                    description: request::required(action, "description", fields.description)?,
                    scope: request::required_str(action, "scope", fields.scope)?,
                    labels: fields.labels,
                    source: CertificateSource::Managed { domains },
                }))
            },
            "create_self_uploaded" => {
                let pem_certificate =
                    request::required_str(action, "certificate", fields.certificate)?;
                let pem_private_key = request::required(action, "private_key", fields.private_key)?;
                if pem_private_key.is_empty() {
                    return Err(ActionError::MissingField {
                        action: action.to_string(),
                        field: "private_key",
                    });
                }
                Ok(CertificateAction::CreateSelfUploaded(NewCertificate {
                    parent: parent_of(action, &fields.project_id)?,
                    name,
                    description: request::required(action, "description", fields.description)?,
                    scope: request::required_str(action, "scope", fields.scope)?,
                    labels: fields.labels,
                    source: CertificateSource::SelfManaged {
                        pem_certificate,
                        pem_private_key,
                    },
                }))
            },
            "delete" => Ok(CertificateAction::Delete(name)),
            "get" => Ok(CertificateAction::Get(name)),
            "update" => Ok(CertificateAction::Update(CertificateUpdate {
                name,
                description: fields.description,
                domains: fields.domains,
            })),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}

fn parent_of(action: &str, project_id: &str) -> Result<ResourceName, ActionError> {
    ResourceName::certificate_parent(project_id).map_err(|e| ActionError::from_name(action, e))
}

/// Success payload of every certificate action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateReply {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateDetails>,
}

impl CertificateReply {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            certificate: None,
        }
    }
}

/// Run a validated certificate action
pub async fn execute(
    api: &dyn CertificateApi,
    action: CertificateAction,
    cancel: &CancellationToken,
) -> Result<CertificateReply, ActionError> {
    match action {
        CertificateAction::CreateManaged(new) | CertificateAction::CreateSelfUploaded(new) => {
            create(api, new, cancel).await
        },
        CertificateAction::Delete(name) => delete(api, &name, cancel).await,
        CertificateAction::Get(name) => get(api, &name).await,
        CertificateAction::Update(update_request) => update(api, update_request, cancel).await,
    }
}

/// Create a managed or self-uploaded certificate
pub async fn create(
    api: &dyn CertificateApi,
    new: NewCertificate,
    cancel: &CancellationToken,
) -> Result<CertificateReply, ActionError> {
    let (label, verb) = match new.source {
        CertificateSource::Managed { .. } => ("Managed", "creating managed certificate"),
        CertificateSource::SelfManaged { .. } => {
            ("Self-uploaded", "creating self-uploaded certificate")
        },
    };
    tracing::info!(certificate = %new.name, "{} certificate requested", label);

    let certificate_id = new.name.id().to_string();
    let resource = Certificate {
        name: new.name.to_string(),
        description: new.description,
        scope: Some(new.scope),
        labels: new.labels,
        managed: match &new.source {
            CertificateSource::Managed { domains } => Some(ManagedCertificate {
                domains: domains.clone(),
                ..Default::default()
            }),
            CertificateSource::SelfManaged { .. } => None,
        },
        self_managed: match new.source {
            CertificateSource::SelfManaged {
                pem_certificate,
                pem_private_key,
            } => Some(SelfManagedCertificate {
                pem_certificate,
                pem_private_key: Some(pem_private_key),
            }),
            CertificateSource::Managed { .. } => None,
        },
        ..Default::default()
    };

    let created = api
        .create_certificate(&new.parent, &certificate_id, &resource, cancel)
        .await
        .map_err(ActionError::remote(verb))?;

    Ok(CertificateReply::message(format!(
        "{} certificate {} created successfully",
        label,
        display_name(&created, &new.name)
    )))
}

pub async fn delete(
    api: &dyn CertificateApi,
    name: &ResourceName,
    cancel: &CancellationToken,
) -> Result<CertificateReply, ActionError> {
    tracing::info!(certificate = %name, "Deleting certificate");

    api.delete_certificate(name, cancel)
        .await
        .map_err(ActionError::remote("deleting certificate"))?;

    Ok(CertificateReply::message(format!(
        "Certificate {} deleted successfully",
        name.id()
    )))
}

pub async fn get(
    api: &dyn CertificateApi,
    name: &ResourceName,
) -> Result<CertificateReply, ActionError> {
    let certificate = api
        .get_certificate(name)
        .await
        .map_err(ActionError::remote("getting certificate details"))?;

    let details = CertificateDetails::from(certificate);
    Ok(CertificateReply {
        message: format!("Certificate {} retrieved", name),
        certificate: Some(details),
    })
}

/// Fetch, patch the requested fields, and send a masked update
pub async fn update(
    api: &dyn CertificateApi,
    update_request: CertificateUpdate,
    cancel: &CancellationToken,
) -> Result<CertificateReply, ActionError> {
    let verb = "updating certificate";
    let mut current = api
        .get_certificate(&update_request.name)
        .await
        .map_err(ActionError::remote(verb))?;

    let mask = apply_update(&mut current, &update_request);
    if mask.is_empty() {
        tracing::info!(certificate = %update_request.name, "No updates requested");
        return Ok(CertificateReply::message("No updates requested"));
    }

    if current.name.is_empty() {
        current.name = update_request.name.to_string();
    }
    tracing::info!(
        certificate = %update_request.name,
        mask = %mask.to_param(),
        "Updating certificate"
    );

    let updated = api
        .update_certificate(&current, &mask, cancel)
        .await
        .map_err(ActionError::remote(verb))?;

    Ok(CertificateReply::message(format!(
        "Certificate {} updated successfully",
        display_name(&updated, &update_request.name)
    )))
}

/// Apply requested changes to `current` and return the touched field paths
pub fn apply_update(current: &mut Certificate, update_request: &CertificateUpdate) -> UpdateMask {
    let mut mask = UpdateMask::default();

    if let Some(description) = &update_request.description {
        current.description = description.clone();
        mask.push("description");
    }

    if let Some(domains) = &update_request.domains {
        // Self-uploaded certificates have no domain list
        if let Some(managed) = current.managed.as_mut() {
            managed.domains = domains.clone();
            mask.push("managed.domains");
        }
    }

    mask
}

fn display_name<'a>(returned: &'a Certificate, requested: &'a ResourceName) -> &'a str {
    if returned.name.is_empty() {
        requested.as_str()
    } else {
        &returned.name
    }
}
