//! Resource names
//!
//! GCP addresses every resource by a `/`-separated name built from a fixed
//! template. Each template field must be a non-empty single segment, so a
//! bad field is rejected here instead of producing a name the API cannot
//! resolve.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} must be a single path segment, got '{value}'")]
    NotASegment { field: &'static str, value: String },
}

impl NameError {
    pub fn field(&self) -> &'static str {
        match self {
            NameError::Empty(field) => field,
            NameError::NotASegment { field, .. } => field,
        }
    }
}

fn segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str, NameError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NameError::Empty(field));
    }
    if value.contains('/') {
        return Err(NameError::NotASegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// A fully qualified resource name such as `projects/p/locations/global/certificates/c`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    /// `projects/{project}/locations/global`
    pub fn certificate_parent(project_id: &str) -> Result<Self, NameError> {
        let project = segment("project_id", project_id)?;
        Ok(Self(format!("projects/{}/locations/global", project)))
    }

    /// `projects/{project}/locations/global/certificates/{name}`
    pub fn certificate(project_id: &str, name: &str) -> Result<Self, NameError> {
        let parent = Self::certificate_parent(project_id)?;
        let name = segment("name", name)?;
        Ok(Self(format!("{}/certificates/{}", parent.0, name)))
    }

    /// `projects/{project}/zones/{zone}/instances/{instance}`
    pub fn instance(project: &str, zone: &str, instance: &str) -> Result<Self, NameError> {
        let project = segment("project", project)?;
        let zone = segment("zone", zone)?;
        let instance = segment("instance", instance)?;
        Ok(Self(format!(
            "projects/{}/zones/{}/instances/{}",
            project, zone, instance
        )))
    }

    /// `projects/{project}/serviceAccounts/{email}`
    pub fn service_account(project_id: &str, email: &str) -> Result<Self, NameError> {
        let project = segment("project_id", project_id)?;
        let email = segment("service_account_email", email)?;
        Ok(Self(format!("projects/{}/serviceAccounts/{}", project, email)))
    }

    /// `projects/{project}/serviceAccounts/{email}/keys/{key_id}`
    pub fn service_account_key(
        project_id: &str,
        email: &str,
        key_id: &str,
    ) -> Result<Self, NameError> {
        let account = Self::service_account(project_id, email)?;
        let key_id = segment("key_id", key_id)?;
        Ok(Self(format!("{}/keys/{}", account.0, key_id)))
    }

    /// Key resource under this service account name
    pub fn key(&self, key_id: &str) -> Result<Self, NameError> {
        let key_id = segment("key_id", key_id)?;
        Ok(Self(format!("{}/keys/{}", self.0, key_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment (the resource's own identifier)
    pub fn id(&self) -> &str {
        trailing_segment(&self.0)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Last `/`-separated segment of a resource name
pub fn trailing_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
