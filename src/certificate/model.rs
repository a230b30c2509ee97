//! Certificate Manager resource types

use crate::gcp::ApiError;
use crate::secret::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `certificatemanager.googleapis.com/Certificate` as exchanged over REST
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<ManagedCertificate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_managed: Option<SelfManagedCertificate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub san_dnsnames: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCertificate {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_authorizations: Vec<String>,
    /// Provisioning state, output only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfManagedCertificate {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pem_certificate: String,
    /// Write only; never returned by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_private_key: Option<SecretString>,
}

impl Certificate {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        serde_json::from_value(value).map_err(ApiError::Decode)
    }

    pub fn is_managed(&self) -> bool {
        self.managed.is_some()
    }
}

/// Field paths replaced by a partial update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateMask(Vec<&'static str>);

impl UpdateMask {
    pub fn push(&mut self, path: &'static str) {
        if !self.0.contains(&path) {
            self.0.push(path);
        }
    }

    pub fn paths(&self) -> &[&'static str] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of the `updateMask` query parameter
    pub fn to_param(&self) -> String {
        self.0.join(",")
    }
}

/// Certificate as reported by the `get` action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateDetails {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// `managed` or `self_managed`
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub san_dnsnames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pem_certificate: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
}

impl From<Certificate> for CertificateDetails {
    fn from(cert: Certificate) -> Self {
        let (kind, domains, state) = match cert.managed {
            Some(managed) => ("managed", managed.domains, managed.state),
            None => ("self_managed", Vec::new(), None),
        };
        let pem_certificate = cert
            .pem_certificate
            .or_else(|| cert.self_managed.map(|s| s.pem_certificate))
            .filter(|pem| !pem.is_empty());

        Self {
            name: cert.name,
            description: cert.description,
            scope: cert.scope,
            kind,
            domains,
            state,
            san_dnsnames: cert.san_dnsnames,
            pem_certificate,
            labels: cert.labels,
            create_time: cert.create_time,
            update_time: cert.update_time,
            expire_time: cert.expire_time,
        }
    }
}
