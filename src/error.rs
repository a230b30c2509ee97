//! Error type shared by all adapter groups

use crate::gcp::ApiError;
use crate::resource_name::NameError;
use serde::Serialize;
use thiserror::Error;

/// Stable classification of an [`ActionError`], reported as `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    UnknownAction,
    MissingField,
    Remote,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Input problems the caller has to fix; nothing was sent to GCP
    pub fn is_caller_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest | ErrorKind::UnknownAction | ErrorKind::MissingField
        )
    }

    /// Status code for HTTP-shaped hosts
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::UnknownAction | ErrorKind::MissingField => 400,
            ErrorKind::Cancelled => 503,
            ErrorKind::Remote | ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{field} is required for {action} action")]
    MissingField { action: String, field: &'static str },

    #[error("Invalid {field} for {action} action: {reason}")]
    InvalidField {
        action: String,
        field: &'static str,
        reason: String,
    },

    /// A GCP call failed; `verb` names the operation, e.g. "starting VM"
    #[error("Error {verb}: {source}")]
    Remote {
        verb: &'static str,
        #[source]
        source: ApiError,
    },

    /// A step of a compound action (restart, rotate) failed
    #[error("Error {verb}: {source}")]
    Sequence {
        verb: &'static str,
        #[source]
        source: Box<ActionError>,
    },

    #[error("Cancelled while {0}")]
    Cancelled(String),

    #[error("Failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ActionError {
    /// Adapter for `map_err` on GCP calls
    pub fn remote(verb: &'static str) -> impl FnOnce(ApiError) -> ActionError {
        move |source| ActionError::Remote { verb, source }
    }

    /// Map a resource-name error for the given action
    pub fn from_name(action: &str, err: NameError) -> Self {
        match err {
            NameError::Empty(field) => ActionError::MissingField {
                action: action.to_string(),
                field,
            },
            NameError::NotASegment { field, .. } => ActionError::InvalidField {
                action: action.to_string(),
                field,
                reason: err.to_string(),
            },
        }
    }

    /// Wrap this error as a failed step of a compound action
    pub fn in_sequence(self, verb: &'static str) -> Self {
        ActionError::Sequence {
            verb,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::InvalidRequest(_) | ActionError::InvalidField { .. } => {
                ErrorKind::InvalidRequest
            },
            ActionError::UnknownAction(_) => ErrorKind::UnknownAction,
            ActionError::MissingField { .. } => ErrorKind::MissingField,
            ActionError::Remote { source, .. } if source.is_cancelled() => ErrorKind::Cancelled,
            ActionError::Remote { .. } => ErrorKind::Remote,
            ActionError::Sequence { source, .. } => source.kind(),
            ActionError::Cancelled(_) => ErrorKind::Cancelled,
            ActionError::Encode(_) => ErrorKind::Internal,
        }
    }
}
