//! Request parsing helpers shared by the adapter groups

use crate::error::ActionError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Read the `action` field of a request object
pub fn action_name(request: &Value) -> Result<&str, ActionError> {
    let Some(object) = request.as_object() else {
        return Err(ActionError::InvalidRequest(
            "request must be a JSON object".to_string(),
        ));
    };

    match object.get("action") {
        Some(Value::String(action)) => Ok(action),
        Some(_) => Err(ActionError::InvalidRequest(
            "action must be a string".to_string(),
        )),
        None => Err(ActionError::InvalidRequest("missing action".to_string())),
    }
}

/// Deserialize the action's argument fields from the request
pub fn fields<T: DeserializeOwned>(action: &str, request: &Value) -> Result<T, ActionError> {
    serde_json::from_value(request.clone())
        .map_err(|e| ActionError::InvalidRequest(format!("{} action: {}", action, e)))
}

/// Require an optional field to be present
pub fn required<T>(action: &str, field: &'static str, value: Option<T>) -> Result<T, ActionError> {
    value.ok_or_else(|| ActionError::MissingField {
        action: action.to_string(),
        field,
    })
}

/// Require a string field to be present and non-blank
pub fn required_str(
    action: &str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, ActionError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ActionError::MissingField {
            action: action.to_string(),
            field,
        }),
    }
}
