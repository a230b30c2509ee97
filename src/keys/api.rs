//! IAM service-account key API

use crate::gcp::{ApiError, GcpClient};
use crate::resource_name::ResourceName;
use crate::secret::SecretString;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    #[default]
    KeyTypeUnspecified,
    UserManaged,
    /// Google-rotated keys; not managed by users
    SystemManaged,
    #[serde(other)]
    Unknown,
}

/// Key metadata as returned by `keys.list`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub name: String,
    #[serde(default)]
    pub key_type: KeyType,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub valid_after_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_before_time: Option<DateTime<Utc>>,
}

/// A freshly created key; `private_key` is the decoded credentials file
#[derive(Debug, Clone, PartialEq)]
pub struct NewKey {
    pub name: String,
    pub private_key: SecretString,
}

#[async_trait]
pub trait KeyApi: Send + Sync {
    async fn create_key(&self, account: &ResourceName) -> Result<NewKey, ApiError>;

    async fn delete_key(&self, key: &ResourceName) -> Result<(), ApiError>;

    async fn enable_key(&self, key: &ResourceName) -> Result<(), ApiError>;

    async fn disable_key(&self, key: &ResourceName) -> Result<(), ApiError>;

    /// All keys of the account, in provider order
    async fn list_keys(&self, account: &ResourceName) -> Result<Vec<KeyMetadata>, ApiError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedKeyResponse {
    name: String,
    #[serde(default)]
    private_key_data: Option<SecretString>,
}

#[derive(Deserialize)]
struct ListKeysResponse {
    #[serde(default)]
    keys: Vec<KeyMetadata>,
}

/// Decode `privateKeyData`; the error never includes the material itself
fn decode_private_key(encoded: &SecretString) -> Result<SecretString, ApiError> {
    let bytes = STANDARD
        .decode(encoded.expose().trim())
        .map_err(|_| ApiError::Unexpected("privateKeyData is not valid base64".to_string()))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ApiError::Unexpected("privateKeyData is not valid UTF-8".to_string()))?;
    Ok(SecretString::new(text))
}

#[async_trait]
impl KeyApi for GcpClient {
    async fn create_key(&self, account: &ResourceName) -> Result<NewKey, ApiError> {
        let url = self.iam_url(&format!("{}/keys", account));
        let response = self.post(&url, Some(&json!({}))).await?;
        let created: CreatedKeyResponse =
            serde_json::from_value(response).map_err(ApiError::Decode)?;

        let Some(encoded) = created.private_key_data else {
            return Err(ApiError::Unexpected(format!(
                "key {} was created without private key data",
                created.name
            )));
        };

        Ok(NewKey {
            private_key: decode_private_key(&encoded)?,
            name: created.name,
        })
    }

    async fn delete_key(&self, key: &ResourceName) -> Result<(), ApiError> {
        let url = self.iam_url(key.as_str());
        self.delete(&url).await?;
        Ok(())
    }

    async fn enable_key(&self, key: &ResourceName) -> Result<(), ApiError> {
        let url = self.iam_url(&format!("{}:enable", key));
        self.post(&url, Some(&json!({}))).await?;
        Ok(())
    }

    async fn disable_key(&self, key: &ResourceName) -> Result<(), ApiError> {
        let url = self.iam_url(&format!("{}:disable", key));
        self.post(&url, Some(&json!({}))).await?;
        Ok(())
    }

    async fn list_keys(&self, account: &ResourceName) -> Result<Vec<KeyMetadata>, ApiError> {
        let url = self.iam_url(&format!("{}/keys", account));
        let response = self.get(&url).await?;
        if response.is_null() {
            return Ok(Vec::new());
        }
        let listed: ListKeysResponse = serde_json::from_value(response).map_err(ApiError::Decode)?;
        Ok(listed.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_parsing() {
        let keys: ListKeysResponse = serde_json::from_value(json!({
            "keys": [
                {"name": "a", "keyType": "USER_MANAGED"},
                {"name": "b", "keyType": "SYSTEM_MANAGED"},
                {"name": "c"},
                {"name": "d", "keyType": "SOMETHING_ELSE"}
            ]
        }))
        .unwrap();

        let types: Vec<KeyType> = keys.keys.iter().map(|k| k.key_type).collect();
        assert_eq!(
            types,
            vec![
                KeyType::UserManaged,
                KeyType::SystemManaged,
                KeyType::KeyTypeUnspecified,
                KeyType::Unknown
            ]
        );
    }

    #[test]
    fn test_decode_private_key() {
        let encoded = SecretString::new(STANDARD.encode(r#"{"type": "service_account"}"#));
        let decoded = decode_private_key(&encoded).unwrap();
        assert_eq!(decoded.expose(), r#"{"type": "service_account"}"#);
    }

    #[test]
    fn test_decode_rejects_garbage_without_echoing_it() {
        let err = decode_private_key(&SecretString::new("not base64 !!")).unwrap_err();
        assert_eq!(err.to_string(), "unexpected response: privateKeyData is not valid base64");
    }
}
