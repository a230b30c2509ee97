//! Service-account key adapter
//!
//! Actions: `create`, `delete`, `rotate`, `enable`, `disable`, `list` and
//! `delete_all`. Private key material only ever travels inside a
//! [`SecretString`] and is handed back to the caller once, in the reply to
//! `create` or `rotate`.
//!
//! `rotate` is delete-then-create with no rollback: if create fails after
//! the old key is gone, the account is left one key short and the error
//! says so.

mod api;

pub use api::{KeyApi, KeyMetadata, KeyType, NewKey};

use crate::error::ActionError;
use crate::request;
use crate::resource_name::{trailing_segment, ResourceName};
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action names accepted by this group
pub const ACTIONS: &[&str] = &[
    "create",
    "delete",
    "rotate",
    "enable",
    "disable",
    "list",
    "delete_all",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAccount {
    pub name: ResourceName,
    pub email: String,
}

impl ServiceAccount {
    fn key(&self, action: &str, key_id: Option<String>) -> Result<KeyRef, ActionError> {
        let key_id = request::required_str(action, "key_id", key_id)?;
        let name = self
            .name
            .key(&key_id)
            .map_err(|e| ActionError::from_name(action, e))?;
        Ok(KeyRef {
            account: self.clone(),
            name,
        })
    }
}

/// A single key of a service account
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRef {
    pub account: ServiceAccount,
    pub name: ResourceName,
}

impl KeyRef {
    pub fn key_id(&self) -> &str {
        self.name.id()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Create(ServiceAccount),
    Delete(KeyRef),
    Rotate(KeyRef),
    Enable(KeyRef),
    Disable(KeyRef),
    List(ServiceAccount),
    DeleteAll(ServiceAccount),
}

#[derive(Debug, Default, Deserialize)]
struct KeyFields {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    service_account_email: String,
    #[serde(default)]
    key_id: Option<String>,
}

impl KeyAction {
    pub fn from_request(request: &Value) -> Result<Self, ActionError> {
        let action = request::action_name(request)?;
        if !ACTIONS.contains(&action) {
            return Err(ActionError::UnknownAction(action.to_string()));
        }

        let fields: KeyFields = request::fields(action, request)?;
        let account = ServiceAccount {
            name: ResourceName::service_account(&fields.project_id, &fields.service_account_email)
                .map_err(|e| ActionError::from_name(action, e))?,
            email: fields.service_account_email.trim().to_string(),
        };

        match action {
            "create" => Ok(KeyAction::Create(account)),
            "delete" => Ok(KeyAction::Delete(account.key(action, fields.key_id)?)),
            "rotate" => Ok(KeyAction::Rotate(account.key(action, fields.key_id)?)),
            "enable" => Ok(KeyAction::Enable(account.key(action, fields.key_id)?)),
            "disable" => Ok(KeyAction::Disable(account.key(action, fields.key_id)?)),
            "list" => Ok(KeyAction::List(account)),
            "delete_all" => Ok(KeyAction::DeleteAll(account)),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}

/// Reply to `create` and a successful `rotate`.
///
/// Deliberately not `Clone`: the reply is the only holder of the key.
#[derive(Debug, PartialEq, Serialize)]
pub struct CreatedKey {
    pub private_key: SecretString,
    pub key_id: String,
    pub service_account_email: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDeletion {
    Deleted,
    /// The provider reported not-found or failed-precondition
    AlreadyAbsent { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Deleted,
    AlreadyAbsent,
    Enabled,
    Disabled,
    Noop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDeletion {
    pub key_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteAllReport {
    pub message: String,
    pub deleted_keys: Vec<String>,
    pub failed_keys: Vec<FailedDeletion>,
    pub attempted: usize,
    pub deleted: usize,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyReply {
    Created(CreatedKey),
    Status { message: String, status: KeyStatus },
    Listed { message: String, key_ids: Vec<String> },
    DeletedAll(DeleteAllReport),
}

impl KeyReply {
    fn status(message: String, status: KeyStatus) -> Self {
        KeyReply::Status { message, status }
    }
}

pub async fn execute(api: &dyn KeyApi, action: KeyAction) -> Result<KeyReply, ActionError> {
    match action {
        KeyAction::Create(account) => create(api, &account).await.map(KeyReply::Created),
        KeyAction::Delete(key) => {
            let reply = match delete(api, &key).await? {
                KeyDeletion::Deleted => KeyReply::status(
                    format!("Successfully deleted key {}", key.key_id()),
                    KeyStatus::Deleted,
                ),
                KeyDeletion::AlreadyAbsent { detail } => KeyReply::status(
                    format!(
                        "Failed to delete key {}. The key may not exist: {}",
                        key.key_id(),
                        detail
                    ),
                    KeyStatus::AlreadyAbsent,
                ),
            };
            Ok(reply)
        },
        KeyAction::Rotate(key) => match rotate(api, &key).await? {
            Some(created) => Ok(KeyReply::Created(created)),
            None => Ok(KeyReply::status(
                format!("Key {} was not deleted; no new key created", key.key_id()),
                KeyStatus::Noop,
            )),
        },
        KeyAction::Enable(key) => {
            enable(api, &key).await?;
            Ok(KeyReply::status(
                format!("Successfully enabled key {}", key.key_id()),
                KeyStatus::Enabled,
            ))
        },
        KeyAction::Disable(key) => {
            disable(api, &key).await?;
            Ok(KeyReply::status(
                format!("Successfully disabled key {}", key.key_id()),
                KeyStatus::Disabled,
            ))
        },
        KeyAction::List(account) => {
            let key_ids = list(api, &account).await?;
            Ok(KeyReply::Listed {
                message: format!(
                    "Found {} user-managed keys for {}",
                    key_ids.len(),
                    account.email
                ),
                key_ids,
            })
        },
        KeyAction::DeleteAll(account) => delete_all(api, &account).await.map(KeyReply::DeletedAll),
    }
}

pub async fn create(api: &dyn KeyApi, account: &ServiceAccount) -> Result<CreatedKey, ActionError> {
    tracing::info!(account = %account.name, "Creating service account key");
    let key = api
        .create_key(&account.name)
        .await
        .map_err(ActionError::remote("creating service account key"))?;

    let key_id = trailing_segment(&key.name).to_string();
    tracing::info!(account = %account.name, key_id = %key_id, "Service account key created");

    Ok(CreatedKey {
        private_key: key.private_key,
        key_id,
        service_account_email: account.email.clone(),
        message: format!("Access key for {} created successfully", account.name),
    })
}

/// Delete one key. A key that is already gone is not an error.
pub async fn delete(api: &dyn KeyApi, key: &KeyRef) -> Result<KeyDeletion, ActionError> {
    tracing::info!(key = %key.name, "Deleting service account key");
    match api.delete_key(&key.name).await {
        Ok(()) => Ok(KeyDeletion::Deleted),
        Err(e) if e.is_failed_precondition() || e.is_not_found() => {
            tracing::warn!(key = %key.name, error = %e, "Key already absent");
            Ok(KeyDeletion::AlreadyAbsent {
                detail: e.to_string(),
            })
        },
        Err(e) => Err(ActionError::remote("deleting service account key")(e)),
    }
}

/// Delete `key`, then create a replacement only if the delete went through.
///
/// Returns `None` when the old key was already absent.
pub async fn rotate(api: &dyn KeyApi, key: &KeyRef) -> Result<Option<CreatedKey>, ActionError> {
    let deletion = delete(api, key)
        .await
        .map_err(|e| e.in_sequence("rotating service account key"))?;

    if let KeyDeletion::AlreadyAbsent { .. } = deletion {
        tracing::info!(key = %key.name, "Key was not deleted, skipping create");
        return Ok(None);
    }

    match create(api, &key.account).await {
        Ok(created) => Ok(Some(created)),
        Err(e) => {
            tracing::error!(
                key = %key.name,
                error = %e,
                "Rotation left the account without a replacement key"
            );
            Err(e.in_sequence("rotating service account key (old key already deleted)"))
        },
    }
}

pub async fn enable(api: &dyn KeyApi, key: &KeyRef) -> Result<(), ActionError> {
    tracing::info!(key = %key.name, "Enabling service account key");
    api.enable_key(&key.name)
        .await
        .map_err(ActionError::remote("enabling service account key"))
}

pub async fn disable(api: &dyn KeyApi, key: &KeyRef) -> Result<(), ActionError> {
    tracing::info!(key = %key.name, "Disabling service account key");
    api.disable_key(&key.name)
        .await
        .map_err(ActionError::remote("disabling service account key"))
}

/// User-managed key ids, in provider order
pub async fn list(api: &dyn KeyApi, account: &ServiceAccount) -> Result<Vec<String>, ActionError> {
    let keys = api
        .list_keys(&account.name)
        .await
        .map_err(ActionError::remote("listing service account keys"))?;

    Ok(user_managed_ids(&keys))
}

/// Ids of keys that are not system-managed
pub fn user_managed_ids(keys: &[KeyMetadata]) -> Vec<String> {
    keys.iter()
        .filter(|k| k.key_type != KeyType::SystemManaged)
        .map(|k| trailing_segment(&k.name).to_string())
        .collect()
}

/// Delete every user-managed key, one at a time; failures do not stop the loop
pub async fn delete_all(
    api: &dyn KeyApi,
    account: &ServiceAccount,
) -> Result<DeleteAllReport, ActionError> {
    let key_ids = list(api, account)
        .await
        .map_err(|e| e.in_sequence("deleting all service account keys"))?;

    let mut deleted_keys = Vec::new();
    let mut failed_keys = Vec::new();

    for key_id in &key_ids {
        let key = match account.key("delete_all", Some(key_id.clone())) {
            Ok(key) => key,
            Err(e) => {
                failed_keys.push(FailedDeletion {
                    key_id: key_id.clone(),
                    reason: e.to_string(),
                });
                continue;
            },
        };

        match delete(api, &key).await {
            Ok(KeyDeletion::Deleted) => deleted_keys.push(key_id.clone()),
            Ok(KeyDeletion::AlreadyAbsent { detail }) => failed_keys.push(FailedDeletion {
                key_id: key_id.clone(),
                reason: detail,
            }),
            Err(e) => failed_keys.push(FailedDeletion {
                key_id: key_id.clone(),
                reason: e.to_string(),
            }),
        }
    }

    tracing::info!(
        account = %account.name,
        attempted = key_ids.len(),
        deleted = deleted_keys.len(),
        "Deleted service account keys"
    );

    Ok(DeleteAllReport {
        message: format!("deleted_keys: {:?}", deleted_keys),
        attempted: key_ids.len(),
        deleted: deleted_keys.len(),
        deleted_keys,
        failed_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gcp::ApiError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum DeleteBehaviour {
        Precondition,
        NotFound,
        Denied,
    }

    fn status_error(status: StatusCode, code: &str, message: &str) -> ApiError {
        ApiError::Status {
            status,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Records calls; deletes succeed unless scripted otherwise
    #[derive(Default)]
    struct FakeKeys {
        keys: Vec<(&'static str, KeyType)>,
        deletes: HashMap<&'static str, DeleteBehaviour>,
        fail_create: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeKeys {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyApi for FakeKeys {
        async fn create_key(&self, account: &ResourceName) -> Result<NewKey, ApiError> {
            self.record(format!("create {}", account));
            if self.fail_create {
                return Err(status_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    "RESOURCE_EXHAUSTED",
                    "Key quota exceeded",
                ));
            }
            Ok(NewKey {
                name: format!("{}/keys/new-key", account),
                private_key: SecretString::new("{\"private_key\": \"material\"}"),
            })
        }

        async fn delete_key(&self, key: &ResourceName) -> Result<(), ApiError> {
            self.record(format!("delete {}", key.id()));
            match self.deletes.get(key.id()) {
                None => Ok(()),
                Some(DeleteBehaviour::Precondition) => Err(status_error(
                    StatusCode::BAD_REQUEST,
                    "FAILED_PRECONDITION",
                    "Precondition check failed.",
                )),
                Some(DeleteBehaviour::NotFound) => Err(status_error(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Key not found",
                )),
                Some(DeleteBehaviour::Denied) => Err(status_error(
                    StatusCode::FORBIDDEN,
                    "PERMISSION_DENIED",
                    "Permission denied",
                )),
            }
        }

        async fn enable_key(&self, key: &ResourceName) -> Result<(), ApiError> {
            self.record(format!("enable {}", key.id()));
            Ok(())
        }

        async fn disable_key(&self, key: &ResourceName) -> Result<(), ApiError> {
            self.record(format!("disable {}", key.id()));
            Ok(())
        }

        async fn list_keys(&self, account: &ResourceName) -> Result<Vec<KeyMetadata>, ApiError> {
            self.record("list".into());
            Ok(self
                .keys
                .iter()
                .map(|(id, key_type)| KeyMetadata {
                    name: format!("{}/keys/{}", account, id),
                    key_type: *key_type,
                    disabled: false,
                    valid_after_time: None,
                    valid_before_time: None,
                })
                .collect())
        }
    }

    const EMAIL: &str = "deployer@p.iam.gserviceaccount.com";

    fn account() -> ServiceAccount {
        ServiceAccount {
            name: ResourceName::service_account("p", EMAIL).unwrap(),
            email: EMAIL.to_string(),
        }
    }

    fn key(key_id: &str) -> KeyRef {
        account().key("delete", Some(key_id.to_string())).unwrap()
    }

    #[test]
    fn test_key_actions_require_key_id() {
        for action in ["delete", "rotate", "enable", "disable"] {
            let request = json!({"action": action, "project_id": "p", "service_account_email": EMAIL});
            let err = KeyAction::from_request(&request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingField);
            assert_eq!(err.to_string(), format!("key_id is required for {} action", action));
        }
    }

    #[test]
    fn test_parse_key_actions() {
        let request = json!({
            "action": "rotate",
            "project_id": "p",
            "service_account_email": EMAIL,
            "key_id": "abc123"
        });
        assert_eq!(KeyAction::from_request(&request).unwrap(), KeyAction::Rotate(key("abc123")));

        let request = json!({"action": "list", "project_id": "p", "service_account_email": EMAIL});
        assert_eq!(KeyAction::from_request(&request).unwrap(), KeyAction::List(account()));

        let err = KeyAction::from_request(&json!({"action": "purge"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: purge");
    }

    #[tokio::test]
    async fn test_create_returns_key_once() {
        let api = FakeKeys::default();

        let created = create(&api, &account()).await.unwrap();

        assert_eq!(created.key_id, "new-key");
        assert_eq!(created.service_account_email, EMAIL);
        assert_eq!(
            created.message,
            format!("Access key for projects/p/serviceAccounts/{} created successfully", EMAIL)
        );
        assert!(!format!("{:?}", created).contains("material"));
        assert_eq!(
            serde_json::to_value(&created).unwrap()["private_key"],
            json!("{\"private_key\": \"material\"}")
        );
    }

    #[tokio::test]
    async fn test_delete_outcomes() {
        let api = FakeKeys {
            deletes: HashMap::from([
                ("gone", DeleteBehaviour::Precondition),
                ("missing", DeleteBehaviour::NotFound),
                ("locked", DeleteBehaviour::Denied),
            ]),
            ..Default::default()
        };

        assert_eq!(delete(&api, &key("k1")).await.unwrap(), KeyDeletion::Deleted);
        assert!(matches!(
            delete(&api, &key("gone")).await.unwrap(),
            KeyDeletion::AlreadyAbsent { .. }
        ));
        assert!(matches!(
            delete(&api, &key("missing")).await.unwrap(),
            KeyDeletion::AlreadyAbsent { .. }
        ));

        let err = delete(&api, &key("locked")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(
            err.to_string(),
            "Error deleting service account key: Permission denied (403 Forbidden)"
        );
    }

    #[tokio::test]
    async fn test_delete_reply_messages() {
        let api = FakeKeys {
            deletes: HashMap::from([("gone", DeleteBehaviour::Precondition)]),
            ..Default::default()
        };

        let reply = execute(&api, KeyAction::Delete(key("k1"))).await.unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"message": "Successfully deleted key k1", "status": "deleted"})
        );

        let reply = execute(&api, KeyAction::Delete(key("gone"))).await.unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({
                "message": "Failed to delete key gone. The key may not exist: Precondition check failed. (400 Bad Request)",
                "status": "already_absent"
            })
        );
    }

    #[tokio::test]
    async fn test_rotate_creates_after_delete() {
        let api = FakeKeys::default();

        let created = rotate(&api, &key("old")).await.unwrap().unwrap();

        assert_eq!(created.key_id, "new-key");
        assert_eq!(created.service_account_email, EMAIL);
        assert_eq!(
            api.calls(),
            vec!["delete old".to_string(), format!("create projects/p/serviceAccounts/{}", EMAIL)]
        );
    }

    #[tokio::test]
    async fn test_rotate_is_noop_when_key_absent() {
        let api = FakeKeys {
            deletes: HashMap::from([("gone", DeleteBehaviour::Precondition)]),
            ..Default::default()
        };

        let reply = execute(&api, KeyAction::Rotate(key("gone"))).await.unwrap();

        assert_eq!(
            reply,
            KeyReply::Status {
                message: "Key gone was not deleted; no new key created".into(),
                status: KeyStatus::Noop,
            }
        );
        assert_eq!(api.calls(), vec!["delete gone"]);
    }

    #[tokio::test]
    async fn test_rotate_stops_when_delete_is_denied() {
        let api = FakeKeys {
            deletes: HashMap::from([("locked", DeleteBehaviour::Denied)]),
            ..Default::default()
        };

        let err = execute(&api, KeyAction::Rotate(key("locked"))).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(
            err.to_string(),
            "Error rotating service account key: \
             Error deleting service account key: Permission denied (403 Forbidden)"
        );
        assert_eq!(api.calls(), vec!["delete locked"]);
    }

    #[tokio::test]
    async fn test_rotate_does_not_roll_back_failed_create() {
        let api = FakeKeys {
            fail_create: true,
            ..Default::default()
        };

        let err = rotate(&api, &key("old")).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Error rotating service account key (old key already deleted): \
             Error creating service account key: Key quota exceeded (429 Too Many Requests)"
        );
        assert_eq!(
            api.calls(),
            vec!["delete old".to_string(), format!("create projects/p/serviceAccounts/{}", EMAIL)]
        );
    }

    #[tokio::test]
    async fn test_list_skips_system_managed_keys_in_order() {
        let api = FakeKeys {
            keys: vec![
                ("b", KeyType::UserManaged),
                ("sys", KeyType::SystemManaged),
                ("a", KeyType::UserManaged),
                ("c", KeyType::KeyTypeUnspecified),
            ],
            ..Default::default()
        };

        assert_eq!(list(&api, &account()).await.unwrap(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_delete_all_reports_counts() {
        let api = FakeKeys {
            keys: vec![
                ("k1", KeyType::UserManaged),
                ("sys", KeyType::SystemManaged),
                ("k2", KeyType::UserManaged),
                ("k3", KeyType::UserManaged),
            ],
            deletes: HashMap::from([("k2", DeleteBehaviour::Denied)]),
            ..Default::default()
        };

        let report = delete_all(&api, &account()).await.unwrap();

        assert_eq!(report.deleted_keys, vec!["k1", "k3"]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed_keys.len(), 1);
        assert_eq!(report.failed_keys[0].key_id, "k2");
        assert_eq!(report.message, r#"deleted_keys: ["k1", "k3"]"#);
        assert_eq!(
            api.calls(),
            vec!["list", "delete k1", "delete k2", "delete k3"]
        );
    }

    #[tokio::test]
    async fn test_enable_and_disable() {
        let api = FakeKeys::default();

        let reply = execute(&api, KeyAction::Enable(key("k1"))).await.unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"message": "Successfully enabled key k1", "status": "enabled"})
        );

        let reply = execute(&api, KeyAction::Disable(key("k1"))).await.unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"message": "Successfully disabled key k1", "status": "disabled"})
        );
        assert_eq!(api.calls(), vec!["enable k1", "disable k1"]);
    }
}
