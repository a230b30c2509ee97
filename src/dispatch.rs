//! Action dispatch
//!
//! A request names its `action`; the [`Group`] picks which adapter's closed
//! set of actions it is validated against. Validation happens in full
//! before any GCP call, so a rejected request never reaches the provider.

use crate::certificate::{self, CertificateAction, CertificateApi};
use crate::compute::{self, InstanceApi, PowerAction};
use crate::config::Settings;
use crate::error::ActionError;
use crate::gcp::GcpClient;
use crate::keys::{self, KeyAction, KeyApi};
use crate::outcome::ActionResponse;
use crate::wait::PollPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Adapter group a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Certificate,
    Compute,
    Keys,
}

impl Group {
    pub const ALL: [Group; 3] = [Group::Certificate, Group::Compute, Group::Keys];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Certificate => "certificate",
            Group::Compute => "compute",
            Group::Keys => "keys",
        }
    }

    /// Registered action names
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Group::Certificate => certificate::ACTIONS,
            Group::Compute => compute::ACTIONS,
            Group::Keys => keys::ACTIONS,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated action of any group
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Certificate(CertificateAction),
    Compute(PowerAction),
    Keys(KeyAction),
}

impl Action {
    pub fn parse(group: Group, request: &Value) -> Result<Self, ActionError> {
        match group {
            Group::Certificate => CertificateAction::from_request(request).map(Action::Certificate),
            Group::Compute => PowerAction::from_request(request).map(Action::Compute),
            Group::Keys => KeyAction::from_request(request).map(Action::Keys),
        }
    }

    pub fn group(&self) -> Group {
        match self {
            Action::Certificate(_) => Group::Certificate,
            Action::Compute(_) => Group::Compute,
            Action::Keys(_) => Group::Keys,
        }
    }

    /// Request name of the action
    pub fn name(&self) -> &'static str {
        match self {
            Action::Certificate(action) => match action {
                CertificateAction::CreateManaged(_) => "create",
                CertificateAction::CreateSelfUploaded(_) => "create_self_uploaded",
                CertificateAction::Delete(_) => "delete",
                CertificateAction::Get(_) => "get",
                CertificateAction::Update(_) => "update",
            },
            Action::Compute(action) => match action {
                PowerAction::Start(_) => "start",
                PowerAction::Stop(_) => "stop",
                PowerAction::Reset(_) => "reset",
                PowerAction::Restart(_) => "restart",
            },
            Action::Keys(action) => match action {
                KeyAction::Create(_) => "create",
                KeyAction::Delete(_) => "delete",
                KeyAction::Rotate(_) => "rotate",
                KeyAction::Enable(_) => "enable",
                KeyAction::Disable(_) => "disable",
                KeyAction::List(_) => "list",
                KeyAction::DeleteAll(_) => "delete_all",
            },
        }
    }
}

/// Validate a request without touching any API.
///
/// A rejection is already the final response, so hosts can answer it
/// before credentials are resolved.
pub fn validate(group: Group, request: &Value) -> Result<Action, ActionResponse> {
    Action::parse(group, request).map_err(|e| {
        let action = request
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::warn!(%group, action, error = %e, "Rejected request");
        ActionResponse::failure(&e)
    })
}

/// Routes requests to the adapters.
///
/// Holds no per-request state; clones share the same APIs and
/// cancellation token.
#[derive(Clone)]
pub struct Dispatcher {
    certificates: Arc<dyn CertificateApi>,
    instances: Arc<dyn InstanceApi>,
    keys: Arc<dyn KeyApi>,
    restart_policy: PollPolicy,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Dispatcher backed by the GCP REST APIs
    pub fn new(client: GcpClient, settings: &Settings) -> Self {
        let client = Arc::new(client);
        Self::with_apis(
            client.clone(),
            client.clone(),
            client,
            settings.restart_policy(),
        )
    }

    pub fn with_apis(
        certificates: Arc<dyn CertificateApi>,
        instances: Arc<dyn InstanceApi>,
        keys: Arc<dyn KeyApi>,
        restart_policy: PollPolicy,
    ) -> Self {
        Self {
            certificates,
            instances,
            keys,
            restart_policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort in-flight waits
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Validate and run one request
    pub async fn dispatch(&self, group: Group, request: &Value) -> Result<ActionResponse, ActionError> {
        let action = Action::parse(group, request)?;
        self.run(action).await
    }

    /// Run an already validated action
    pub async fn run(&self, action: Action) -> Result<ActionResponse, ActionError> {
        match action {
            Action::Certificate(action) => {
                let reply = certificate::execute(self.certificates.as_ref(), action, &self.cancel).await?;
                ActionResponse::success(&reply)
            },
            Action::Compute(action) => {
                let reply = compute::execute(
                    self.instances.as_ref(),
                    action,
                    self.restart_policy,
                    &self.cancel,
                )
                .await?;
                ActionResponse::success(&reply)
            },
            Action::Keys(action) => {
                let reply = keys::execute(self.keys.as_ref(), action).await?;
                ActionResponse::success(&reply)
            },
        }
    }

    /// Like [`Dispatcher::dispatch`], with failures folded into the response
    pub async fn handle(&self, group: Group, request: &Value) -> ActionResponse {
        match validate(group, request) {
            Ok(action) => self.handle_action(action).await,
            Err(rejection) => rejection,
        }
    }

    /// Run a validated action, with failures folded into the response
    pub async fn handle_action(&self, action: Action) -> ActionResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "action",
            %request_id,
            group = %action.group(),
            action = action.name()
        );

        async move {
            let started = Instant::now();
            let result = self.run(action).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(_) => tracing::info!(elapsed_ms, "Action completed"),
                Err(e) if e.kind().is_caller_error() => {
                    tracing::warn!(error = %e, "Rejected action")
                },
                Err(e) => tracing::error!(error = %e, kind = ?e.kind(), elapsed_ms, "Action failed"),
            }

            ActionResponse::from_result(result)
        }
        .instrument(span)
        .await
    }

    /// Response plus status code for HTTP-shaped hosts
    pub async fn handle_http(&self, group: Group, request: &Value) -> (ActionResponse, u16) {
        let response = self.handle(group, request).await;
        let status = response.http_status();
        (response, status)
    }
}
