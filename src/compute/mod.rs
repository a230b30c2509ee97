//! Compute power adapter
//!
//! Actions: `start`, `stop`, `reset` and `restart`. The single actions
//! return as soon as GCP accepts them. `restart` stops the instance, waits
//! for it to reach `TERMINATED` under a [`PollPolicy`], then starts it
//! again. A restart that runs out of time reports `timed_out` and leaves
//! the instance stopped.

mod api;

pub use api::{InstanceApi, InstanceStatus};

use crate::error::ActionError;
use crate::gcp::ApiError;
use crate::request;
use crate::resource_name::ResourceName;
use crate::wait::{poll_until, PollOutcome, PollPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Action names accepted by this group
pub const ACTIONS: &[&str] = &["start", "stop", "restart", "reset"];

#[derive(Debug, Clone, PartialEq)]
pub enum PowerAction {
    Start(ResourceName),
    Stop(ResourceName),
    Reset(ResourceName),
    Restart(ResourceName),
}

#[derive(Debug, Default, Deserialize)]
struct InstanceFields {
    #[serde(default)]
    project: String,
    #[serde(default)]
    zone: String,
    #[serde(default)]
    instance: String,
}

impl PowerAction {
    pub fn from_request(request: &Value) -> Result<Self, ActionError> {
        let action = request::action_name(request)?;
        if !ACTIONS.contains(&action) {
            return Err(ActionError::UnknownAction(action.to_string()));
        }

        let fields: InstanceFields = request::fields(action, request)?;
        let instance = ResourceName::instance(&fields.project, &fields.zone, &fields.instance)
            .map_err(|e| ActionError::from_name(action, e))?;

        match action {
            "start" => Ok(PowerAction::Start(instance)),
            "stop" => Ok(PowerAction::Stop(instance)),
            "reset" => Ok(PowerAction::Reset(instance)),
            "restart" => Ok(PowerAction::Restart(instance)),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerStatus {
    /// GCP accepted the request; the instance has not necessarily changed state yet
    Initiated,
    /// The instance did not stop within the restart window; start was not issued
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerReply {
    pub message: String,
    pub status: PowerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl PowerReply {
    fn initiated(message: String, operation: Option<String>) -> Self {
        Self {
            message,
            status: PowerStatus::Initiated,
            operation,
        }
    }
}

pub async fn execute(
    api: &dyn InstanceApi,
    action: PowerAction,
    restart_policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<PowerReply, ActionError> {
    match action {
        PowerAction::Start(instance) => start(api, &instance).await,
        PowerAction::Stop(instance) => stop(api, &instance).await,
        PowerAction::Reset(instance) => reset(api, &instance).await,
        PowerAction::Restart(instance) => restart(api, &instance, restart_policy, cancel).await,
    }
}

pub async fn start(api: &dyn InstanceApi, instance: &ResourceName) -> Result<PowerReply, ActionError> {
    tracing::info!(instance = %instance, "Starting VM");
    let operation = api
        .start_instance(instance)
        .await
        .map_err(ActionError::remote("starting VM"))?;

    Ok(PowerReply::initiated(
        format!("VM {} start initiated", instance.id()),
        operation,
    ))
}

pub async fn stop(api: &dyn InstanceApi, instance: &ResourceName) -> Result<PowerReply, ActionError> {
    tracing::info!(instance = %instance, "Stopping VM");
    let operation = api
        .stop_instance(instance)
        .await
        .map_err(ActionError::remote("stopping VM"))?;

    Ok(PowerReply::initiated(
        format!("VM {} stop initiated", instance.id()),
        operation,
    ))
}

pub async fn reset(api: &dyn InstanceApi, instance: &ResourceName) -> Result<PowerReply, ActionError> {
    tracing::info!(instance = %instance, "Resetting VM");
    let operation = api
        .reset_instance(instance)
        .await
        .map_err(ActionError::remote("resetting VM"))?;

    Ok(PowerReply::initiated(
        format!("VM {} reset initiated", instance.id()),
        operation,
    ))
}

/// Stop, wait for `TERMINATED`, then start.
///
/// The wait is abandoned on timeout or cancellation without issuing start;
/// GCP holds the only state, so an abandoned restart can simply be re-run.
pub async fn restart(
    api: &dyn InstanceApi,
    instance: &ResourceName,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<PowerReply, ActionError> {
    const VERB: &str = "restarting VM";
    let short_name = instance.id();

    stop(api, instance).await.map_err(|e| e.in_sequence(VERB))?;

    let outcome = poll_until(policy, cancel, || async move {
        let status = api.instance_status(instance).await?;
        tracing::debug!(instance = %instance, status = %status, "Polled VM status");
        Ok::<_, ApiError>(status.is_stopped().then_some(status))
    })
    .await
    .map_err(|e| ActionError::remote("checking VM status")(e).in_sequence(VERB))?;

    match outcome {
        PollOutcome::Ready { ticks, .. } => {
            tracing::info!(instance = %instance, polls = ticks, "VM stopped, starting it again");
            let started = start(api, instance).await.map_err(|e| e.in_sequence(VERB))?;
            Ok(PowerReply::initiated(
                format!("VM {} restart initiated", short_name),
                started.operation,
            ))
        },
        PollOutcome::TimedOut { ticks } => {
            tracing::warn!(
                instance = %instance,
                polls = ticks,
                timeout_secs = policy.timeout.as_secs(),
                "Timed out waiting for VM to stop"
            );
            Ok(PowerReply {
                message: format!("Timeout waiting for VM {} to stop", short_name),
                status: PowerStatus::TimedOut,
                operation: None,
            })
        },
        PollOutcome::Cancelled { .. } => Err(ActionError::Cancelled(format!(
            "waiting for VM {} to stop",
            short_name
        ))
        .in_sequence(VERB)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Serves scripted statuses (repeating the last one) and records every call
    #[derive(Default)]
    struct FakeInstances {
        statuses: Mutex<VecDeque<&'static str>>,
        fail_stop: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeInstances {
        fn with_statuses(statuses: &[&'static str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, call: &str) -> usize {
            self.calls().iter().filter(|c| **c == call).count()
        }
    }

    #[async_trait]
    impl InstanceApi for FakeInstances {
        async fn start_instance(&self, _instance: &ResourceName) -> Result<Option<String>, ApiError> {
            self.calls.lock().unwrap().push("start");
            Ok(Some("operation-start".into()))
        }

        async fn stop_instance(&self, _instance: &ResourceName) -> Result<Option<String>, ApiError> {
            self.calls.lock().unwrap().push("stop");
            if self.fail_stop {
                return Err(ApiError::Status {
                    status: StatusCode::FORBIDDEN,
                    code: Some("PERMISSION_DENIED".into()),
                    message: "Permission denied".into(),
                });
            }
            Ok(Some("operation-stop".into()))
        }

        async fn reset_instance(&self, _instance: &ResourceName) -> Result<Option<String>, ApiError> {
            self.calls.lock().unwrap().push("reset");
            Ok(None)
        }

        async fn instance_status(&self, _instance: &ResourceName) -> Result<InstanceStatus, ApiError> {
            self.calls.lock().unwrap().push("status");
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop_front().unwrap_or("RUNNING")
            } else {
                statuses.front().copied().unwrap_or("RUNNING")
            };
            Ok(InstanceStatus::from_api_status(status))
        }
    }

    fn vm() -> ResourceName {
        ResourceName::instance("p", "asia-southeast1-a", "vm-1").unwrap()
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(5), Duration::from_secs(540))
    }

    #[test]
    fn test_parse_power_actions() {
        let request = json!({"action": "reset", "project": "p", "zone": "z", "instance": "vm-1"});
        assert_eq!(
            PowerAction::from_request(&request).unwrap(),
            PowerAction::Reset(ResourceName::instance("p", "z", "vm-1").unwrap())
        );

        let err = PowerAction::from_request(&json!({"action": "hibernate"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAction);

        let err = PowerAction::from_request(&json!({"action": "start", "project": "p", "zone": "z"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "instance is required for start action");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_starts_after_three_ticks() {
        let api = FakeInstances::with_statuses(&["RUNNING", "STOPPING", "STOPPING", "TERMINATED"]);
        let started = Instant::now();

        let reply = restart(&api, &vm(), policy(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.message, "VM vm-1 restart initiated");
        assert_eq!(reply.status, PowerStatus::Initiated);
        assert_eq!(
            api.calls(),
            vec!["stop", "status", "status", "status", "status", "start"]
        );
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(15) && waited < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_timeout_never_starts() {
        let api = FakeInstances::with_statuses(&["RUNNING", "STOPPING"]);

        let reply = restart(&api, &vm(), policy(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.message, "Timeout waiting for VM vm-1 to stop");
        assert_eq!(reply.status, PowerStatus::TimedOut);
        assert_eq!(api.count("start"), 0);
        assert_eq!(api.count("stop"), 1);
        assert!(api.count("status") > 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancelled_never_starts() {
        let api = FakeInstances::with_statuses(&["STOPPING"]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let err = restart(&api, &vm(), policy(), &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(
            err.to_string(),
            "Error restarting VM: Cancelled while waiting for VM vm-1 to stop"
        );
        assert_eq!(api.count("start"), 0);
    }

    #[tokio::test]
    async fn test_restart_failure_names_the_sequence() {
        let api = FakeInstances {
            fail_stop: true,
            ..Default::default()
        };

        let err = restart(&api, &vm(), policy(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Error restarting VM: Error stopping VM: Permission denied (403 Forbidden)"
        );
        assert_eq!(api.calls(), vec!["stop"]);
    }

    #[tokio::test]
    async fn test_single_actions_do_not_wait() {
        let api = FakeInstances::default();

        let reply = start(&api, &vm()).await.unwrap();
        assert_eq!(reply.message, "VM vm-1 start initiated");
        assert_eq!(reply.operation.as_deref(), Some("operation-start"));

        let reply = reset(&api, &vm()).await.unwrap();
        assert_eq!(reply.message, "VM vm-1 reset initiated");
        assert!(reply.operation.is_none());

        assert_eq!(api.calls(), vec!["start", "reset"]);
    }

    #[test]
    fn test_reply_serialization() {
        let reply = PowerReply {
            message: "Timeout waiting for VM vm-1 to stop".into(),
            status: PowerStatus::TimedOut,
            operation: None,
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"message": "Timeout waiting for VM vm-1 to stop", "status": "timed_out"})
        );
    }
}
