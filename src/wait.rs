//! Bounded, cancellable polling
//!
//! Used for the VM restart stop-wait and for long-running operation waits.
//! Polling runs at a fixed interval with no backoff. The deadline is checked
//! before each probe, and a cancelled token ends the wait between probes.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Interval and deadline for a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value after `ticks` sleeps
    Ready { value: T, ticks: u32 },
    /// The deadline passed before the probe produced a value
    TimedOut { ticks: u32 },
    Cancelled { ticks: u32 },
}

/// Run `probe` until it yields `Some`, the policy's timeout elapses, or `cancel` fires.
///
/// Probe errors end the loop immediately and are returned as-is.
pub async fn poll_until<T, E, F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let mut ticks = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled { ticks });
        }
        if started.elapsed() > policy.timeout {
            return Ok(PollOutcome::TimedOut { ticks });
        }

        if let Some(value) = probe().await? {
            return Ok(PollOutcome::Ready { value, ticks });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled { ticks }),
            _ = tokio::time::sleep(policy.interval) => ticks += 1,
        }
    }
}
