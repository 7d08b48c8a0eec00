//! Deadline-bounded polling with an injectable clock.
//!
//! The managed services these plugins drive are pull-only, so every wait
//! is a sleep-then-check loop. A poll stops when the check reports done,
//! when the check fails, or when the deadline expires; errors are never
//! retried.
//!
//! # Example
//!
//! ```ignore
//! use ddm_plugin_common::poll::{poll_until, PollPolicy, TokioClock};
//!
//! let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(1200));
//! poll_until(&TokioClock, "elasticsearch ready", policy, || async {
//!     Ok::<_, MyError>(cluster_is_ready().await?)
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

/// Default polling policies.
pub mod defaults {
    use std::time::Duration;

    /// Interval between readiness checks of the managed service.
    pub const READINESS_INTERVAL: Duration = Duration::from_secs(5);

    /// Deadline for the managed service to become ready.
    pub const READINESS_TIMEOUT: Duration = Duration::from_secs(20 * 60);

    /// Interval between orchestrator `Status` calls.
    pub const STATUS_INTERVAL: Duration = Duration::from_secs(2);

    /// Deadline for a transfer to reach a terminal status.
    pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5 * 60);
}

/// Source of time for polling loops.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Waits for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on or advanced explicitly.
///
/// Sleeping returns immediately after advancing the clock, which makes
/// deadline behaviour deterministic in tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// Creates a clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Returns the time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Returns every duration slept so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

/// Interval and overall deadline of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between checks.
    pub interval: Duration,
    /// Overall deadline, measured from the first check.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a polling policy.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Readiness policy (5s interval, 20 minute deadline).
    pub fn readiness() -> Self {
        Self::new(defaults::READINESS_INTERVAL, defaults::READINESS_TIMEOUT)
    }

    /// Status polling policy (2s interval, 5 minute deadline).
    pub fn status() -> Self {
        Self::new(defaults::STATUS_INTERVAL, defaults::STATUS_TIMEOUT)
    }
}

/// Errors ending a polling loop without success.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// The deadline expired before the check reported done.
    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout {
        /// Description of what was awaited.
        what: String,
        /// Time spent polling.
        elapsed: Duration,
    },

    /// The check itself failed.
    #[error(transparent)]
    Check(E),
}

impl<E> PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns true if the deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

/// Polls `check` until it yields a value.
///
/// `check` runs immediately, then once per interval. `Ok(None)` means not
/// done yet; `Ok(Some(v))` ends the loop with `v`; `Err(e)` ends it with
/// [`PollError::Check`]. The last check runs at the deadline.
pub async fn poll_for<C, F, Fut, T, E>(
    clock: &C,
    what: &str,
    policy: PollPolicy,
    mut check: F,
) -> Result<T, PollError<E>>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::error::Error + 'static,
{
    let started = clock.now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if let Some(value) = check().await.map_err(PollError::Check)? {
            return Ok(value);
        }

        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed >= policy.timeout {
            return Err(PollError::Timeout {
                what: what.to_string(),
                elapsed,
            });
        }

        trace!(what, attempt, ?elapsed, "Not done yet, sleeping");
        clock
            .sleep(policy.interval.min(policy.timeout - elapsed))
            .await;
    }
}

/// Polls `check` until it returns `Ok(true)`.
pub async fn poll_until<C, F, Fut, E>(
    clock: &C,
    what: &str,
    policy: PollPolicy,
    mut check: F,
) -> Result<(), PollError<E>>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + 'static,
{
    poll_for(clock, what, policy, || {
        let fut = check();
        async move { fut.await.map(|done| done.then_some(())) }
    })
    .await
}
