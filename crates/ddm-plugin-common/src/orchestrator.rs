//! Orchestrator side of the plugin protocol.
//!
//! The orchestrator calls `Sync` once, then calls `Status` on a fixed
//! interval while the plugin reports `InProgress`. Any other status ends
//! the wait, including `Errored`, so a failing plugin is never polled
//! forever. A replication runs the active phase (snapshot) to completion
//! before starting the standby phase (restore).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::plugin::{DataSyncPlugin, OperationStatus, PluginParams, StatusError};
use crate::poll::{poll_for, Clock, PollError, PollPolicy};

/// Phase of a two-cluster replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Snapshot on the active cluster.
    Active,
    /// Restore on the standby cluster.
    Standby,
}

impl Phase {
    /// Returns the phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Active => "active",
            Phase::Standby => "standby",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors ending an orchestrated phase.
#[derive(Debug, Error)]
pub enum OrchestrationError<E>
where
    E: std::error::Error + 'static,
{
    /// The `Sync` call failed.
    #[error("{phase} sync failed: {source}")]
    Sync {
        /// Phase that failed.
        phase: Phase,
        /// Plugin error.
        #[source]
        source: E,
    },

    /// A `Status` call returned an error alongside its status.
    #[error("{phase} status check ended with {status}: {source}")]
    Status {
        /// Phase that failed.
        phase: Phase,
        /// Status reported with the error.
        status: OperationStatus,
        /// Plugin error.
        #[source]
        source: E,
    },

    /// The phase reached a terminal status other than `Completed`.
    #[error("{phase} phase ended with status {status}")]
    NotCompleted {
        /// Phase that failed.
        phase: Phase,
        /// Terminal status observed.
        status: OperationStatus,
    },

    /// The phase was still in progress when the deadline expired.
    #[error("Timed out after {elapsed:?} waiting for the {phase} phase")]
    Timeout {
        /// Phase that timed out.
        phase: Phase,
        /// Time spent polling.
        elapsed: Duration,
    },
}

impl<E> OrchestrationError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the phase the error belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            OrchestrationError::Sync { phase, .. }
            | OrchestrationError::Status { phase, .. }
            | OrchestrationError::NotCompleted { phase, .. }
            | OrchestrationError::Timeout { phase, .. } => *phase,
        }
    }

    /// Returns the terminal status, if one was observed.
    pub fn status(&self) -> Option<OperationStatus> {
        match self {
            OrchestrationError::Status { status, .. }
            | OrchestrationError::NotCompleted { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Drives plugins through Sync and the Status polling loop.
pub struct Orchestrator {
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl Orchestrator {
    /// Creates an orchestrator with the given clock and polling policy.
    pub fn new(clock: Arc<dyn Clock>, policy: PollPolicy) -> Self {
        Self { clock, policy }
    }

    /// Returns the status polling policy.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Polls `Status` until it reports a terminal status.
    ///
    /// Returns the terminal status when the plugin reports one without an
    /// error. A status returned with an error ends the wait with
    /// [`OrchestrationError::Status`].
    #[instrument(skip(self, plugin, params), fields(plugin = %plugin.name()))]
    pub async fn wait_for_terminal<P>(
        &self,
        phase: Phase,
        plugin: &P,
        params: &PluginParams,
    ) -> Result<OperationStatus, OrchestrationError<P::Error>>
    where
        P: DataSyncPlugin + ?Sized,
    {
        let what = format!("{phase} phase");
        let result = poll_for(self.clock.as_ref(), &what, self.policy, || async move {
            let reported: Result<OperationStatus, StatusError<P::Error>> =
                plugin.status(params).await;
            reported.map(|status| match status {
                OperationStatus::InProgress => {
                    debug!(%phase, "Transfer still in progress");
                    None
                }
                status => Some(status),
            })
        })
        .await;

        match result {
            Ok(status) => {
                info!(%phase, %status, "Transfer reached terminal status");
                Ok(status)
            }
            Err(PollError::Check(StatusError { status, source })) => {
                warn!(%phase, %status, error = %source, "Status check failed");
                Err(OrchestrationError::Status {
                    phase,
                    status,
                    source,
                })
            }
            Err(PollError::Timeout { elapsed, .. }) => {
                warn!(%phase, ?elapsed, "Transfer did not finish before the deadline");
                Err(OrchestrationError::Timeout { phase, elapsed })
            }
        }
    }

    /// Calls `Sync` and waits for the transfer to complete.
    ///
    /// Succeeds only when the terminal status is `Completed`.
    #[instrument(skip(self, plugin, params, volumes), fields(plugin = %plugin.name()))]
    pub async fn run_phase<P>(
        &self,
        phase: Phase,
        plugin: &P,
        params: &PluginParams,
        volumes: &[String],
    ) -> Result<(), OrchestrationError<P::Error>>
    where
        P: DataSyncPlugin + ?Sized,
    {
        info!(%phase, "Triggering sync");
        plugin
            .sync(params, volumes)
            .await
            .map_err(|source| OrchestrationError::Sync { phase, source })?;

        match self.wait_for_terminal(phase, plugin, params).await? {
            OperationStatus::Completed => Ok(()),
            status => Err(OrchestrationError::NotCompleted { phase, status }),
        }
    }

    /// Replicates from the active plugin to the standby plugin.
    ///
    /// The standby phase starts only after the active phase completed.
    pub async fn replicate<A, S, E>(
        &self,
        active: &A,
        standby: &S,
        params: &PluginParams,
    ) -> Result<(), OrchestrationError<E>>
    where
        A: DataSyncPlugin<Error = E> + ?Sized,
        S: DataSyncPlugin<Error = E> + ?Sized,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run_phase(Phase::Active, active, params, &[]).await?;
        self.run_phase(Phase::Standby, standby, params, &[]).await?;
        info!("Replication completed");
        Ok(())
    }
}
