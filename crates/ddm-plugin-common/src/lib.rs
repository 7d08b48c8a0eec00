//! Common infrastructure for data-sync plugins.
//!
//! This crate provides the pieces shared by every plugin that an external
//! orchestrator drives through the Init → Sync → Status protocol:
//!
//! - [`DataSyncPlugin`]: The protocol trait implemented by plugin adapters
//! - [`OperationStatus`] and [`EngineMode`]: The protocol vocabulary
//! - [`PluginParamsExt`]: Typed access to the string parameter map
//! - [`poll`]: Deadline-bounded polling with an injectable [`poll::Clock`]
//! - [`orchestrator`]: The caller side of the Status polling contract
//!
//! # Protocol
//!
//! 1. `Init` is called once per cluster to prepare it for replication
//! 2. `Sync` on the active cluster triggers a snapshot
//! 3. `Status` on the active cluster is polled until it is terminal
//! 4. `Sync` on the standby cluster triggers a restore of that snapshot
//! 5. `Status` on the standby cluster is polled until it is terminal
//!
//! Only `InProgress` is polled again; every other status ends the wait.

pub mod error;
pub mod orchestrator;
pub mod plugin;
pub mod poll;

// Re-export commonly used items at crate root
pub use error::{ParamError, ParamResult};
pub use orchestrator::{OrchestrationError, Orchestrator, Phase};
pub use plugin::{
    keys, DataSyncPlugin, EngineMode, EngineRef, OperationStatus, PluginParams, PluginParamsExt,
    StatusError,
};
pub use poll::{Clock, ManualClock, PollError, PollPolicy, TokioClock};
