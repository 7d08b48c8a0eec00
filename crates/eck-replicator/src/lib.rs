//! Elasticsearch replication plugin for clusters managed by ECK.
//!
//! This crate implements a [`ddm_plugin_common::DataSyncPlugin`] that
//! replicates an Elasticsearch cluster from an "active" deployment to a
//! "standby" deployment through snapshots in shared object storage.
//!
//! # Responsibilities
//!
//! - Resolve plugin parameters from the `MoveEngine` control object
//! - Install the `repository-s3` plugin on every Elasticsearch node and wait
//!   for ECK to roll it out
//! - Register the snapshot repository (read-only on standby)
//! - Trigger snapshots (active) and close-all + restore (standby)
//! - Report snapshot and recovery progress as [`ddm_plugin_common::OperationStatus`]
//!
//! # Kubernetes objects
//!
//! | Kind | Access | Purpose |
//! |------|--------|---------|
//! | MoveEngine (`kubemove.io/v1alpha1`) | get | Plugin parameters and mode |
//! | Elasticsearch (`elasticsearch.k8s.elastic.co/v1`) | get, replace | Bootstrap injection, readiness |
//! | StatefulSet | list | Rollout confirmation |
//! | Pod | list | Rollout confirmation |
//! | Secret | get | Basic-auth password, CA certificate |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ddm_plugin_common::{plugin_params, keys, DataSyncPlugin};
//! use eck_replicator::{ElasticsearchPlugin, KubeCluster, PluginConfig};
//!
//! let cluster = Arc::new(KubeCluster::connect(None, None).await?);
//! let plugin = ElasticsearchPlugin::with_default_clients(cluster, Arc::new(PluginConfig::default()));
//! plugin.init(&plugin_params! {
//!     keys::ENGINE_NAME => "sample-es-move",
//!     keys::ENGINE_NAMESPACE => "default",
//! }).await?;
//! ```

pub mod bootstrap;
pub mod client;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod params;
pub mod plugin;
pub mod readiness;
pub mod registrar;
pub mod status;

pub use client::{ElasticClient, EsResponse, SecretClientFactory, ServiceClientFactory};
pub use cluster::{ClusterApi, ClusterError, ClusterResult, KubeCluster};
pub use config::{ConfigError, PluginConfig};
pub use error::{ErrorCategory, PluginError, PluginResult};
pub use params::{ParameterResolver, PluginParameters, ResolvedParameters};
pub use plugin::{ElasticsearchPlugin, PLUGIN_NAME};
pub use readiness::{ReadinessCoordinator, UnitSetReadiness};
