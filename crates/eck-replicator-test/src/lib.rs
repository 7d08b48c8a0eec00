//! Integration test infrastructure for the ECK replication plugin
//!
//! Provides:
//! - An in-memory Kubernetes API that rolls out Elasticsearch changes the
//!   way ECK does
//! - An Elasticsearch REST mock with helpers for each endpoint the plugin
//!   calls
//! - Fixtures for control objects, Elasticsearch resources, StatefulSets,
//!   pods and secrets

mod es_mock;
mod fake_cluster;
pub mod fixtures;

pub use es_mock::{error_body, recovery_body, EsMock, RecordedRequest};
pub use fake_cluster::{FakeCluster, RolloutMode};
pub use fixtures::*;
