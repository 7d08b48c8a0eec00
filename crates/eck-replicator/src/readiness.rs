//! Readiness polling of the managed Elasticsearch.
//!
//! After the bootstrap mutation, ECK rolls the node sets one pod at a time.
//! The resource reports phase `Ready` well before every pod runs the new
//! template, so when bootstrap confirmation is requested each round also
//! checks the pods of every StatefulSet controlled by the resource.

use std::collections::BTreeMap;
use std::sync::Arc;

use ddm_plugin_common::poll::poll_until;
use ddm_plugin_common::{Clock, PollPolicy};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::cluster::ClusterApi;
use crate::constants::{elasticsearch, POD_RUNNING_PHASE};
use crate::error::PluginResult;

/// Rollout state of one StatefulSet owned by the Elasticsearch resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSetReadiness {
    /// StatefulSet name.
    pub name: String,
    /// Desired replicas (`spec.replicas`, default 1).
    pub expected: i32,
    /// Pods selected by the set's selector.
    pub owned: usize,
    /// Pods that are running and carry the bootstrap init container.
    pub ready: usize,
}

impl UnitSetReadiness {
    /// Returns true when every expected replica is running with the marker.
    pub fn is_ready(&self) -> bool {
        self.owned > 0 && i64::try_from(self.ready).unwrap_or(i64::MAX) >= i64::from(self.expected)
    }
}

/// Returns true if `set` is controlled by the object with `uid`.
fn is_controlled_by(set: &StatefulSet, uid: &str) -> bool {
    set.metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

/// Renders `matchLabels` as a label selector string.
fn label_selector(set: &StatefulSet) -> Option<String> {
    let labels: &BTreeMap<String, String> = set
        .spec
        .as_ref()?
        .selector
        .match_labels
        .as_ref()
        .filter(|labels| !labels.is_empty())?;
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        == Some(POD_RUNNING_PHASE)
}

fn has_init_container(pod: &Pod, name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.init_containers.as_ref())
        .is_some_and(|containers| containers.iter().any(|c| c.name == name))
}

/// Waits for the Elasticsearch resource and its pods to be ready.
#[derive(Clone)]
pub struct ReadinessCoordinator {
    cluster: Arc<dyn ClusterApi>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    marker: String,
}

impl ReadinessCoordinator {
    /// Creates a coordinator; `marker` names the bootstrap init container.
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            clock,
            policy,
            marker: marker.into(),
        }
    }

    /// Polls until the resource is ready.
    ///
    /// A missing resource keeps polling; any other lookup or listing error
    /// stops the loop. Expiry of the deadline yields a timeout error.
    #[instrument(skip(self))]
    pub async fn wait_until_ready(
        &self,
        namespace: &str,
        name: &str,
        confirm_bootstrap: bool,
    ) -> PluginResult<()> {
        let what = format!("elasticsearch {namespace}/{name} to become ready");
        poll_until(self.clock.as_ref(), &what, self.policy, || {
            self.check_round(namespace, name, confirm_bootstrap)
        })
        .await?;

        info!(namespace, name, "Elasticsearch is ready");
        Ok(())
    }

    async fn check_round(
        &self,
        namespace: &str,
        name: &str,
        confirm_bootstrap: bool,
    ) -> PluginResult<bool> {
        let es = match self.cluster.get_elasticsearch(namespace, name).await {
            Ok(es) => es,
            Err(e) if e.is_not_found() => {
                debug!(namespace, name, "Elasticsearch not found yet");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let phase = es
            .data
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if phase != elasticsearch::READY_PHASE {
            debug!(namespace, name, phase, "Elasticsearch not ready");
            return Ok(false);
        }
        if !confirm_bootstrap {
            return Ok(true);
        }

        let sets = self.unit_sets(&es, namespace).await?;
        if sets.is_empty() {
            warn!(namespace, name, "No StatefulSet controlled by Elasticsearch");
            return Ok(false);
        }
        for set in &sets {
            debug!(
                statefulset = %set.name,
                expected = set.expected,
                owned = set.owned,
                ready = set.ready,
                "Rollout progress"
            );
        }
        Ok(sets.iter().all(UnitSetReadiness::is_ready))
    }

    /// Collects the rollout state of every StatefulSet controlled by `es`.
    pub async fn unit_sets(
        &self,
        es: &DynamicObject,
        namespace: &str,
    ) -> PluginResult<Vec<UnitSetReadiness>> {
        let uid = es.metadata.uid.as_deref().unwrap_or_default();
        let sets = self.cluster.list_stateful_sets(namespace).await?;

        let mut records = Vec::new();
        for set in sets.iter().filter(|s| !uid.is_empty() && is_controlled_by(s, uid)) {
            let name = set.metadata.name.clone().unwrap_or_default();
            let expected = set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);

            let pods = match label_selector(set) {
                Some(selector) => self.cluster.list_pods(namespace, &selector).await?,
                None => {
                    warn!(statefulset = %name, "StatefulSet has no matchLabels selector");
                    Vec::new()
                }
            };
            let ready = pods
                .iter()
                .filter(|pod| is_running(pod) && has_init_container(pod, &self.marker))
                .count();

            records.push(UnitSetReadiness {
                name,
                expected,
                owned: pods.len(),
                ready,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{elasticsearch_resource, ClusterError, MockClusterApi};
    use crate::error::PluginError;
    use ddm_plugin_common::ManualClock;
    use k8s_openapi::api::apps::v1::StatefulSetSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    const UID: &str = "0b6c3a52-6f7e-4b69-9a34-0d8a3b1e4c11";

    fn es(phase: &str) -> DynamicObject {
        let mut es = DynamicObject::new("sample-es", &elasticsearch_resource()).within("default");
        es.metadata.uid = Some(UID.to_string());
        es.data = json!({ "spec": { "nodeSets": [] }, "status": { "phase": phase } });
        es
    }

    fn stateful_set(name: &str, owner_uid: &str, replicas: i32) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "elasticsearch.k8s.elastic.co/v1".to_string(),
                    kind: "Elasticsearch".to_string(),
                    name: "sample-es".to_string(),
                    uid: owner_uid.to_string(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "elasticsearch.k8s.elastic.co/statefulset-name".to_string(),
                        name.to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn pod(phase: &str, init_container: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta::default(),
            spec: Some(PodSpec {
                init_containers: init_container.map(|name| {
                    vec![Container {
                        name: name.to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    fn coordinator(cluster: MockClusterApi, clock: Arc<ManualClock>) -> ReadinessCoordinator {
        ReadinessCoordinator::new(
            Arc::new(cluster),
            clock,
            PollPolicy::new(Duration::from_secs(5), Duration::from_secs(20)),
            "plugin-installer",
        )
    }

    #[test]
    fn test_unit_set_readiness() {
        let record = |expected, owned, ready| UnitSetReadiness {
            name: "sample-es-es-default".to_string(),
            expected,
            owned,
            ready,
        };
        assert!(record(3, 3, 3).is_ready());
        assert!(!record(3, 3, 2).is_ready());
        assert!(!record(0, 0, 0).is_ready());
        assert!(record(1, 2, 1).is_ready());
    }

    #[test]
    fn test_label_selector() {
        let set = stateful_set("sample-es-es-default", UID, 1);
        assert_eq!(
            label_selector(&set).as_deref(),
            Some("elasticsearch.k8s.elastic.co/statefulset-name=sample-es-es-default")
        );
    }

    #[tokio::test]
    async fn test_ready_without_confirmation() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_elasticsearch()
            .times(1)
            .returning(|_, _| Ok(es("Ready")));
        cluster.expect_list_stateful_sets().never();

        let clock = Arc::new(ManualClock::new());
        coordinator(cluster, clock.clone())
            .wait_until_ready("default", "sample-es", false)
            .await
            .unwrap();
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_waits_through_not_found_and_phase() {
        let mut cluster = MockClusterApi::new();
        let mut seq = mockall::Sequence::new();
        cluster
            .expect_get_elasticsearch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|ns, name| Err(ClusterError::not_found("Elasticsearch", ns, name)));
        cluster
            .expect_get_elasticsearch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(es("ApplyingChanges")));
        cluster
            .expect_get_elasticsearch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(es("Ready")));
        cluster
            .expect_list_stateful_sets()
            .times(1)
            .returning(|_| {
                Ok(vec![
                    stateful_set("sample-es-es-default", UID, 2),
                    stateful_set("other-es-es-default", "another-uid", 1),
                ])
            });
        cluster
            .expect_list_pods()
            .withf(|_, selector| selector.ends_with("=sample-es-es-default"))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    pod("Running", Some("plugin-installer")),
                    pod("Running", Some("plugin-installer")),
                ])
            });

        let clock = Arc::new(ManualClock::new());
        coordinator(cluster, clock.clone())
            .wait_until_ready("default", "sample-es", true)
            .await
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_partial_rollout_times_out() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_elasticsearch()
            .returning(|_, _| Ok(es("Ready")));
        cluster
            .expect_list_stateful_sets()
            .returning(|_| Ok(vec![stateful_set("sample-es-es-default", UID, 3)]));
        cluster.expect_list_pods().returning(|_, _| {
            Ok(vec![
                pod("Running", Some("plugin-installer")),
                pod("Running", None),
                pod("Pending", Some("plugin-installer")),
            ])
        });

        let clock = Arc::new(ManualClock::new());
        let err = coordinator(cluster, clock.clone())
            .wait_until_ready("default", "sample-es", true)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_no_owned_stateful_set_is_not_ready() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_elasticsearch()
            .returning(|_, _| Ok(es("Ready")));
        cluster
            .expect_list_stateful_sets()
            .returning(|_| Ok(vec![stateful_set("other-es-es-default", "another-uid", 1)]));
        cluster.expect_list_pods().never();

        let err = coordinator(cluster, Arc::new(ManualClock::new()))
            .wait_until_ready("default", "sample-es", true)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_lookup_error_stops_polling() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_elasticsearch()
            .times(1)
            .returning(|_, _| {
                Err(ClusterError::MissingField {
                    kind: "Elasticsearch".to_string(),
                    field: "metadata.name",
                })
            });

        let clock = Arc::new(ManualClock::new());
        let err = coordinator(cluster, clock.clone())
            .wait_until_ready("default", "sample-es", true)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Cluster(_)));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_listing_error_stops_polling() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_elasticsearch()
            .times(1)
            .returning(|_, _| Ok(es("Ready")));
        cluster
            .expect_list_stateful_sets()
            .times(1)
            .returning(|ns| Err(ClusterError::not_found("StatefulSet", ns, "")));

        let err = coordinator(cluster, Arc::new(ManualClock::new()))
            .wait_until_ready("default", "sample-es", true)
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
    }
}
