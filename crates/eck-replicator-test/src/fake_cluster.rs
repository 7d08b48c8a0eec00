//! In-memory Kubernetes API with a simulated ECK operator

use std::collections::BTreeMap;

use async_trait::async_trait;
use eck_replicator::constants::{elasticsearch as eck, POD_RUNNING_PHASE};
use eck_replicator::{ClusterApi, ClusterError, ClusterResult};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use crate::fixtures;

/// How the simulated operator reacts to a replaced Elasticsearch resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutMode {
    /// Every node set is rolled out with the new pod template.
    ///
    /// The resource reports `ApplyingChanges` for the given number of reads
    /// before switching back to `Ready`.
    Complete {
        /// Reads answered with `ApplyingChanges`.
        applying_reads: usize,
    },
    /// The resource stays `Ready` but no pod is ever replaced.
    Stalled,
}

impl Default for RolloutMode {
    fn default() -> Self {
        Self::Complete { applying_reads: 1 }
    }
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn object_key(metadata: &ObjectMeta) -> Key {
    key(
        metadata.namespace.as_deref().unwrap_or(fixtures::NAMESPACE),
        metadata.name.as_deref().unwrap_or_default(),
    )
}

#[derive(Default)]
struct State {
    move_engines: BTreeMap<Key, DynamicObject>,
    elasticsearches: BTreeMap<Key, DynamicObject>,
    stateful_sets: BTreeMap<Key, StatefulSet>,
    pods: BTreeMap<Key, Pod>,
    secrets: BTreeMap<Key, Secret>,
    replaced: Vec<DynamicObject>,
    applying_reads: BTreeMap<Key, usize>,
}

/// [`ClusterApi`] holding objects in memory.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    rollout: RolloutMode,
}

impl FakeCluster {
    /// Creates an empty cluster with the default rollout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how replacements of Elasticsearch resources are rolled out.
    pub fn with_rollout(mut self, rollout: RolloutMode) -> Self {
        self.rollout = rollout;
        self
    }

    pub fn add_move_engine(&self, object: DynamicObject) {
        let key = object_key(&object.metadata);
        self.state.lock().move_engines.insert(key, object);
    }

    pub fn add_elasticsearch(&self, object: DynamicObject) {
        let key = object_key(&object.metadata);
        self.state.lock().elasticsearches.insert(key, object);
    }

    pub fn add_stateful_set(&self, set: StatefulSet) {
        let key = object_key(&set.metadata);
        self.state.lock().stateful_sets.insert(key, set);
    }

    pub fn add_pod(&self, pod: Pod) {
        let key = object_key(&pod.metadata);
        self.state.lock().pods.insert(key, pod);
    }

    pub fn add_secret(&self, secret: Secret) {
        let key = object_key(&secret.metadata);
        self.state.lock().secrets.insert(key, secret);
    }

    /// Returns every Elasticsearch resource passed to a replace call.
    pub fn replaced(&self) -> Vec<DynamicObject> {
        self.state.lock().replaced.clone()
    }

    /// Returns the stored pods of a namespace.
    pub fn pods(&self, namespace: &str) -> Vec<Pod> {
        self.state
            .lock()
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect()
    }

    /// Recreates the StatefulSet and pods of every node set from `es`.
    fn roll_out(state: &mut State, es: &DynamicObject) {
        let namespace = es.metadata.namespace.clone().unwrap_or_default();
        let es_name = es.metadata.name.clone().unwrap_or_default();
        let uid = es.metadata.uid.clone().unwrap_or_default();
        let node_sets = es
            .data
            .pointer("/spec/nodeSets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for node_set in &node_sets {
            let node_set_name = node_set
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let count = node_set
                .get("count")
                .and_then(Value::as_i64)
                .and_then(|c| i32::try_from(c).ok())
                .unwrap_or(1);
            let init_containers: Vec<String> = node_set
                .pointer("/podTemplate/spec/initContainers")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|c| c.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            let init_containers: Vec<&str> = init_containers.iter().map(String::as_str).collect();

            let sts = fixtures::stateful_set_name(&es_name, node_set_name);
            let mut set = fixtures::stateful_set(&sts, &uid, count);
            set.metadata.namespace = Some(namespace.clone());
            state.stateful_sets.insert(key(&namespace, &sts), set);

            state.pods.retain(|(ns, _), pod| {
                ns != &namespace
                    || pod
                        .metadata
                        .labels
                        .as_ref()
                        .and_then(|l| l.get(fixtures::STATEFULSET_NAME_LABEL))
                        != Some(&sts)
            });
            for ordinal in 0..count {
                let name = format!("{sts}-{ordinal}");
                let mut pod = fixtures::pod(&name, &sts, POD_RUNNING_PHASE, &init_containers);
                pod.metadata.namespace = Some(namespace.clone());
                state.pods.insert(key(&namespace, &name), pod);
            }
            debug!(statefulset = %sts, count, "Rolled out node set");
        }
    }
}

fn set_phase(es: &mut DynamicObject, phase: &str) {
    match es.data.get_mut("status").and_then(Value::as_object_mut) {
        Some(status) => {
            status.insert("phase".to_string(), json!(phase));
        }
        None => {
            if let Some(data) = es.data.as_object_mut() {
                data.insert("status".to_string(), json!({ "phase": phase }));
            }
        }
    }
}

fn selector_matches(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_move_engine(&self, namespace: &str, name: &str) -> ClusterResult<DynamicObject> {
        self.state
            .lock()
            .move_engines
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::not_found("MoveEngine", namespace, name))
    }

    async fn get_elasticsearch(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<DynamicObject> {
        let mut state = self.state.lock();
        let k = key(namespace, name);
        let mut es = state
            .elasticsearches
            .get(&k)
            .cloned()
            .ok_or_else(|| ClusterError::not_found(eck::KIND, namespace, name))?;

        if let Some(remaining) = state.applying_reads.get_mut(&k) {
            if *remaining > 0 {
                *remaining -= 1;
                set_phase(&mut es, "ApplyingChanges");
            }
        }
        Ok(es)
    }

    async fn replace_elasticsearch(
        &self,
        elasticsearch: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let k = object_key(&elasticsearch.metadata);
        let mut state = self.state.lock();
        if !state.elasticsearches.contains_key(&k) {
            return Err(ClusterError::not_found(eck::KIND, &k.0, &k.1));
        }

        let mut stored = elasticsearch.clone();
        state.replaced.push(elasticsearch.clone());
        match self.rollout {
            RolloutMode::Complete { applying_reads } => {
                set_phase(&mut stored, eck::READY_PHASE);
                Self::roll_out(&mut state, &stored);
                state.applying_reads.insert(k.clone(), applying_reads);
            }
            RolloutMode::Stalled => set_phase(&mut stored, eck::READY_PHASE),
        }
        state.elasticsearches.insert(k, stored.clone());
        Ok(stored)
    }

    async fn list_stateful_sets(&self, namespace: &str) -> ClusterResult<Vec<StatefulSet>> {
        Ok(self
            .state
            .lock()
            .stateful_sets
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, set)| set.clone())
            .collect())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> ClusterResult<Vec<Pod>> {
        Ok(self
            .pods(namespace)
            .into_iter()
            .filter(|pod| selector_matches(pod, label_selector))
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> ClusterResult<Secret> {
        self.state
            .lock()
            .secrets
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::not_found("Secret", namespace, name))
    }
}
