//! Test fixtures for the Kubernetes objects the plugin reads
//!
//! Provides a standard active or standby deployment: a `MoveEngine` control
//! object, an ECK `Elasticsearch` resource with one node set, its
//! StatefulSet and pod, and the `elastic` user secret.

use std::collections::BTreeMap;

use ddm_plugin_common::{keys, PluginParams};
use eck_replicator::constants::{elasticsearch as eck, move_engine as me, POD_RUNNING_PHASE};
use eck_replicator::params::{ElasticsearchOptions, PluginParameters, RepositoryOptions};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use serde_json::{json, Value};

use crate::FakeCluster;

/// Namespace of every fixture object.
pub const NAMESPACE: &str = "default";
/// Control object name.
pub const ENGINE_NAME: &str = "sample-es-move";
/// Elasticsearch resource name.
pub const ES_NAME: &str = "sample-es";
/// UID of the Elasticsearch resource.
pub const ES_UID: &str = "3f1b8a6e-2c4d-4e5f-8a9b-0c1d2e3f4a5b";
/// Node set of the Elasticsearch resource.
pub const NODE_SET: &str = "default";
/// Secret holding the `elastic` user's password.
pub const AUTH_SECRET: &str = "sample-es-es-elastic-user";
/// Password stored in [`AUTH_SECRET`].
pub const PASSWORD: &str = "changeme";
/// Object storage credentials secret.
pub const CREDENTIALS_SECRET: &str = "minio-credentials";
/// Snapshot repository name.
pub const REPOSITORY: &str = "minio_repo";
/// Snapshot bucket.
pub const BUCKET: &str = "e2e-bucket";
/// Label ECK puts on the pods of a StatefulSet.
pub const STATEFULSET_NAME_LABEL: &str = "elasticsearch.k8s.elastic.co/statefulset-name";

/// Returns the StatefulSet name ECK uses for a node set.
pub fn stateful_set_name(es_name: &str, node_set: &str) -> String {
    format!("{es_name}-es-{node_set}")
}

/// Standard plugin parameters pointing at `elasticsearch`.
pub fn plugin_parameters(elasticsearch: ElasticsearchOptions) -> PluginParameters {
    PluginParameters {
        repository: RepositoryOptions {
            name: REPOSITORY.to_string(),
            bucket: BUCKET.to_string(),
            scheme: "http".to_string(),
            credentials: CREDENTIALS_SECRET.to_string(),
            ..Default::default()
        },
        elasticsearch,
    }
}

/// Control object carrying `parameters` and `mode`.
pub fn move_engine(mode: &str, parameters: &PluginParameters) -> DynamicObject {
    let mut object = DynamicObject::new(ENGINE_NAME, &eck_replicator::cluster::move_engine_resource())
        .within(NAMESPACE);
    let parameters = serde_json::to_value(parameters).expect("plugin parameters serialize");
    object.data = json!({
        "spec": {
            (me::FIELD_MODE): mode,
            (me::FIELD_PLUGIN_PARAMETERS): parameters,
        }
    });
    object
}

/// Elasticsearch resource with one node set of `count` nodes.
pub fn elasticsearch(phase: &str, count: i32) -> DynamicObject {
    let mut es =
        DynamicObject::new(ES_NAME, &eck_replicator::cluster::elasticsearch_resource())
            .within(NAMESPACE);
    es.metadata.uid = Some(ES_UID.to_string());
    es.data = json!({
        "spec": {
            "version": "7.5.0",
            "nodeSets": [{
                "name": NODE_SET,
                "count": count,
                "config": { "node.store.allow_mmap": false }
            }]
        },
        "status": { "phase": phase }
    });
    es
}

/// Returns `status.phase` of an Elasticsearch resource.
pub fn phase(es: &DynamicObject) -> Option<&str> {
    es.data.pointer("/status/phase").and_then(Value::as_str)
}

/// StatefulSet of `replicas` controlled by the object with `owner_uid`.
pub fn stateful_set(name: &str, owner_uid: &str, replicas: i32) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: format!("{}/{}", eck::GROUP, eck::VERSION),
                kind: eck::KIND.to_string(),
                name: ES_NAME.to_string(),
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
                    STATEFULSET_NAME_LABEL.to_string(),
                    name.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Pod of `stateful_set` with the given phase and init containers.
pub fn pod(name: &str, stateful_set: &str, phase: &str, init_containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(
                STATEFULSET_NAME_LABEL.to_string(),
                stateful_set.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            init_containers: (!init_containers.is_empty()).then(|| {
                init_containers
                    .iter()
                    .map(|name| Container {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect()
            }),
            containers: vec![Container {
                name: "elasticsearch".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

/// Secret storing `password` under `user`.
pub fn auth_secret(name: &str, user: &str, password: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            user.to_string(),
            ByteString(password.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// Parameter map naming the fixture control object.
pub fn engine_params(snapshot: Option<&str>) -> PluginParams {
    let mut params = PluginParams::new();
    params.insert(keys::ENGINE_NAME.to_string(), ENGINE_NAME.to_string());
    params.insert(keys::ENGINE_NAMESPACE.to_string(), NAMESPACE.to_string());
    if let Some(snapshot) = snapshot {
        params.insert(keys::SNAPSHOT_NAME.to_string(), snapshot.to_string());
    }
    params
}

/// Cluster holding a running, not yet bootstrapped deployment.
///
/// The Elasticsearch resource is `Ready` with one node set of one node
/// whose pod does not run the plugin installer.
pub fn seeded_cluster(mode: &str, parameters: &PluginParameters) -> FakeCluster {
    let sts = stateful_set_name(ES_NAME, NODE_SET);
    let cluster = FakeCluster::new();
    cluster.add_move_engine(move_engine(mode, parameters));
    cluster.add_elasticsearch(elasticsearch(eck::READY_PHASE, 1));
    cluster.add_stateful_set(stateful_set(&sts, ES_UID, 1));
    cluster.add_pod(pod(&format!("{sts}-0"), &sts, POD_RUNNING_PHASE, &[]));
    cluster.add_secret(auth_secret(AUTH_SECRET, "elastic", PASSWORD));
    cluster
}
