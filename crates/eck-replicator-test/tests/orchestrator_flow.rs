//! Two-phase replication between an active and a standby cluster

use std::sync::Arc;
use std::time::Duration;

use ddm_plugin_common::{
    EngineMode, ManualClock, OperationStatus, OrchestrationError, Orchestrator, Phase, PollPolicy,
};
use eck_replicator::{ClusterApi, ElasticsearchPlugin, PluginConfig, SecretClientFactory};
use eck_replicator_test::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::ResponseTemplate;

const SNAPSHOT: &str = "snapshot-1700000000";

struct Side {
    es: EsMock,
    plugin: ElasticsearchPlugin,
}

async fn side(mode: EngineMode) -> Side {
    let es = EsMock::start().await;
    let cluster: Arc<dyn ClusterApi> =
        Arc::new(seeded_cluster(mode.as_str(), &plugin_parameters(es.options())));
    let config = Arc::new(PluginConfig::default());
    let clients = Arc::new(SecretClientFactory::new(
        cluster.clone(),
        config.elastic_user.clone(),
        config.request_timeout(),
    ));
    let plugin = ElasticsearchPlugin::new(cluster, clients, Arc::new(ManualClock::new()), config);
    Side { es, plugin }
}

fn accepted() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "accepted": true }))
}

fn orchestrator(clock: Arc<ManualClock>) -> Orchestrator {
    Orchestrator::new(
        clock,
        PollPolicy::new(Duration::from_secs(2), Duration::from_secs(300)),
    )
}

#[tokio::test]
async fn test_replicate_snapshot_then_restore() {
    let active = side(EngineMode::Active).await;
    active
        .es
        .mock_create_snapshot(REPOSITORY, SNAPSHOT, accepted())
        .await;
    active
        .es
        .mock_snapshot_state(REPOSITORY, SNAPSHOT, "IN_PROGRESS", Some(2))
        .await;
    active
        .es
        .mock_snapshot_state(REPOSITORY, SNAPSHOT, "SUCCESS", None)
        .await;

    let standby = side(EngineMode::Standby).await;
    standby
        .es
        .mock_close_all(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .await;
    standby.es.mock_restore(REPOSITORY, SNAPSHOT, accepted()).await;
    standby.es.mock_recovery(json!({}), Some(1)).await;
    standby
        .es
        .mock_recovery(
            recovery_body(&[("logs-1", "SNAPSHOT", SNAPSHOT, "DONE")]),
            None,
        )
        .await;

    let clock = Arc::new(ManualClock::new());
    orchestrator(clock.clone())
        .replicate(&active.plugin, &standby.plugin, &engine_params(Some(SNAPSHOT)))
        .await
        .unwrap();

    assert_eq!(
        active.es.request_lines().await,
        vec![
            format!("PUT /_snapshot/minio_repo/{SNAPSHOT}"),
            format!("GET /_snapshot/minio_repo/{SNAPSHOT}"),
            format!("GET /_snapshot/minio_repo/{SNAPSHOT}"),
            format!("GET /_snapshot/minio_repo/{SNAPSHOT}"),
        ]
    );
    assert_eq!(
        standby.es.request_lines().await,
        vec![
            "POST /_all/_close".to_string(),
            format!("POST /_snapshot/minio_repo/{SNAPSHOT}/_restore"),
            "GET /_recovery".to_string(),
            "GET /_recovery".to_string(),
        ]
    );
    // two in-progress polls on the active side, one on the standby side
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 3]);
}

#[tokio::test]
async fn test_failed_snapshot_stops_before_standby() {
    let active = side(EngineMode::Active).await;
    active
        .es
        .mock_create_snapshot(REPOSITORY, SNAPSHOT, accepted())
        .await;
    active
        .es
        .mock_snapshot_state(REPOSITORY, SNAPSHOT, "FAILED", None)
        .await;
    let standby = side(EngineMode::Standby).await;

    let err = orchestrator(Arc::new(ManualClock::new()))
        .replicate(&active.plugin, &standby.plugin, &engine_params(Some(SNAPSHOT)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::NotCompleted {
            phase: Phase::Active,
            status: OperationStatus::Failed,
        }
    ));
    assert!(standby.es.requests().await.is_empty());
}

#[tokio::test]
async fn test_restore_error_ends_standby_phase() {
    let active = side(EngineMode::Active).await;
    active
        .es
        .mock_create_snapshot(REPOSITORY, SNAPSHOT, accepted())
        .await;
    active
        .es
        .mock_snapshot_state(REPOSITORY, SNAPSHOT, "SUCCESS", None)
        .await;

    let standby = side(EngineMode::Standby).await;
    standby
        .es
        .mock_close_all(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .await;
    standby
        .es
        .mock_restore(
            REPOSITORY,
            SNAPSHOT,
            error_body(404, "snapshot_missing_exception", "missing"),
        )
        .await;

    let err = orchestrator(Arc::new(ManualClock::new()))
        .replicate(&active.plugin, &standby.plugin, &engine_params(Some(SNAPSHOT)))
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Phase::Standby);
    assert!(matches!(err, OrchestrationError::Sync { .. }));
}
