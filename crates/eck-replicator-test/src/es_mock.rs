//! Elasticsearch REST mock
//!
//! Wraps a [`wiremock::MockServer`] with one helper per endpoint the plugin
//! calls, and exposes the received requests for ordering assertions.

use eck_replicator::params::ElasticsearchOptions;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{AUTH_SECRET, ES_NAME, NAMESPACE};

/// A request received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// Returns "METHOD /path".
    pub fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Elasticsearch error response with one root cause.
pub fn error_body(status: u16, error_type: &str, reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": {
            "root_cause": [{ "type": error_type, "reason": reason }],
            "type": error_type,
            "reason": reason
        },
        "status": status
    }))
}

/// Mock Elasticsearch REST endpoint.
pub struct EsMock {
    server: MockServer,
}

impl EsMock {
    /// Starts a mock server on a random local port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Connection options addressing this mock over plain HTTP.
    pub fn options(&self) -> ElasticsearchOptions {
        let address = self.server.address();
        ElasticsearchOptions {
            name: ES_NAME.to_string(),
            namespace: NAMESPACE.to_string(),
            service_name: address.ip().to_string(),
            scheme: "http".to_string(),
            port: address.port(),
            auth_secret: AUTH_SECRET.to_string(),
            ..Default::default()
        }
    }

    /// `PUT /_snapshot/{repository}`
    pub async fn mock_create_repository(&self, repository: &str, response: ResponseTemplate) {
        Mock::given(method("PUT"))
            .and(path(format!("/_snapshot/{repository}")))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// `PUT /_snapshot/{repository}/{snapshot}`
    pub async fn mock_create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
        response: ResponseTemplate,
    ) {
        Mock::given(method("PUT"))
            .and(path(format!("/_snapshot/{repository}/{snapshot}")))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// `GET /_snapshot/{repository}/{snapshot}` answering with `state`.
    ///
    /// With `times`, the mock stops matching after that many requests so a
    /// later mount can answer the following polls.
    pub async fn mock_snapshot_state(
        &self,
        repository: &str,
        snapshot: &str,
        state: &str,
        times: Option<u64>,
    ) {
        let body = json!({
            "snapshots": [{
                "snapshot": snapshot,
                "state": state,
                "indices": ["logs-1"],
                "failures": []
            }]
        });
        let mock = Mock::given(method("GET"))
            .and(path(format!("/_snapshot/{repository}/{snapshot}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        let mock = match times {
            Some(n) => mock.up_to_n_times(n),
            None => mock,
        };
        mock.mount(&self.server).await;
    }

    /// `POST /_all/_close`
    pub async fn mock_close_all(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/_all/_close"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// `POST /_snapshot/{repository}/{snapshot}/_restore`
    pub async fn mock_restore(&self, repository: &str, snapshot: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(format!("/_snapshot/{repository}/{snapshot}/_restore")))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// `GET /_recovery` answering with `body`.
    pub async fn mock_recovery(&self, body: Value, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path("/_recovery"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        let mock = match times {
            Some(n) => mock.up_to_n_times(n),
            None => mock,
        };
        mock.mount(&self.server).await;
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| RecordedRequest {
                method: request.method.to_string(),
                path: request.url.path().to_string(),
                body: serde_json::from_slice(&request.body).ok(),
            })
            .collect()
    }

    /// "METHOD /path" of every request received so far.
    pub async fn request_lines(&self) -> Vec<String> {
        self.requests()
            .await
            .iter()
            .map(RecordedRequest::line)
            .collect()
    }
}

/// Recovery response with one shard per `(index, type, snapshot, stage)`.
pub fn recovery_body(shards: &[(&str, &str, &str, &str)]) -> Value {
    let mut indices = serde_json::Map::new();
    for (index, kind, snapshot, stage) in shards {
        let entry = indices
            .entry(index.to_string())
            .or_insert_with(|| json!({ "shards": [] }));
        if let Some(list) = entry["shards"].as_array_mut() {
            list.push(json!({
                "type": kind,
                "stage": stage,
                "source": { "repository": crate::fixtures::REPOSITORY, "snapshot": snapshot }
            }));
        }
    }
    Value::Object(indices)
}
