//! Names shared with Kubernetes, ECK and the Elasticsearch REST API.

/// Control object (`MoveEngine`) resource coordinates.
pub mod move_engine {
    /// API group.
    pub const GROUP: &str = "kubemove.io";

    /// API version.
    pub const VERSION: &str = "v1alpha1";

    /// Kind.
    pub const KIND: &str = "MoveEngine";

    /// Plural resource name.
    pub const PLURAL: &str = "moveengines";

    /// Spec field holding the plugin parameter blob.
    pub const FIELD_PLUGIN_PARAMETERS: &str = "pluginParameters";

    /// Spec field holding the replication mode.
    pub const FIELD_MODE: &str = "mode";
}

/// ECK `Elasticsearch` resource coordinates.
pub mod elasticsearch {
    /// API group.
    pub const GROUP: &str = "elasticsearch.k8s.elastic.co";

    /// API version.
    pub const VERSION: &str = "v1";

    /// Kind.
    pub const KIND: &str = "Elasticsearch";

    /// Plural resource name.
    pub const PLURAL: &str = "elasticsearches";

    /// Phase reported once every node set is rolled out.
    pub const READY_PHASE: &str = "Ready";
}

/// Secret keys read when building the Elasticsearch client.
pub mod secrets {
    /// Built-in superuser; its password is stored under this key.
    pub const ELASTIC_USER: &str = "elastic";

    /// Key of the PEM CA certificate in the TLS secret.
    pub const TLS_CERT_KEY: &str = "tls.crt";
}

/// Bootstrap step injected into every Elasticsearch pod.
pub mod bootstrap {
    /// Init container installing the repository plugin.
    pub const CONTAINER_NAME: &str = "plugin-installer";

    /// Shell used to run the install command.
    pub const SHELL: &str = "sh";

    /// Install command run inside the init container.
    pub const INSTALL_COMMAND: &str = "bin/elasticsearch-plugin install --batch repository-s3";
}

/// Pod phase of a running compute unit.
pub const POD_RUNNING_PHASE: &str = "Running";

/// Vocabulary of the Elasticsearch snapshot and recovery APIs.
pub mod vendor {
    /// Default repository type.
    pub const REPOSITORY_TYPE_S3: &str = "s3";

    /// Index pattern addressing every index.
    pub const ALL_INDICES: &str = "_all";

    /// Snapshot finished successfully.
    pub const SNAPSHOT_SUCCESS: &str = "SUCCESS";

    /// Snapshot still running.
    pub const SNAPSHOT_IN_PROGRESS: &str = "IN_PROGRESS";

    /// Snapshot failed.
    pub const SNAPSHOT_FAILED: &str = "FAILED";

    /// Shard recovery sourced from a snapshot.
    pub const RECOVERY_TYPE_SNAPSHOT: &str = "SNAPSHOT";

    /// Terminal shard recovery stage.
    pub const RECOVERY_STAGE_DONE: &str = "DONE";
}
