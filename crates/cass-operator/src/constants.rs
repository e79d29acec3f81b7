/// Kubernetes label keys.
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const NAME: &str = "app.kubernetes.io/name";

    /// Cassandra-specific labels.
    pub const CLUSTER: &str = "cassandra.datastax.com/cluster";
    pub const DATACENTER: &str = "cassandra.datastax.com/datacenter";
    pub const RACK: &str = "cassandra.datastax.com/rack";
    pub const SEED_NODE: &str = "cassandra.datastax.com/seed-node";
}

/// Label values.
pub mod values {
    pub const APP_NAME: &str = "cassandra";
    pub const MANAGED_BY: &str = "cass-operator";
    pub const SEED_NODE: &str = "true";
}

/// Annotation keys.
pub mod annotations {
    /// Hash of the derived pod template, stored on each rack StatefulSet.
    pub const RESOURCE_HASH: &str = "cassandra.datastax.com/resource-hash";
    /// Node a PVC was bound to by the scheduler.
    pub const SELECTED_NODE: &str = "volume.kubernetes.io/selected-node";
}

/// Taint marking a node as excluded from scheduling Cassandra members.
pub mod taints {
    pub const DRAIN_KEY: &str = "node.vmware.com/drain";
    pub const DRAIN_VALUE: &str = "drain";
    pub const DRAIN_EFFECT: &str = "NoSchedule";
}

/// Finalizer name for graceful cleanup.
pub const FINALIZER: &str = "finalizer.cassandra.datastax.com";

/// Field manager used for server-side patches.
pub const FIELD_MANAGER: &str = "cass-operator";

/// Default ports.
pub mod ports {
    pub const NATIVE: i32 = 9042;
    pub const INTERNODE: i32 = 7000;
    pub const MGMT_API: i32 = 8080;
}

/// Default resource values.
pub mod defaults {
    pub const IMAGE: &str = "datastax/cassandra-mgmtapi:3.11.6";
    pub const DATA_DIR: &str = "/var/lib/cassandra";
    pub const DATA_VOLUME: &str = "server-data";
    pub const STORAGE_SIZE: &str = "10Gi";
    pub const DEFAULT_RACK: &str = "default";
    pub const CONTAINER_NAME: &str = "cassandra";
    pub const MAX_SEEDS: usize = 3;
    pub const LOG_LEVEL: &str = "info";
    pub const METRICS_ADDR: &str = "0.0.0.0:8383";

    /// Requeue intervals in seconds.
    pub const REQUEUE_CONVERGING_SECS: u64 = 5;
    pub const REQUEUE_BACKOFF_BASE_MS: u64 = 500;
    pub const REQUEUE_BACKOFF_MAX_SECS: u64 = 300;
}
