use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Persistent storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Kubernetes StorageClass name. Unset uses the cluster default.
    #[serde(default)]
    pub storage_class_name: Option<String>,

    /// Storage size (e.g., "10Gi", "100Gi").
    #[serde(default = "super::defaults::storage_size")]
    pub size: String,

    /// Access modes. Defaults to `["ReadWriteOnce"]`.
    #[serde(default = "super::defaults::access_modes")]
    pub access_modes: Vec<String>,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            storage_class_name: None,
            size: super::defaults::storage_size(),
            access_modes: super::defaults::access_modes(),
        }
    }
}

/// Kubernetes-style condition for status reporting.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., "Ready", "ReconcileFailed").
    #[serde(rename = "type")]
    pub type_: String,

    /// Status: "True", "False", or "Unknown".
    pub status: String,

    /// Machine-readable reason (e.g., "AllRacksReady").
    #[serde(default)]
    pub reason: Option<String>,

    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,

    /// Last transition time (RFC 3339 string).
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

/// Resource requirements (requests and limits).
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: Option<ResourceValues>,

    #[serde(default)]
    pub limits: Option<ResourceValues>,
}

/// CPU and memory values.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResourceValues {
    /// CPU (e.g., "500m", "2").
    #[serde(default)]
    pub cpu: Option<String>,

    /// Memory (e.g., "4Gi").
    #[serde(default)]
    pub memory: Option<String>,
}

/// Toleration for Pod scheduling.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    pub key: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
    pub effect: Option<String>,
    #[serde(default)]
    pub toleration_seconds: Option<i64>,
}
