use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, ResourceRequirements, StorageSpec, Toleration};
use crate::constants::{self, FINALIZER};

/// Spec for a Cassandra datacenter spread across racks.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cassandra.datastax.com",
    version = "v1alpha2",
    kind = "CassandraDatacenter",
    namespaced,
    status = "CassandraDatacenterStatus",
    shortname = "cassdc",
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyNodes"}"#,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".status.desiredNodes"}"#,
    printcolumn = r#"{"name":"Progress","type":"string","jsonPath":".status.cassandraOperatorProgress"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterSpec {
    /// Name of the Cassandra cluster this datacenter belongs to.
    pub cluster_name: String,

    /// Desired number of Cassandra nodes across all racks.
    pub size: i32,

    /// Container image for the Cassandra server with the management API.
    #[serde(default = "super::defaults::image")]
    pub server_image: String,

    /// Persistent storage for each node's data directory.
    #[serde(default)]
    pub storage_config: StorageSpec,

    /// How the operator authenticates to the management API.
    #[serde(default)]
    pub management_api_auth: ManagementApiAuthConfig,

    /// Ordered failure-domain partitions. Empty means a single `default` rack.
    #[serde(default)]
    pub racks: Vec<Rack>,

    /// Resource requests and limits per node.
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,

    /// Server configuration, passed to the container as JSON.
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,

    /// Node selector for Pod scheduling.
    #[serde(default)]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Pod tolerations.
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> Schema {
    let mut obj = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    obj.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".into(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(obj)
}

/// A named failure domain.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    pub name: String,

    /// Availability zone the rack's pods are pinned to.
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementApiAuthConfig {
    #[serde(default)]
    pub insecure: Option<InsecureAuth>,

    #[serde(default)]
    pub manual: Option<ManualAuth>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct InsecureAuth {}

/// Mutual TLS using user-provided secrets.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualAuth {
    pub client_secret_name: String,
    pub server_secret_name: String,
}

/// Resolved authentication mode.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthMode {
    Insecure,
    Manual {
        client_secret: String,
        server_secret: String,
    },
}

impl ManagementApiAuthConfig {
    /// `manual` wins when both are set; nothing set means insecure.
    pub fn mode(&self) -> AuthMode {
        match &self.manual {
            Some(m) => AuthMode::Manual {
                client_secret: m.client_secret_name.clone(),
                server_secret: m.server_secret_name.clone(),
            },
            None => AuthMode::Insecure,
        }
    }
}

/// Status for CassandraDatacenter.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterStatus {
    /// `Ready` when every rack matches the declaration, `Updating` otherwise.
    #[serde(default)]
    pub cassandra_operator_progress: Option<String>,

    #[serde(default)]
    pub ready_nodes: i32,

    #[serde(default)]
    pub desired_nodes: i32,

    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// Pods recreated by the node-replacement workflow.
    #[serde(default)]
    pub node_replacements: Vec<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl CassandraDatacenter {
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".into())
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Declared racks, or the implied `default` rack.
    pub fn racks(&self) -> Vec<Rack> {
        if self.spec.racks.is_empty() {
            vec![Rack {
                name: constants::defaults::DEFAULT_RACK.into(),
                zone: None,
            }]
        } else {
            self.spec.racks.clone()
        }
    }

    /// Name of the rack StatefulSet, e.g. `cluster1-dc1-r1-sts`.
    pub fn stateful_set_name(&self, rack: &str) -> String {
        format!("{}-{}-{}-sts", self.spec.cluster_name, self.name_any(), rack)
    }

    pub fn service_name(&self) -> String {
        format!("{}-{}-service", self.spec.cluster_name, self.name_any())
    }

    pub fn seed_service_name(&self) -> String {
        format!("{}-seed-service", self.spec.cluster_name)
    }

    pub fn all_pods_service_name(&self) -> String {
        format!("{}-{}-all-pods-service", self.spec.cluster_name, self.name_any())
    }

    pub fn rack_service_name(&self, rack: &str) -> String {
        format!("{}-{}-{}-service", self.spec.cluster_name, self.name_any(), rack)
    }

    /// Label selector matching every object of the Cassandra cluster, across
    /// datacenters. The seed Service is cluster-wide and only carries this.
    pub fn cluster_label_selector(&self) -> String {
        format!("{}={}", constants::labels::CLUSTER, self.spec.cluster_name)
    }

    /// Label selector string matching every object owned by this datacenter.
    pub fn label_selector(&self) -> String {
        format!(
            "{}={},{}={}",
            constants::labels::CLUSTER,
            self.spec.cluster_name,
            constants::labels::DATACENTER,
            self.name_any()
        )
    }
}
