//! Builders for the Kubernetes objects derived from a CassandraDatacenter.

pub mod service_builder;
pub mod statefulset_builder;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::constants::{labels, values};
use crate::crds::CassandraDatacenter;

/// Labels carried by every object the operator owns for a datacenter.
pub fn datacenter_labels(dc: &CassandraDatacenter) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::NAME.into(), values::APP_NAME.into()),
        (labels::MANAGED_BY.into(), values::MANAGED_BY.into()),
        (labels::CLUSTER.into(), dc.spec.cluster_name.clone()),
        (labels::DATACENTER.into(), dc.name_any()),
    ])
}

/// Datacenter labels plus the rack label.
pub fn rack_labels(dc: &CassandraDatacenter, rack: &str) -> BTreeMap<String, String> {
    let mut l = datacenter_labels(dc);
    l.insert(labels::RACK.into(), rack.into());
    l
}

/// Selector for all member pods of the datacenter.
pub fn datacenter_selector(dc: &CassandraDatacenter) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::CLUSTER.into(), dc.spec.cluster_name.clone()),
        (labels::DATACENTER.into(), dc.name_any()),
    ])
}

/// Selector for the member pods of one rack.
pub fn rack_selector(dc: &CassandraDatacenter, rack: &str) -> BTreeMap<String, String> {
    let mut s = datacenter_selector(dc);
    s.insert(labels::RACK.into(), rack.into());
    s
}

/// Build an OwnerReference for a CassandraDatacenter.
pub fn owner_reference(dc: &CassandraDatacenter) -> OwnerReference {
    OwnerReference {
        api_version: CassandraDatacenter::api_version(&()).to_string(),
        kind: CassandraDatacenter::kind(&()).to_string(),
        name: dc.name_any(),
        uid: dc.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
