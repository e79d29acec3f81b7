use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{datacenter_labels, datacenter_selector, owner_reference, rack_labels, rack_selector};
use crate::constants::{self, labels, values};
use crate::crds::CassandraDatacenter;

fn port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.into()),
        port,
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    }
}

fn headless_service(
    dc: &CassandraDatacenter,
    name: String,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
    publish_not_ready: bool,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(dc.namespace_or_default()),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(dc)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            cluster_ip: Some("None".into()),
            selector: Some(selector),
            ports: Some(ports),
            publish_not_ready_addresses: publish_not_ready.then_some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Headless discovery Service for clients of the datacenter.
pub fn build_datacenter_service(dc: &CassandraDatacenter) -> Service {
    headless_service(
        dc,
        dc.service_name(),
        datacenter_labels(dc),
        datacenter_selector(dc),
        vec![
            port("native", constants::ports::NATIVE),
            port("mgmt-api", constants::ports::MGMT_API),
        ],
        false,
    )
}

/// Cluster-wide Service resolving to the seed-labelled pods.
///
/// Seeds must be resolvable before they pass readiness, otherwise the first
/// node of a new cluster can never bootstrap.
pub fn build_seed_service(dc: &CassandraDatacenter) -> Service {
    let selector = BTreeMap::from([
        (labels::CLUSTER.into(), dc.spec.cluster_name.clone()),
        (labels::SEED_NODE.into(), values::SEED_NODE.into()),
    ]);
    let mut svc_labels = datacenter_labels(dc);
    svc_labels.remove(labels::DATACENTER);
    headless_service(
        dc,
        dc.seed_service_name(),
        svc_labels,
        selector,
        vec![port("internode", constants::ports::INTERNODE)],
        true,
    )
}

/// Governing Service of every rack StatefulSet.
pub fn build_all_pods_service(dc: &CassandraDatacenter) -> Service {
    headless_service(
        dc,
        dc.all_pods_service_name(),
        datacenter_labels(dc),
        datacenter_selector(dc),
        vec![
            port("native", constants::ports::NATIVE),
            port("internode", constants::ports::INTERNODE),
            port("mgmt-api", constants::ports::MGMT_API),
        ],
        true,
    )
}

/// Per-rack addressing Service.
pub fn build_rack_service(dc: &CassandraDatacenter, rack: &str) -> Service {
    headless_service(
        dc,
        dc.rack_service_name(rack),
        rack_labels(dc, rack),
        rack_selector(dc, rack),
        vec![port("native", constants::ports::NATIVE)],
        false,
    )
}

/// Every Service the datacenter should have, in creation order.
pub fn build_desired_services(dc: &CassandraDatacenter) -> Vec<Service> {
    let mut services = vec![
        build_datacenter_service(dc),
        build_seed_service(dc),
        build_all_pods_service(dc),
    ];
    services.extend(dc.racks().iter().map(|r| build_rack_service(dc, &r.name)));
    services
}

/// Names of [`build_desired_services`], without building them.
pub fn desired_service_names(dc: &CassandraDatacenter) -> Vec<String> {
    build_desired_services(dc)
        .iter()
        .map(|s| s.name_any())
        .collect()
}
