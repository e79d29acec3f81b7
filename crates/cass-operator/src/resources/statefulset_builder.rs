use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvVar, HTTPGetAction, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, PersistentVolumeClaim,
    PersistentVolumeClaimSpec as K8sPvcSpec, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, SecretVolumeSource, Toleration, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use sha2::{Digest, Sha256};

use super::{datacenter_selector, owner_reference, rack_labels, rack_selector};
use crate::constants::{self, annotations, defaults};
use crate::crds::{AuthMode, CassandraDatacenter, Rack};
use crate::error::Result;

const ZONE_LABEL: &str = "topology.kubernetes.io/zone";
const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";
const MGMT_CERTS_VOLUME: &str = "mgmt-api-server-certs";
const MGMT_CERTS_PATH: &str = "/management-api-certs";

/// Build the StatefulSet owning one rack's members.
pub fn build_rack_stateful_set(
    dc: &CassandraDatacenter,
    rack: &Rack,
    replicas: i32,
) -> Result<StatefulSet> {
    let template = build_pod_template(dc, rack);
    let hash = template_hash(&template)?;

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(dc.stateful_set_name(&rack.name)),
            namespace: Some(dc.namespace_or_default()),
            labels: Some(rack_labels(dc, &rack.name)),
            annotations: Some(BTreeMap::from([(
                annotations::RESOURCE_HASH.into(),
                hash,
            )])),
            owner_references: Some(vec![owner_reference(dc)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: dc.all_pods_service_name(),
            pod_management_policy: Some("Parallel".into()),
            selector: LabelSelector {
                match_labels: Some(rack_selector(dc, &rack.name)),
                ..Default::default()
            },
            template,
            volume_claim_templates: Some(vec![build_data_claim_template(dc, &rack.name)]),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".into()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Pod template shared by every member of a rack.
pub fn build_pod_template(dc: &CassandraDatacenter, rack: &Rack) -> PodTemplateSpec {
    let spec = &dc.spec;

    let mut env_vars = vec![EnvVar {
        name: "DS_CLUSTER_NAME".into(),
        value: Some(spec.cluster_name.clone()),
        ..Default::default()
    }];
    if let Some(ref config) = spec.config {
        env_vars.push(EnvVar {
            name: "CONFIG_FILE_DATA".into(),
            value: Some(config.to_string()),
            ..Default::default()
        });
    }

    let mut volume_mounts = vec![VolumeMount {
        name: defaults::DATA_VOLUME.into(),
        mount_path: defaults::DATA_DIR.into(),
        ..Default::default()
    }];
    let mut volumes = Vec::new();

    if let AuthMode::Manual { server_secret, .. } = spec.management_api_auth.mode() {
        for (name, file) in [
            ("MGMT_API_TLS_CA_CERT_FILE", "ca.crt"),
            ("MGMT_API_TLS_CERT_FILE", "tls.crt"),
            ("MGMT_API_TLS_KEY_FILE", "tls.key"),
        ] {
            env_vars.push(EnvVar {
                name: name.into(),
                value: Some(format!("{MGMT_CERTS_PATH}/{file}")),
                ..Default::default()
            });
        }
        volume_mounts.push(VolumeMount {
            name: MGMT_CERTS_VOLUME.into(),
            mount_path: MGMT_CERTS_PATH.into(),
            read_only: Some(true),
            ..Default::default()
        });
        volumes.push(Volume {
            name: MGMT_CERTS_VOLUME.into(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(server_secret),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let resources = spec.resources.as_ref().map(|r| {
        let to_map = |v: &crate::crds::common::ResourceValues| {
            let mut map = BTreeMap::new();
            if let Some(ref cpu) = v.cpu {
                map.insert("cpu".into(), Quantity(cpu.clone()));
            }
            if let Some(ref mem) = v.memory {
                map.insert("memory".into(), Quantity(mem.clone()));
            }
            map
        };
        ResourceRequirements {
            requests: r.requests.as_ref().map(to_map),
            limits: r.limits.as_ref().map(to_map),
            ..Default::default()
        }
    });

    let probe = |path: &str, initial_delay: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.into()),
            port: IntOrString::Int(constants::ports::MGMT_API),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    };

    let container = Container {
        name: defaults::CONTAINER_NAME.into(),
        image: Some(spec.server_image.clone()),
        ports: Some(vec![
            ContainerPort {
                name: Some("native".into()),
                container_port: constants::ports::NATIVE,
                ..Default::default()
            },
            ContainerPort {
                name: Some("internode".into()),
                container_port: constants::ports::INTERNODE,
                ..Default::default()
            },
            ContainerPort {
                name: Some("mgmt-api".into()),
                container_port: constants::ports::MGMT_API,
                ..Default::default()
            },
        ]),
        env: Some(env_vars),
        resources,
        liveness_probe: Some(probe("/api/v0/probes/liveness", 15)),
        readiness_probe: Some(probe("/api/v0/probes/readiness", 20)),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    let tolerations: Option<Vec<Toleration>> = if spec.tolerations.is_empty() {
        None
    } else {
        Some(
            spec.tolerations
                .iter()
                .map(|t| Toleration {
                    key: t.key.clone(),
                    operator: t.operator.clone(),
                    value: t.value.clone(),
                    effect: t.effect.clone(),
                    toleration_seconds: t.toleration_seconds,
                })
                .collect(),
        )
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(rack_labels(dc, &rack.name)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            affinity: Some(build_affinity(dc, rack)),
            node_selector: spec.node_selector.clone(),
            tolerations,
            volumes: (!volumes.is_empty()).then_some(volumes),
            ..Default::default()
        }),
    }
}

/// One member per host across the datacenter, pinned to the rack's zone if set.
fn build_affinity(dc: &CassandraDatacenter, rack: &Rack) -> Affinity {
    let anti_affinity = PodAntiAffinity {
        required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_labels: Some(datacenter_selector(dc)),
                ..Default::default()
            }),
            topology_key: HOSTNAME_LABEL.into(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let node_affinity = rack.zone.as_ref().map(|zone| NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: ZONE_LABEL.into(),
                    operator: "In".into(),
                    values: Some(vec![zone.clone()]),
                }]),
                ..Default::default()
            }],
        }),
        ..Default::default()
    });

    Affinity {
        node_affinity,
        pod_anti_affinity: Some(anti_affinity),
        ..Default::default()
    }
}

/// Volume claim template for the data directory.
fn build_data_claim_template(dc: &CassandraDatacenter, rack: &str) -> PersistentVolumeClaim {
    let storage = &dc.spec.storage_config;

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(defaults::DATA_VOLUME.into()),
            labels: Some(rack_labels(dc, rack)),
            ..Default::default()
        },
        spec: Some(K8sPvcSpec {
            storage_class_name: storage.storage_class_name.clone(),
            access_modes: Some(storage.access_modes.clone()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".into(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Stable hash of a pod template, used to detect template drift without
/// comparing against server-defaulted fields.
pub fn template_hash(template: &PodTemplateSpec) -> Result<String> {
    let bytes = serde_json::to_vec(template)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Name of the PVC the StatefulSet creates for a member pod.
pub fn claim_name_for_pod(pod_name: &str) -> String {
    format!("{}-{pod_name}", defaults::DATA_VOLUME)
}
