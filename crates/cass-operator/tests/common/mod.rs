//! In-memory stand-in for the Kubernetes API used by the scenario tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{
    Node, NodeSpec, PersistentVolumeClaim, Pod, PodCondition, PodStatus, Service, Taint,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::{Resource, ResourceExt};

use cass_operator::client::ClusterApi;
use cass_operator::constants::{annotations, labels, taints, FINALIZER};
use cass_operator::crds::{CassandraDatacenter, CassandraDatacenterStatus};
use cass_operator::error::{OperatorError, Result};

#[derive(Default)]
pub struct FakeState {
    pub datacenters: BTreeMap<(String, String), CassandraDatacenter>,
    pub services: Vec<Service>,
    pub stateful_sets: Vec<StatefulSet>,
    pub pods: Vec<Pod>,
    pub pvcs: Vec<PersistentVolumeClaim>,
    pub nodes: Vec<Node>,
    /// Every call, as `operation/name`.
    pub calls: Vec<String>,
    /// Calls that fail, as `operation/name` or `operation/*`.
    pub failures: BTreeSet<String>,
}

#[derive(Default)]
pub struct FakeClusterApi {
    pub state: Mutex<FakeState>,
    /// How long `get_datacenter` stalls before answering.
    read_delay: Mutex<Option<Duration>>,
    active_reads: AtomicUsize,
    peak_reads: AtomicUsize,
}

const WRITE_OPS: &[&str] = &[
    "set_finalizers",
    "patch_datacenter_status",
    "create_service",
    "patch_service",
    "create_stateful_set",
    "scale_stateful_set",
    "patch_stateful_set",
    "delete_pod",
    "set_seed_label",
    "delete_pvc",
    "clear_selected_node",
];

fn matches_selector(meta: &ObjectMeta, selector: &str) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

fn select<K: Resource + Clone>(items: &[K], namespace: &str, selector: &str) -> Vec<K> {
    items
        .iter()
        .filter(|o| o.meta().namespace.as_deref() == Some(namespace))
        .filter(|o| matches_selector(o.meta(), selector))
        .cloned()
        .collect()
}

impl FakeClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datacenter(dc: CassandraDatacenter) -> Self {
        let fake = Self::new();
        fake.put_datacenter(dc);
        fake
    }

    pub fn put_datacenter(&self, dc: CassandraDatacenter) {
        let key = (dc.namespace_or_default(), dc.name_any());
        self.state.lock().unwrap().datacenters.insert(key, dc);
    }

    pub fn datacenter(&self, namespace: &str, name: &str) -> Option<CassandraDatacenter> {
        self.state
            .lock()
            .unwrap()
            .datacenters
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn fail(&self, call: &str) {
        self.state.lock().unwrap().failures.insert(call.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    /// Most `get_datacenter` calls seen in flight at once.
    pub fn peak_concurrent_reads(&self) -> usize {
        self.peak_reads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| WRITE_OPS.iter().any(|op| c.starts_with(&format!("{op}/"))))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Record a call and fail it if it was configured to fail.
    fn call(&self, op: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let call = format!("{op}/{name}");
        state.calls.push(call.clone());
        if state.failures.contains(&call) || state.failures.contains(&format!("{op}/*")) {
            return Err(OperatorError::Reconcile(format!("injected failure: {call}")));
        }
        Ok(())
    }

    pub fn add_node(&self, name: &str, drained: bool) {
        let taints = drained.then(|| {
            vec![Taint {
                key: taints::DRAIN_KEY.into(),
                value: Some(taints::DRAIN_VALUE.into()),
                effect: taints::DRAIN_EFFECT.into(),
                ..Default::default()
            }]
        });
        self.state.lock().unwrap().nodes.push(Node {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                taints,
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    pub fn add_pvc(&self, namespace: &str, name: &str, pvc_labels: BTreeMap<String, String>) {
        self.state.lock().unwrap().pvcs.push(PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                labels: Some(pvc_labels),
                ..Default::default()
            },
            ..Default::default()
        });
    }

    pub fn stateful_set_replicas(&self) -> BTreeMap<String, i32> {
        self.state
            .lock()
            .unwrap()
            .stateful_sets
            .iter()
            .map(|s| {
                (
                    s.name_any(),
                    s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(0),
                )
            })
            .collect()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .unwrap()
            .pods
            .iter()
            .find(|p| p.name_any() == name)
            .cloned()
    }

    pub fn pvc(&self, name: &str) -> Option<PersistentVolumeClaim> {
        self.state
            .lock()
            .unwrap()
            .pvcs
            .iter()
            .find(|p| p.name_any() == name)
            .cloned()
    }

    /// Play the StatefulSet controller: every StatefulSet gets exactly its
    /// replica count of Ready pods, each with a claim bound to `node-<pod>`.
    pub fn settle(&self) {
        let mut state = self.state.lock().unwrap();
        let stateful_sets = state.stateful_sets.clone();
        for sts in &stateful_sets {
            let name = sts.name_any();
            let namespace = sts.namespace().unwrap_or_default();
            let spec = sts.spec.clone().unwrap_or_default();
            let replicas = spec.replicas.unwrap_or(1);
            let pod_labels = spec
                .template
                .metadata
                .and_then(|m| m.labels)
                .unwrap_or_default();

            state.pods.retain(|p| {
                let Some(ordinal) = p.name_any().strip_prefix(&format!("{name}-")).map(String::from)
                else {
                    return true;
                };
                ordinal.parse::<i32>().map(|o| o < replicas).unwrap_or(true)
            });

            for ordinal in 0..replicas {
                let pod_name = format!("{name}-{ordinal}");
                let mut kept_labels = pod_labels.clone();
                if let Some(existing) = state.pods.iter().find(|p| p.name_any() == pod_name) {
                    if let Some(seed) = existing.labels().get(labels::SEED_NODE) {
                        kept_labels.insert(labels::SEED_NODE.into(), seed.clone());
                    }
                }
                state.pods.retain(|p| p.name_any() != pod_name);
                state.pods.push(ready_pod(&namespace, &pod_name, kept_labels));

                let claim = format!("server-data-{pod_name}");
                if !state.pvcs.iter().any(|c| c.name_any() == claim) {
                    state.pvcs.push(PersistentVolumeClaim {
                        metadata: ObjectMeta {
                            name: Some(claim),
                            namespace: Some(namespace.clone()),
                            labels: Some(pod_labels.clone()),
                            annotations: Some(BTreeMap::from([(
                                annotations::SELECTED_NODE.into(),
                                format!("node-{pod_name}"),
                            )])),
                            ..Default::default()
                        },
                        ..Default::default()
                    });
                }
            }

            if let Some(live) = state.stateful_sets.iter_mut().find(|s| s.name_any() == name) {
                live.status = Some(StatefulSetStatus {
                    replicas,
                    ready_replicas: Some(replicas),
                    ..Default::default()
                });
            }
        }
    }

    /// Mark a pod as unschedulable, as the scheduler would.
    pub fn make_unschedulable(&self, pod_name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(pod) = state.pods.iter_mut().find(|p| p.name_any() == pod_name) {
            pod.status = Some(PodStatus {
                phase: Some("Pending".into()),
                conditions: Some(vec![PodCondition {
                    type_: "PodScheduled".into(),
                    status: "False".into(),
                    reason: Some("Unschedulable".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            });
        }
        for sts in state.stateful_sets.iter_mut() {
            if pod_name.starts_with(&format!("{}-", sts.name_any())) {
                if let Some(status) = sts.status.as_mut() {
                    status.ready_replicas = status.ready_replicas.map(|r| r - 1);
                }
            }
        }
    }
}

fn ready_pod(namespace: &str, name: &str, pod_labels: BTreeMap<String, String>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(pod_labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some("Running".into()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".into(),
                status: "True".into(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn get_datacenter(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CassandraDatacenter>> {
        self.call("get_datacenter", name)?;
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            let now = self.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_reads.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.active_reads.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(self.datacenter(namespace, name))
    }

    async fn set_finalizers(
        &self,
        dc: &CassandraDatacenter,
        finalizers: Vec<String>,
    ) -> Result<()> {
        self.call("set_finalizers", &dc.name_any())?;
        let mut state = self.state.lock().unwrap();
        let key = (dc.namespace_or_default(), dc.name_any());
        let delete = match state.datacenters.get_mut(&key) {
            Some(stored) => {
                stored.metadata.finalizers = Some(finalizers.clone());
                stored.metadata.deletion_timestamp.is_some() && finalizers.is_empty()
            }
            None => return Err(OperatorError::NotFound(dc.name_any())),
        };
        if delete {
            state.datacenters.remove(&key);
        }
        Ok(())
    }

    async fn patch_datacenter_status(
        &self,
        dc: &CassandraDatacenter,
        status: &CassandraDatacenterStatus,
    ) -> Result<()> {
        self.call("patch_datacenter_status", &dc.name_any())?;
        let mut state = self.state.lock().unwrap();
        let key = (dc.namespace_or_default(), dc.name_any());
        if let Some(stored) = state.datacenters.get_mut(&key) {
            stored.status = Some(status.clone());
        }
        Ok(())
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        self.call("list_services", selector)?;
        Ok(select(&self.state.lock().unwrap().services, namespace, selector))
    }

    async fn create_service(&self, svc: &Service) -> Result<()> {
        self.call("create_service", &svc.name_any())?;
        let mut state = self.state.lock().unwrap();
        if state.services.iter().any(|s| s.name_any() == svc.name_any()) {
            return Err(OperatorError::Reconcile(format!("{} already exists", svc.name_any())));
        }
        state.services.push(svc.clone());
        Ok(())
    }

    async fn patch_service(&self, svc: &Service) -> Result<()> {
        self.call("patch_service", &svc.name_any())?;
        let mut state = self.state.lock().unwrap();
        if let Some(live) = state.services.iter_mut().find(|s| s.name_any() == svc.name_any()) {
            *live = svc.clone();
        }
        Ok(())
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<StatefulSet>> {
        self.call("list_stateful_sets", selector)?;
        Ok(select(&self.state.lock().unwrap().stateful_sets, namespace, selector))
    }

    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<()> {
        self.call("create_stateful_set", &sts.name_any())?;
        let mut created = sts.clone();
        created.status = Some(StatefulSetStatus {
            replicas: 0,
            ready_replicas: Some(0),
            ..Default::default()
        });
        self.state.lock().unwrap().stateful_sets.push(created);
        Ok(())
    }

    async fn scale_stateful_set(&self, _namespace: &str, name: &str, replicas: i32) -> Result<()> {
        self.call("scale_stateful_set", name)?;
        let mut state = self.state.lock().unwrap();
        if let Some(sts) = state.stateful_sets.iter_mut().find(|s| s.name_any() == name) {
            if let Some(spec) = sts.spec.as_mut() {
                spec.replicas = Some(replicas);
            }
        }
        Ok(())
    }

    async fn patch_stateful_set(&self, sts: &StatefulSet) -> Result<()> {
        self.call("patch_stateful_set", &sts.name_any())?;
        let mut state = self.state.lock().unwrap();
        if let Some(live) = state
            .stateful_sets
            .iter_mut()
            .find(|s| s.name_any() == sts.name_any())
        {
            live.metadata.annotations = sts.metadata.annotations.clone();
            if let (Some(live_spec), Some(spec)) = (live.spec.as_mut(), sts.spec.as_ref()) {
                live_spec.template = spec.template.clone();
            }
        }
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        self.call("list_pods", selector)?;
        Ok(select(&self.state.lock().unwrap().pods, namespace, selector))
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<()> {
        self.call("delete_pod", name)?;
        self.state.lock().unwrap().pods.retain(|p| p.name_any() != name);
        Ok(())
    }

    async fn set_seed_label(&self, _namespace: &str, name: &str, seed: bool) -> Result<()> {
        self.call("set_seed_label", name)?;
        let mut state = self.state.lock().unwrap();
        if let Some(pod) = state.pods.iter_mut().find(|p| p.name_any() == name) {
            if seed {
                pod.labels_mut().insert(labels::SEED_NODE.into(), "true".into());
            } else {
                pod.labels_mut().remove(labels::SEED_NODE);
            }
        }
        Ok(())
    }

    async fn list_pvcs(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.call("list_pvcs", selector)?;
        Ok(select(&self.state.lock().unwrap().pvcs, namespace, selector))
    }

    async fn delete_pvc(&self, _namespace: &str, name: &str) -> Result<()> {
        self.call("delete_pvc", name)?;
        self.state.lock().unwrap().pvcs.retain(|p| p.name_any() != name);
        Ok(())
    }

    async fn clear_selected_node(&self, _namespace: &str, name: &str) -> Result<()> {
        self.call("clear_selected_node", name)?;
        let mut state = self.state.lock().unwrap();
        if let Some(pvc) = state.pvcs.iter_mut().find(|p| p.name_any() == name) {
            pvc.annotations_mut().remove(annotations::SELECTED_NODE);
        }
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        self.call("get_node", name)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .find(|n| n.name_any() == name)
            .cloned())
    }
}

/// A datacenter as a user would submit it.
pub fn datacenter(racks: &[&str], size: i32) -> CassandraDatacenter {
    let mut dc = CassandraDatacenter::new(
        "dc1",
        serde_json::from_value(serde_json::json!({
            "clusterName": "cluster1",
            "size": size,
            "racks": racks.iter().map(|r| serde_json::json!({"name": r})).collect::<Vec<_>>(),
        }))
        .unwrap(),
    );
    dc.metadata.namespace = Some("default".into());
    dc.metadata.uid = Some("dc-uid".into());
    dc.metadata.generation = Some(1);
    dc
}

/// Same, already carrying the finalizer.
pub fn guarded_datacenter(racks: &[&str], size: i32) -> CassandraDatacenter {
    let mut dc = datacenter(racks, size);
    dc.metadata.finalizers = Some(vec![FINALIZER.into()]);
    dc
}

pub fn mark_deleted(dc: &mut CassandraDatacenter) {
    dc.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
}
