//! Read-only snapshot of the live objects belonging to a datacenter.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::ResourceExt;
use tracing::debug;

use crate::client::ClusterApi;
use crate::constants::labels;
use crate::crds::CassandraDatacenter;
use crate::error::Result;
use crate::predicates::filter_pods_with_label;
use crate::resources::statefulset_builder::claim_name_for_pod;

/// Everything one reconcile pass reads from the cluster, gathered up front.
#[derive(Clone, Debug, Default)]
pub struct ClusterSnapshot {
    pub services: Vec<Service>,
    pub stateful_sets: Vec<StatefulSet>,
    pub pods: Vec<Pod>,
    pub pvcs: Vec<PersistentVolumeClaim>,
}

/// List the datacenter's Services, StatefulSets, Pods and PVCs concurrently.
///
/// The first failed read fails the whole gather; callers never see a
/// partial snapshot.
pub async fn gather(api: &dyn ClusterApi, dc: &CassandraDatacenter) -> Result<ClusterSnapshot> {
    let namespace = dc.namespace_or_default();
    let dc_selector = dc.label_selector();
    let cluster_selector = dc.cluster_label_selector();

    let (services, stateful_sets, pods, pvcs) = futures::try_join!(
        api.list_services(&namespace, &cluster_selector),
        api.list_stateful_sets(&namespace, &dc_selector),
        api.list_pods(&namespace, &dc_selector),
        api.list_pvcs(&namespace, &dc_selector),
    )?;

    debug!(
        name = %dc.name_any(),
        namespace = %namespace,
        services = services.len(),
        stateful_sets = stateful_sets.len(),
        pods = pods.len(),
        pvcs = pvcs.len(),
        "Gathered cluster snapshot"
    );

    Ok(ClusterSnapshot {
        services,
        stateful_sets,
        pods,
        pvcs,
    })
}

impl ClusterSnapshot {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name_any() == name)
    }

    pub fn stateful_set(&self, name: &str) -> Option<&StatefulSet> {
        self.stateful_sets.iter().find(|s| s.name_any() == name)
    }

    /// Member pods of one rack, in listing order.
    pub fn rack_pods(&self, rack: &str) -> Vec<&Pod> {
        filter_pods_with_label(&self.pods, labels::RACK, rack)
    }

    /// Data claim of a member pod, if it has been provisioned.
    pub fn claim_for_pod(&self, pod_name: &str) -> Option<&PersistentVolumeClaim> {
        let claim = claim_name_for_pod(pod_name);
        self.pvcs.iter().find(|c| c.name_any() == claim)
    }
}
