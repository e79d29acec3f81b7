//! Seam between the reconciliation engine and the Kubernetes API.
//!
//! The engine only talks to the cluster through [`ClusterApi`]; production
//! wiring uses [`KubeClusterApi`], tests substitute mocks or in-memory fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::constants::{annotations, labels, values, FIELD_MANAGER};
use crate::crds::{CassandraDatacenter, CassandraDatacenterStatus};
use crate::error::{is_not_found, OperatorError, Result};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// `Ok(None)` when the datacenter does not exist.
    async fn get_datacenter(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CassandraDatacenter>>;

    /// Replace the datacenter's finalizer list, guarded by its resourceVersion.
    async fn set_finalizers(&self, dc: &CassandraDatacenter, finalizers: Vec<String>)
        -> Result<()>;

    async fn patch_datacenter_status(
        &self,
        dc: &CassandraDatacenter,
        status: &CassandraDatacenterStatus,
    ) -> Result<()>;

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>>;
    async fn create_service(&self, svc: &Service) -> Result<()>;
    /// Merge-patch the mutable fields of an existing Service.
    async fn patch_service(&self, svc: &Service) -> Result<()>;

    async fn list_stateful_sets(&self, namespace: &str, selector: &str)
        -> Result<Vec<StatefulSet>>;
    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<()>;
    async fn scale_stateful_set(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;
    /// Merge-patch labels, annotations and pod template of an existing StatefulSet.
    async fn patch_stateful_set(&self, sts: &StatefulSet) -> Result<()>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
    async fn set_seed_label(&self, namespace: &str, name: &str, seed: bool) -> Result<()>;

    async fn list_pvcs(&self, namespace: &str, selector: &str)
        -> Result<Vec<PersistentVolumeClaim>>;
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()>;
    /// Drop the scheduler's selected-node annotation so the claim can rebind.
    async fn clear_selected_node(&self, namespace: &str, name: &str) -> Result<()>;

    /// `Ok(None)` when the node is gone.
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;
}

/// [`ClusterApi`] backed by a live `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn list_labelled<K>(api: Api<K>, selector: &str) -> Result<Vec<K>>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    let list = api.list(&ListParams::default().labels(selector)).await?;
    Ok(list.items)
}

/// Delete by name; an already-missing object counts as deleted.
async fn delete_ignoring_missing<K>(api: Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => {
            debug!(name = %name, "Object already deleted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String> {
    obj.meta()
        .namespace
        .clone()
        .ok_or_else(|| OperatorError::Reconcile(format!("{} has no namespace", obj.name_any())))
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_datacenter(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CassandraDatacenter>> {
        let api: Api<CassandraDatacenter> = self.namespaced(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn set_finalizers(
        &self,
        dc: &CassandraDatacenter,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let api: Api<CassandraDatacenter> = self.namespaced(&dc.namespace_or_default());
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": dc.resource_version(),
            }
        });
        api.patch(
            &dc.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn patch_datacenter_status(
        &self,
        dc: &CassandraDatacenter,
        status: &CassandraDatacenterStatus,
    ) -> Result<()> {
        let api: Api<CassandraDatacenter> = self.namespaced(&dc.namespace_or_default());
        let patch = json!({ "status": status });
        api.patch_status(
            &dc.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        list_labelled(self.namespaced(namespace), selector).await
    }

    async fn create_service(&self, svc: &Service) -> Result<()> {
        let api: Api<Service> = self.namespaced(&namespace_of(svc)?);
        api.create(&PostParams::default(), svc).await?;
        Ok(())
    }

    async fn patch_service(&self, svc: &Service) -> Result<()> {
        let api: Api<Service> = self.namespaced(&namespace_of(svc)?);
        let spec = svc.spec.clone().unwrap_or_default();
        let patch = json!({
            "metadata": { "labels": svc.metadata.labels },
            "spec": {
                "selector": spec.selector,
                "ports": spec.ports,
                "publishNotReadyAddresses": spec.publish_not_ready_addresses,
            }
        });
        api.patch(
            &svc.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<StatefulSet>> {
        list_labelled(self.namespaced(namespace), selector).await
    }

    async fn create_stateful_set(&self, sts: &StatefulSet) -> Result<()> {
        let api: Api<StatefulSet> = self.namespaced(&namespace_of(sts)?);
        api.create(&PostParams::default(), sts).await?;
        Ok(())
    }

    async fn scale_stateful_set(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<StatefulSet> = self.namespaced(namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn patch_stateful_set(&self, sts: &StatefulSet) -> Result<()> {
        let api: Api<StatefulSet> = self.namespaced(&namespace_of(sts)?);
        let template = sts.spec.as_ref().map(|s| &s.template);
        let patch = json!({
            "metadata": {
                "labels": sts.metadata.labels,
                "annotations": sts.metadata.annotations,
            },
            "spec": { "template": template }
        });
        api.patch(
            &sts.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        list_labelled(self.namespaced(namespace), selector).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        delete_ignoring_missing::<Pod>(self.namespaced(namespace), name).await
    }

    async fn set_seed_label(&self, namespace: &str, name: &str, seed: bool) -> Result<()> {
        let api: Api<Pod> = self.namespaced(namespace);
        let value = seed.then_some(values::SEED_NODE);
        let patch = json!({
            "metadata": { "labels": BTreeMap::from([(labels::SEED_NODE, value)]) }
        });
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn list_pvcs(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        list_labelled(self.namespaced(namespace), selector).await
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        delete_ignoring_missing::<PersistentVolumeClaim>(self.namespaced(namespace), name).await
    }

    async fn clear_selected_node(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<PersistentVolumeClaim> = self.namespaced(namespace);
        let patch = json!({
            "metadata": {
                "annotations": BTreeMap::from([(annotations::SELECTED_NODE, None::<String>)])
            }
        });
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}
