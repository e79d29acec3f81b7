//! kube-runtime wiring for the CassandraDatacenter reconciler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use tracing::{error, info, warn};

use crate::client::KubeClusterApi;
use crate::config::OperatorConfig;
use crate::constants::{defaults, labels};
use crate::crds::CassandraDatacenter;
use crate::dispatch::{BackoffMap, ObjectKey};
use crate::error::OperatorError;
use crate::metrics;
use crate::reconcile::{Outcome, Reconciler, Verdict};

/// Shared context for the datacenter controller.
pub struct Context {
    pub reconciler: Reconciler,
    backoff: BackoffMap,
}

impl Context {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            backoff: BackoffMap::default(),
        }
    }
}

fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Map a member pod back to the datacenter it belongs to.
fn datacenter_for_pod(pod: Pod) -> Option<ObjectRef<CassandraDatacenter>> {
    let dc = pod.labels().get(labels::DATACENTER)?.clone();
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(&dc).within(&namespace))
}

/// Start the datacenter controller and run until the watch streams end.
pub async fn run(client: Client, config: &OperatorConfig) {
    let namespace = config.watch_namespace.as_deref();
    let datacenters: Api<CassandraDatacenter> = api_for(&client, namespace);
    let stateful_sets: Api<StatefulSet> = api_for(&client, namespace);
    let services: Api<Service> = api_for(&client, namespace);
    let pods: Api<Pod> = api_for(&client, namespace);

    let reconciler = Reconciler::new(Arc::new(KubeClusterApi::new(client.clone())));
    let ctx = Arc::new(Context::new(reconciler));

    info!(namespace = namespace.unwrap_or("*"), "Starting CassandraDatacenter controller");

    Controller::new(datacenters, watcher::Config::default())
        .owns(stateful_sets, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .watches(
            pods,
            watcher::Config::default().labels(labels::DATACENTER),
            datacenter_for_pod,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("CassandraDatacenter reconciliation error: {e:?}");
            }
        })
        .await;
}

fn to_action(outcome: Outcome) -> Action {
    match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::Requeue => Action::requeue(Duration::from_secs(defaults::REQUEUE_CONVERGING_SECS)),
    }
}

async fn reconcile(
    dc: Arc<CassandraDatacenter>,
    ctx: Arc<Context>,
) -> Result<Action, OperatorError> {
    let key = ObjectKey::new(dc.namespace_or_default(), dc.name_any());
    let started = Instant::now();

    let result = ctx.reconciler.reconcile(&key.namespace, &key.name).await;
    metrics::record_reconciliation(Verdict::from(&result), started.elapsed().as_secs_f64());

    let outcome = result?;
    ctx.backoff.reset(&key);
    Ok(to_action(outcome))
}

fn error_policy(dc: Arc<CassandraDatacenter>, error: &OperatorError, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::new(dc.namespace_or_default(), dc.name_any());
    if !error.is_transient() {
        warn!(key = %key, "Non-transient reconciliation error: {error}");
        return Action::requeue(Duration::from_secs(defaults::REQUEUE_BACKOFF_MAX_SECS));
    }
    let delay = ctx.backoff.next_delay(&key);
    warn!(key = %key, ?delay, "Reconciliation error, backing off: {error}");
    Action::requeue(delay)
}
