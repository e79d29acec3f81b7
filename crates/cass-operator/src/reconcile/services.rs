use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort};
use kube::ResourceExt;
use tracing::info;

use crate::client::ClusterApi;
use crate::crds::CassandraDatacenter;
use crate::error::Result;
use crate::observe::ClusterSnapshot;
use crate::resources::service_builder;

/// Create missing Services and patch drifted ones. Returns the number of writes.
///
/// Services are never deleted here; owner references take care of that.
pub async fn reconcile_services(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    snapshot: &ClusterSnapshot,
) -> Result<usize> {
    let mut writes = 0;

    for desired in service_builder::build_desired_services(dc) {
        let name = desired.name_any();
        match snapshot.service(&name) {
            None => {
                info!(service = %name, "Creating Service");
                api.create_service(&desired).await?;
                writes += 1;
            }
            Some(live) if service_drifted(&desired, live) => {
                info!(service = %name, "Updating drifted Service");
                api.patch_service(&desired).await?;
                writes += 1;
            }
            Some(_) => {}
        }
    }

    Ok(writes)
}

/// True when a field the operator controls differs on the live Service.
///
/// Labels and selector are compared key by key: extra keys on the live object
/// are tolerated, since a merge patch can set keys but never drop foreign
/// ones. Server-filled port fields such as the protocol default are ignored.
pub fn service_drifted(desired: &Service, live: &Service) -> bool {
    let labels_drifted = !is_submap(Some(desired.labels()), Some(live.labels()));

    let (Some(want), Some(have)) = (desired.spec.as_ref(), live.spec.as_ref()) else {
        return labels_drifted || desired.spec.is_some();
    };

    labels_drifted
        || !is_submap(want.selector.as_ref(), have.selector.as_ref())
        || want.publish_not_ready_addresses.unwrap_or(false)
            != have.publish_not_ready_addresses.unwrap_or(false)
        || !ports_match(
            want.ports.as_deref().unwrap_or_default(),
            have.ports.as_deref().unwrap_or_default(),
        )
}

/// Every entry of `want` is present with the same value in `have`.
fn is_submap(
    want: Option<&BTreeMap<String, String>>,
    have: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(want) = want else {
        return true;
    };
    want.iter().all(|(k, v)| have.and_then(|h| h.get(k)) == Some(v))
}

fn ports_match(want: &[ServicePort], have: &[ServicePort]) -> bool {
    want.len() == have.len()
        && want.iter().zip(have).all(|(w, h)| {
            w.name == h.name
                && w.port == h.port
                && (w.target_port.is_none() || w.target_port == h.target_port)
        })
}
