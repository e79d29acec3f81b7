//! Kubernetes operator that converges Cassandra datacenters toward their
//! declared topology.

pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crds;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod observe;
pub mod predicates;
pub mod reconcile;
pub mod resources;
pub mod scaling;
pub mod sets;
pub mod telemetry;

pub use crds::CassandraDatacenter;
pub use reconcile::{Outcome, Reconciler, Verdict};
