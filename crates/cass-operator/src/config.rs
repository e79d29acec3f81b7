//! Deployment environment of the operator process.

use std::io::ErrorKind;
use std::path::Path;

use crate::constants::defaults;
use crate::error::{OperatorError, Result};

pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
pub const FORCE_RUN_MODE_ENV: &str = "OSDK_FORCE_RUN_MODE";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const METRICS_ADDR_ENV: &str = "METRICS_ADDR";

/// File mounted into every pod with its service account namespace.
pub const NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Whether the operator runs inside the cluster or from a developer machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Cluster,
    Local,
}

impl RunMode {
    fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("local") => RunMode::Local,
            _ => RunMode::Cluster,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// `None` watches every namespace.
    pub watch_namespace: Option<String>,
    pub log_level: String,
    pub metrics_addr: String,
    pub run_mode: RunMode,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let watch_namespace = watch_namespace(&lookup)?;
        Ok(Self {
            watch_namespace: (!watch_namespace.is_empty()).then_some(watch_namespace),
            log_level: lookup(LOG_LEVEL_ENV).unwrap_or_else(|| defaults::LOG_LEVEL.into()),
            metrics_addr: lookup(METRICS_ADDR_ENV)
                .unwrap_or_else(|| defaults::METRICS_ADDR.into()),
            run_mode: RunMode::from_value(lookup(FORCE_RUN_MODE_ENV).as_deref()),
        })
    }
}

/// Namespace the operator is scoped to. An empty value means all namespaces;
/// an unset variable is a configuration error.
pub fn watch_namespace<F>(lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(WATCH_NAMESPACE_ENV)
        .ok_or_else(|| OperatorError::Config(format!("{WATCH_NAMESPACE_ENV} must be set")))
}

/// Namespace the operator itself runs in, read from the service account mount.
pub fn operator_namespace(run_mode: RunMode) -> Result<String> {
    operator_namespace_from(run_mode, Path::new(NAMESPACE_FILE))
}

pub fn operator_namespace_from(run_mode: RunMode, path: &Path) -> Result<String> {
    if run_mode == RunMode::Local {
        return Err(OperatorError::RunLocal);
    }
    match std::fs::read_to_string(path) {
        Ok(ns) => Ok(ns.trim().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(OperatorError::NamespaceNotFound),
        Err(e) => Err(e.into()),
    }
}
