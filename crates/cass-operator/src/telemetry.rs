use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{OperatorError, Result};

/// Build the log filter: `RUST_LOG` wins, otherwise `level` applies to the
/// operator and kube-runtime stays at `warn`.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,cass_operator={level}")))
}

/// Install the global tracing subscriber. Fails if one is already installed.
pub fn init(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| OperatorError::Config(format!("failed to install tracing subscriber: {e}")))
}
