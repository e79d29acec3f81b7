use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("namespace not found for current environment")]
    NamespaceNotFound,

    #[error("operator run mode forced to local")]
    RunLocal,
}

pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Whether this error is transient and the reconciliation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OperatorError::Kube(_) | OperatorError::Reconcile(_) | OperatorError::NotFound(_)
        )
    }
}

/// Check if a kube::Error is a 404 Not Found.
pub fn is_not_found(e: &kube::Error) -> bool {
    matches!(
        e,
        kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })
    )
}
