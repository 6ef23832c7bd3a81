//! Error types for the WordPress operator.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found while writing it.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace (empty for cluster-scoped kinds).
        namespace: String,
    },

    /// Optimistic concurrency violation: the write was based on a stale
    /// resource version.
    #[error("Conflict writing {kind}/{name}: object was modified")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// Create raced with another writer.
    #[error("Resource already exists: {kind}/{name}")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// The child object is controlled by another owner.
    #[error("{kind}/{name} is already controlled by {owner}")]
    AlreadyOwned {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Current controller, as `Kind/name`.
        owner: String,
    },

    /// Malformed label selector.
    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    /// A syncer could not compute the desired state of its child.
    #[error("Sync failed for {syncer}: {cause}")]
    SyncError {
        /// Syncer name.
        syncer: String,
        /// Error cause.
        cause: String,
    },

    /// Some sites could not be stamped with a policy version.
    #[error("Policy {policy} failed to propagate to {failed}/{total} sites: {cause}")]
    PolicyPropagation {
        /// Policy name.
        policy: String,
        /// Number of failed updates.
        failed: usize,
        /// Number of matched sites.
        total: usize,
        /// First failure.
        cause: String,
    },

    /// The reconcile pass exceeded its deadline.
    #[error("Reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl OperatorError {
    /// Build a [`OperatorError::SyncError`].
    pub fn sync(syncer: impl Into<String>, cause: impl ToString) -> Self {
        Self::SyncError {
            syncer: syncer.into(),
            cause: cause.to_string(),
        }
    }

    /// Short machine-readable reason, used for events and status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::KubeError(_) => "ApiError",
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::AlreadyOwned { .. } => "AlreadyOwned",
            Self::InvalidSelector(_) => "InvalidSelector",
            Self::SyncError { .. } => "SyncFailed",
            Self::PolicyPropagation { .. } => "PropagationFailed",
            Self::Timeout(_) => "Timeout",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::SerializationError(_) => "SerializationError",
        }
    }

    /// Whether a retry is expected to succeed without a spec change.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::InvalidSelector(_)
                | Self::AlreadyOwned { .. }
                | Self::InvalidConfig(_)
                | Self::SerializationError(_)
        )
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_errors_need_a_spec_fix() {
        let err = OperatorError::InvalidSelector("bad".into());
        assert!(!err.is_transient());
        assert_eq!(err.reason(), "InvalidSelector");
    }

    #[test]
    fn conflicts_are_transient() {
        let err = OperatorError::Conflict {
            kind: "Wordpress".into(),
            name: "blog".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Conflict writing Wordpress/blog: object was modified");
    }
}
