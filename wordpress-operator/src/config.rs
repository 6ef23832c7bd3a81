//! Operator configuration.

use std::time::Duration;

/// Default deadline for a single reconcile pass.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default requeue delay after a transient error.
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Default requeue delay after an error that needs a spec fix.
pub const DEFAULT_PERMANENT_ERROR_REQUEUE: Duration = Duration::from_secs(300);

/// Runtime configuration shared by both controllers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wordpress_operator::config::OperatorConfig;
///
/// let config = OperatorConfig::default()
///     .with_namespace("sites")
///     .with_reconcile_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.namespace.as_deref(), Some("sites"));
/// ```
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch for Wordpress sites; `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Deadline for one reconcile pass.
    pub reconcile_timeout: Duration,
    /// Requeue delay for transient errors (conflicts, API failures).
    pub error_requeue: Duration,
    /// Requeue delay for errors that will not heal without a spec change.
    pub permanent_error_requeue: Duration,
    /// Periodic resync after a successful pass; `None` waits for changes.
    pub resync_interval: Option<Duration>,
    /// Field manager name used on writes.
    pub field_manager: String,
    /// Event reporter name for the Wordpress controller.
    pub wordpress_controller_name: String,
    /// Event reporter name for the WordpressPolicy controller.
    pub policy_controller_name: String,
    /// Reporting instance (usually the pod name).
    pub instance: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            error_requeue: DEFAULT_ERROR_REQUEUE,
            permanent_error_requeue: DEFAULT_PERMANENT_ERROR_REQUEUE,
            resync_interval: None,
            field_manager: "wordpress-operator".to_string(),
            wordpress_controller_name: "wordpress-controller".to_string(),
            policy_controller_name: "wordpress-policy-controller".to_string(),
            instance: None,
        }
    }
}

impl OperatorConfig {
    /// Restrict the operator to one namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the reconcile deadline.
    pub fn with_reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Set the requeue delay for transient errors.
    pub fn with_error_requeue(mut self, delay: Duration) -> Self {
        self.error_requeue = delay;
        self
    }

    /// Resync every object `interval` after its last successful pass.
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = Some(interval);
        self
    }

    /// Set the reporting instance name.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Requeue delay appropriate for an error.
    pub fn requeue_for(&self, error: &crate::error::OperatorError) -> Duration {
        use crate::error::OperatorError;

        match error {
            OperatorError::Conflict { .. }
            | OperatorError::AlreadyExists { .. }
            | OperatorError::Timeout(_) => Duration::from_secs(5),
            err if !err.is_transient() => self.permanent_error_requeue,
            _ => self.error_requeue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;

    #[test]
    fn requeue_delay_depends_on_error() {
        let config = OperatorConfig::default();

        let conflict = OperatorError::Conflict {
            kind: "Wordpress".into(),
            name: "blog".into(),
        };
        assert_eq!(config.requeue_for(&conflict), Duration::from_secs(5));

        let selector = OperatorError::InvalidSelector("env in ()".into());
        assert_eq!(config.requeue_for(&selector), DEFAULT_PERMANENT_ERROR_REQUEUE);

        let sync = OperatorError::sync("secret", "boom");
        assert_eq!(config.requeue_for(&sync), DEFAULT_ERROR_REQUEUE);

        let tuned = config.with_error_requeue(Duration::from_secs(12));
        assert_eq!(tuned.requeue_for(&sync), Duration::from_secs(12));
        assert_eq!(tuned.requeue_for(&selector), DEFAULT_PERMANENT_ERROR_REQUEUE);
    }
}
