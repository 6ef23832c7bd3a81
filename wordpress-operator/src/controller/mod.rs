//! Reconcilers for the WordPress operator.
//!
//! - [`WordpressReconciler`]: converges the children of a Wordpress site
//! - [`PolicyReconciler`]: stamps matching sites with a policy's version
//!
//! Both are stateless between passes: every pass re-reads what it needs from
//! the [`Store`] and runs under the configured deadline.
//!
//! # Usage with kube-runtime
//!
//! The controller runtime requires both a reconcile function and an error policy:
//!
//! ```ignore
//! use wordpress_operator::controller::{WordpressReconciler, wordpress_error_policy};
//!
//! Controller::new(sites, watcher_config)
//!     .run(|site, ctx| async move {
//!         let reconciler = WordpressReconciler::new(ctx.clone());
//!         reconciler.reconcile(&ObjectKey::of(site.as_ref())).await
//!     }, wordpress_error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod policy;
mod wordpress;

pub use policy::{PolicyReconciler, error_policy as policy_error_policy};
pub use wordpress::{WordpressReconciler, error_policy as wordpress_error_policy};

use crate::config::OperatorConfig;
use crate::error::{OperatorError, OperatorResult};
use crate::events::EventRecorder;
use crate::store::Store;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared context for one controller.
pub struct ControllerContext<S: Store> {
    /// Object store.
    pub store: Arc<S>,
    /// Event sink, reporting as this controller.
    pub recorder: Arc<dyn EventRecorder>,
    /// Operator configuration.
    pub config: OperatorConfig,
}

impl<S: Store> ControllerContext<S> {
    /// Create a new controller context.
    pub fn new(store: Arc<S>, recorder: Arc<dyn EventRecorder>, config: OperatorConfig) -> Self {
        Self {
            store,
            recorder,
            config,
        }
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl ReconcileAction {
    /// Action after a successful pass: a periodic resync when `resync` is
    /// set, otherwise wait for the next change.
    pub fn converged(resync: Option<Duration>) -> Self {
        resync.map_or(Self::Done, Self::Requeue)
    }
}

impl From<ReconcileAction> for kube::runtime::controller::Action {
    fn from(action: ReconcileAction) -> Self {
        match action {
            ReconcileAction::Requeue(duration) => Self::requeue(duration),
            ReconcileAction::Done => Self::await_change(),
        }
    }
}

/// Run one pass under `deadline`.
///
/// Dropping the pass future on expiry cancels any outstanding store call.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    pass: impl Future<Output = OperatorResult<T>>,
) -> OperatorResult<T> {
    tokio::time::timeout(deadline, pass)
        .await
        .map_err(|_| OperatorError::Timeout(deadline))?
}
