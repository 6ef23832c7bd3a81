//! Wordpress controller.
//!
//! Converges the children of a Wordpress site: salts secret, deployment,
//! service, ingress, wp-cron job and the optional code/media claims.

use super::{ControllerContext, ReconcileAction, with_deadline};
use crate::crd::{
    Condition, POLICY_ANNOTATION_PREFIX, Wordpress, WordpressPolicy, policy_annotation_key,
    set_condition,
};
use crate::error::{OperatorError, OperatorResult};
use crate::selector::Selector;
use crate::store::{ObjectKey, Store};
use crate::syncer::{SyncResult, sync_all};
use crate::wordpress::{defaults, policies, syncers};
use kube::{Resource, ResourceExt};
use std::sync::Arc;

/// Reconciler for Wordpress resources.
pub struct WordpressReconciler<S: Store> {
    ctx: Arc<ControllerContext<S>>,
}

impl<S: Store> Clone for WordpressReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<S: Store> WordpressReconciler<S> {
    /// Create a new Wordpress reconciler.
    pub fn new(ctx: Arc<ControllerContext<S>>) -> Self {
        Self { ctx }
    }

    /// Reconcile the site identified by `key`.
    ///
    /// One pass:
    /// 1. Fetches the site; a missing site is a no-op
    /// 2. Drops the stamps of policies that were deleted or no longer match
    /// 3. Merges matching policy templates and applies defaults in memory
    /// 4. Runs the secret, deployment, service, ingress and wp-cron syncers,
    ///    then the code and media claim syncers when requested
    /// 5. Records the outcome as the `Ready` condition
    ///
    /// The first syncer error is returned for retry.
    pub async fn reconcile(&self, key: &ObjectKey) -> OperatorResult<ReconcileAction> {
        with_deadline(self.ctx.config.reconcile_timeout, self.pass(key)).await
    }

    async fn pass(&self, key: &ObjectKey) -> OperatorResult<ReconcileAction> {
        let store = self.ctx.store.as_ref();

        let Some(wp) = store.get::<Wordpress>(key).await? else {
            tracing::debug!(key = %key, "Wordpress not found, nothing to converge");
            return Ok(ReconcileAction::Done);
        };

        tracing::info!(
            key = %key,
            resource_version = ?wp.resource_version(),
            "Reconciling Wordpress"
        );

        let all: Vec<WordpressPolicy> = store.list(None, &Selector::default()).await?;
        let matched = policies::matching(&wp, &all);
        let wp = self.prune_stamps(wp, &matched).await?;

        let effective = effective(&wp, &matched);
        let syncers = syncers::<S>(&effective)?;
        let owner = wp.object_ref(&());

        let result = sync_all(store, self.ctx.recorder.as_ref(), &owner, &syncers).await;
        self.update_status(key, &wp, &result).await?;

        let results = result?;
        tracing::info!(
            key = %key,
            changed = results.iter().filter(|r| r.operation.mutated()).count(),
            total = results.len(),
            "Wordpress converged"
        );

        Ok(ReconcileAction::converged(self.ctx.config.resync_interval))
    }

    /// Remove policy stamps whose policy is gone or no longer selects `wp`.
    ///
    /// Returns the site as stored afterwards.
    async fn prune_stamps(
        &self,
        mut wp: Wordpress,
        matched: &[&WordpressPolicy],
    ) -> OperatorResult<Wordpress> {
        let current: Vec<String> = matched
            .iter()
            .map(|p| policy_annotation_key(&p.name_any()))
            .collect();
        let stale: Vec<String> = wp
            .annotations()
            .keys()
            .filter(|k| k.starts_with(POLICY_ANNOTATION_PREFIX) && !current.contains(k))
            .cloned()
            .collect();

        if stale.is_empty() {
            return Ok(wp);
        }

        for key in &stale {
            wp.annotations_mut().remove(key);
        }
        tracing::info!(site = %wp.name_any(), stamps = ?stale, "Removing stale policy stamps");
        self.ctx.store.update(&wp).await
    }

    /// Patch the `Ready` condition and observed generation when they changed.
    async fn update_status(
        &self,
        key: &ObjectKey,
        wp: &Wordpress,
        result: &OperatorResult<Vec<SyncResult>>,
    ) -> OperatorResult<()> {
        let mut status = wp.status.clone().unwrap_or_default();

        let condition = match result {
            Ok(results) => Condition::ready(
                "SyncSuccessful",
                format!("{} children in sync", results.len()),
            ),
            Err(e) => Condition::not_ready("SyncFailed", e.to_string()),
        };

        let mut changed = set_condition(&mut status.conditions, condition);
        if status.observed_generation != wp.meta().generation {
            status.observed_generation = wp.meta().generation;
            changed = true;
        }

        if !changed {
            return Ok(());
        }

        let patch = serde_json::to_value(&status)?;
        match self.ctx.store.patch_status::<Wordpress>(key, patch).await {
            Ok(_) => Ok(()),
            // The site was deleted mid-pass.
            Err(OperatorError::NotFound { .. }) => Ok(()),
            // A failing pass reports its own error, not the status write's.
            Err(e) if result.is_err() => {
                tracing::warn!(key = %key, error = %e, "Failed to update Wordpress status");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// The site after policy merge and defaulting. Never persisted.
fn effective(wp: &Wordpress, matched: &[&WordpressPolicy]) -> Wordpress {
    let mut effective = wp.clone();
    if !matched.is_empty() {
        let applied = policies::apply(&mut effective, matched);
        tracing::debug!(site = %wp.name_any(), policies = ?applied, "Applied policies");
    }

    defaults::apply(&mut effective);
    effective
}

/// Error policy for the Wordpress controller.
pub fn error_policy<S: Store>(
    wp: Arc<Wordpress>,
    error: &OperatorError,
    ctx: Arc<ControllerContext<S>>,
) -> kube::runtime::controller::Action {
    let delay = ctx.config.requeue_for(error);
    tracing::error!(
        site = %wp.name_any(),
        error = %error,
        requeue_secs = delay.as_secs(),
        "Wordpress reconciliation error"
    );
    kube::runtime::controller::Action::requeue(delay)
}
