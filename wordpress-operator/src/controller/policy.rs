//! WordpressPolicy controller.
//!
//! Resolves a policy's selector against the sites in scope and stamps every
//! match with the annotation `policy.wordpress.presslabs.org/{policy}` set to
//! the policy's applied version. Sites the selector no longer matches lose
//! the stamp. Either change re-triggers the Wordpress controller, which
//! merges the templates of the policies that currently match.

use super::{ControllerContext, ReconcileAction, with_deadline};
use crate::crd::{Condition, Wordpress, WordpressPolicy, policy_annotation_key, set_condition};
use crate::error::{OperatorError, OperatorResult};
use crate::events::Event;
use crate::selector::{self, Selector, SelectorExt};
use crate::store::{ObjectKey, Store};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of stamping the matched sites.
#[derive(Debug, Default)]
struct Propagation {
    matched: usize,
    stamped: usize,
    /// Sites carrying a stamp the selector no longer matches.
    stale: usize,
    unstamped: usize,
    failed: usize,
    first_error: Option<String>,
}

impl Propagation {
    /// Sites this pass had to touch or keep stamped.
    fn total(&self) -> usize {
        self.matched + self.stale
    }
}

/// Reconciler for WordpressPolicy resources.
pub struct PolicyReconciler<S: Store> {
    ctx: Arc<ControllerContext<S>>,
}

impl<S: Store> Clone for PolicyReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<S: Store> PolicyReconciler<S> {
    /// Create a new policy reconciler.
    pub fn new(ctx: Arc<ControllerContext<S>>) -> Self {
        Self { ctx }
    }

    /// Reconcile the policy named `name`.
    ///
    /// Every site needing a stamp change is attempted even when some updates
    /// fail; the failures are then reported together as
    /// [`OperatorError::PolicyPropagation`] so the whole pass is retried.
    pub async fn reconcile(&self, name: &str) -> OperatorResult<ReconcileAction> {
        with_deadline(self.ctx.config.reconcile_timeout, self.pass(name)).await
    }

    async fn pass(&self, name: &str) -> OperatorResult<ReconcileAction> {
        let key = ObjectKey::cluster(name);
        let Some(policy) = self.ctx.store.get::<WordpressPolicy>(&key).await? else {
            tracing::debug!(policy = %name, "WordpressPolicy not found, nothing to propagate");
            return Ok(ReconcileAction::Done);
        };

        let selector = match selector::compile(policy.spec.selector.as_ref()) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!(policy = %name, error = %e, "Invalid policy selector");
                self.ctx
                    .recorder
                    .record(
                        &policy.object_ref(&()),
                        Event::warning(e.reason(), e.to_string()),
                    )
                    .await;
                let condition = Condition::not_ready(e.reason(), e.to_string());
                self.update_status(&key, &policy, None, condition).await?;
                return Err(e);
            }
        };

        tracing::info!(
            policy = %name,
            selector = %selector,
            version = %policy.applied_version(),
            "Reconciling WordpressPolicy"
        );

        let propagation = self.propagate(&policy, &selector).await?;

        let condition = match &propagation.first_error {
            None => Condition::ready(
                "PolicyApplied",
                format!("applied to {} sites", propagation.matched),
            ),
            Some(cause) => Condition::not_ready(
                "PropagationFailed",
                format!(
                    "failed to update {}/{} sites: {}",
                    propagation.failed,
                    propagation.total(),
                    cause
                ),
            ),
        };
        self.update_status(&key, &policy, Some(propagation.matched), condition)
            .await?;

        if propagation.stamped > 0 || propagation.unstamped > 0 {
            self.ctx
                .recorder
                .record(
                    &policy.object_ref(&()),
                    Event::normal(
                        "PolicyApplied",
                        format!(
                            "stamped {} of {} sites, unstamped {}",
                            propagation.stamped, propagation.matched, propagation.unstamped
                        ),
                    ),
                )
                .await;
        }

        if let Some(cause) = propagation.first_error.clone() {
            let err = OperatorError::PolicyPropagation {
                policy: name.to_string(),
                failed: propagation.failed,
                total: propagation.total(),
                cause,
            };
            self.ctx
                .recorder
                .record(
                    &policy.object_ref(&()),
                    Event::warning(err.reason(), err.to_string()),
                )
                .await;
            return Err(err);
        }

        tracing::info!(
            policy = %name,
            matched = propagation.matched,
            stamped = propagation.stamped,
            unstamped = propagation.unstamped,
            "WordpressPolicy propagated"
        );

        Ok(ReconcileAction::converged(self.ctx.config.resync_interval))
    }

    /// Stamp every site in scope matching `selector` with the policy's
    /// version and unstamp the ones it no longer matches.
    async fn propagate(
        &self,
        policy: &WordpressPolicy,
        selector: &Selector,
    ) -> OperatorResult<Propagation> {
        let sites: Vec<Wordpress> = self
            .ctx
            .store
            .list(self.ctx.config.namespace.as_deref(), &Selector::default())
            .await?;

        let annotation = policy_annotation_key(&policy.name_any());
        let version = policy.applied_version();
        let mut outcome = Propagation::default();

        for mut site in sites {
            let matches = selector.matches(site.labels());
            let current = site.annotations().get(&annotation).cloned();

            let stamping = match (matches, current) {
                (true, Some(v)) if v == version => {
                    outcome.matched += 1;
                    continue;
                }
                (true, _) => {
                    outcome.matched += 1;
                    site.metadata
                        .annotations
                        .get_or_insert_with(BTreeMap::new)
                        .insert(annotation.clone(), version.clone());
                    true
                }
                (false, Some(_)) => {
                    outcome.stale += 1;
                    site.annotations_mut().remove(&annotation);
                    false
                }
                (false, None) => continue,
            };

            match self.ctx.store.update(&site).await {
                Ok(_) if stamping => {
                    tracing::debug!(site = %ObjectKey::of(&site), version = %version, "Stamped policy version");
                    outcome.stamped += 1;
                }
                Ok(_) => {
                    tracing::debug!(site = %ObjectKey::of(&site), policy = %policy.name_any(), "Removed policy stamp");
                    outcome.unstamped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        site = %ObjectKey::of(&site),
                        policy = %policy.name_any(),
                        stamping,
                        error = %e,
                        "Failed to update policy stamp"
                    );
                    outcome.failed += 1;
                    outcome.first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        Ok(outcome)
    }

    /// Patch the policy status when it changed.
    async fn update_status(
        &self,
        key: &ObjectKey,
        policy: &WordpressPolicy,
        matched: Option<usize>,
        condition: Condition,
    ) -> OperatorResult<()> {
        let mut status = policy.status.clone().unwrap_or_default();

        let mut changed = set_condition(&mut status.conditions, condition);
        if let Some(matched) = matched {
            let matched = i32::try_from(matched).unwrap_or(i32::MAX);
            if status.matched_sites != matched {
                status.matched_sites = matched;
                changed = true;
            }
        }
        if status.observed_generation != policy.meta().generation {
            status.observed_generation = policy.meta().generation;
            changed = true;
        }

        if !changed {
            return Ok(());
        }

        let patch = serde_json::to_value(&status)?;
        match self
            .ctx
            .store
            .patch_status::<WordpressPolicy>(key, patch)
            .await
        {
            Ok(_) | Err(OperatorError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Error policy for the WordpressPolicy controller.
pub fn error_policy<S: Store>(
    policy: Arc<WordpressPolicy>,
    error: &OperatorError,
    ctx: Arc<ControllerContext<S>>,
) -> kube::runtime::controller::Action {
    let delay = ctx.config.requeue_for(error);
    tracing::error!(
        policy = %policy.name_any(),
        error = %error,
        requeue_secs = delay.as_secs(),
        "WordpressPolicy reconciliation error"
    );
    kube::runtime::controller::Action::requeue(delay)
}
