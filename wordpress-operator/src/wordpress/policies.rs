//! Policy template merge.
//!
//! Policies apply in reverse priority order: the highest numeric priority is
//! merged first and the lowest last, so the lowest number wins. Among equal
//! priorities the policy whose name sorts first wins.

use crate::crd::{Wordpress, WordpressPolicy, WordpressRuntimeSpec};
use crate::selector::{self, SelectorExt};
use kube::ResourceExt;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Policies whose selector matches `wp`.
///
/// Policies with an invalid selector are skipped; the policy controller
/// reports them.
pub fn matching<'a>(wp: &Wordpress, policies: &'a [WordpressPolicy]) -> Vec<&'a WordpressPolicy> {
    policies
        .iter()
        .filter(|policy| match selector::compile(policy.spec.selector.as_ref()) {
            Ok(selector) => selector.matches(wp.labels()),
            Err(e) => {
                tracing::warn!(
                    policy = %policy.name_any(),
                    error = %e,
                    "Skipping policy with invalid selector"
                );
                false
            }
        })
        .collect()
}

/// Order `policies` for merging: the winner comes last.
pub fn merge_order(policies: &mut [&WordpressPolicy]) {
    policies.sort_by_key(|p| (Reverse(p.spec.priority), Reverse(p.name_any())));
}

/// Merge the templates of `policies` into `wp`, in merge order.
///
/// Returns the names of the applied policies, in the order they were merged.
pub fn apply(wp: &mut Wordpress, policies: &[&WordpressPolicy]) -> Vec<String> {
    let mut ordered = policies.to_vec();
    merge_order(&mut ordered);

    ordered
        .into_iter()
        .map(|policy| {
            let template = &policy.spec.template;
            if let Some(meta) = &template.metadata {
                extend(&mut wp.metadata.labels, &meta.labels);
                extend(&mut wp.metadata.annotations, &meta.annotations);
            }
            merge_runtime(&mut wp.spec.runtime, &template.spec);
            policy.name_any()
        })
        .collect()
}

fn extend(target: &mut Option<BTreeMap<String, String>>, source: &BTreeMap<String, String>) {
    if !source.is_empty() {
        target
            .get_or_insert_with(BTreeMap::new)
            .extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Overlay `template` on `target`.
///
/// Scalars set in the template override, `env` merges by variable name and
/// maps merge key-wise.
pub fn merge_runtime(target: &mut WordpressRuntimeSpec, template: &WordpressRuntimeSpec) {
    fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            target.clone_from(value);
        }
    }

    overlay(&mut target.replicas, &template.replicas);
    overlay(&mut target.image, &template.image);
    overlay(&mut target.tag, &template.tag);
    overlay(&mut target.image_pull_policy, &template.image_pull_policy);
    overlay(&mut target.service_account_name, &template.service_account_name);
    overlay(&mut target.resources, &template.resources);
    overlay(&mut target.cron_schedule, &template.cron_schedule);

    for var in &template.env {
        match target.env.iter_mut().find(|e| e.name == var.name) {
            Some(existing) => *existing = var.clone(),
            None => target.env.push(var.clone()),
        }
    }

    target.node_selector.extend(
        template
            .node_selector
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    target.ingress_annotations.extend(
        template
            .ingress_annotations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
}
