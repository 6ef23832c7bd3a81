//! Site model: naming, labels, defaulting, policy merge and child syncers.
//!
//! Everything here is a pure function of the (effective) [`Wordpress`]
//! object; nothing talks to the store except the syncers returned by
//! [`syncers`].

pub mod defaults;
pub mod policies;
mod resources;

pub use resources::{
    SALT_KEYS, SECRET_CHECKSUM_ANNOTATION, code_pvc_syncer, cron_syncer, deployment_syncer,
    ingress_syncer, media_pvc_syncer, secret_syncer, service_syncer,
};

use crate::crd::Wordpress;
use crate::error::{OperatorError, OperatorResult};
use crate::store::Store;
use crate::syncer::Syncer;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Value of `app.kubernetes.io/name` on every child.
pub const APP_NAME: &str = "wordpress";

/// Value of `app.kubernetes.io/managed-by` on every child.
pub const MANAGED_BY: &str = "wordpress-operator";

/// Name of the salts Secret.
pub fn secret_name(wp: &Wordpress) -> String {
    format!("{}-wp", wp.name_any())
}

/// Name of the Deployment, Service and Ingress.
pub fn web_name(wp: &Wordpress) -> String {
    wp.name_any()
}

/// Name of the wp-cron CronJob.
pub fn cron_name(wp: &Wordpress) -> String {
    format!("{}-wp-cron", wp.name_any())
}

/// Name of the code PersistentVolumeClaim.
pub fn code_pvc_name(wp: &Wordpress) -> String {
    format!("{}-code", wp.name_any())
}

/// Name of the media PersistentVolumeClaim.
pub fn media_pvc_name(wp: &Wordpress) -> String {
    format!("{}-media", wp.name_any())
}

/// Labels selecting the site's web pods.
pub fn selector_labels(wp: &Wordpress) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/instance".to_string(), wp.name_any()),
    ])
}

/// Labels of a child object.
pub fn labels(wp: &Wordpress, component: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(wp);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels
}

/// Initial metadata of a child named `name`, in the site's namespace.
pub(crate) fn child_meta(wp: &Wordpress, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: wp.namespace(),
        ..Default::default()
    }
}

/// Merge `labels` into `meta`, keeping labels set by others.
pub(crate) fn merge_labels(meta: &mut ObjectMeta, labels: BTreeMap<String, String>) {
    meta.labels.get_or_insert_with(BTreeMap::new).extend(labels);
}

/// Controller owner reference pointing at the site.
pub fn owner_reference(wp: &Wordpress) -> OperatorResult<OwnerReference> {
    wp.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidConfig(format!(
            "Wordpress {} has no uid, cannot own children",
            wp.name_any()
        ))
    })
}

/// Ordered syncers for a site.
///
/// The secret comes first because the deployment reads its resolved object.
/// PVC syncers are appended only when the site requests a claim-backed code
/// or media volume.
pub fn syncers<S: Store>(wp: &Wordpress) -> OperatorResult<Vec<Box<dyn Syncer<S>>>> {
    let owner = owner_reference(wp)?;

    let secret = secret_syncer(wp, owner.clone());
    let deployment = deployment_syncer(wp, owner.clone(), secret.object());

    let mut syncers: Vec<Box<dyn Syncer<S>>> = vec![
        Box::new(secret),
        Box::new(deployment),
        Box::new(service_syncer(wp, owner.clone())),
        Box::new(ingress_syncer(wp, owner.clone())),
        Box::new(cron_syncer(wp, owner.clone())),
    ];

    if wp.spec.wants_code_pvc() {
        syncers.push(Box::new(code_pvc_syncer(wp, owner.clone())));
    }

    if wp.spec.wants_media_pvc() {
        syncers.push(Box::new(media_pvc_syncer(wp, owner)));
    }

    Ok(syncers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CodeVolumeSpec, MediaVolumeSpec, WordpressSpec};
    use crate::store::MemoryStore;

    fn site(spec: WordpressSpec) -> Wordpress {
        let mut wp = Wordpress::new("blog", spec);
        wp.metadata.namespace = Some("sites".to_string());
        wp.metadata.uid = Some("3f1c".to_string());
        wp
    }

    fn names(syncers: &[Box<dyn Syncer<MemoryStore>>]) -> Vec<String> {
        syncers.iter().map(|s| s.object_key().to_string()).collect()
    }

    #[test]
    fn child_names() {
        let wp = site(WordpressSpec::default());
        assert_eq!(secret_name(&wp), "blog-wp");
        assert_eq!(web_name(&wp), "blog");
        assert_eq!(cron_name(&wp), "blog-wp-cron");
        assert_eq!(code_pvc_name(&wp), "blog-code");
        assert_eq!(media_pvc_name(&wp), "blog-media");
    }

    #[test]
    fn child_labels() {
        let wp = site(WordpressSpec::default());
        let labels = labels(&wp, "web");
        assert_eq!(labels["app.kubernetes.io/name"], "wordpress");
        assert_eq!(labels["app.kubernetes.io/instance"], "blog");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "wordpress-operator");
        assert_eq!(labels["app.kubernetes.io/component"], "web");
    }

    #[test]
    fn core_syncers_in_order() {
        let wp = site(WordpressSpec::default());
        let syncers = syncers::<MemoryStore>(&wp).unwrap();
        assert_eq!(
            names(&syncers),
            vec![
                "sites/blog-wp",
                "sites/blog",
                "sites/blog",
                "sites/blog",
                "sites/blog-wp-cron"
            ]
        );
        let kinds: Vec<String> = syncers.iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec!["Secret", "Deployment", "Service", "Ingress", "CronJob"]
        );
    }

    #[test]
    fn pvc_syncers_are_conditional() {
        let wp = site(WordpressSpec {
            code: Some(CodeVolumeSpec {
                empty_dir: Some(Default::default()),
                ..Default::default()
            }),
            media: Some(MediaVolumeSpec {
                persistent_volume_claim: Some(Default::default()),
                ..Default::default()
            }),
            ..Default::default()
        });

        let syncers = syncers::<MemoryStore>(&wp).unwrap();
        assert_eq!(syncers.len(), 6);
        assert_eq!(syncers[5].object_key().to_string(), "sites/blog-media");
    }

    #[test]
    fn site_without_uid_cannot_own() {
        let mut wp = site(WordpressSpec::default());
        wp.metadata.uid = None;
        assert!(syncers::<MemoryStore>(&wp).is_err());
    }
}
