use crate::crd::Wordpress;
use crate::syncer::ObjectSyncer;
use crate::wordpress::{child_meta, code_pvc_name, labels, media_pvc_name, merge_labels};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

fn pvc_syncer(
    wp: &Wordpress,
    owner: OwnerReference,
    syncer: &'static str,
    name: String,
    component: &str,
    template: Option<PersistentVolumeClaimSpec>,
) -> ObjectSyncer<PersistentVolumeClaim> {
    let obj = PersistentVolumeClaim {
        metadata: child_meta(wp, name),
        ..Default::default()
    };
    let labels = labels(wp, component);

    ObjectSyncer::new(syncer, owner, obj, move |pvc: &mut PersistentVolumeClaim| {
        merge_labels(&mut pvc.metadata, labels.clone());

        // The claim spec is mostly immutable; only set it on create.
        if pvc.metadata.resource_version.is_none() {
            pvc.spec.clone_from(&template);
        }

        Ok(())
    })
}

/// Syncer for the `{site}-code` claim.
pub fn code_pvc_syncer(
    wp: &Wordpress,
    owner: OwnerReference,
) -> ObjectSyncer<PersistentVolumeClaim> {
    let template = wp
        .spec
        .code
        .as_ref()
        .and_then(|code| code.persistent_volume_claim.clone());
    pvc_syncer(wp, owner, "code-pvc", code_pvc_name(wp), "code", template)
}

/// Syncer for the `{site}-media` claim.
pub fn media_pvc_syncer(
    wp: &Wordpress,
    owner: OwnerReference,
) -> ObjectSyncer<PersistentVolumeClaim> {
    let template = wp
        .spec
        .media
        .as_ref()
        .and_then(|media| media.persistent_volume_claim.clone());
    pvc_syncer(wp, owner, "media-pvc", media_pvc_name(wp), "media", template)
}
