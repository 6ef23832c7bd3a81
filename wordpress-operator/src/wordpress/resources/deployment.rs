use super::{HTTP_CONTAINER_PORT, HTTP_PORT_NAME, SALT_KEYS};
use crate::crd::{POLICY_ANNOTATION_PREFIX, Wordpress};
use crate::error::OperatorError;
use crate::syncer::{ObjectHandle, ObjectSyncer};
use crate::wordpress::{
    child_meta, code_pvc_name, labels, media_pvc_name, merge_labels, secret_name,
    selector_labels, web_name,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, PersistentVolumeClaimVolumeSource, PodSpec, Secret,
    SecretEnvSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Pod template annotation carrying a checksum of the salts secret, so that
/// pods roll when the secret changes.
pub const SECRET_CHECKSUM_ANNOTATION: &str = "wordpress.presslabs.org/secret-checksum";

/// Annotations kubectl owns on a pod template (e.g. `restartedAt`).
const KUBECTL_ANNOTATION_PREFIX: &str = "kubectl.kubernetes.io/";

const CONTAINER_NAME: &str = "wordpress";
const CODE_VOLUME: &str = "code";
const MEDIA_VOLUME: &str = "media";

/// Checksum of the salts, failing when one is missing.
fn salts_checksum(secret: &Secret) -> Result<String, String> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    let data = secret.data.as_ref();

    let mut hasher = Sha256::new();
    for key in SALT_KEYS {
        let value = data
            .and_then(|d| d.get(key))
            .ok_or_else(|| format!("secret {} has no key {}", name, key))?;
        hasher.update(key.as_bytes());
        hasher.update(&value.0);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn volumes(wp: &Wordpress) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    if let Some(code) = &wp.spec.code {
        let source = if code.persistent_volume_claim.is_some() {
            Some(Volume {
                name: CODE_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: code_pvc_name(wp),
                    read_only: None,
                }),
                ..Default::default()
            })
        } else {
            code.empty_dir.as_ref().map(|empty_dir| Volume {
                name: CODE_VOLUME.to_string(),
                empty_dir: Some(empty_dir.clone()),
                ..Default::default()
            })
        };

        if let (Some(volume), Some(mount_path)) = (source, &code.mount_path) {
            volumes.push(volume);
            mounts.push(VolumeMount {
                name: CODE_VOLUME.to_string(),
                mount_path: mount_path.clone(),
                sub_path: code.content_sub_path.clone(),
                read_only: Some(code.read_only),
                ..Default::default()
            });
        }
    }

    if let Some(media) = &wp.spec.media {
        let source = if media.persistent_volume_claim.is_some() {
            Some(Volume {
                name: MEDIA_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: media_pvc_name(wp),
                    read_only: None,
                }),
                ..Default::default()
            })
        } else {
            media.empty_dir.as_ref().map(|empty_dir| Volume {
                name: MEDIA_VOLUME.to_string(),
                empty_dir: Some(empty_dir.clone()),
                ..Default::default()
            })
        };

        if let (Some(volume), Some(mount_path)) = (source, &media.mount_path) {
            volumes.push(volume);
            mounts.push(VolumeMount {
                name: MEDIA_VOLUME.to_string(),
                mount_path: mount_path.clone(),
                ..Default::default()
            });
        }
    }

    (volumes, mounts)
}

/// Carry the site's labels and annotations onto the pod template.
///
/// Site labels (policy template labels included) are overridden by the web
/// labels. Policy stamps and kubectl annotations of the site are left out;
/// kubectl annotations already on the template are kept.
fn pod_template_meta(meta: &mut ObjectMeta, wp: &Wordpress, checksum: String) {
    let mut pod_labels = wp.metadata.labels.clone().unwrap_or_default();
    pod_labels.extend(labels(wp, "web"));
    meta.labels = Some(pod_labels);

    let mut annotations: BTreeMap<String, String> = meta
        .annotations
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter(|(k, _)| k.starts_with(KUBECTL_ANNOTATION_PREFIX))
        .collect();
    annotations.extend(
        wp.metadata
            .annotations
            .iter()
            .flatten()
            .filter(|(k, _)| {
                !k.starts_with(POLICY_ANNOTATION_PREFIX) && !k.starts_with(KUBECTL_ANNOTATION_PREFIX)
            })
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    annotations.insert(SECRET_CHECKSUM_ANNOTATION.to_string(), checksum);
    meta.annotations = Some(annotations);
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

/// Configure the WordPress container in place.
fn configure_container(container: &mut Container, wp: &Wordpress, mounts: Vec<VolumeMount>) {
    let runtime = &wp.spec.runtime;

    container.image = Some(format!(
        "{}:{}",
        runtime.image.as_deref().unwrap_or_default(),
        runtime.tag.as_deref().unwrap_or_default()
    ));
    container.image_pull_policy.clone_from(&runtime.image_pull_policy);
    container.env = non_empty(runtime.env.clone());
    container.env_from = Some(vec![EnvFromSource {
        secret_ref: Some(SecretEnvSource {
            name: secret_name(wp),
            optional: None,
        }),
        ..Default::default()
    }]);
    container.ports = Some(vec![ContainerPort {
        name: Some(HTTP_PORT_NAME.to_string()),
        container_port: HTTP_CONTAINER_PORT,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]);
    container.resources.clone_from(&runtime.resources);
    container.volume_mounts = non_empty(mounts);
}

/// Syncer for the `{site}` deployment.
///
/// Reads the salts secret resolved earlier in the pass through `secret`; a
/// missing salt aborts the pass.
pub fn deployment_syncer(
    wp: &Wordpress,
    owner: OwnerReference,
    secret: ObjectHandle<Secret>,
) -> ObjectSyncer<Deployment> {
    let obj = Deployment {
        metadata: child_meta(wp, web_name(wp)),
        ..Default::default()
    };
    let wp = wp.clone();

    ObjectSyncer::new("deployment", owner, obj, move |deploy: &mut Deployment| {
        let checksum = secret
            .with(salts_checksum)
            .map_err(|cause| OperatorError::sync("deployment", cause))?;

        merge_labels(&mut deploy.metadata, labels(&wp, "web"));

        let spec = deploy.spec.get_or_insert_with(DeploymentSpec::default);
        spec.replicas = wp.spec.runtime.replicas;
        // The selector is immutable once created.
        if spec.selector.match_labels.is_none() && spec.selector.match_expressions.is_none() {
            spec.selector = LabelSelector {
                match_labels: Some(selector_labels(&wp)),
                match_expressions: None,
            };
        }

        let template = &mut spec.template;
        let meta = template.metadata.get_or_insert_with(ObjectMeta::default);
        pod_template_meta(meta, &wp, checksum);

        let (volumes, mounts) = volumes(&wp);
        let pod = template.spec.get_or_insert_with(PodSpec::default);
        pod.service_account_name
            .clone_from(&wp.spec.runtime.service_account_name);
        pod.node_selector = if wp.spec.runtime.node_selector.is_empty() {
            None
        } else {
            Some(wp.spec.runtime.node_selector.clone())
        };
        pod.volumes = non_empty(volumes);

        let container = match pod.containers.iter().position(|c| c.name == CONTAINER_NAME) {
            Some(index) => &mut pod.containers[index],
            None => {
                pod.containers.push(Container {
                    name: CONTAINER_NAME.to_string(),
                    ..Default::default()
                });
                let last = pod.containers.len() - 1;
                &mut pod.containers[last]
            }
        };
        configure_container(container, &wp, mounts);

        Ok(())
    })
}
