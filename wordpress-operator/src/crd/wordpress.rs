//! Wordpress Custom Resource Definition.
//!
//! Defines the desired state of one WordPress site.

use super::condition::Condition;
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, EnvVar, PersistentVolumeClaimSpec, ResourceRequirements,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wordpress is the Schema for the wordpresses API.
///
/// The operator derives a salts Secret, a Deployment, a Service, an Ingress,
/// a wp-cron CronJob and, on request, PersistentVolumeClaims for the code and
/// media volumes from each Wordpress object.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "wordpress.presslabs.org",
    version = "v1alpha1",
    kind = "Wordpress",
    plural = "wordpresses",
    shortname = "wp",
    namespaced,
    status = "WordpressStatus",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WordpressSpec {
    /// Public host names served by this site.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,

    /// Secret holding the TLS certificate for `domains`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_secret_ref: Option<String>,

    /// Code volume configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeVolumeSpec>,

    /// Media volume configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaVolumeSpec>,

    /// Runtime settings, also enforceable through policies.
    #[serde(flatten)]
    pub runtime: WordpressRuntimeSpec,
}

/// Runtime settings of a site.
///
/// Every field is optional so that a policy template only overrides what it
/// sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WordpressRuntimeSpec {
    /// Number of web pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Runtime image repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Runtime image tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Image pull policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Service account for web and cron pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Extra environment for the WordPress container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Compute resources of the WordPress container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Node selector for pod placement.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Extra annotations for the Ingress.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ingress_annotations: BTreeMap<String, String>,

    /// Schedule of the wp-cron CronJob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<String>,
}

/// Code volume configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeVolumeSpec {
    /// Mount the code read-only.
    #[serde(default)]
    pub read_only: bool,

    /// Where the code is mounted in the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,

    /// Sub path of the volume holding `wp-content`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_sub_path: Option<String>,

    /// Back the code volume with a PersistentVolumeClaim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSpec>,

    /// Back the code volume with an emptyDir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
}

/// Media volume configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaVolumeSpec {
    /// Where uploads are mounted in the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,

    /// Back the media volume with a PersistentVolumeClaim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSpec>,

    /// Back the media volume with an emptyDir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
}

/// Wordpress status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WordpressStatus {
    /// Generation last handled by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions representing the current state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl WordpressSpec {
    /// Whether the code volume is backed by a PersistentVolumeClaim.
    pub fn wants_code_pvc(&self) -> bool {
        self.code
            .as_ref()
            .is_some_and(|code| code.persistent_volume_claim.is_some())
    }

    /// Whether the media volume is backed by a PersistentVolumeClaim.
    pub fn wants_media_pvc(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|media| media.persistent_volume_claim.is_some())
    }
}
