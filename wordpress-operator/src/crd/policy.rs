//! WordpressPolicy Custom Resource Definition.
//!
//! A policy selects Wordpress sites by label and enforces a runtime template
//! on them.

use super::condition::Condition;
use super::wordpress::WordpressRuntimeSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation prefix stamped on sites by the policy controller.
///
/// The full key is `{prefix}{policy-name}` and the value is the policy's
/// [applied version](WordpressPolicy::applied_version).
pub const POLICY_ANNOTATION_PREFIX: &str = "policy.wordpress.presslabs.org/";

/// Annotation key recording the version of `policy` applied to a site.
pub fn policy_annotation_key(policy: &str) -> String {
    format!("{}{}", POLICY_ANNOTATION_PREFIX, policy)
}

/// WordpressPolicy is the Schema for the wordpresspolicies API.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "wordpress.presslabs.org",
    version = "v1alpha1",
    kind = "WordpressPolicy",
    plural = "wordpresspolicies",
    shortname = "wppol",
    status = "WordpressPolicyStatus",
    printcolumn = r#"{"name":"Priority", "type":"integer", "jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Matched", "type":"integer", "jsonPath":".status.matchedSites"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WordpressPolicySpec {
    /// Label selector for the sites this policy applies to.
    /// If not specified, the policy applies to every site.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Order in which policies apply. Policies apply in reverse priority
    /// order, so the lowest priority is applied last and wins.
    #[serde(default)]
    pub priority: i32,

    /// Template to enforce.
    #[serde(default)]
    pub template: WordpressTemplateSpec,
}

/// Template enforced by a policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WordpressTemplateSpec {
    /// Labels and annotations merged into the site's metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TemplateMetadata>,

    /// Runtime settings merged into the site's spec.
    #[serde(default)]
    pub spec: WordpressRuntimeSpec,
}

impl WordpressPolicy {
    /// Version stamped on the sites this policy applies to.
    ///
    /// This is the spec generation, so status writes do not restamp. Objects
    /// without a generation fall back to their resource version.
    pub fn applied_version(&self) -> String {
        match (self.metadata.generation, &self.metadata.resource_version) {
            (Some(generation), _) => generation.to_string(),
            (None, Some(rv)) => rv.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Metadata part of a policy template.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    /// Labels to set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations to set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// WordpressPolicy status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WordpressPolicyStatus {
    /// Generation last handled by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Number of sites matched on the last pass.
    #[serde(default)]
    pub matched_sites: i32,

    /// Conditions representing the current state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
