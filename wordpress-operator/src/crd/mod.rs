//! Custom Resource Definitions for the WordPress operator.
//!
//! This module defines the CRDs that the operator manages:
//!
//! - [`Wordpress`]: A WordPress site
//! - [`WordpressPolicy`]: A label-selected template enforced on sites

mod condition;
mod policy;
mod wordpress;

pub use condition::{CONDITION_READY, Condition, set_condition};
pub use policy::{
    POLICY_ANNOTATION_PREFIX, TemplateMetadata, WordpressPolicy, WordpressPolicySpec,
    WordpressPolicyStatus, WordpressTemplateSpec, policy_annotation_key,
};
pub use wordpress::{
    CodeVolumeSpec, MediaVolumeSpec, Wordpress, WordpressRuntimeSpec, WordpressSpec,
    WordpressStatus,
};
