//! Defaulting.
//!
//! Two explicit passes run at the top of every reconcile, both pure and
//! idempotent:
//!
//! 1. [`apply_schema_defaults`]: the defaults declared on the CRD schema
//! 2. [`set_spec_defaults`]: operator-level defaults derived from the spec
//!
//! The result is never written back to the site.

use crate::crd::{Wordpress, WordpressSpec};

/// Runtime image used when neither the site nor a policy sets one.
pub const DEFAULT_IMAGE: &str = "docker.io/bitpoke/wordpress-runtime";

/// Runtime image tag used when neither the site nor a policy sets one.
pub const DEFAULT_TAG: &str = "5.8.2";

/// Default pull policy.
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Where the code volume is mounted by default.
pub const DEFAULT_CODE_MOUNT_PATH: &str = "/app/web/wp-content";

/// Sub path of the code volume holding `wp-content` by default.
pub const DEFAULT_CONTENT_SUB_PATH: &str = "wp-content/";

/// Where the media volume is mounted by default.
pub const DEFAULT_MEDIA_MOUNT_PATH: &str = "/app/web/wp-content/uploads";

/// wp-cron runs every minute by default.
pub const DEFAULT_CRON_SCHEDULE: &str = "* * * * *";

/// Defaults declared on the CRD schema.
pub fn apply_schema_defaults(spec: &mut WordpressSpec) {
    spec.runtime.replicas.get_or_insert(1);
    spec.runtime
        .image_pull_policy
        .get_or_insert_with(|| DEFAULT_IMAGE_PULL_POLICY.to_string());
}

/// Operator-level defaults.
pub fn set_spec_defaults(spec: &mut WordpressSpec) {
    let runtime = &mut spec.runtime;
    runtime.image.get_or_insert_with(|| DEFAULT_IMAGE.to_string());
    runtime.tag.get_or_insert_with(|| DEFAULT_TAG.to_string());
    runtime
        .cron_schedule
        .get_or_insert_with(|| DEFAULT_CRON_SCHEDULE.to_string());

    if let Some(code) = spec.code.as_mut() {
        code.mount_path
            .get_or_insert_with(|| DEFAULT_CODE_MOUNT_PATH.to_string());
        code.content_sub_path
            .get_or_insert_with(|| DEFAULT_CONTENT_SUB_PATH.to_string());
    }

    if let Some(media) = spec.media.as_mut() {
        media
            .mount_path
            .get_or_insert_with(|| DEFAULT_MEDIA_MOUNT_PATH.to_string());
    }
}

/// Both passes, in order.
pub fn apply(wp: &mut Wordpress) {
    apply_schema_defaults(&mut wp.spec);
    set_spec_defaults(&mut wp.spec);
}
