//! Child syncers of a site.
//!
//! Each constructor takes the effective (merged and defaulted) site and the
//! owner reference, and returns an [`ObjectSyncer`](crate::syncer::ObjectSyncer)
//! whose mutation only touches the fields the operator manages. Fields
//! defaulted by the API server are left alone so that a converged child
//! compares equal on the next pass.

mod cron;
mod deployment;
mod ingress;
mod pvc;
mod secret;
mod service;

pub use cron::cron_syncer;
pub use deployment::{SECRET_CHECKSUM_ANNOTATION, deployment_syncer};
pub use ingress::ingress_syncer;
pub use pvc::{code_pvc_syncer, media_pvc_syncer};
pub use secret::{SALT_KEYS, secret_syncer};
pub use service::service_syncer;

/// Name of the HTTP port on the web container and the Service.
pub(crate) const HTTP_PORT_NAME: &str = "http";

/// Port the runtime image listens on.
pub(crate) const HTTP_CONTAINER_PORT: i32 = 8080;
