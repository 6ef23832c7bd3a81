//! WordPress Kubernetes Operator
//!
//! This crate provides a Kubernetes operator that converges WordPress sites
//! and propagates label-selected policies onto them.
//!
//! # Custom Resource Definitions
//!
//! - **Wordpress**: A site; the operator derives a salts Secret, a Deployment,
//!   a Service, an Ingress, a wp-cron CronJob and optional code/media
//!   PersistentVolumeClaims from it
//! - **WordpressPolicy**: A runtime template enforced on every site matching
//!   its label selector
//!
//! # Example
//!
//! ```yaml
//! apiVersion: wordpress.presslabs.org/v1alpha1
//! kind: Wordpress
//! metadata:
//!   name: blog
//!   labels:
//!     env: prod
//! spec:
//!   domains:
//!     - blog.example.com
//!   replicas: 2
//!   media:
//!     persistentVolumeClaim:
//!       accessModes: [ReadWriteOnce]
//!       resources:
//!         requests:
//!           storage: 10Gi
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod observability;
pub mod selector;
pub mod store;
pub mod syncer;
pub mod wordpress;

pub use config::OperatorConfig;
pub use crd::{Wordpress, WordpressPolicy, WordpressPolicySpec, WordpressSpec};
pub use error::{OperatorError, OperatorResult};
