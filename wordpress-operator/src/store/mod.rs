//! Typed object store consumed by the reconcilers.
//!
//! The reconcilers never talk to the Kubernetes API directly. They read and
//! write through a [`Store`]:
//!
//! - [`KubeStore`]: backed by `kube::Api`, used by the operator binary
//! - [`MemoryStore`]: in-process store with the same optimistic-concurrency
//!   semantics, used in tests and for local experiments
//!
//! # Implementation Notes
//!
//! - `update` must fail with [`OperatorError::Conflict`] when the object's
//!   resource version is stale; it never merges
//! - `get` returns `Ok(None)` for missing objects
//! - all methods return `Send` futures so passes can run on a worker pool

mod kubernetes;
mod memory;

pub use kubernetes::KubeStore;
pub use memory::MemoryStore;

use crate::crd::{Wordpress, WordpressPolicy};
use crate::error::{OperatorError, OperatorResult};
use crate::selector::Selector;
use kube::{Api, Client, Resource, ResourceExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Type alias for async store futures.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = OperatorResult<T>> + Send + 'a>>;

/// Namespaced identifier of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object.
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Objects that can live in a [`Store`].
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kubernetes API handle for this kind, scoped to `namespace` when the
    /// kind is namespaced.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Kind name, e.g. `Deployment`.
    fn kind_name() -> String {
        Self::kind(&()).to_string()
    }
}

macro_rules! namespaced_objects {
    ($($kind:ty),* $(,)?) => {
        $(
            impl StoreObject for $kind {
                fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
                    match namespace {
                        Some(ns) => Api::namespaced(client, ns),
                        None => Api::all(client),
                    }
                }
            }
        )*
    };
}

namespaced_objects!(
    Wordpress,
    Secret,
    Deployment,
    Service,
    Ingress,
    CronJob,
    PersistentVolumeClaim,
);

impl StoreObject for WordpressPolicy {
    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// Get/list/create/update capability against a typed object store.
pub trait Store: Send + Sync + 'static {
    /// Fetch an object; `Ok(None)` when it does not exist.
    fn get<'a, K: StoreObject>(&'a self, key: &'a ObjectKey) -> StoreFuture<'a, Option<K>>;

    /// List objects matching `selector`, in `namespace` or across all
    /// namespaces.
    fn list<'a, K: StoreObject>(
        &'a self,
        namespace: Option<&'a str>,
        selector: &'a Selector,
    ) -> StoreFuture<'a, Vec<K>>;

    /// Create an object.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if an object with the same key exists
    fn create<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K>;

    /// Replace an object, checking its resource version.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the object changed since it was read
    /// - `NotFound` if the object is gone
    fn update<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K>;

    /// Merge-patch the status subresource.
    fn patch_status<'a, K: StoreObject>(
        &'a self,
        key: &'a ObjectKey,
        status: serde_json::Value,
    ) -> StoreFuture<'a, K>;
}

pub(crate) fn not_found<K: StoreObject>(key: &ObjectKey) -> OperatorError {
    OperatorError::NotFound {
        kind: K::kind_name(),
        name: key.name.clone(),
        namespace: key.namespace.clone().unwrap_or_default(),
    }
}
