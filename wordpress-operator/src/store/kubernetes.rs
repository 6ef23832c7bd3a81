//! Store backed by the Kubernetes API.

use super::{ObjectKey, Store, StoreFuture, StoreObject, not_found};
use crate::error::OperatorError;
use crate::selector::Selector;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

/// [`Store`] implementation on top of `kube::Api`.
///
/// Updates are full replaces carrying the object's `resourceVersion`, so the
/// API server rejects writes based on stale reads with HTTP 409.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Create a store using `client`, writing as `field_manager`.
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

/// Map API errors onto the operator taxonomy.
fn map_write_error<K: StoreObject>(err: kube::Error, key: &ObjectKey) -> OperatorError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => not_found::<K>(key),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            OperatorError::AlreadyExists {
                kind: K::kind_name(),
                name: key.name.clone(),
            }
        }
        kube::Error::Api(resp) if resp.code == 409 => OperatorError::Conflict {
            kind: K::kind_name(),
            name: key.name.clone(),
        },
        other => OperatorError::KubeError(other),
    }
}

impl Store for KubeStore {
    fn get<'a, K: StoreObject>(&'a self, key: &'a ObjectKey) -> StoreFuture<'a, Option<K>> {
        Box::pin(async move {
            let api = K::api(self.client.clone(), key.namespace.as_deref());
            Ok(api.get_opt(&key.name).await?)
        })
    }

    fn list<'a, K: StoreObject>(
        &'a self,
        namespace: Option<&'a str>,
        selector: &'a Selector,
    ) -> StoreFuture<'a, Vec<K>> {
        Box::pin(async move {
            let api = K::api(self.client.clone(), namespace);
            let mut params = ListParams::default();
            if !selector.selects_all() {
                params = params.labels_from(selector);
            }
            Ok(api.list(&params).await?.items)
        })
    }

    fn create<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K> {
        Box::pin(async move {
            let key = ObjectKey::of(obj);
            let api = K::api(self.client.clone(), key.namespace.as_deref());
            tracing::debug!(kind = %K::kind_name(), key = %key, "Creating object");
            api.create(&self.post_params(), obj)
                .await
                .map_err(|e| map_write_error::<K>(e, &key))
        })
    }

    fn update<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K> {
        Box::pin(async move {
            let key = ObjectKey::of(obj);
            let api = K::api(self.client.clone(), key.namespace.as_deref());
            tracing::debug!(
                kind = %K::kind_name(),
                key = %key,
                resource_version = ?obj.resource_version(),
                "Replacing object"
            );
            api.replace(&key.name, &self.post_params(), obj)
                .await
                .map_err(|e| map_write_error::<K>(e, &key))
        })
    }

    fn patch_status<'a, K: StoreObject>(
        &'a self,
        key: &'a ObjectKey,
        status: serde_json::Value,
    ) -> StoreFuture<'a, K> {
        Box::pin(async move {
            let api = K::api(self.client.clone(), key.namespace.as_deref());
            let patch = serde_json::json!({ "status": status });
            api.patch_status(
                &key.name,
                &PatchParams {
                    field_manager: Some(self.field_manager.clone()),
                    ..Default::default()
                },
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| map_write_error::<K>(e, key))
        })
    }
}
