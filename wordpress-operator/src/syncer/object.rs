//! Generic syncer for one typed child object.

use super::{SyncFuture, SyncOperation, SyncResult, Syncer};
use crate::error::{OperatorError, OperatorResult};
use crate::store::{ObjectKey, Store, StoreObject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use parking_lot::RwLock;
use std::sync::Arc;

/// Mutation applied to the child to make it match the desired state.
pub type MutateFn<K> = Box<dyn Fn(&mut K) -> OperatorResult<()> + Send + Sync>;

/// Shared handle to a syncer's child object.
///
/// Before the syncer runs the handle holds the initialized object (name and
/// namespace only); afterwards it holds the object as stored. Later syncers
/// in the same pass read it to depend on an earlier child.
#[derive(Debug)]
pub struct ObjectHandle<K>(Arc<RwLock<K>>);

impl<K> Clone for ObjectHandle<K> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<K: Clone> ObjectHandle<K> {
    fn new(obj: K) -> Self {
        Self(Arc::new(RwLock::new(obj)))
    }

    /// Snapshot of the current object.
    pub fn get(&self) -> K {
        self.0.read().clone()
    }

    /// Run `f` against the current object.
    pub fn with<R>(&self, f: impl FnOnce(&K) -> R) -> R {
        f(&self.0.read())
    }

    fn set(&self, obj: K) {
        *self.0.write() = obj;
    }
}

/// Syncer converging one object of kind `K`.
///
/// A pass reads the stored object (or starts from the initialized one),
/// applies the mutation, ensures the controller owner reference and writes
/// only when the serialized object changed.
pub struct ObjectSyncer<K: StoreObject> {
    name: String,
    owner: OwnerReference,
    key: ObjectKey,
    initial: K,
    object: ObjectHandle<K>,
    mutate: MutateFn<K>,
}

impl<K: StoreObject> ObjectSyncer<K> {
    /// Create a syncer for `obj`, owned by `owner`.
    ///
    /// `obj` only needs its name and namespace set; everything else is the
    /// job of `mutate`.
    pub fn new(
        name: impl Into<String>,
        owner: OwnerReference,
        obj: K,
        mutate: impl Fn(&mut K) -> OperatorResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            owner,
            key: ObjectKey::of(&obj),
            object: ObjectHandle::new(obj.clone()),
            initial: obj,
            mutate: Box::new(mutate),
        }
    }

    /// Handle to the child object.
    pub fn object(&self) -> ObjectHandle<K> {
        self.object.clone()
    }

    /// Apply the mutation to `obj` without touching the store.
    #[cfg(test)]
    pub(crate) fn mutate(&self, obj: &mut K) -> OperatorResult<()> {
        (self.mutate)(obj)
    }

    async fn run<S: Store>(&self, store: &S) -> OperatorResult<SyncResult> {
        let stored: Option<K> = store.get(&self.key).await?;
        let exists = stored.is_some();
        let mut obj = stored.unwrap_or_else(|| self.initial.clone());
        let before = serde_json::to_value(&obj)?;

        (self.mutate)(&mut obj).map_err(|e| match e {
            err @ OperatorError::SyncError { .. } => err,
            other => OperatorError::sync(&self.name, other),
        })?;
        set_controller(&mut obj, &self.owner)?;

        let operation = if !exists {
            obj = store.create(&obj).await?;
            SyncOperation::Created
        } else if serde_json::to_value(&obj)? != before {
            obj = store.update(&obj).await?;
            SyncOperation::Updated
        } else {
            SyncOperation::Unchanged
        };

        self.object.set(obj);

        Ok(SyncResult {
            kind: K::kind_name(),
            key: self.key.clone(),
            operation,
        })
    }
}

impl<S: Store, K: StoreObject> Syncer<S> for ObjectSyncer<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> String {
        K::kind_name()
    }

    fn object_key(&self) -> ObjectKey {
        self.key.clone()
    }

    fn sync<'a>(&'a self, store: &'a S) -> SyncFuture<'a> {
        Box::pin(self.run(store))
    }
}

/// Make `owner` the controller of `obj`.
///
/// Fails with `AlreadyOwned` when a different object is already the
/// controller.
fn set_controller<K: StoreObject>(obj: &mut K, owner: &OwnerReference) -> OperatorResult<()> {
    let name = obj.meta().name.clone().unwrap_or_default();
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = refs.iter().find(|r| r.controller == Some(true)) {
        if existing.uid != owner.uid {
            return Err(OperatorError::AlreadyOwned {
                kind: K::kind_name(),
                name,
                owner: format!("{}/{}", existing.kind, existing.name),
            });
        }
    }

    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) if *existing == *owner => {}
        Some(existing) => *existing = owner.clone(),
        None => refs.push(owner.clone()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::Secret;
    use kube::ResourceExt;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "wordpress.presslabs.org/v1alpha1".to_string(),
            kind: "Wordpress".to_string(),
            name: "blog".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn secret() -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("blog-wp".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn syncer(uid: &str, value: &'static str) -> ObjectSyncer<Secret> {
        ObjectSyncer::new("secret", owner(uid), secret(), move |s: &mut Secret| {
            s.string_data = Some(BTreeMap::from([("KEY".to_string(), value.to_string())]));
            Ok(())
        })
    }

    #[tokio::test]
    async fn create_then_unchanged_then_update() {
        let store = MemoryStore::new();

        let first = syncer("uid-1", "a");
        let result = Syncer::<MemoryStore>::sync(&first, &store).await.unwrap();
        assert_eq!(result.operation, SyncOperation::Created);
        assert!(first.object().get().resource_version().is_some());

        let second = syncer("uid-1", "a");
        let result = Syncer::<MemoryStore>::sync(&second, &store).await.unwrap();
        assert_eq!(result.operation, SyncOperation::Unchanged);
        assert_eq!(store.writes(), 1);

        let third = syncer("uid-1", "b");
        let result = Syncer::<MemoryStore>::sync(&third, &store).await.unwrap();
        assert_eq!(result.operation, SyncOperation::Updated);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn refuses_foreign_controller() {
        let store = MemoryStore::new();
        Syncer::<MemoryStore>::sync(&syncer("uid-1", "a"), &store)
            .await
            .unwrap();

        let result = Syncer::<MemoryStore>::sync(&syncer("uid-2", "a"), &store).await;
        assert!(matches!(result, Err(OperatorError::AlreadyOwned { .. })));
    }

    #[tokio::test]
    async fn mutation_error_is_a_sync_error() {
        let store = MemoryStore::new();
        let failing = ObjectSyncer::new("secret", owner("uid-1"), secret(), |_s: &mut Secret| {
            Err(OperatorError::InvalidConfig("no salts".to_string()))
        });

        let result = Syncer::<MemoryStore>::sync(&failing, &store).await;
        match result {
            Err(OperatorError::SyncError { syncer, cause }) => {
                assert_eq!(syncer, "secret");
                assert!(cause.contains("no salts"));
            }
            other => panic!("expected SyncError, got {:?}", other),
        }
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn set_controller_is_idempotent() {
        let mut s = secret();
        set_controller(&mut s, &owner("uid-1")).unwrap();
        set_controller(&mut s, &owner("uid-1")).unwrap();
        assert_eq!(s.metadata.owner_references.as_ref().map(Vec::len), Some(1));
    }
}
