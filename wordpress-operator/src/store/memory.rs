//! In-memory store.
//!
//! This store is useful for:
//! - Testing reconcilers without an API server
//! - Counting writes to verify idempotence
//! - Injecting write failures
//!
//! It mimics the API server's bookkeeping: every write bumps a global
//! resource version, creates assign a `uid` and `generation`, updates check
//! the resource version and keep the stored `status`, and status patches only
//! touch `status`.

use super::{ObjectKey, Store, StoreFuture, StoreObject, not_found};
use crate::error::{OperatorError, OperatorResult};
use crate::selector::{Selector, SelectorExt};
use kube::ResourceExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

type EntryKey = (String, Option<String>, String);

/// In-memory [`Store`] with API-server-like concurrency semantics.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<EntryKey, Value>>,
    /// Last assigned resource version.
    version: AtomicU64,
    /// Successful creates, updates and status patches.
    writes: AtomicUsize,
    /// Names whose writes fail with an injected error.
    failing: Mutex<HashSet<String>>,
}

fn type_key<K: StoreObject>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn entry_key<K: StoreObject>(key: &ObjectKey) -> EntryKey {
    (type_key::<K>(), key.namespace.clone(), key.name.clone())
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation or the last
    /// [`reset_writes`](Self::reset_writes).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Reset the write counter.
    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Make every write to objects named `name` fail.
    pub fn fail_writes_to(&self, name: impl Into<String>) {
        self.failing.lock().insert(name.into());
    }

    /// Stop failing writes to objects named `name`.
    pub fn heal(&self, name: &str) {
        self.failing.lock().remove(name);
    }

    /// All stored objects of kind `K`, ordered by namespace and name.
    pub fn objects<K: StoreObject>(&self) -> Vec<K> {
        let kind = type_key::<K>();
        self.objects
            .lock()
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .filter_map(|(_, value)| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    /// Remove an object, as if it was deleted by a user.
    pub fn delete<K: StoreObject>(&self, key: &ObjectKey) -> bool {
        self.objects.lock().remove(&entry_key::<K>(key)).is_some()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn check_injected<K: StoreObject>(&self, key: &ObjectKey) -> OperatorResult<()> {
        if self.failing.lock().contains(&key.name) {
            return Err(OperatorError::InvalidConfig(format!(
                "injected write failure for {} {}",
                K::kind_name(),
                key
            )));
        }
        Ok(())
    }

    fn get_now<K: StoreObject>(&self, key: &ObjectKey) -> OperatorResult<Option<K>> {
        self.objects
            .lock()
            .get(&entry_key::<K>(key))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    fn list_now<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> OperatorResult<Vec<K>> {
        let kind = type_key::<K>();
        let objects = self.objects.lock();
        let mut items = Vec::new();

        for ((k, ns, _), value) in objects.iter() {
            if *k != kind || (namespace.is_some() && ns.as_deref() != namespace) {
                continue;
            }
            let obj: K = serde_json::from_value(value.clone())?;
            if selector.matches(obj.labels()) {
                items.push(obj);
            }
        }

        Ok(items)
    }

    fn create_now<K: StoreObject>(&self, obj: &K) -> OperatorResult<K> {
        let key = ObjectKey::of(obj);
        self.check_injected::<K>(&key)?;

        let mut objects = self.objects.lock();
        let entry = entry_key::<K>(&key);
        if objects.contains_key(&entry) {
            return Err(OperatorError::AlreadyExists {
                kind: K::kind_name(),
                name: key.name,
            });
        }

        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.resource_version = Some(self.next_version());
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.generation = Some(1);

        objects.insert(entry, serde_json::to_value(&created)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    fn update_now<K: StoreObject>(&self, obj: &K) -> OperatorResult<K> {
        let key = ObjectKey::of(obj);
        self.check_injected::<K>(&key)?;

        let mut objects = self.objects.lock();
        let entry = entry_key::<K>(&key);
        let stored = objects.get(&entry).ok_or_else(|| not_found::<K>(&key))?;
        let current: K = serde_json::from_value(stored.clone())?;

        if obj.resource_version() != current.resource_version() {
            return Err(OperatorError::Conflict {
                kind: K::kind_name(),
                name: key.name,
            });
        }

        let mut updated = serde_json::to_value(obj)?;
        let spec_changed = updated.get("spec") != stored.get("spec");
        match stored.get("status") {
            Some(status) => updated["status"] = status.clone(),
            None => {
                if let Some(map) = updated.as_object_mut() {
                    map.remove("status");
                }
            }
        }

        let mut updated: K = serde_json::from_value(updated)?;
        let meta = updated.meta_mut();
        meta.resource_version = Some(self.next_version());
        meta.uid = current.uid();
        meta.generation = match (current.meta().generation, spec_changed) {
            (Some(generation), true) => Some(generation + 1),
            (generation, _) => generation,
        };

        objects.insert(entry, serde_json::to_value(&updated)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    fn patch_status_now<K: StoreObject>(&self, key: &ObjectKey, status: Value) -> OperatorResult<K> {
        self.check_injected::<K>(key)?;

        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(&entry_key::<K>(key))
            .ok_or_else(|| not_found::<K>(key))?;

        merge(&mut stored["status"], status);
        stored["metadata"]["resourceVersion"] = Value::String(self.next_version());

        let patched: K = serde_json::from_value(stored.clone())?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(patched)
    }
}

/// JSON merge patch (RFC 7386).
fn merge(target: &mut Value, patch: Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            if let Some(map) = target.as_object_mut() {
                for (key, value) in fields {
                    if value.is_null() {
                        map.remove(&key);
                    } else {
                        merge(map.entry(key).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other,
    }
}

impl Store for MemoryStore {
    fn get<'a, K: StoreObject>(&'a self, key: &'a ObjectKey) -> StoreFuture<'a, Option<K>> {
        Box::pin(async move { self.get_now(key) })
    }

    fn list<'a, K: StoreObject>(
        &'a self,
        namespace: Option<&'a str>,
        selector: &'a Selector,
    ) -> StoreFuture<'a, Vec<K>> {
        Box::pin(async move { self.list_now(namespace, selector) })
    }

    fn create<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K> {
        Box::pin(async move { self.create_now(obj) })
    }

    fn update<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K> {
        Box::pin(async move { self.update_now(obj) })
    }

    fn patch_status<'a, K: StoreObject>(
        &'a self,
        key: &'a ObjectKey,
        status: Value,
    ) -> StoreFuture<'a, K> {
        Box::pin(async move { self.patch_status_now(key, status) })
    }
}
