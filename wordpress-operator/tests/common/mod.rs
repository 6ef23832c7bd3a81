//! Common test utilities for integration tests.

#![allow(dead_code)]

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wordpress_operator::controller::{ControllerContext, PolicyReconciler, WordpressReconciler};
use wordpress_operator::crd::{
    Condition, CONDITION_READY, Wordpress, WordpressPolicy, WordpressPolicySpec,
    WordpressRuntimeSpec, WordpressSpec, WordpressTemplateSpec,
};
use wordpress_operator::events::MemoryRecorder;
use wordpress_operator::store::{MemoryStore, ObjectKey, Store, StoreFuture, StoreObject};
use wordpress_operator::selector::Selector;
use wordpress_operator::OperatorConfig;

/// Namespace the test sites live in.
pub const NAMESPACE: &str = "sites";

/// A store, a recorder and both reconcilers wired together.
pub struct Harness<S: Store = MemoryStore> {
    pub store: Arc<S>,
    pub recorder: Arc<MemoryRecorder>,
    pub sites: WordpressReconciler<S>,
    pub policies: PolicyReconciler<S>,
}

impl Harness<MemoryStore> {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), test_config())
    }
}

impl<S: Store> Harness<S> {
    pub fn with_store(store: S, config: OperatorConfig) -> Self {
        let store = Arc::new(store);
        let recorder = Arc::new(MemoryRecorder::new());
        let ctx = Arc::new(ControllerContext::new(
            store.clone(),
            recorder.clone(),
            config,
        ));
        Self {
            store,
            recorder,
            sites: WordpressReconciler::new(ctx.clone()),
            policies: PolicyReconciler::new(ctx),
        }
    }

    /// Fetch an object that must exist.
    pub async fn fetch<K: StoreObject>(&self, key: &ObjectKey) -> K {
        self.store
            .get::<K>(key)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{} {} should exist", K::kind_name(), key))
    }
}

/// Config with a short deadline and the test namespace.
pub fn test_config() -> OperatorConfig {
    OperatorConfig::default()
        .with_namespace(NAMESPACE)
        .with_reconcile_timeout(Duration::from_secs(10))
}

/// Key of a site in the test namespace.
pub fn site_key(name: &str) -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, name)
}

/// Key of a child of a site in the test namespace.
pub fn child_key(name: &str) -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, name)
}

/// A site serving `{name}.example.com`.
pub fn site(name: &str, labels: &[(&str, &str)]) -> Wordpress {
    let mut wp = Wordpress::new(
        name,
        WordpressSpec {
            domains: vec![format!("{}.example.com", name)],
            ..Default::default()
        },
    );
    wp.metadata.namespace = Some(NAMESPACE.to_string());
    if !labels.is_empty() {
        wp.metadata.labels = Some(to_map(labels));
    }
    wp
}

/// A policy selecting sites by `match_labels`.
pub fn policy(
    name: &str,
    priority: i32,
    match_labels: &[(&str, &str)],
    runtime: WordpressRuntimeSpec,
) -> WordpressPolicy {
    WordpressPolicy::new(
        name,
        WordpressPolicySpec {
            selector: Some(LabelSelector {
                match_labels: Some(to_map(match_labels)),
                ..Default::default()
            }),
            priority,
            template: WordpressTemplateSpec {
                metadata: None,
                spec: runtime,
            },
        },
    )
}

/// A policy without a selector, applying to every site.
pub fn policy_for_all(name: &str, priority: i32, runtime: WordpressRuntimeSpec) -> WordpressPolicy {
    let mut policy = policy(name, priority, &[], runtime);
    policy.spec.selector = None;
    policy
}

/// Point the selector of `policy` at `match_labels`.
pub fn reselect(policy: &mut WordpressPolicy, match_labels: &[(&str, &str)]) {
    policy.spec.selector = Some(LabelSelector {
        match_labels: Some(to_map(match_labels)),
        ..Default::default()
    });
}

/// A runtime template that only sets the image.
pub fn image(image: &str) -> WordpressRuntimeSpec {
    WordpressRuntimeSpec {
        image: Some(image.to_string()),
        ..Default::default()
    }
}

/// Create `obj` in `store`, returning it with server-assigned fields.
pub async fn seed<S: Store, K: StoreObject>(store: &S, obj: K) -> K {
    store.create(&obj).await.unwrap()
}

/// The `Ready` condition of a set of conditions.
pub fn ready(conditions: &[Condition]) -> Option<&Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == CONDITION_READY)
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Store whose reads stall for `delay` before reaching the inner store.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

impl Store for SlowStore {
    fn get<'a, K: StoreObject>(&'a self, key: &'a ObjectKey) -> StoreFuture<'a, Option<K>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.get(key).await
        })
    }

    fn list<'a, K: StoreObject>(
        &'a self,
        namespace: Option<&'a str>,
        selector: &'a Selector,
    ) -> StoreFuture<'a, Vec<K>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.list(namespace, selector).await
        })
    }

    fn create<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K> {
        self.inner.create(obj)
    }

    fn update<'a, K: StoreObject>(&'a self, obj: &'a K) -> StoreFuture<'a, K> {
        self.inner.update(obj)
    }

    fn patch_status<'a, K: StoreObject>(
        &'a self,
        key: &'a ObjectKey,
        status: serde_json::Value,
    ) -> StoreFuture<'a, K> {
        self.inner.patch_status(key, status)
    }
}
