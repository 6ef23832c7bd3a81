//! Integration tests for the WordpressPolicy reconciler.

mod common;

use common::{
    Harness, child_key, image, policy, policy_for_all, ready, reselect, seed, site, site_key,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::ResourceExt;
use wordpress_operator::OperatorError;
use wordpress_operator::controller::ReconcileAction;
use wordpress_operator::crd::{Wordpress, WordpressPolicy, policy_annotation_key};
use wordpress_operator::store::{ObjectKey, Store};

async fn stamp(h: &Harness, name: &str) -> Option<String> {
    let wp: Wordpress = h.fetch(&site_key(name)).await;
    wp.annotations().get(&policy_annotation_key("hardened")).cloned()
}

async fn current_version(h: &Harness) -> String {
    let policy: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    policy.applied_version()
}

fn container_image(deployment: &Deployment) -> String {
    deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
        .image
        .clone()
        .unwrap()
}

#[tokio::test]
async fn stamps_only_matching_sites() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("prod", &[("env", "prod")])).await;
    seed(h.store.as_ref(), site("staging", &[("env", "staging")])).await;
    seed(h.store.as_ref(), site("bare", &[])).await;
    let hardened = seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("hardened")),
    )
    .await;

    let action = h.policies.reconcile("hardened").await.unwrap();
    assert_eq!(action, ReconcileAction::Done);

    assert_eq!(stamp(&h, "prod").await, Some(hardened.applied_version()));
    assert_eq!(stamp(&h, "prod").await.as_deref(), Some("1"));
    assert_eq!(stamp(&h, "staging").await, None);
    assert_eq!(stamp(&h, "bare").await, None);

    let stored: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    let status = stored.status.unwrap();
    assert_eq!(status.matched_sites, 1);
    assert_eq!(ready(&status.conditions).unwrap().status, "True");
    assert!(h.recorder.find("PolicyApplied").is_some());
}

#[tokio::test]
async fn stamp_tracks_the_policy_version() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("a", &[("env", "prod")])).await;
    seed(h.store.as_ref(), site("b", &[("env", "prod")])).await;
    seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("v1")),
    )
    .await;
    h.policies.reconcile("hardened").await.unwrap();

    let mut edited: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    edited.spec.template.spec.image = Some("v2".to_string());
    let edited = h.store.update(&edited).await.unwrap();

    h.policies.reconcile("hardened").await.unwrap();

    assert_eq!(edited.applied_version(), "2");
    assert_eq!(stamp(&h, "a").await.as_deref(), Some("2"));
    assert_eq!(stamp(&h, "b").await.as_deref(), Some("2"));
}

#[tokio::test]
async fn converged_policy_writes_nothing() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("prod", &[("env", "prod")])).await;
    seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("hardened")),
    )
    .await;

    // The status write of the first pass leaves the generation alone.
    h.policies.reconcile("hardened").await.unwrap();
    assert_eq!(stamp(&h, "prod").await, Some(current_version(&h).await));

    h.store.reset_writes();
    h.recorder.clear();
    h.policies.reconcile("hardened").await.unwrap();

    assert_eq!(h.store.writes(), 0);
    assert!(h.recorder.is_empty());
}

#[tokio::test]
async fn partial_failure_stamps_the_rest() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("a", &[("env", "prod")])).await;
    seed(h.store.as_ref(), site("b", &[("env", "prod")])).await;
    seed(h.store.as_ref(), site("c", &[("env", "prod")])).await;
    let hardened = seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("hardened")),
    )
    .await;
    h.store.fail_writes_to("b");

    let err = h.policies.reconcile("hardened").await.unwrap_err();

    match err {
        OperatorError::PolicyPropagation { failed, total, .. } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("expected PolicyPropagation, got {:?}", other),
    }
    assert_eq!(stamp(&h, "a").await, Some(hardened.applied_version()));
    assert_eq!(stamp(&h, "b").await, None);
    assert_eq!(stamp(&h, "c").await, Some(hardened.applied_version()));

    let stored: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    let condition = ready(&stored.status.as_ref().unwrap().conditions).unwrap().clone();
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some("PropagationFailed"));
    assert!(h.recorder.find("PropagationFailed").is_some());
}

#[tokio::test]
async fn invalid_selector_is_reported() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("prod", &[("env", "prod")])).await;
    let mut broken = policy("hardened", 0, &[], image("hardened"));
    broken.spec.selector = Some(LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "env".to_string(),
            operator: "Near".to_string(),
            values: Some(vec!["prod".to_string()]),
        }]),
        ..Default::default()
    });
    seed(h.store.as_ref(), broken).await;

    let err = h.policies.reconcile("hardened").await.unwrap_err();

    assert!(matches!(err, OperatorError::InvalidSelector(_)));
    assert_eq!(stamp(&h, "prod").await, None);
    let warning = h.recorder.find("InvalidSelector").unwrap();
    assert_eq!(warning.kind, "WordpressPolicy");

    let stored: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    let condition = ready(&stored.status.as_ref().unwrap().conditions).unwrap().clone();
    assert_eq!(condition.reason.as_deref(), Some("InvalidSelector"));
}

#[tokio::test]
async fn sites_outside_the_namespace_are_ignored() {
    let h = Harness::new();
    let mut elsewhere = site("other", &[("env", "prod")]);
    elsewhere.metadata.namespace = Some("elsewhere".to_string());
    seed(h.store.as_ref(), elsewhere).await;
    seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("hardened")),
    )
    .await;

    h.policies.reconcile("hardened").await.unwrap();

    let other: Wordpress = h
        .fetch(&ObjectKey::namespaced("elsewhere", "other"))
        .await;
    assert!(other.annotations().is_empty());
}

#[tokio::test]
async fn missing_policy_is_a_no_op() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("prod", &[("env", "prod")])).await;

    let action = h.policies.reconcile("gone").await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    assert_eq!(h.store.writes(), 1);
}

#[tokio::test]
async fn policy_without_selector_stamps_every_site() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("prod", &[("env", "prod")])).await;
    seed(h.store.as_ref(), site("bare", &[])).await;
    seed(h.store.as_ref(), policy_for_all("hardened", 0, image("hardened"))).await;

    h.policies.reconcile("hardened").await.unwrap();

    assert_eq!(stamp(&h, "prod").await.as_deref(), Some("1"));
    assert_eq!(stamp(&h, "bare").await.as_deref(), Some("1"));
    let stored: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    assert_eq!(stored.status.unwrap().matched_sites, 2);

    h.sites.reconcile(&site_key("bare")).await.unwrap();
    let deployment: Deployment = h.fetch(&child_key("bare")).await;
    assert_eq!(container_image(&deployment), "hardened:5.8.2");
}

#[tokio::test]
async fn narrowed_policy_releases_its_sites() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("blog", &[("env", "prod")])).await;
    seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("registry.example.com/wp")),
    )
    .await;

    h.policies.reconcile("hardened").await.unwrap();
    h.sites.reconcile(&site_key("blog")).await.unwrap();
    let deployment: Deployment = h.fetch(&child_key("blog")).await;
    assert_eq!(container_image(&deployment), "registry.example.com/wp:5.8.2");

    let mut narrowed: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    reselect(&mut narrowed, &[("env", "staging")]);
    h.store.update(&narrowed).await.unwrap();
    h.recorder.clear();

    h.policies.reconcile("hardened").await.unwrap();

    assert_eq!(stamp(&h, "blog").await, None);
    let stored: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    assert_eq!(stored.status.unwrap().matched_sites, 0);
    let applied = h.recorder.find("PolicyApplied").unwrap();
    assert!(applied.event.message.contains("unstamped 1"));

    // Losing the stamp re-triggers the site, which drops the template.
    h.sites.reconcile(&site_key("blog")).await.unwrap();
    let deployment: Deployment = h.fetch(&child_key("blog")).await;
    assert_eq!(
        container_image(&deployment),
        "docker.io/bitpoke/wordpress-runtime:5.8.2"
    );

    h.store.reset_writes();
    h.policies.reconcile("hardened").await.unwrap();
    assert_eq!(h.store.writes(), 0);
}

#[tokio::test]
async fn failed_unstamp_is_reported() {
    let h = Harness::new();
    seed(h.store.as_ref(), site("blog", &[("env", "prod")])).await;
    seed(
        h.store.as_ref(),
        policy("hardened", 0, &[("env", "prod")], image("hardened")),
    )
    .await;
    h.policies.reconcile("hardened").await.unwrap();

    let mut narrowed: WordpressPolicy = h.fetch(&ObjectKey::cluster("hardened")).await;
    reselect(&mut narrowed, &[("env", "staging")]);
    h.store.update(&narrowed).await.unwrap();
    h.store.fail_writes_to("blog");

    let err = h.policies.reconcile("hardened").await.unwrap_err();

    match err {
        OperatorError::PolicyPropagation { failed, total, .. } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 1);
        }
        other => panic!("expected PolicyPropagation, got {:?}", other),
    }
    assert_eq!(stamp(&h, "blog").await.as_deref(), Some("1"));
}
