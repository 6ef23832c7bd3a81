use super::HTTP_PORT_NAME;
use crate::crd::Wordpress;
use crate::error::OperatorError;
use crate::syncer::ObjectSyncer;
use crate::wordpress::{child_meta, labels, merge_labels, web_name};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

fn rule(host: &str, service: &str) -> IngressRule {
    IngressRule {
        host: Some(host.to_string()),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service.to_string(),
                        port: Some(ServiceBackendPort {
                            name: Some(HTTP_PORT_NAME.to_string()),
                            number: None,
                        }),
                    }),
                    resource: None,
                },
            }],
        }),
    }
}

/// Syncer for the `{site}` ingress, one rule per domain.
///
/// A site without domains cannot be routed and fails the pass.
pub fn ingress_syncer(wp: &Wordpress, owner: OwnerReference) -> ObjectSyncer<Ingress> {
    let obj = Ingress {
        metadata: child_meta(wp, web_name(wp)),
        ..Default::default()
    };
    let labels = labels(wp, "web");
    let service = web_name(wp);
    let domains = wp.spec.domains.clone();
    let tls_secret = wp.spec.tls_secret_ref.clone();
    let annotations = wp.spec.runtime.ingress_annotations.clone();

    ObjectSyncer::new("ingress", owner, obj, move |ingress: &mut Ingress| {
        if domains.is_empty() {
            return Err(OperatorError::sync(
                "ingress",
                "spec.domains must not be empty",
            ));
        }

        merge_labels(&mut ingress.metadata, labels.clone());
        if !annotations.is_empty() {
            ingress
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .extend(annotations.clone());
        }

        let spec = ingress.spec.get_or_insert_with(IngressSpec::default);
        spec.rules = Some(domains.iter().map(|d| rule(d, &service)).collect());
        spec.tls = tls_secret.as_ref().map(|secret| {
            vec![IngressTLS {
                hosts: Some(domains.clone()),
                secret_name: Some(secret.clone()),
            }]
        });

        Ok(())
    })
}
