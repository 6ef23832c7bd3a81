use super::HTTP_PORT_NAME;
use crate::crd::Wordpress;
use crate::syncer::ObjectSyncer;
use crate::wordpress::{child_meta, labels, merge_labels, selector_labels, web_name};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Syncer for the `{site}` service, exposing port 80 to the web pods.
pub fn service_syncer(wp: &Wordpress, owner: OwnerReference) -> ObjectSyncer<Service> {
    let obj = Service {
        metadata: child_meta(wp, web_name(wp)),
        ..Default::default()
    };
    let labels = labels(wp, "web");
    let selector = selector_labels(wp);

    ObjectSyncer::new("service", owner, obj, move |svc: &mut Service| {
        merge_labels(&mut svc.metadata, labels.clone());

        let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = Some(selector.clone());
        spec.ports = Some(vec![ServicePort {
            name: Some(HTTP_PORT_NAME.to_string()),
            port: 80,
            protocol: Some("TCP".to_string()),
            target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
            ..Default::default()
        }]);

        Ok(())
    })
}
