use crate::crd::Wordpress;
use crate::syncer::ObjectSyncer;
use crate::wordpress::{child_meta, cron_name, labels, merge_labels, web_name};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;

const CURL_IMAGE: &str = "docker.io/curlimages/curl:8.5.0";
const CONTAINER_NAME: &str = "curl";

/// Syncer for the `{site}-wp-cron` cron job, which pings `wp-cron.php`
/// through the site's service.
pub fn cron_syncer(wp: &Wordpress, owner: OwnerReference) -> ObjectSyncer<CronJob> {
    let obj = CronJob {
        metadata: child_meta(wp, cron_name(wp)),
        ..Default::default()
    };
    let labels = labels(wp, "wp-cron");
    let schedule = wp.spec.runtime.cron_schedule.clone().unwrap_or_default();
    let service_account = wp.spec.runtime.service_account_name.clone();
    let node_selector = wp.spec.runtime.node_selector.clone();

    let url = format!(
        "http://{}.{}.svc/wp-cron.php?doing_wp_cron",
        web_name(wp),
        wp.namespace().unwrap_or_default()
    );
    let mut args = vec!["--silent".to_string(), "--max-time".to_string(), "30".to_string()];
    if let Some(host) = wp.spec.domains.first() {
        args.push("--header".to_string());
        args.push(format!("Host: {}", host));
    }
    args.push(url);

    ObjectSyncer::new("wp-cron", owner, obj, move |cron: &mut CronJob| {
        merge_labels(&mut cron.metadata, labels.clone());

        let spec = cron.spec.get_or_insert_with(CronJobSpec::default);
        spec.schedule.clone_from(&schedule);
        spec.concurrency_policy = Some("Forbid".to_string());
        spec.successful_jobs_history_limit = Some(1);
        spec.failed_jobs_history_limit = Some(1);
        spec.starting_deadline_seconds = Some(10);

        let job = spec.job_template.spec.get_or_insert_with(JobSpec::default);
        job.backoff_limit = Some(0);
        job.active_deadline_seconds = Some(60);

        let template: &mut PodTemplateSpec = &mut job.template;
        merge_labels(
            template.metadata.get_or_insert_with(ObjectMeta::default),
            labels.clone(),
        );

        let pod = template.spec.get_or_insert_with(PodSpec::default);
        pod.restart_policy = Some("Never".to_string());
        pod.service_account_name.clone_from(&service_account);
        pod.node_selector = if node_selector.is_empty() {
            None
        } else {
            Some(node_selector.clone())
        };
        if !pod.containers.iter().any(|c| c.name == CONTAINER_NAME) {
            pod.containers.push(Container {
                name: CONTAINER_NAME.to_string(),
                ..Default::default()
            });
        }
        for container in pod.containers.iter_mut().filter(|c| c.name == CONTAINER_NAME) {
            container.image = Some(CURL_IMAGE.to_string());
            container.args = Some(args.clone());
        }

        if spec.job_template.metadata.is_none() {
            spec.job_template.metadata = Some(ObjectMeta {
                labels: Some(labels.clone()),
                ..Default::default()
            });
        }

        Ok(())
    })
}
