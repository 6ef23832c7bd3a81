//! WordPress Kubernetes Operator binary.
//!
//! This binary runs the WordPress operator, which manages Wordpress and
//! WordpressPolicy custom resources in a Kubernetes cluster.

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::Controller;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, CustomResourceExt, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use wordpress_operator::OperatorConfig;
use wordpress_operator::controller::{
    ControllerContext, PolicyReconciler, WordpressReconciler, policy_error_policy,
    wordpress_error_policy,
};
use wordpress_operator::crd::{Wordpress, WordpressPolicy};
use wordpress_operator::events::KubeEventRecorder;
use wordpress_operator::observability::{DEFAULT_LOG_FILTER, LogFormat, init_tracing};
use wordpress_operator::store::{KubeStore, ObjectKey, StoreObject};

/// Label selector narrowing the child watches to objects this operator made.
const MANAGED_CHILDREN: &str = "app.kubernetes.io/managed-by=wordpress-operator";

/// Kubernetes operator for WordPress sites.
#[derive(Parser, Debug)]
#[command(name = "wordpress-operator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace to watch for Wordpress sites (all namespaces when empty)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Deadline for one reconcile pass, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    reconcile_timeout_secs: u64,

    /// Requeue delay after a transient reconcile error, in seconds
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 30)]
    error_requeue_secs: u64,

    /// Periodic resync of converged objects, in seconds (0 disables)
    #[arg(long, env = "RESYNC_SECS", default_value_t = 0)]
    resync_secs: u64,

    /// Log format: json, pretty or compact
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    log_format: LogFormat,

    /// Log filter, in `RUST_LOG` syntax
    #[arg(long, env = "LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,

    /// Name of this instance, reported on events
    #[arg(long, env = "POD_NAME")]
    pod_name: Option<String>,

    /// Print the CRD manifests and exit
    #[arg(long)]
    generate_crds: bool,
}

impl Args {
    fn config(&self) -> OperatorConfig {
        let mut config = OperatorConfig::default()
            .with_reconcile_timeout(Duration::from_secs(self.reconcile_timeout_secs))
            .with_error_requeue(Duration::from_secs(self.error_requeue_secs));
        if self.resync_secs > 0 {
            config = config.with_resync_interval(Duration::from_secs(self.resync_secs));
        }
        if let Some(ns) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            config = config.with_namespace(ns);
        }
        if let Some(pod) = &self.pod_name {
            config = config.with_instance(pod.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.generate_crds {
        generate_crds()?;
        return Ok(());
    }

    init_tracing(args.log_format, &args.log_filter)?;
    tracing::info!("Starting WordPress Kubernetes Operator");

    let config = args.config();
    tracing::info!(
        namespace = config.namespace.as_deref().unwrap_or("*"),
        reconcile_timeout_secs = config.reconcile_timeout.as_secs(),
        error_requeue_secs = config.error_requeue.as_secs(),
        resync_secs = config.resync_interval.map(|d| d.as_secs()),
        "Operator configuration"
    );

    // Connect to Kubernetes
    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let store = Arc::new(KubeStore::new(client.clone(), config.field_manager.clone()));

    let wordpress_ctx = Arc::new(ControllerContext::new(
        store.clone(),
        Arc::new(KubeEventRecorder::new(
            client.clone(),
            config.wordpress_controller_name.clone(),
            config.instance.clone(),
        )),
        config.clone(),
    ));
    let policy_ctx = Arc::new(ControllerContext::new(
        store,
        Arc::new(KubeEventRecorder::new(
            client.clone(),
            config.policy_controller_name.clone(),
            config.instance.clone(),
        )),
        config.clone(),
    ));

    // Start controllers concurrently
    let wordpress_controller = run_wordpress_controller(client.clone(), &config, wordpress_ctx);
    let policy_controller = run_policy_controller(client, &config, policy_ctx);

    tokio::select! {
        result = wordpress_controller => {
            tracing::error!("Wordpress controller exited: {:?}", result);
            result?;
        }
        result = policy_controller => {
            tracing::error!("WordpressPolicy controller exited: {:?}", result);
            result?;
        }
    }

    Ok(())
}

/// Run the Wordpress controller.
///
/// Changes to owned children re-trigger their site through the controller
/// owner reference. Any policy change, deletion included, re-triggers every
/// known site, so a site stops carrying a template its policies no longer
/// give it.
async fn run_wordpress_controller(
    client: Client,
    config: &OperatorConfig,
    ctx: Arc<ControllerContext<KubeStore>>,
) -> anyhow::Result<()> {
    tracing::info!("Starting Wordpress controller");

    let ns = config.namespace.as_deref();
    let children = WatcherConfig::default().labels(MANAGED_CHILDREN);
    let reconciler = WordpressReconciler::new(ctx.clone());

    let controller = Controller::new(Wordpress::api(client.clone(), ns), WatcherConfig::default());
    let known = controller.store();

    controller
        .watches(
            WordpressPolicy::api(client.clone(), None),
            WatcherConfig::default(),
            move |_policy| {
                known
                    .state()
                    .into_iter()
                    .map(|site| ObjectRef::from_obj(site.as_ref()))
                    .collect::<Vec<_>>()
            },
        )
        .owns(Secret::api(client.clone(), ns), children.clone())
        .owns(Deployment::api(client.clone(), ns), children.clone())
        .owns(Service::api(client.clone(), ns), children.clone())
        .owns(Ingress::api(client.clone(), ns), children.clone())
        .owns(CronJob::api(client.clone(), ns), children.clone())
        .owns(PersistentVolumeClaim::api(client, ns), children)
        .shutdown_on_signal()
        .run(
            move |site, _ctx| {
                let reconciler = reconciler.clone();
                async move {
                    reconciler
                        .reconcile(&ObjectKey::of(site.as_ref()))
                        .await
                        .map(Into::into)
                }
            },
            wordpress_error_policy::<KubeStore>,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(site = %obj, ?action, "Reconciled Wordpress");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Wordpress controller stream error");
                }
            }
        })
        .await;

    Ok(())
}

/// Run the WordpressPolicy controller.
///
/// Any site change re-triggers every known policy, since a label change can
/// add or remove a match.
async fn run_policy_controller(
    client: Client,
    config: &OperatorConfig,
    ctx: Arc<ControllerContext<KubeStore>>,
) -> anyhow::Result<()> {
    tracing::info!("Starting WordpressPolicy controller");

    let controller = Controller::new(
        WordpressPolicy::api(client.clone(), None),
        WatcherConfig::default(),
    );
    let known = controller.store();
    let reconciler = PolicyReconciler::new(ctx.clone());

    controller
        .watches(
            Wordpress::api(client, config.namespace.as_deref()),
            WatcherConfig::default(),
            move |_site| {
                known
                    .state()
                    .into_iter()
                    .map(|policy| ObjectRef::from_obj(policy.as_ref()))
                    .collect::<Vec<_>>()
            },
        )
        .shutdown_on_signal()
        .run(
            move |policy, _ctx| {
                let reconciler = reconciler.clone();
                async move {
                    reconciler
                        .reconcile(&policy.name_any())
                        .await
                        .map(Into::into)
                }
            },
            policy_error_policy::<KubeStore>,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(policy = %obj, ?action, "Reconciled WordpressPolicy");
                }
                Err(e) => {
                    tracing::error!(error = %e, "WordpressPolicy controller stream error");
                }
            }
        })
        .await;

    Ok(())
}

/// Generate CRD YAML files.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&Wordpress::crd())?);
    println!("---");
    println!("{}", serde_yaml::to_string(&WordpressPolicy::crd())?);
    Ok(())
}
