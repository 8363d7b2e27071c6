//! APIManager controller
//!
//! Watches APIManager resources and the objects they own, and runs one
//! Redis reconcile pass per trigger. Retry timing lives here, never in the
//! reconcile pass itself.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::{api::ListParams, Api, Client, Resource, ResourceExt};
use kube_runtime::{
    controller::{Action, Controller},
    watcher::Config as WatcherConfig,
};
use tracing::{error, info, instrument, warn};

use crate::component::RedisBuilder;
use crate::controllers::Context;
use crate::crd::APIManager;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::{
    status, HighAvailabilityGate, KindReconcilers, ReconcileOutcome, RedisReconciler,
};

/// Requeue interval after a successful pass
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the APIManager controller
pub async fn run(client: Client, context: Arc<Context>, watch_namespace: Option<String>) {
    let namespace = watch_namespace.as_deref();
    let api: Api<APIManager> = scoped_api(&client, namespace);

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("APIManager CRD not installed: {}", e);
        return;
    }

    info!(
        namespace = namespace.unwrap_or("*"),
        "Starting APIManager controller"
    );

    Controller::new(api, WatcherConfig::default())
        .owns(scoped_api::<Deployment>(&client, namespace), WatcherConfig::default())
        .owns(scoped_api::<Service>(&client, namespace), WatcherConfig::default())
        .owns(scoped_api::<ConfigMap>(&client, namespace), WatcherConfig::default())
        .owns(
            scoped_api::<PersistentVolumeClaim>(&client, namespace),
            WatcherConfig::default(),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled APIManager"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["APIManager"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<APIManager>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["APIManager"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["APIManager"])
        .inc();

    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::config(format!("APIManager '{}' has no namespace", name)))?;

    info!(
        generation = obj.metadata.generation.unwrap_or(0),
        "Reconciling APIManager"
    );

    let reconciler = RedisReconciler::new(
        obj.clone(),
        Arc::new(HighAvailabilityGate),
        Arc::new(RedisBuilder),
        KindReconcilers::namespaced(ctx.client.clone(), &namespace),
    );

    match reconciler.reconcile().await {
        Ok(outcome) => {
            if let ReconcileOutcome::Reconciled { resources } = outcome {
                metrics::MANAGED_RESOURCES
                    .with_label_values(&[namespace.as_str(), name.as_str()])
                    .set(resources as f64);
            }
            status::update_status_ready(&obj, &ctx.client, &namespace, outcome).await?;
            Ok(Action::requeue(RESYNC_INTERVAL))
        }
        Err(e) => {
            if let Err(status_err) =
                status::update_status_failed(&obj, &ctx.client, &namespace, &e.to_string()).await
            {
                warn!(error = %status_err, "Failed to record reconcile failure in status");
            }
            Err(e)
        }
    }
}

/// Requeue delay for a failed pass, by error class
pub fn requeue_after(error: &Error) -> Duration {
    match error.root() {
        Error::Config(_) | Error::Validation(_) | Error::Ownership(_) => Duration::from_secs(300),
        Error::PermissionDenied(_) => Duration::from_secs(60),
        Error::Conflict(_) => Duration::from_secs(5),
        _ => Duration::from_secs(30),
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<APIManager>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(requeue_after(error))
}
