//! APIManager status updates

use chrono::Utc;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::{json, Value};

use crate::crd::APIManager;
use crate::error::Result;

use super::redis::ReconcileOutcome;
use super::FIELD_MANAGER;

/// Status patch for a pass that did not fail
pub fn ready_status(api_manager: &APIManager, outcome: ReconcileOutcome) -> Value {
    let (message, reason, resources) = match outcome {
        ReconcileOutcome::Skipped => (
            "Redis is provided externally (high availability enabled)".to_string(),
            "HighAvailabilityEnabled",
            None,
        ),
        ReconcileOutcome::Reconciled { resources } => (
            format!("{} Redis resources reconciled", resources),
            "ResourcesReconciled",
            Some(resources),
        ),
    };

    json!({
        "status": {
            "phase": "Ready",
            "message": message,
            "reconciledResources": resources,
            "observedGeneration": api_manager.metadata.generation,
            "conditions": [{
                "type": "RedisReady",
                "status": "True",
                "lastTransitionTime": Utc::now(),
                "reason": reason,
                "message": message
            }]
        }
    })
}

/// Status patch for a failed pass
pub fn failed_status(api_manager: &APIManager, error_message: &str) -> Value {
    json!({
        "status": {
            "phase": "Failed",
            "message": error_message,
            "reconciledResources": null,
            "observedGeneration": api_manager.metadata.generation,
            "conditions": [{
                "type": "RedisReady",
                "status": "False",
                "lastTransitionTime": Utc::now(),
                "reason": "ReconcileFailed",
                "message": error_message
            }]
        }
    })
}

/// Whether the recorded status differs from the given phase and message.
///
/// Status writes trigger another watch event, so unchanged status is not
/// written again.
pub fn needs_update(api_manager: &APIManager, phase: &str, message: &str) -> bool {
    match &api_manager.status {
        Some(status) => {
            status.phase.as_deref() != Some(phase)
                || status.message.as_deref() != Some(message)
                || status.observed_generation != api_manager.metadata.generation
        }
        None => true,
    }
}

/// Update status to Ready
pub async fn update_status_ready(
    api_manager: &APIManager,
    client: &Client,
    namespace: &str,
    outcome: ReconcileOutcome,
) -> Result<()> {
    let status = ready_status(api_manager, outcome);
    let message = status["status"]["message"].as_str().unwrap_or_default();
    if !needs_update(api_manager, "Ready", message) {
        return Ok(());
    }

    patch_status(api_manager, client, namespace, status).await
}

/// Update status to Failed
pub async fn update_status_failed(
    api_manager: &APIManager,
    client: &Client,
    namespace: &str,
    error_message: &str,
) -> Result<()> {
    if !needs_update(api_manager, "Failed", error_message) {
        return Ok(());
    }

    patch_status(
        api_manager,
        client,
        namespace,
        failed_status(api_manager, error_message),
    )
    .await
}

async fn patch_status(api_manager: &APIManager, client: &Client, namespace: &str, status: Value) -> Result<()> {
    let api: Api<APIManager> = Api::namespaced(client.clone(), namespace);

    api.patch_status(
        &api_manager.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(status),
    )
    .await?;

    Ok(())
}
