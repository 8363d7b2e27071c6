//! APIManager Custom Resource Definition

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// APIManager resource specification
///
/// Only the fields consumed by the Redis reconciler are modelled here.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apps.3scale.net",
    version = "v1alpha1",
    kind = "APIManager",
    plural = "apimanagers",
    singular = "apimanager",
    shortname = "apim",
    namespaced,
    status = "APIManagerStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Resources", "type": "integer", "jsonPath": ".status.reconciledResources"}"#,
    printcolumn = r#"{"name": "HA", "type": "boolean", "jsonPath": ".spec.highAvailability.enabled"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct APIManagerSpec {
    /// Value of the `app` label stamped on every managed object
    #[serde(default = "default_app_label")]
    pub app_label: String,

    /// Allow image streams to import from insecure registries
    #[serde(default)]
    pub image_stream_tag_import_insecure: bool,

    /// Apply default compute resource requirements when none are given
    #[serde(default = "default_true")]
    pub resource_requirements_enabled: bool,

    /// External high-availability databases. When enabled, Redis is not
    /// deployed by the operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailabilitySpec>,

    /// Backend Redis configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_redis: Option<RedisComponentSpec>,

    /// System Redis configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_redis: Option<RedisComponentSpec>,
}

fn default_app_label() -> String {
    "3scale-api-management".to_string()
}

fn default_true() -> bool {
    true
}

impl APIManagerSpec {
    /// Whether the external high-availability mode is switched on
    pub fn high_availability_enabled(&self) -> bool {
        self.high_availability
            .as_ref()
            .map(|ha| ha.enabled)
            .unwrap_or(false)
    }
}

/// High-availability mode
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailabilitySpec {
    #[serde(default)]
    pub enabled: bool,
}

/// Per-role Redis settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisComponentSpec {
    /// Redis container image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Storage class for the data volume claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Requested size of the data volume (e.g. "1Gi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,

    /// Compute resources of the Redis container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsSpec>,

    /// Node selector for the Redis pod
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Priority class of the Redis pod
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
}

/// Compute resource requirements
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, String>>,
}

/// APIManager status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct APIManagerStatus {
    /// Current phase (Ready, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of Redis resources applied by the last successful pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled_resources: Option<u32>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
