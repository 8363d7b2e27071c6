//! Redis options adapter
//!
//! Converts the APIManager spec into the read-only options consumed by the
//! Redis descriptor builder. Options are derived once per reconcile pass.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;

use crate::component::RedisRole;
use crate::crd::{APIManager, RedisComponentSpec, ResourceRequirementsSpec};
use crate::error::{Error, Result};

/// Redis image used when the spec does not name one
pub const DEFAULT_REDIS_IMAGE: &str = "quay.io/fedora/redis-6:latest";

/// Data volume size used when the spec does not name one
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

/// Options for the whole Redis resource group
#[derive(Debug, Clone, PartialEq)]
pub struct RedisOptions {
    /// Namespace all descriptors live in
    pub namespace: String,
    /// Value of the `app` label
    pub app_label: String,
    /// Import image stream tags from insecure registries
    pub insecure_import_policy: bool,
    /// Backend role options
    pub backend: RedisRoleOptions,
    /// System role options
    pub system: RedisRoleOptions,
}

impl RedisOptions {
    /// Options of a single role
    pub fn role(&self, role: RedisRole) -> &RedisRoleOptions {
        match role {
            RedisRole::Backend => &self.backend,
            RedisRole::System => &self.system,
        }
    }
}

/// Options for one Redis role
#[derive(Debug, Clone, PartialEq)]
pub struct RedisRoleOptions {
    pub image: String,
    pub storage_class_name: Option<String>,
    pub storage_size: String,
    pub resources: Option<ResourceRequirements>,
    pub node_selector: Option<BTreeMap<String, String>>,
    pub priority_class_name: Option<String>,
}

/// Derives [`RedisOptions`] from an APIManager
pub struct RedisOptionsProvider<'a> {
    api_manager: &'a APIManager,
}

impl<'a> RedisOptionsProvider<'a> {
    pub fn new(api_manager: &'a APIManager) -> Self {
        Self { api_manager }
    }

    /// Build the options for this pass
    pub fn redis_options(&self) -> Result<RedisOptions> {
        let namespace = self.api_manager.namespace().ok_or_else(|| {
            Error::config(format!(
                "APIManager '{}' has no namespace",
                self.api_manager.name_any()
            ))
        })?;

        let spec = &self.api_manager.spec;

        Ok(RedisOptions {
            namespace,
            app_label: spec.app_label.clone(),
            insecure_import_policy: spec.image_stream_tag_import_insecure,
            backend: role_options(
                RedisRole::Backend,
                spec.backend_redis.as_ref(),
                spec.resource_requirements_enabled,
            ),
            system: role_options(
                RedisRole::System,
                spec.system_redis.as_ref(),
                spec.resource_requirements_enabled,
            ),
        })
    }
}

fn role_options(
    role: RedisRole,
    spec: Option<&RedisComponentSpec>,
    resource_requirements_enabled: bool,
) -> RedisRoleOptions {
    let spec = spec.cloned().unwrap_or_default();

    let resources = if !resource_requirements_enabled {
        None
    } else {
        Some(
            spec.resources
                .as_ref()
                .map(build_resource_requirements)
                .unwrap_or_else(|| default_resource_requirements(role)),
        )
    };

    RedisRoleOptions {
        image: spec
            .image
            .unwrap_or_else(|| DEFAULT_REDIS_IMAGE.to_string()),
        storage_class_name: spec.storage_class_name,
        storage_size: spec
            .storage_size
            .unwrap_or_else(|| DEFAULT_STORAGE_SIZE.to_string()),
        resources,
        node_selector: spec.node_selector,
        priority_class_name: spec.priority_class_name,
    }
}

fn build_resource_requirements(spec: &ResourceRequirementsSpec) -> ResourceRequirements {
    let to_quantities = |m: &BTreeMap<String, String>| {
        m.iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect::<BTreeMap<_, _>>()
    };

    ResourceRequirements {
        limits: spec.limits.as_ref().map(to_quantities),
        requests: spec.requests.as_ref().map(to_quantities),
        ..Default::default()
    }
}

/// Default compute resources of a Redis container
pub fn default_resource_requirements(role: RedisRole) -> ResourceRequirements {
    let (limit_cpu, request_cpu, request_memory) = match role {
        RedisRole::Backend => ("2", "1", "1Gi"),
        RedisRole::System => ("500m", "150m", "256Mi"),
    };

    ResourceRequirements {
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(limit_cpu.to_string())),
            ("memory".to_string(), Quantity("32Gi".to_string())),
        ])),
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(request_cpu.to_string())),
            ("memory".to_string(), Quantity(request_memory.to_string())),
        ])),
        ..Default::default()
    }
}
