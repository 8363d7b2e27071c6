//! Desired-state descriptors for the Redis resource group
//!
//! A descriptor is an immutable value describing the target shape of one
//! cluster object. Descriptors are rebuilt from the current options on every
//! pass and handed to exactly one kind reconciler.

mod redis;

pub use redis::*;

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::adapters::RedisOptions;
use crate::crd::ImageStream;
use crate::error::Result;

/// Managed Redis role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RedisRole {
    Backend,
    System,
}

impl RedisRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisRole::Backend => "backend",
            RedisRole::System => "system",
        }
    }
}

impl fmt::Display for RedisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a managed cluster object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    Service,
    ConfigMap,
    PersistentVolumeClaim,
    ImageStream,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::ImageStream => "ImageStream",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A desired object of one of the managed kinds
#[derive(Clone, Debug, PartialEq)]
pub enum DesiredObject {
    Deployment(Deployment),
    Service(Service),
    ConfigMap(ConfigMap),
    PersistentVolumeClaim(PersistentVolumeClaim),
    ImageStream(ImageStream),
}

impl DesiredObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DesiredObject::Deployment(_) => ResourceKind::Deployment,
            DesiredObject::Service(_) => ResourceKind::Service,
            DesiredObject::ConfigMap(_) => ResourceKind::ConfigMap,
            DesiredObject::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            DesiredObject::ImageStream(_) => ResourceKind::ImageStream,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            DesiredObject::Deployment(o) => &o.metadata,
            DesiredObject::Service(o) => &o.metadata,
            DesiredObject::ConfigMap(o) => &o.metadata,
            DesiredObject::PersistentVolumeClaim(o) => &o.metadata,
            DesiredObject::ImageStream(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            DesiredObject::Deployment(o) => &mut o.metadata,
            DesiredObject::Service(o) => &mut o.metadata,
            DesiredObject::ConfigMap(o) => &mut o.metadata,
            DesiredObject::PersistentVolumeClaim(o) => &mut o.metadata,
            DesiredObject::ImageStream(o) => &mut o.metadata,
        }
    }

    /// Object name, empty when the descriptor carries none
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// A desired object tagged with the role it belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredResource {
    pub role: RedisRole,
    pub object: DesiredObject,
}

impl DesiredResource {
    pub fn new(role: RedisRole, object: DesiredObject) -> Self {
        Self { role, object }
    }
}

/// The nine descriptors of one Redis pass
#[derive(Clone, Debug, PartialEq)]
pub struct RedisBundle {
    pub backend_deployment: Deployment,
    pub backend_service: Service,
    pub backend_config_map: ConfigMap,
    pub backend_pvc: PersistentVolumeClaim,
    pub backend_image_stream: ImageStream,
    pub system_deployment: Deployment,
    pub system_pvc: PersistentVolumeClaim,
    pub system_image_stream: ImageStream,
    pub system_service: Service,
}

/// Turns reconcile options into desired-state descriptors
///
/// Implementations must be deterministic for a given options value.
pub trait DescriptorBuilder: Send + Sync {
    fn build(&self, options: &RedisOptions) -> Result<RedisBundle>;
}
