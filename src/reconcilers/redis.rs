//! Redis resource-group reconciler
//!
//! One pass walks the nine Redis descriptors in a fixed order. Each resource
//! is first stamped with ownership metadata and then handed to the
//! reconciler of its kind. The first failure aborts the pass; resources
//! already applied stay applied and the next pass converges them.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::adapters::RedisOptionsProvider;
use crate::component::{DescriptorBuilder, DesiredObject, DesiredResource, RedisBundle, RedisRole};
use crate::crd::APIManager;
use crate::error::{Error, ReconcileStep, Result};
use crate::metrics;

use super::gate::ModeGate;
use super::kind::KindReconcilers;
use super::ownership::Ownership;

/// Outcome of a pass that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The mode gate switched the group off
    Skipped,
    /// Every resource was applied
    Reconciled { resources: usize },
}

/// Order in which the bundle is reconciled.
///
/// Storage is applied before the system Redis deployment that mounts it.
/// The order is a convention, not a dependency graph.
pub fn reconcile_order(bundle: RedisBundle) -> [DesiredResource; 9] {
    use RedisRole::{Backend, System};

    [
        DesiredResource::new(Backend, DesiredObject::Deployment(bundle.backend_deployment)),
        DesiredResource::new(Backend, DesiredObject::Service(bundle.backend_service)),
        DesiredResource::new(Backend, DesiredObject::ConfigMap(bundle.backend_config_map)),
        DesiredResource::new(Backend, DesiredObject::PersistentVolumeClaim(bundle.backend_pvc)),
        DesiredResource::new(Backend, DesiredObject::ImageStream(bundle.backend_image_stream)),
        DesiredResource::new(System, DesiredObject::PersistentVolumeClaim(bundle.system_pvc)),
        DesiredResource::new(System, DesiredObject::Deployment(bundle.system_deployment)),
        DesiredResource::new(System, DesiredObject::ImageStream(bundle.system_image_stream)),
        DesiredResource::new(System, DesiredObject::Service(bundle.system_service)),
    ]
}

/// Reconciles the Redis resources of one APIManager
pub struct RedisReconciler {
    api_manager: Arc<APIManager>,
    gate: Arc<dyn ModeGate>,
    builder: Arc<dyn DescriptorBuilder>,
    reconcilers: KindReconcilers,
}

impl RedisReconciler {
    pub fn new(
        api_manager: Arc<APIManager>,
        gate: Arc<dyn ModeGate>,
        builder: Arc<dyn DescriptorBuilder>,
        reconcilers: KindReconcilers,
    ) -> Self {
        Self {
            api_manager,
            gate,
            builder,
            reconcilers,
        }
    }

    /// Run one pass
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let name = self.api_manager.name_any();

        if !self.gate.should_reconcile(&self.api_manager.spec) {
            info!(apimanager = %name, "High availability enabled, skipping Redis");
            metrics::SKIPPED_PASSES.with_label_values(&["redis"]).inc();
            return Ok(ReconcileOutcome::Skipped);
        }

        let options = RedisOptionsProvider::new(&self.api_manager).redis_options()?;
        let bundle = self.builder.build(&options)?;
        let ownership = Ownership::new(&self.api_manager);

        let mut resources = 0;
        for desired in reconcile_order(bundle) {
            self.reconcile_resource(desired, &ownership).await?;
            resources += 1;
        }

        info!(apimanager = %name, resources, "Redis resources reconciled");
        Ok(ReconcileOutcome::Reconciled { resources })
    }

    async fn reconcile_resource(&self, desired: DesiredResource, ownership: &Ownership) -> Result<()> {
        let DesiredResource { role, mut object } = desired;
        let kind = object.kind();
        let name = object.name().to_string();

        let wrap = |step: ReconcileStep, source: Error| Error::Resource {
            role,
            kind,
            name: name.clone(),
            step,
            source: Box::new(source),
        };

        ownership
            .initialize_as_owned(object.metadata_mut())
            .map_err(|e| wrap(ReconcileStep::InitializeOwnership, e))?;

        debug!(role = %role, kind = %kind, name = %name, "Reconciling resource");

        match self.reconcilers.dispatch(object).await {
            Ok(()) => {
                metrics::RESOURCE_RECONCILES
                    .with_label_values(&[kind.as_str(), role.as_str(), "success"])
                    .inc();
                Ok(())
            }
            Err(e) => {
                warn!(role = %role, kind = %kind, name = %name, error = %e, "Resource reconcile failed");
                metrics::RESOURCE_RECONCILES
                    .with_label_values(&[kind.as_str(), role.as_str(), "failure"])
                    .inc();
                Err(wrap(ReconcileStep::Apply, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RedisOptionsProvider;
    use crate::component::{RedisBuilder, ResourceKind};

    #[test]
    fn order_covers_every_descriptor_once() {
        let mut apim = APIManager::new("apimanager", serde_json::from_str("{}").unwrap());
        apim.metadata.namespace = Some("3scale".to_string());
        let options = RedisOptionsProvider::new(&apim).redis_options().unwrap();
        let bundle = RedisBuilder.build(&options).unwrap();

        let order: Vec<(RedisRole, ResourceKind, String)> = reconcile_order(bundle)
            .into_iter()
            .map(|r| (r.role, r.object.kind(), r.object.name().to_string()))
            .collect();

        assert_eq!(
            order,
            vec![
                (RedisRole::Backend, ResourceKind::Deployment, "backend-redis".to_string()),
                (RedisRole::Backend, ResourceKind::Service, "backend-redis".to_string()),
                (RedisRole::Backend, ResourceKind::ConfigMap, "redis-config".to_string()),
                (RedisRole::Backend, ResourceKind::PersistentVolumeClaim, "backend-redis-storage".to_string()),
                (RedisRole::Backend, ResourceKind::ImageStream, "backend-redis".to_string()),
                (RedisRole::System, ResourceKind::PersistentVolumeClaim, "system-redis-storage".to_string()),
                (RedisRole::System, ResourceKind::Deployment, "system-redis".to_string()),
                (RedisRole::System, ResourceKind::ImageStream, "system-redis".to_string()),
                (RedisRole::System, ResourceKind::Service, "system-redis".to_string()),
            ]
        );
    }
}
