//! Per-kind reconcile contract and dispatch

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::Client;

use crate::component::{DesiredObject, ResourceKind};
use crate::crd::ImageStream;
use crate::error::Result;

use super::apply::ApiReconciler;
use super::mutators;

/// Drives the live object of one kind toward a desired descriptor.
///
/// Implementations create the object when absent and otherwise update only
/// the fields the operator owns. Calling `reconcile` twice with the same
/// descriptor and no outside drift must leave the same live state and must
/// not fail the second time.
#[async_trait]
pub trait KindReconciler<K>: Send + Sync {
    async fn reconcile(&self, desired: K) -> Result<()>;
}

/// One kind reconciler per managed resource kind
#[derive(Clone)]
pub struct KindReconcilers {
    pub deployments: Arc<dyn KindReconciler<Deployment>>,
    pub services: Arc<dyn KindReconciler<Service>>,
    pub config_maps: Arc<dyn KindReconciler<ConfigMap>>,
    pub persistent_volume_claims: Arc<dyn KindReconciler<PersistentVolumeClaim>>,
    pub image_streams: Arc<dyn KindReconciler<ImageStream>>,
}

impl KindReconcilers {
    /// API-server backed reconcilers for one namespace
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            deployments: Arc::new(ApiReconciler::namespaced(
                client.clone(),
                namespace,
                ResourceKind::Deployment,
                mutators::deployment,
            )),
            services: Arc::new(ApiReconciler::namespaced(
                client.clone(),
                namespace,
                ResourceKind::Service,
                mutators::service,
            )),
            config_maps: Arc::new(ApiReconciler::namespaced(
                client.clone(),
                namespace,
                ResourceKind::ConfigMap,
                mutators::config_map,
            )),
            persistent_volume_claims: Arc::new(ApiReconciler::namespaced(
                client.clone(),
                namespace,
                ResourceKind::PersistentVolumeClaim,
                mutators::persistent_volume_claim,
            )),
            image_streams: Arc::new(ApiReconciler::namespaced(
                client,
                namespace,
                ResourceKind::ImageStream,
                mutators::image_stream,
            )),
        }
    }

    /// Hand a desired object to the reconciler of its kind
    pub async fn dispatch(&self, object: DesiredObject) -> Result<()> {
        match object {
            DesiredObject::Deployment(o) => self.deployments.reconcile(o).await,
            DesiredObject::Service(o) => self.services.reconcile(o).await,
            DesiredObject::ConfigMap(o) => self.config_maps.reconcile(o).await,
            DesiredObject::PersistentVolumeClaim(o) => {
                self.persistent_volume_claims.reconcile(o).await
            }
            DesiredObject::ImageStream(o) => self.image_streams.reconcile(o).await,
        }
    }
}
