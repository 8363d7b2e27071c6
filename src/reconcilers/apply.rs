//! API-server backed kind reconciler
//!
//! Create-if-absent, update-if-drifted. Drift is decided by a per-kind
//! mutator that copies only operator-owned fields onto the live object, so
//! fields set by other actors (defaults, cluster IPs, volume bindings) are
//! left alone.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, PostParams},
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::component::ResourceKind;
use crate::error::{Error, Result};

use super::kind::KindReconciler;
use super::FIELD_MANAGER;

/// Copies owned fields from `desired` onto `live`; returns whether anything changed
pub type Mutator<K> = fn(live: &mut K, desired: &K) -> bool;

/// [`KindReconciler`] talking to the Kubernetes API
pub struct ApiReconciler<K> {
    api: Api<K>,
    kind: ResourceKind,
    mutate: Mutator<K>,
}

impl<K> ApiReconciler<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    pub fn namespaced(client: Client, namespace: &str, kind: ResourceKind, mutate: Mutator<K>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            kind,
            mutate,
        }
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Map API failures onto the operator's error taxonomy
pub fn classify_api_error(kind: ResourceKind, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 403 => {
            Error::PermissionDenied(format!("{} '{}': {}", kind, name, resp.message))
        }
        kube::Error::Api(resp) if resp.code == 409 => {
            Error::Conflict(format!("{} '{}': {}", kind, name, resp.message))
        }
        other => Error::Kube(other),
    }
}

#[async_trait]
impl<K> KindReconciler<K> for ApiReconciler<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn reconcile(&self, desired: K) -> Result<()> {
        let name = desired.name_any();

        let live = self
            .api
            .get_opt(&name)
            .await
            .map_err(|e| classify_api_error(self.kind, &name, e))?;

        match live {
            None => {
                info!(kind = %self.kind, name = %name, "Creating object");
                self.api
                    .create(&post_params(), &desired)
                    .await
                    .map_err(|e| classify_api_error(self.kind, &name, e))?;
            }
            Some(mut live) => {
                if (self.mutate)(&mut live, &desired) {
                    info!(kind = %self.kind, name = %name, "Updating drifted object");
                    self.api
                        .replace(&name, &post_params(), &live)
                        .await
                        .map_err(|e| classify_api_error(self.kind, &name, e))?;
                } else {
                    debug!(kind = %self.kind, name = %name, "Object up to date");
                }
            }
        }

        Ok(())
    }
}
