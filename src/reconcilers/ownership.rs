//! Ownership initialization
//!
//! Every desired descriptor is stamped with the APIManager's controller
//! owner reference and the standard labels before it reaches its kind
//! reconciler, so the cluster garbage-collects it together with its owner.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::APIManager;
use crate::error::{Error, Result};

/// Value of the `app.kubernetes.io/managed-by` label
pub const MANAGED_BY: &str = "apimanager-operator";

/// Ownership metadata derived from one APIManager
#[derive(Debug, Clone)]
pub struct Ownership {
    owner: Option<OwnerReference>,
    owner_name: String,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
}

impl Ownership {
    pub fn new(api_manager: &APIManager) -> Self {
        let labels = BTreeMap::from([
            ("app".to_string(), api_manager.spec.app_label.clone()),
            (
                "app.kubernetes.io/managed-by".to_string(),
                MANAGED_BY.to_string(),
            ),
        ]);

        Self {
            owner: api_manager.controller_owner_ref(&()),
            owner_name: api_manager.name_any(),
            namespace: api_manager.namespace(),
            labels,
        }
    }

    /// The controller reference stamped on owned objects, if the owner is valid
    pub fn owner_reference(&self) -> Option<&OwnerReference> {
        self.owner.as_ref()
    }

    /// Stamp owner reference, namespace and labels onto a descriptor.
    ///
    /// Applying it again to an already stamped descriptor changes nothing.
    pub fn initialize_as_owned(&self, meta: &mut ObjectMeta) -> Result<()> {
        let name = meta
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::ownership("descriptor has no name"))?;

        let owner = self.owner.as_ref().ok_or_else(|| {
            Error::ownership(format!(
                "owner APIManager '{}' has no name or uid",
                self.owner_name
            ))
        })?;

        let namespace = self.namespace.as_ref().ok_or_else(|| {
            Error::ownership(format!(
                "owner APIManager '{}' has no namespace",
                self.owner_name
            ))
        })?;

        match &meta.namespace {
            Some(ns) if ns != namespace => {
                return Err(Error::ownership(format!(
                    "'{}' is in namespace '{}' but its owner is in '{}'",
                    name, ns, namespace
                )));
            }
            Some(_) => {}
            None => meta.namespace = Some(namespace.clone()),
        }

        let refs = meta.owner_references.get_or_insert_with(Vec::new);

        if let Some(other) = refs
            .iter()
            .find(|r| r.controller == Some(true) && r.uid != owner.uid)
        {
            return Err(Error::ownership(format!(
                "'{}' is already controlled by {} '{}'",
                name, other.kind, other.name
            )));
        }

        if !refs.iter().any(|r| r.uid == owner.uid) {
            refs.push(owner.clone());
        }

        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(self.labels.clone());

        Ok(())
    }
}
