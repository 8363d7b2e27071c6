//! Custom Resource Definitions used by the APIManager operator

mod api_manager;
mod image_stream;

pub use api_manager::*;
pub use image_stream::*;

use kube::CustomResourceExt;

/// Generate the CRD YAML manifests owned by this operator
///
/// ImageStream is provided by the platform and is not included.
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&APIManager::crd())?])
}
