//! OpenShift ImageStream type
//!
//! The ImageStream CRD is installed by the platform, not by this operator.
//! Only the subset of fields the operator writes is modelled; `crdgen` never
//! emits it.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ImageStream specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    plural = "imagestreams",
    singular = "imagestream",
    shortname = "is",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    /// Local name lookup policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_policy: Option<ImageLookupPolicy>,

    /// Tags tracked by this stream
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagReference>,
}

/// Image lookup policy
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageLookupPolicy {
    pub local: bool,
}

/// A named tag pointing at an image source
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    /// Tag name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Image the tag tracks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ImageSourceReference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_policy: Option<TagImportPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_policy: Option<TagReferencePolicy>,
}

/// Reference to the source of a tag (usually `DockerImage`)
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSourceReference {
    pub kind: String,
    pub name: String,
}

/// Tag import policy
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagImportPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<bool>,
}

/// Tag reference policy (`Source` or `Local`)
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagReferencePolicy {
    #[serde(rename = "type")]
    pub type_: String,
}
