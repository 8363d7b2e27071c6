//! Field mutators used to reconcile live objects
//!
//! Each mutator copies the fields the operator owns from the desired
//! descriptor onto the live object and reports whether the live object
//! changed. Fields absent from the descriptor are left as they are.
//!
//! Comparisons follow what the API server hands back: quantities are
//! compared by value and unset flags equal `false`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PersistentVolumeClaim, ResourceRequirements, Service,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::component::IMAGE_TRIGGER_ANNOTATION;
use crate::crd::{ImageStream, TagImportPolicy};

fn sync<T: PartialEq + Clone>(live: &mut T, desired: &T) -> bool {
    if live != desired {
        *live = desired.clone();
        true
    } else {
        false
    }
}

fn merge_map(
    live: &mut Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return false;
    };

    let live = live.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (k, v) in desired {
        if live.get(k) != Some(v) {
            live.insert(k.clone(), v.clone());
            changed = true;
        }
    }
    changed
}

/// Exact value of a quantity in billionths of its unit.
///
/// Returns `None` for forms not handled here (exponents, sub-nano
/// precision), which are then compared as strings.
fn quantity_nanos(value: &str) -> Option<i128> {
    // (suffix, multiplier, divisor)
    const SUFFIXES: [(&str, i128, i128); 13] = [
        ("Ki", 1 << 10, 1),
        ("Mi", 1 << 20, 1),
        ("Gi", 1 << 30, 1),
        ("Ti", 1 << 40, 1),
        ("Pi", 1 << 50, 1),
        ("Ei", 1 << 60, 1),
        ("k", 1_000, 1),
        ("M", 1_000_000, 1),
        ("G", 1_000_000_000, 1),
        ("T", 1_000_000_000_000, 1),
        ("P", 1_000_000_000_000_000, 1),
        ("E", 1_000_000_000_000_000_000, 1),
        ("m", 1, 1_000),
    ];

    let value = value.trim();
    let (number, multiplier, divisor) = SUFFIXES
        .iter()
        .find_map(|(suffix, mul, div)| value.strip_suffix(*suffix).map(|n| (n, *mul, *div)))
        .unwrap_or((value, 1, 1));

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || frac_part.len() > 9
        || !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let int: i128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let frac: i128 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse::<i128>().ok()? * 10i128.pow(9 - frac_part.len() as u32)
    };

    let scaled = int
        .checked_mul(1_000_000_000)?
        .checked_add(frac)?
        .checked_mul(multiplier)?;
    (scaled % divisor == 0).then_some(scaled / divisor)
}

fn same_quantity(a: &Quantity, b: &Quantity) -> bool {
    match (quantity_nanos(&a.0), quantity_nanos(&b.0)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn same_quantities(
    a: &Option<BTreeMap<String, Quantity>>,
    b: &Option<BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let a = a.as_ref().unwrap_or(&empty);
    let b = b.as_ref().unwrap_or(&empty);

    a.len() == b.len()
        && a.iter()
            .all(|(k, v)| b.get(k).map(|other| same_quantity(v, other)).unwrap_or(false))
}

fn sync_resources(
    live: &mut Option<ResourceRequirements>,
    desired: &Option<ResourceRequirements>,
) -> bool {
    let empty = ResourceRequirements::default();
    let l = live.as_ref().unwrap_or(&empty);
    let d = desired.as_ref().unwrap_or(&empty);

    if same_quantities(&l.limits, &d.limits)
        && same_quantities(&l.requests, &d.requests)
        && l.claims.as_deref().unwrap_or_default() == d.claims.as_deref().unwrap_or_default()
    {
        false
    } else {
        *live = desired.clone();
        true
    }
}

fn sync_import_policy(live: &mut Option<TagImportPolicy>, desired: &Option<TagImportPolicy>) -> bool {
    let flags = |p: &Option<TagImportPolicy>| {
        p.as_ref()
            .map(|p| (p.insecure.unwrap_or(false), p.scheduled.unwrap_or(false)))
            .unwrap_or((false, false))
    };

    if flags(&*live) == flags(desired) {
        false
    } else {
        *live = desired.clone();
        true
    }
}

/// Labels, annotations and owner references
pub fn metadata(live: &mut ObjectMeta, desired: &ObjectMeta) -> bool {
    let mut changed = merge_map(&mut live.labels, &desired.labels);
    changed |= merge_map(&mut live.annotations, &desired.annotations);

    if let Some(desired_refs) = &desired.owner_references {
        let live_refs = live.owner_references.get_or_insert_with(Vec::new);
        for r in desired_refs {
            if !live_refs.iter().any(|l| l.uid == r.uid) {
                live_refs.push(r.clone());
                changed = true;
            }
        }
    }

    changed
}

/// With `image_triggered` set the image belongs to the image trigger and is
/// only written when the container is created.
fn container(live: &mut Container, desired: &Container, image_triggered: bool) -> bool {
    let mut changed = !image_triggered && sync(&mut live.image, &desired.image);
    changed |= sync(&mut live.image_pull_policy, &desired.image_pull_policy);
    changed |= sync(&mut live.command, &desired.command);
    changed |= sync(&mut live.args, &desired.args);
    changed |= sync(&mut live.env, &desired.env);
    changed |= sync(&mut live.ports, &desired.ports);
    changed |= sync_resources(&mut live.resources, &desired.resources);
    changed |= sync(&mut live.volume_mounts, &desired.volume_mounts);
    changed |= sync(&mut live.liveness_probe, &desired.liveness_probe);
    changed |= sync(&mut live.readiness_probe, &desired.readiness_probe);
    changed
}

/// Replicas, strategy, pod labels, containers, volumes and scheduling.
///
/// Container images of a deployment carrying an image trigger are left to
/// the trigger controller, which resolves them from the image stream.
pub fn deployment(live: &mut Deployment, desired: &Deployment) -> bool {
    let mut changed = metadata(&mut live.metadata, &desired.metadata);
    let image_triggered = desired
        .metadata
        .annotations
        .as_ref()
        .map(|a| a.contains_key(IMAGE_TRIGGER_ANNOTATION))
        .unwrap_or(false);

    let Some(desired_spec) = &desired.spec else {
        return changed;
    };
    let spec = live.spec.get_or_insert_with(Default::default);

    changed |= sync(&mut spec.replicas, &desired_spec.replicas);

    let desired_strategy = desired_spec.strategy.as_ref().and_then(|s| s.type_.as_ref());
    let live_strategy = spec.strategy.as_ref().and_then(|s| s.type_.as_ref());
    if desired_strategy.is_some() && desired_strategy != live_strategy {
        spec.strategy = desired_spec.strategy.clone();
        changed = true;
    }

    if let Some(desired_meta) = &desired_spec.template.metadata {
        let meta = spec.template.metadata.get_or_insert_with(Default::default);
        changed |= merge_map(&mut meta.labels, &desired_meta.labels);
        changed |= merge_map(&mut meta.annotations, &desired_meta.annotations);
    }

    if let Some(desired_pod) = &desired_spec.template.spec {
        let pod = spec.template.spec.get_or_insert_with(Default::default);

        for desired_container in &desired_pod.containers {
            match pod
                .containers
                .iter_mut()
                .find(|c| c.name == desired_container.name)
            {
                Some(live_container) => {
                    changed |= container(live_container, desired_container, image_triggered);
                }
                None => {
                    pod.containers.push(desired_container.clone());
                    changed = true;
                }
            }
        }

        changed |= sync(&mut pod.volumes, &desired_pod.volumes);
        changed |= sync(&mut pod.node_selector, &desired_pod.node_selector);
        changed |= sync(&mut pod.priority_class_name, &desired_pod.priority_class_name);
    }

    changed
}

/// Ports and selector; cluster IPs and other allocated fields are kept
pub fn service(live: &mut Service, desired: &Service) -> bool {
    let mut changed = metadata(&mut live.metadata, &desired.metadata);

    if let Some(desired_spec) = &desired.spec {
        let spec = live.spec.get_or_insert_with(Default::default);
        changed |= sync(&mut spec.ports, &desired_spec.ports);
        changed |= sync(&mut spec.selector, &desired_spec.selector);
    }

    changed
}

/// Data entries
pub fn config_map(live: &mut ConfigMap, desired: &ConfigMap) -> bool {
    let mut changed = metadata(&mut live.metadata, &desired.metadata);
    changed |= sync(&mut live.data, &desired.data);
    changed
}

/// Metadata only: a bound claim's spec cannot be changed in place
pub fn persistent_volume_claim(live: &mut PersistentVolumeClaim, desired: &PersistentVolumeClaim) -> bool {
    metadata(&mut live.metadata, &desired.metadata)
}

/// Tags upserted by name; tags added by others are kept
pub fn image_stream(live: &mut ImageStream, desired: &ImageStream) -> bool {
    let mut changed = metadata(&mut live.metadata, &desired.metadata);

    for desired_tag in &desired.spec.tags {
        match live.spec.tags.iter_mut().find(|t| t.name == desired_tag.name) {
            Some(tag) => {
                changed |= sync(&mut tag.from, &desired_tag.from);
                changed |= sync_import_policy(&mut tag.import_policy, &desired_tag.import_policy);
                changed |= sync(&mut tag.reference_policy, &desired_tag.reference_policy);
                changed |= merge_map(&mut tag.annotations, &desired_tag.annotations);
            }
            None => {
                live.spec.tags.push(desired_tag.clone());
                changed = true;
            }
        }
    }

    changed
}
