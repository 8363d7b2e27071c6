//! Redis component
//!
//! Builds the Deployment, Service, ConfigMap, PersistentVolumeClaim and
//! ImageStream descriptors of the backend and system Redis instances.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, ExecAction, KeyToPath,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec, TCPSocketAction,
    Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;

use crate::adapters::{RedisOptions, RedisRoleOptions};
use crate::crd::{
    ImageSourceReference, ImageStream, ImageStreamSpec, TagImportPolicy, TagReference,
    TagReferencePolicy,
};
use crate::error::{Error, Result};

use super::{DescriptorBuilder, RedisBundle, RedisRole};

/// Redis listening port
pub const REDIS_PORT: i32 = 6379;

/// Name of the config map holding `redis.conf`, shared by both roles
pub const REDIS_CONFIG_MAP_NAME: &str = "redis-config";

/// Tag tracked by the Redis image streams
pub const REDIS_IMAGE_TAG: &str = "latest";

/// Deployment annotation asking OpenShift to resolve container images from
/// an image stream tag
pub const IMAGE_TRIGGER_ANNOTATION: &str = "image.openshift.io/triggers";

const REDIS_CONFIG_KEY: &str = "redis.conf";
const REDIS_CONFIG_DIR: &str = "/etc/redis.d/";
const REDIS_DATA_DIR: &str = "/var/lib/redis/data";
const DATA_VOLUME: &str = "redis-storage";
const CONFIG_VOLUME: &str = "redis-config";

const REDIS_CONF: &str = r#"protected-mode no

port 6379

timeout 0
tcp-keepalive 300

daemonize no
supervised no

loglevel notice

databases 16

save 900 1
save 300 10
save 60 10000

stop-writes-on-bgsave-error yes

rdbcompression yes
rdbchecksum yes

dbfilename dump.rdb

replica-serve-stale-data yes
replica-read-only yes

repl-diskless-sync no
repl-disable-tcp-nodelay no

appendonly yes
appendfilename "appendonly.aof"
appendfsync everysec
no-appendfsync-on-rewrite no
auto-aof-rewrite-percentage 100
auto-aof-rewrite-min-size 64mb

lua-time-limit 5000

activerehashing no

aof-rewrite-incremental-fsync yes
dir /var/lib/redis/data
"#;

/// Deployment and Service name of a role (`backend-redis`, `system-redis`)
pub fn redis_name(role: RedisRole) -> String {
    format!("{}-redis", role)
}

/// PersistentVolumeClaim name of a role
pub fn redis_storage_name(role: RedisRole) -> String {
    format!("{}-redis-storage", role)
}

/// Default [`DescriptorBuilder`]: validates options and builds the Redis bundle
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisBuilder;

impl DescriptorBuilder for RedisBuilder {
    fn build(&self, options: &RedisOptions) -> Result<RedisBundle> {
        validate(options)?;
        Ok(Redis::new(options).bundle())
    }
}

/// Check that options can produce a valid bundle
pub fn validate(options: &RedisOptions) -> Result<()> {
    if options.namespace.trim().is_empty() {
        return Err(Error::validation("Namespace must not be empty"));
    }

    if options.app_label.trim().is_empty() {
        return Err(Error::validation("App label must not be empty"));
    }

    for role in [RedisRole::Backend, RedisRole::System] {
        let opts = options.role(role);

        if opts.image.trim().is_empty() {
            return Err(Error::validation(format!("{} Redis image must not be empty", role)));
        }

        if !is_valid_quantity(&opts.storage_size) {
            return Err(Error::validation(format!(
                "Invalid {} Redis storage size '{}'",
                role, opts.storage_size
            )));
        }

        if let Some(class) = &opts.storage_class_name {
            if class.trim().is_empty() {
                return Err(Error::validation(format!(
                    "{} Redis storage class name must not be empty when set",
                    role
                )));
            }
        }
    }

    Ok(())
}

/// Accepts a decimal number followed by an optional Kubernetes quantity suffix
fn is_valid_quantity(value: &str) -> bool {
    const SUFFIXES: [&str; 13] = [
        "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E", "m",
    ];

    let number = SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(*suffix))
        .unwrap_or(value);

    !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit() || c == '.')
        && number.parse::<f64>().map(|n| n > 0.0).unwrap_or(false)
}

/// Redis descriptor factory for one set of options
pub struct Redis<'a> {
    options: &'a RedisOptions,
}

impl<'a> Redis<'a> {
    pub fn new(options: &'a RedisOptions) -> Self {
        Self { options }
    }

    /// All nine descriptors
    pub fn bundle(&self) -> RedisBundle {
        RedisBundle {
            backend_deployment: self.deployment(RedisRole::Backend),
            backend_service: self.service(RedisRole::Backend),
            backend_config_map: self.config_map(),
            backend_pvc: self.persistent_volume_claim(RedisRole::Backend),
            backend_image_stream: self.image_stream(RedisRole::Backend),
            system_deployment: self.deployment(RedisRole::System),
            system_pvc: self.persistent_volume_claim(RedisRole::System),
            system_image_stream: self.image_stream(RedisRole::System),
            system_service: self.service(RedisRole::System),
        }
    }

    fn labels(&self, role: RedisRole) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.options.app_label.clone()),
            ("app.kubernetes.io/name".to_string(), "redis".to_string()),
            ("app.kubernetes.io/component".to_string(), role.to_string()),
        ])
    }

    fn selector(role: RedisRole) -> BTreeMap<String, String> {
        BTreeMap::from([("deployment".to_string(), redis_name(role))])
    }

    fn metadata(&self, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.options.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        }
    }

    pub fn deployment(&self, role: RedisRole) -> Deployment {
        let name = redis_name(role);
        let opts = self.options.role(role);

        let mut pod_labels = self.labels(role);
        pod_labels.extend(Self::selector(role));

        let trigger = json!([{
            "from": {
                "kind": "ImageStreamTag",
                "name": format!("{}:{}", name, REDIS_IMAGE_TAG),
            },
            "fieldPath": format!("spec.template.spec.containers[?(@.name==\"{}\")].image", name),
        }]);

        let mut metadata = self.metadata(name.clone(), self.labels(role));
        metadata.annotations = Some(BTreeMap::from([(
            IMAGE_TRIGGER_ANNOTATION.to_string(),
            trigger.to_string(),
        )]));

        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(Self::selector(role)),
                    ..Default::default()
                },
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    ..Default::default()
                }),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Self::container(&name, opts)],
                        volumes: Some(Self::volumes(role)),
                        node_selector: opts.node_selector.clone(),
                        priority_class_name: opts.priority_class_name.clone(),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn container(name: &str, opts: &RedisRoleOptions) -> Container {
        Container {
            name: name.to_string(),
            image: Some(opts.image.clone()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: Some(vec!["redis-server".to_string()]),
            args: Some(vec![
                format!("{}{}", REDIS_CONFIG_DIR, REDIS_CONFIG_KEY),
                "--daemonize".to_string(),
                "no".to_string(),
            ]),
            ports: Some(vec![ContainerPort {
                name: Some("redis".to_string()),
                container_port: REDIS_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            resources: opts.resources.clone(),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: DATA_VOLUME.to_string(),
                    mount_path: REDIS_DATA_DIR.to_string(),
                    ..Default::default()
                },
                VolumeMount {
                    name: CONFIG_VOLUME.to_string(),
                    mount_path: REDIS_CONFIG_DIR.to_string(),
                    ..Default::default()
                },
            ]),
            liveness_probe: Some(Probe {
                tcp_socket: Some(TCPSocketAction {
                    port: IntOrString::Int(REDIS_PORT),
                    ..Default::default()
                }),
                initial_delay_seconds: Some(10),
                period_seconds: Some(10),
                timeout_seconds: Some(1),
                success_threshold: Some(1),
                failure_threshold: Some(3),
                ..Default::default()
            }),
            readiness_probe: Some(Probe {
                exec: Some(ExecAction {
                    command: Some(vec!["redis-cli".to_string(), "ping".to_string()]),
                }),
                initial_delay_seconds: Some(30),
                period_seconds: Some(30),
                timeout_seconds: Some(5),
                success_threshold: Some(1),
                failure_threshold: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn volumes(role: RedisRole) -> Vec<Volume> {
        vec![
            Volume {
                name: DATA_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: redis_storage_name(role),
                    read_only: None,
                }),
                ..Default::default()
            },
            Volume {
                name: CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: REDIS_CONFIG_MAP_NAME.to_string(),
                    items: Some(vec![KeyToPath {
                        key: REDIS_CONFIG_KEY.to_string(),
                        path: REDIS_CONFIG_KEY.to_string(),
                        ..Default::default()
                    }]),
                    default_mode: Some(0o644),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]
    }

    pub fn service(&self, role: RedisRole) -> Service {
        Service {
            metadata: self.metadata(redis_name(role), self.labels(role)),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(Self::selector(role)),
                ports: Some(vec![ServicePort {
                    name: Some("redis".to_string()),
                    port: REDIS_PORT,
                    target_port: Some(IntOrString::Int(REDIS_PORT)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn config_map(&self) -> ConfigMap {
        let mut labels = self.labels(RedisRole::Backend);
        labels.insert(
            "app.kubernetes.io/component".to_string(),
            "redis-config".to_string(),
        );

        ConfigMap {
            metadata: self.metadata(REDIS_CONFIG_MAP_NAME.to_string(), labels),
            data: Some(BTreeMap::from([(
                REDIS_CONFIG_KEY.to_string(),
                REDIS_CONF.to_string(),
            )])),
            ..Default::default()
        }
    }

    pub fn persistent_volume_claim(&self, role: RedisRole) -> PersistentVolumeClaim {
        let opts = self.options.role(role);

        PersistentVolumeClaim {
            metadata: self.metadata(redis_storage_name(role), self.labels(role)),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: opts.storage_class_name.clone(),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(opts.storage_size.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn image_stream(&self, role: RedisRole) -> ImageStream {
        let opts = self.options.role(role);
        let display_name = match role {
            RedisRole::Backend => "Backend Redis",
            RedisRole::System => "System Redis",
        };

        let mut metadata = self.metadata(redis_name(role), self.labels(role));
        metadata.annotations = Some(BTreeMap::from([(
            "openshift.io/display-name".to_string(),
            display_name.to_string(),
        )]));

        let mut image_stream = ImageStream::new(
            &redis_name(role),
            ImageStreamSpec {
                lookup_policy: None,
                tags: vec![TagReference {
                    name: REDIS_IMAGE_TAG.to_string(),
                    annotations: Some(BTreeMap::from([(
                        "openshift.io/display-name".to_string(),
                        format!("{} ({})", display_name, REDIS_IMAGE_TAG),
                    )])),
                    from: Some(ImageSourceReference {
                        kind: "DockerImage".to_string(),
                        name: opts.image.clone(),
                    }),
                    import_policy: Some(TagImportPolicy {
                        insecure: self.options.insecure_import_policy.then_some(true),
                        scheduled: None,
                    }),
                    reference_policy: Some(TagReferencePolicy {
                        type_: "Source".to_string(),
                    }),
                }],
            },
        );
        image_stream.metadata = metadata;
        image_stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{default_resource_requirements, DEFAULT_REDIS_IMAGE};

    fn role_options(role: RedisRole) -> RedisRoleOptions {
        RedisRoleOptions {
            image: DEFAULT_REDIS_IMAGE.to_string(),
            storage_class_name: None,
            storage_size: "1Gi".to_string(),
            resources: Some(default_resource_requirements(role)),
            node_selector: None,
            priority_class_name: None,
        }
    }

    fn options() -> RedisOptions {
        RedisOptions {
            namespace: "3scale".to_string(),
            app_label: "3scale-api-management".to_string(),
            insecure_import_policy: false,
            backend: role_options(RedisRole::Backend),
            system: role_options(RedisRole::System),
        }
    }

    #[test]
    fn build_is_deterministic() {
        let opts = options();
        let first = RedisBuilder.build(&opts).unwrap();
        let second = RedisBuilder.build(&opts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn descriptors_are_named_per_role() {
        let bundle = RedisBuilder.build(&options()).unwrap();

        assert_eq!(bundle.backend_deployment.metadata.name.as_deref(), Some("backend-redis"));
        assert_eq!(bundle.system_service.metadata.name.as_deref(), Some("system-redis"));
        assert_eq!(
            bundle.backend_pvc.metadata.name.as_deref(),
            Some("backend-redis-storage")
        );
        assert_eq!(
            bundle.system_pvc.metadata.name.as_deref(),
            Some("system-redis-storage")
        );
        assert_eq!(
            bundle.backend_config_map.metadata.name.as_deref(),
            Some(REDIS_CONFIG_MAP_NAME)
        );
        assert_eq!(
            bundle.system_image_stream.metadata.name.as_deref(),
            Some("system-redis")
        );
        assert_eq!(
            bundle.backend_service.metadata.namespace.as_deref(),
            Some("3scale")
        );
    }

    #[test]
    fn deployment_mounts_its_own_claim_and_shared_config() {
        let deployment = Redis::new(&options()).deployment(RedisRole::System);
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        let volumes = pod.volumes.unwrap();

        let claim = volumes[0].persistent_volume_claim.as_ref().unwrap();
        assert_eq!(claim.claim_name, "system-redis-storage");

        let config = volumes[1].config_map.as_ref().unwrap();
        assert_eq!(config.name, REDIS_CONFIG_MAP_NAME);

        assert_eq!(pod.containers[0].image.as_deref(), Some(DEFAULT_REDIS_IMAGE));
    }

    #[test]
    fn service_selects_the_deployment_pods() {
        let opts = options();
        let redis = Redis::new(&opts);
        let service = redis.service(RedisRole::Backend);
        let deployment = redis.deployment(RedisRole::Backend);

        let selector = service.spec.unwrap().selector.unwrap();
        let pod_labels = deployment
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .labels
            .unwrap();
        for (k, v) in selector {
            assert_eq!(pod_labels.get(&k), Some(&v));
        }
    }

    #[test]
    fn image_stream_tracks_configured_image() {
        let mut opts = options();
        opts.insecure_import_policy = true;
        opts.backend.image = "registry.local/redis:7".to_string();

        let stream = Redis::new(&opts).image_stream(RedisRole::Backend);
        let tag = &stream.spec.tags[0];
        assert_eq!(tag.name, REDIS_IMAGE_TAG);
        assert_eq!(tag.from.as_ref().unwrap().name, "registry.local/redis:7");
        assert_eq!(tag.import_policy.as_ref().unwrap().insecure, Some(true));
    }

    #[test]
    fn unset_flags_are_omitted() {
        let opts = options();
        let redis = Redis::new(&opts);

        let deployment = redis.deployment(RedisRole::Backend);
        let volumes = deployment.spec.unwrap().template.spec.unwrap().volumes.unwrap();
        assert_eq!(volumes[0].persistent_volume_claim.as_ref().unwrap().read_only, None);

        let stream = redis.image_stream(RedisRole::Backend);
        assert_eq!(stream.spec.tags[0].import_policy.as_ref().unwrap().insecure, None);
    }

    #[test]
    fn empty_image_is_rejected() {
        let mut opts = options();
        opts.system.image = " ".to_string();

        let err = RedisBuilder.build(&opts).unwrap_err();
        assert!(err.to_string().contains("system Redis image"));
    }

    #[test]
    fn invalid_storage_size_is_rejected() {
        let mut opts = options();
        opts.backend.storage_size = "lots".to_string();

        let err = RedisBuilder.build(&opts).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn quantity_parsing() {
        assert!(is_valid_quantity("1Gi"));
        assert!(is_valid_quantity("512Mi"));
        assert!(is_valid_quantity("1.5G"));
        assert!(is_valid_quantity("100"));
        assert!(!is_valid_quantity(""));
        assert!(!is_valid_quantity("Gi"));
        assert!(!is_valid_quantity("-1Gi"));
        assert!(!is_valid_quantity("0"));
    }
}
