//! Integration tests for the Redis resource-group reconcile pass
//!
//! Kind reconcilers are replaced by in-process fakes so that the order,
//! fail-fast and ownership behavior of a pass can be observed directly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};

use apimanager_operator::adapters::RedisOptions;
use apimanager_operator::component::{
    DescriptorBuilder, RedisBuilder, RedisBundle, RedisRole, ResourceKind,
};
use apimanager_operator::crd::{APIManager, ImageStream};
use apimanager_operator::error::ReconcileStep;
use apimanager_operator::reconcilers::{
    mutators, HighAvailabilityGate, KindReconciler, KindReconcilers, Mutator, ReconcileOutcome,
    RedisReconciler,
};
use apimanager_operator::{Error, Result};

// ============================================================================
// Test Helpers
// ============================================================================

fn api_manager(spec: serde_json::Value) -> Arc<APIManager> {
    let mut apim = APIManager::new("apimanager", serde_json::from_value(spec).unwrap());
    apim.metadata.namespace = Some("3scale".to_string());
    apim.metadata.uid = Some("6a1f3c2e-apim".to_string());
    Arc::new(apim)
}

fn default_api_manager() -> Arc<APIManager> {
    api_manager(json!({}))
}

/// The nine resources of a pass, in the order they are reconciled
fn expected_order() -> Vec<(ResourceKind, &'static str)> {
    vec![
        (ResourceKind::Deployment, "backend-redis"),
        (ResourceKind::Service, "backend-redis"),
        (ResourceKind::ConfigMap, "redis-config"),
        (ResourceKind::PersistentVolumeClaim, "backend-redis-storage"),
        (ResourceKind::ImageStream, "backend-redis"),
        (ResourceKind::PersistentVolumeClaim, "system-redis-storage"),
        (ResourceKind::Deployment, "system-redis"),
        (ResourceKind::ImageStream, "system-redis"),
        (ResourceKind::Service, "system-redis"),
    ]
}

#[derive(Clone, Debug, PartialEq)]
struct Call {
    kind: ResourceKind,
    name: String,
    owned_by: Option<String>,
    labels: BTreeMap<String, String>,
}

/// Shared record of the descriptors handed to kind reconcilers
#[derive(Clone, Default)]
struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_on: Option<(ResourceKind, String)>,
}

impl Journal {
    fn failing_on(kind: ResourceKind, name: &str) -> Self {
        Self {
            fail_on: Some((kind, name.to_string())),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn visited(&self) -> Vec<(ResourceKind, String)> {
        self.calls()
            .into_iter()
            .map(|c| (c.kind, c.name))
            .collect()
    }

    fn reconcilers(&self) -> KindReconcilers {
        KindReconcilers {
            deployments: Arc::new(Recorder::new(ResourceKind::Deployment, self)),
            services: Arc::new(Recorder::new(ResourceKind::Service, self)),
            config_maps: Arc::new(Recorder::new(ResourceKind::ConfigMap, self)),
            persistent_volume_claims: Arc::new(Recorder::new(
                ResourceKind::PersistentVolumeClaim,
                self,
            )),
            image_streams: Arc::new(Recorder::new(ResourceKind::ImageStream, self)),
        }
    }
}

/// Kind reconciler that records every call and optionally refuses one object
struct Recorder {
    kind: ResourceKind,
    journal: Journal,
}

impl Recorder {
    fn new(kind: ResourceKind, journal: &Journal) -> Self {
        Self {
            kind,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl<K> KindReconciler<K> for Recorder
where
    K: Resource + Send + 'static,
{
    async fn reconcile(&self, desired: K) -> Result<()> {
        let meta = desired.meta();
        let name = meta.name.clone().unwrap_or_default();

        self.journal.calls.lock().unwrap().push(Call {
            kind: self.kind,
            name: name.clone(),
            owned_by: meta
                .owner_references
                .as_ref()
                .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
                .map(|r| r.uid.clone()),
            labels: meta.labels.clone().unwrap_or_default(),
        });

        if self.journal.fail_on.as_ref() == Some(&(self.kind, name.clone())) {
            return Err(Error::PermissionDenied(format!(
                "{} '{}' is forbidden",
                self.kind, name
            )));
        }

        Ok(())
    }
}

/// Stores an object the way the API server returns it: unset `false` flags
/// are dropped and quantities are rewritten in canonical form.
fn as_served<K: Serialize + DeserializeOwned>(object: &K) -> K {
    fn serve(value: Value) -> Option<Value> {
        match value {
            Value::Bool(false) => None,
            Value::String(s) => Some(Value::String(
                match s.as_str() {
                    "0.5" => "500m",
                    "1024Mi" => "1Gi",
                    "2048Mi" => "2Gi",
                    other => other,
                }
                .to_string(),
            )),
            Value::Object(map) => Some(Value::Object(
                map.into_iter()
                    .filter_map(|(k, v)| serve(v).map(|v| (k, v)))
                    .collect::<Map<String, Value>>(),
            )),
            Value::Array(items) => Some(Value::Array(items.into_iter().filter_map(serve).collect())),
            other => Some(other),
        }
    }

    let served = serve(serde_json::to_value(object).unwrap()).unwrap();
    serde_json::from_value(served).unwrap()
}

/// Kind reconciler backed by an in-memory object store and the real mutators
struct Store<K> {
    objects: Mutex<BTreeMap<String, K>>,
    mutate: Mutator<K>,
    writes: Arc<AtomicUsize>,
}

impl<K: Clone> Store<K> {
    fn new(mutate: Mutator<K>, writes: &Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(BTreeMap::new()),
            mutate,
            writes: writes.clone(),
        })
    }

    fn snapshot(&self) -> BTreeMap<String, K> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl<K> KindReconciler<K> for Store<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn reconcile(&self, desired: K) -> Result<()> {
        let name = desired.meta().name.clone().unwrap_or_default();
        let mut objects = self.objects.lock().unwrap();

        match objects.get_mut(&name) {
            None => {
                objects.insert(name, as_served(&desired));
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            Some(live) => {
                if (self.mutate)(live, &desired) {
                    *live = as_served(live);
                    self.writes.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        Ok(())
    }
}

/// A fake cluster holding one store per kind
struct Cluster {
    writes: Arc<AtomicUsize>,
    deployments: Arc<Store<Deployment>>,
    services: Arc<Store<Service>>,
    config_maps: Arc<Store<ConfigMap>>,
    persistent_volume_claims: Arc<Store<PersistentVolumeClaim>>,
    image_streams: Arc<Store<ImageStream>>,
}

impl Cluster {
    fn new() -> Self {
        let writes = Arc::new(AtomicUsize::new(0));
        Self {
            deployments: Store::new(mutators::deployment, &writes),
            services: Store::new(mutators::service, &writes),
            config_maps: Store::new(mutators::config_map, &writes),
            persistent_volume_claims: Store::new(mutators::persistent_volume_claim, &writes),
            image_streams: Store::new(mutators::image_stream, &writes),
            writes,
        }
    }

    fn reconcilers(&self) -> KindReconcilers {
        KindReconcilers {
            deployments: self.deployments.clone(),
            services: self.services.clone(),
            config_maps: self.config_maps.clone(),
            persistent_volume_claims: self.persistent_volume_claims.clone(),
            image_streams: self.image_streams.clone(),
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn object_count(&self) -> usize {
        self.deployments.snapshot().len()
            + self.services.snapshot().len()
            + self.config_maps.snapshot().len()
            + self.persistent_volume_claims.snapshot().len()
            + self.image_streams.snapshot().len()
    }
}

/// Builder wrapper counting how often descriptors are built
#[derive(Default)]
struct CountingBuilder {
    builds: AtomicUsize,
}

impl CountingBuilder {
    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl DescriptorBuilder for CountingBuilder {
    fn build(&self, options: &RedisOptions) -> Result<RedisBundle> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        RedisBuilder.build(options)
    }
}

fn reconciler(apim: Arc<APIManager>, reconcilers: KindReconcilers) -> RedisReconciler {
    RedisReconciler::new(
        apim,
        Arc::new(HighAvailabilityGate),
        Arc::new(RedisBuilder),
        reconcilers,
    )
}

// ============================================================================
// Successful Passes
// ============================================================================

#[test]
fn all_resources_reconciled_in_fixed_order() {
    let journal = Journal::default();
    let outcome = tokio_test::block_on(
        reconciler(default_api_manager(), journal.reconcilers()).reconcile(),
    )
    .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Reconciled { resources: 9 });

    let expected: Vec<(ResourceKind, String)> = expected_order()
        .into_iter()
        .map(|(kind, name)| (kind, name.to_string()))
        .collect();
    assert_eq!(journal.visited(), expected);
}

#[test]
fn every_descriptor_is_owned_before_it_is_reconciled() {
    let journal = Journal::default();
    tokio_test::block_on(reconciler(default_api_manager(), journal.reconcilers()).reconcile())
        .unwrap();

    let calls = journal.calls();
    assert_eq!(calls.len(), 9);
    for call in calls {
        assert_eq!(
            call.owned_by.as_deref(),
            Some("6a1f3c2e-apim"),
            "{} '{}' reached its reconciler without an owner",
            call.kind,
            call.name
        );
        assert_eq!(
            call.labels.get("app").map(String::as_str),
            Some("3scale-api-management")
        );
        assert_eq!(
            call.labels.get("app.kubernetes.io/managed-by").map(String::as_str),
            Some("apimanager-operator")
        );
    }
}

#[test]
fn custom_app_label_is_stamped_on_every_resource() {
    let journal = Journal::default();
    let apim = api_manager(json!({ "appLabel": "my-3scale" }));
    tokio_test::block_on(reconciler(apim, journal.reconcilers()).reconcile()).unwrap();

    assert!(journal
        .calls()
        .iter()
        .all(|c| c.labels.get("app").map(String::as_str) == Some("my-3scale")));
}

#[test]
fn second_pass_without_drift_writes_nothing() {
    let cluster = Cluster::new();
    let apim = default_api_manager();

    let first = tokio_test::block_on(reconciler(apim.clone(), cluster.reconcilers()).reconcile());
    assert_eq!(first.unwrap(), ReconcileOutcome::Reconciled { resources: 9 });
    assert_eq!(cluster.object_count(), 9);
    assert_eq!(cluster.writes(), 9);

    let deployments = cluster.deployments.snapshot();
    let services = cluster.services.snapshot();
    let config_maps = cluster.config_maps.snapshot();
    let pvcs = cluster.persistent_volume_claims.snapshot();
    let image_streams = cluster.image_streams.snapshot();

    let second = tokio_test::block_on(reconciler(apim, cluster.reconcilers()).reconcile());
    assert_eq!(second.unwrap(), ReconcileOutcome::Reconciled { resources: 9 });

    assert_eq!(cluster.writes(), 9);
    assert_eq!(cluster.deployments.snapshot(), deployments);
    assert_eq!(cluster.services.snapshot(), services);
    assert_eq!(cluster.config_maps.snapshot(), config_maps);
    assert_eq!(cluster.persistent_volume_claims.snapshot(), pvcs);
    assert_eq!(cluster.image_streams.snapshot(), image_streams);
}

#[test]
fn second_pass_with_user_quantities_writes_nothing() {
    let cluster = Cluster::new();
    let apim = api_manager(json!({
        "imageStreamTagImportInsecure": false,
        "backendRedis": {
            "resources": { "limits": { "cpu": "0.5", "memory": "2048Mi" } }
        },
        "systemRedis": {
            "resources": { "requests": { "cpu": "0.5", "memory": "1024Mi" } }
        }
    }));

    tokio_test::block_on(reconciler(apim.clone(), cluster.reconcilers()).reconcile()).unwrap();
    assert_eq!(cluster.writes(), 9);

    let deployments = cluster.deployments.snapshot();
    let pod = deployments["system-redis"].spec.clone().unwrap().template.spec.unwrap();
    let requests = pod.containers[0].resources.clone().unwrap().requests.unwrap();
    assert_eq!(requests["cpu"].0, "500m");

    tokio_test::block_on(reconciler(apim, cluster.reconcilers()).reconcile()).unwrap();
    assert_eq!(cluster.writes(), 9);
    assert_eq!(cluster.deployments.snapshot(), deployments);
}

#[test]
fn spec_change_converges_on_next_pass() {
    let cluster = Cluster::new();
    tokio_test::block_on(reconciler(default_api_manager(), cluster.reconcilers()).reconcile())
        .unwrap();

    let updated = api_manager(json!({
        "systemRedis": {
            "image": "registry.example.com/redis:6.2",
            "priorityClassName": "critical"
        }
    }));
    tokio_test::block_on(reconciler(updated, cluster.reconcilers()).reconcile()).unwrap();

    let deployments = cluster.deployments.snapshot();
    let pod = deployments["system-redis"].spec.clone().unwrap().template.spec.unwrap();
    assert_eq!(pod.priority_class_name.as_deref(), Some("critical"));

    // The image reaches the deployment through its image trigger.
    let image_streams = cluster.image_streams.snapshot();
    let from = image_streams["system-redis"].spec.tags[0].from.as_ref().unwrap();
    assert_eq!(from.name, "registry.example.com/redis:6.2");
    assert_eq!(cluster.object_count(), 9);
}

// ============================================================================
// Mode Gate
// ============================================================================

#[test]
fn high_availability_skips_the_whole_group() {
    let journal = Journal::default();
    let builder = Arc::new(CountingBuilder::default());
    let apim = api_manager(json!({ "highAvailability": { "enabled": true } }));

    let outcome = tokio_test::block_on(
        RedisReconciler::new(
            apim,
            Arc::new(HighAvailabilityGate),
            builder.clone(),
            journal.reconcilers(),
        )
        .reconcile(),
    )
    .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Skipped);
    assert_eq!(builder.builds(), 0);
    assert!(journal.calls().is_empty());
}

#[test]
fn high_availability_disabled_reconciles() {
    let journal = Journal::default();
    let apim = api_manager(json!({ "highAvailability": { "enabled": false } }));

    let outcome =
        tokio_test::block_on(reconciler(apim, journal.reconcilers()).reconcile()).unwrap();

    assert_eq!(outcome, ReconcileOutcome::Reconciled { resources: 9 });
    assert_eq!(journal.calls().len(), 9);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn builder_failure_reconciles_nothing() {
    let journal = Journal::default();
    let builder = Arc::new(CountingBuilder::default());
    let apim = api_manager(json!({ "backendRedis": { "image": "" } }));

    let err = tokio_test::block_on(
        RedisReconciler::new(
            apim,
            Arc::new(HighAvailabilityGate),
            builder.clone(),
            journal.reconcilers(),
        )
        .reconcile(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(err.to_string().contains("backend Redis image"));
    assert_eq!(builder.builds(), 1);
    assert!(journal.calls().is_empty());
}

#[test]
fn system_pvc_failure_stops_the_pass() {
    let journal = Journal::failing_on(ResourceKind::PersistentVolumeClaim, "system-redis-storage");

    let err = tokio_test::block_on(
        reconciler(default_api_manager(), journal.reconcilers()).reconcile(),
    )
    .unwrap_err();

    let visited = journal.visited();
    assert_eq!(visited.len(), 6);
    assert_eq!(
        visited.last(),
        Some(&(
            ResourceKind::PersistentVolumeClaim,
            "system-redis-storage".to_string()
        ))
    );
    for (kind, name) in &expected_order()[6..] {
        assert!(
            !visited.contains(&(*kind, name.to_string())),
            "{} '{}' was reconciled after the failure",
            kind,
            name
        );
    }

    match &err {
        Error::Resource {
            role,
            kind,
            name,
            step,
            ..
        } => {
            assert_eq!(*role, RedisRole::System);
            assert_eq!(*kind, ResourceKind::PersistentVolumeClaim);
            assert_eq!(name, "system-redis-storage");
            assert_eq!(*step, ReconcileStep::Apply);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(err.root(), Error::PermissionDenied(_)));
}

#[test]
fn failure_at_any_position_stops_after_it() {
    for (position, (kind, name)) in expected_order().into_iter().enumerate() {
        let journal = Journal::failing_on(kind, name);

        let result = tokio_test::block_on(
            reconciler(default_api_manager(), journal.reconcilers()).reconcile(),
        );

        assert!(result.is_err(), "failure on {} '{}' was swallowed", kind, name);
        assert_eq!(
            journal.calls().len(),
            position + 1,
            "wrong number of calls when {} '{}' fails",
            kind,
            name
        );
    }
}

#[test]
fn owner_without_uid_fails_before_any_apply() {
    let journal = Journal::default();
    let mut apim = APIManager::new("apimanager", serde_json::from_value(json!({})).unwrap());
    apim.metadata.namespace = Some("3scale".to_string());

    let err = tokio_test::block_on(reconciler(Arc::new(apim), journal.reconcilers()).reconcile())
        .unwrap_err();

    match &err {
        Error::Resource {
            kind, name, step, ..
        } => {
            assert_eq!(*kind, ResourceKind::Deployment);
            assert_eq!(name, "backend-redis");
            assert_eq!(*step, ReconcileStep::InitializeOwnership);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(err.root(), Error::Ownership(_)));
    assert!(journal.calls().is_empty());
}

/// Builder whose descriptor at one position of the pass has no name
struct NamelessAt(usize);

impl DescriptorBuilder for NamelessAt {
    fn build(&self, options: &RedisOptions) -> Result<RedisBundle> {
        let mut bundle = RedisBuilder.build(options)?;
        let meta = match self.0 {
            0 => &mut bundle.backend_deployment.metadata,
            1 => &mut bundle.backend_service.metadata,
            2 => &mut bundle.backend_config_map.metadata,
            3 => &mut bundle.backend_pvc.metadata,
            4 => &mut bundle.backend_image_stream.metadata,
            5 => &mut bundle.system_pvc.metadata,
            6 => &mut bundle.system_deployment.metadata,
            7 => &mut bundle.system_image_stream.metadata,
            _ => &mut bundle.system_service.metadata,
        };
        meta.name = None;
        Ok(bundle)
    }
}

#[test]
fn ownership_failure_keeps_earlier_resources_applied() {
    for (position, (kind, _)) in expected_order().into_iter().enumerate() {
        let cluster = Cluster::new();

        let err = tokio_test::block_on(
            RedisReconciler::new(
                default_api_manager(),
                Arc::new(HighAvailabilityGate),
                Arc::new(NamelessAt(position)),
                cluster.reconcilers(),
            )
            .reconcile(),
        )
        .unwrap_err();

        match &err {
            Error::Resource {
                kind: failed_kind,
                step,
                ..
            } => {
                assert_eq!(*failed_kind, kind);
                assert_eq!(*step, ReconcileStep::InitializeOwnership);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root(), Error::Ownership(_)));
        assert_eq!(cluster.writes(), position);
        assert_eq!(cluster.object_count(), position);
    }
}

#[test]
fn missing_namespace_is_a_config_error() {
    let journal = Journal::default();
    let mut apim = APIManager::new("apimanager", serde_json::from_value(json!({})).unwrap());
    apim.metadata.uid = Some("6a1f3c2e-apim".to_string());

    let err = tokio_test::block_on(reconciler(Arc::new(apim), journal.reconcilers()).reconcile())
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(journal.calls().is_empty());
}
