//! Gateway StatefulSet reconciliation
//!
//! One cycle per capability descriptor: reconcile custom properties, build
//! the desired StatefulSet, then converge the live object with exactly one
//! of create, delete (labels changed), update (hash changed) or nothing.
//! A deleted StatefulSet is recreated on the next cycle.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use meridian_capability::capability::CUSTOM_PROPERTIES_KEY;
use meridian_capability::k8s::StatefulSet;
use meridian_capability::CapabilityDescriptor;
use meridian_common::crd::{AgentFleet, ValueSource};
use meridian_common::kube_utils::{hash_str, SecretReader};
use meridian_common::{Error, LABEL_INSTANCE, LABEL_MODULE};
use tracing::{debug, info, warn};

use crate::builder::{DesiredStateBuilder, Mutator, ResourceMeta, ANNOTATION_TEMPLATE_HASH};
use crate::custom_properties::CustomPropertiesReconciler;
use crate::error::ActiveGateError;
use crate::store::{ServerVersion, VersionProbe, WorkloadStore};

/// Result of one reconcile cycle for a StatefulSet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// StatefulSet did not exist and was created
    Created,
    /// StatefulSet had outdated labels (or is no longer wanted) and was deleted
    Deleted,
    /// StatefulSet differed from the desired state and was replaced
    Updated,
    /// Nothing to do
    Unchanged,
}

impl ReconcileOutcome {
    /// Whether the cycle changed the cluster
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Drives gateway StatefulSets towards their desired state
pub struct StatefulSetReconciler {
    store: Arc<dyn WorkloadStore>,
    secrets: Arc<dyn SecretReader>,
    version_probe: Arc<dyn VersionProbe>,
    custom_properties: Arc<dyn CustomPropertiesReconciler>,
    mutators: Vec<Mutator>,
}

impl StatefulSetReconciler {
    /// Create a reconciler over the given collaborators
    pub fn new(
        store: Arc<dyn WorkloadStore>,
        secrets: Arc<dyn SecretReader>,
        version_probe: Arc<dyn VersionProbe>,
        custom_properties: Arc<dyn CustomPropertiesReconciler>,
    ) -> Self {
        Self {
            store,
            secrets,
            version_probe,
            custom_properties,
            mutators: Vec::new(),
        }
    }

    /// Register a mutator applied to every built StatefulSet before hashing
    pub fn with_mutator(mut self, mutator: Mutator) -> Self {
        self.mutators.push(mutator);
        self
    }

    /// Converge the StatefulSet of an enabled capability
    pub async fn reconcile(
        &self,
        fleet: &AgentFleet,
        capability: &CapabilityDescriptor,
    ) -> Result<ReconcileOutcome, ActiveGateError> {
        let meta = ResourceMeta::from_fleet(fleet)?;

        if let Some(cp) = capability.custom_properties() {
            let owner = owner_reference(fleet, &capability.workload_name(&meta.name))?;
            self.custom_properties
                .reconcile(
                    &owner,
                    &meta.namespace,
                    &capability.configuration.service_account_owner,
                    cp,
                )
                .await?;
        }

        let mut desired = self.build_desired(&meta, capability).await?;
        let owner = owner_reference(fleet, desired.name())?;
        desired.metadata.owner_references = vec![owner];

        let Some(live) = self.store.get(desired.namespace(), desired.name()).await? else {
            info!(
                statefulset = %desired.name(),
                module = %capability.module_name,
                "creating statefulset"
            );
            self.store.create(&desired).await?;
            return Ok(ReconcileOutcome::Created);
        };

        if live.metadata.labels != desired.metadata.labels {
            info!(statefulset = %live.name(), "deleting statefulset with outdated labels");
            self.store.delete(&live).await?;
            return Ok(ReconcileOutcome::Deleted);
        }

        if has_changed(&live, &desired) {
            info!(statefulset = %desired.name(), "updating statefulset");
            desired.metadata.resource_version = live.metadata.resource_version.clone();
            self.store.update(&desired).await?;
            return Ok(ReconcileOutcome::Updated);
        }

        debug!(statefulset = %desired.name(), "statefulset up to date");
        Ok(ReconcileOutcome::Unchanged)
    }

    /// Delete the StatefulSet of a capability that has been switched off
    ///
    /// Only objects carrying this fleet's instance and module labels are
    /// removed.
    pub async fn remove_disabled(
        &self,
        fleet: &AgentFleet,
        capability: &CapabilityDescriptor,
    ) -> Result<ReconcileOutcome, ActiveGateError> {
        let meta = ResourceMeta::from_fleet(fleet)?;
        let name = capability.workload_name(&meta.name);

        let Some(live) = self.store.get(&meta.namespace, &name).await? else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        let ours = live.metadata.labels.get(LABEL_INSTANCE) == Some(&meta.name)
            && live.metadata.labels.get(LABEL_MODULE) == Some(&capability.module_name);
        if !ours {
            debug!(statefulset = %name, "not deleting statefulset not managed for this fleet");
            return Ok(ReconcileOutcome::Unchanged);
        }

        info!(statefulset = %name, "deleting statefulset of disabled capability");
        self.store.delete(&live).await?;
        Ok(ReconcileOutcome::Deleted)
    }

    async fn build_desired(
        &self,
        meta: &ResourceMeta,
        capability: &CapabilityDescriptor,
    ) -> Result<StatefulSet, ActiveGateError> {
        let cp_hash = self
            .custom_properties_hash(&meta.namespace, capability.custom_properties())
            .await?;
        let version = self.kubernetes_version().await;

        let sts = DesiredStateBuilder::new(meta, capability, &cp_hash)
            .with_kubernetes_version(&version.major, &version.minor)
            .with_mutators(&self.mutators)
            .build()?;
        Ok(sts)
    }

    /// Hash of the custom properties the pods will mount; empty when none
    async fn custom_properties_hash(
        &self,
        namespace: &str,
        properties: Option<&ValueSource>,
    ) -> Result<String, Error> {
        let Some(properties) = properties else {
            return Ok(String::new());
        };
        let Some(secret) = properties.reference() else {
            return Ok(hash_str(&properties.value));
        };

        let data = self
            .secrets
            .get(secret, namespace)
            .await?
            .ok_or_else(|| Error::missing_reference(namespace, secret))?;
        let value = data
            .get(CUSTOM_PROPERTIES_KEY)
            .ok_or_else(|| Error::missing_key(namespace, secret, CUSTOM_PROPERTIES_KEY))?;
        Ok(hash_str(&String::from_utf8_lossy(value)))
    }

    /// Cluster version; unknown parts are empty
    async fn kubernetes_version(&self) -> ServerVersion {
        self.version_probe
            .server_version()
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not get kubernetes version");
                ServerVersion::default()
            })
    }
}

fn owner_reference(fleet: &AgentFleet, object: &str) -> Result<OwnerReference, ActiveGateError> {
    fleet
        .controller_owner_ref(&())
        .ok_or_else(|| ActiveGateError::Ownership {
            name: object.to_string(),
            message: "AgentFleet has no uid".to_string(),
        })
}

/// Compare by template hash; objects written before hashing compare by spec
fn has_changed(live: &StatefulSet, desired: &StatefulSet) -> bool {
    let hash = |sts: &StatefulSet| {
        sts.metadata
            .annotations
            .get(ANNOTATION_TEMPLATE_HASH)
            .cloned()
    };
    match (hash(live), hash(desired)) {
        (Some(live), Some(desired)) => live != desired,
        _ => live.spec != desired.spec,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::builder::ANNOTATION_CUSTOM_PROPERTIES_HASH;
    use crate::custom_properties::MockCustomPropertiesReconciler;
    use crate::store::{MockVersionProbe, MockWorkloadStore};
    use async_trait::async_trait;
    use kube::api::ObjectMeta;
    use meridian_capability::{compose_capabilities, TemplateRegistry};
    use meridian_common::crd::{ActiveGateSpec, AgentFleetSpec, CapabilityKind};
    use meridian_common::kube_utils::SecretData;

    mockall::mock! {
        Secrets {}

        #[async_trait]
        impl SecretReader for Secrets {
            async fn get(&self, name: &str, namespace: &str) -> Result<Option<SecretData>, Error>;
        }
    }

    /// In-memory store that records every call
    #[derive(Default)]
    struct FakeStore {
        objects: Mutex<BTreeMap<(String, String), StatefulSet>>,
        calls: Mutex<Vec<&'static str>>,
        revision: Mutex<u64>,
    }

    impl FakeStore {
        fn record(&self, call: &'static str) {
            self.calls.lock().expect("lock").push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().expect("lock").clone()
        }

        fn object(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
            self.objects
                .lock()
                .expect("lock")
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        }

        fn insert(&self, sts: StatefulSet) {
            let mut sts = sts;
            let mut revision = self.revision.lock().expect("lock");
            *revision += 1;
            sts.metadata.resource_version = Some(revision.to_string());
            self.objects
                .lock()
                .expect("lock")
                .insert((sts.namespace().to_string(), sts.name().to_string()), sts);
        }
    }

    #[async_trait]
    impl WorkloadStore for FakeStore {
        async fn get(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, Error> {
            self.record("get");
            Ok(self.object(namespace, name))
        }

        async fn create(&self, sts: &StatefulSet) -> Result<(), Error> {
            self.record("create");
            self.insert(sts.clone());
            Ok(())
        }

        async fn update(&self, sts: &StatefulSet) -> Result<(), Error> {
            self.record("update");
            self.insert(sts.clone());
            Ok(())
        }

        async fn delete(&self, sts: &StatefulSet) -> Result<(), Error> {
            self.record("delete");
            self.objects
                .lock()
                .expect("lock")
                .remove(&(sts.namespace().to_string(), sts.name().to_string()));
            Ok(())
        }

        async fn list(&self, namespace: &str) -> Result<Vec<StatefulSet>, Error> {
            self.record("list");
            Ok(self
                .objects
                .lock()
                .expect("lock")
                .values()
                .filter(|s| s.namespace() == namespace)
                .cloned()
                .collect())
        }
    }

    /// Secret reader whose custom properties can change between cycles
    struct FakeSecrets {
        value: Mutex<Option<String>>,
    }

    impl FakeSecrets {
        fn with(value: Option<&str>) -> Self {
            Self {
                value: Mutex::new(value.map(str::to_string)),
            }
        }

        fn set(&self, value: &str) {
            *self.value.lock().expect("lock") = Some(value.to_string());
        }
    }

    #[async_trait]
    impl SecretReader for FakeSecrets {
        async fn get(&self, _name: &str, _namespace: &str) -> Result<Option<SecretData>, Error> {
            Ok(self.value.lock().expect("lock").clone().map(|v| {
                SecretData::from([(CUSTOM_PROPERTIES_KEY.to_string(), v.into_bytes())])
            }))
        }
    }

    fn fleet(capabilities: Vec<CapabilityKind>) -> AgentFleet {
        AgentFleet {
            metadata: ObjectMeta {
                name: Some("fleet".to_string()),
                namespace: Some("meridian".to_string()),
                uid: Some("fleet-uid".to_string()),
                ..Default::default()
            },
            spec: AgentFleetSpec {
                api_url: "https://tenant.example.com/api".to_string(),
                active_gate: ActiveGateSpec {
                    capabilities,
                    ..Default::default()
                },
                ..Default::default()
            },
            status: None,
        }
    }

    fn with_props_ref(mut fleet: AgentFleet) -> AgentFleet {
        fleet.spec.active_gate.properties.custom_properties = Some(ValueSource {
            value_from: "gateway-props".to_string(),
            ..Default::default()
        });
        fleet
    }

    fn compose(fleet: &AgentFleet) -> CapabilityDescriptor {
        compose_capabilities(fleet, &TemplateRegistry::default(), "1.0.0").expect("compose")
    }

    fn version_probe(major: &'static str, minor: &'static str) -> Arc<dyn VersionProbe> {
        let mut probe = MockVersionProbe::new();
        probe.expect_server_version().returning(move || {
            Ok(ServerVersion {
                major: major.to_string(),
                minor: minor.to_string(),
            })
        });
        Arc::new(probe)
    }

    fn pod_custom_properties_hash(sts: &StatefulSet) -> Option<String> {
        sts.spec
            .template
            .metadata
            .annotations
            .get(ANNOTATION_CUSTOM_PROPERTIES_HASH)
            .cloned()
    }

    fn accepting_custom_properties() -> Arc<dyn CustomPropertiesReconciler> {
        let mut cp = MockCustomPropertiesReconciler::new();
        cp.expect_reconcile().returning(|_, _, _, _| Ok(()));
        Arc::new(cp)
    }

    fn reconciler(
        store: Arc<dyn WorkloadStore>,
        secrets: Arc<dyn SecretReader>,
    ) -> StatefulSetReconciler {
        StatefulSetReconciler::new(
            store,
            secrets,
            version_probe("1", "29"),
            accepting_custom_properties(),
        )
    }

    #[tokio::test]
    async fn second_cycle_is_unchanged() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(FakeSecrets::with(None)));
        let f = fleet(vec![CapabilityKind::Routing, CapabilityKind::KubernetesMonitoring]);
        let cap = compose(&f);

        let first = r.reconcile(&f, &cap).await.expect("first");
        assert_eq!(first, ReconcileOutcome::Created);
        let after_first = store.object("meridian", "fleet-multi").expect("created");

        let second = r.reconcile(&f, &cap).await.expect("second");
        assert_eq!(second, ReconcileOutcome::Unchanged);
        let after_second = store.object("meridian", "fleet-multi").expect("still there");

        assert_eq!(after_first, after_second);
        assert_eq!(store.calls(), vec!["get", "create", "get"]);
        assert_eq!(after_first.metadata.owner_references[0].uid, "fleet-uid");
        assert_eq!(after_first.metadata.owner_references[0].controller, Some(true));
    }

    #[tokio::test]
    async fn outdated_labels_delete_only() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(FakeSecrets::with(None)));
        let f = fleet(vec![CapabilityKind::Routing]);
        let cap = compose(&f);

        r.reconcile(&f, &cap).await.expect("create");
        let mut live = store.object("meridian", "fleet-multi").expect("created");
        live.metadata.labels.insert("legacy".to_string(), "true".to_string());
        store.insert(live);

        let outcome = r.reconcile(&f, &cap).await.expect("migrate");
        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(store.calls(), vec!["get", "create", "get", "delete"]);
        assert!(store.object("meridian", "fleet-multi").is_none());

        let outcome = r.reconcile(&f, &cap).await.expect("recreate");
        assert_eq!(outcome, ReconcileOutcome::Created);
    }

    #[tokio::test]
    async fn changed_spec_updates_with_live_resource_version() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(FakeSecrets::with(None)));
        let mut f = fleet(vec![CapabilityKind::Routing]);

        r.reconcile(&f, &compose(&f)).await.expect("create");
        f.spec.active_gate.properties.replicas = Some(3);

        assert_eq!(
            r.reconcile(&f, &compose(&f)).await.expect("update"),
            ReconcileOutcome::Updated
        );
        let live = store.object("meridian", "fleet-multi").expect("present");
        assert_eq!(live.spec.replicas, Some(3));
        assert_eq!(live.metadata.resource_version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn referenced_custom_properties_change_triggers_update() {
        let store = Arc::new(FakeStore::default());
        let secrets = Arc::new(FakeSecrets::with(Some("a=1")));
        let r = reconciler(store.clone(), secrets.clone());
        let f = with_props_ref(fleet(vec![CapabilityKind::Routing]));
        let cap = compose(&f);

        r.reconcile(&f, &cap).await.expect("create");
        let before = store.object("meridian", "fleet-multi").expect("created");

        secrets.set("a=2");
        let outcome = r.reconcile(&f, &cap).await.expect("update");
        assert_eq!(outcome, ReconcileOutcome::Updated);
        let after = store.object("meridian", "fleet-multi").expect("updated");

        assert_eq!(pod_custom_properties_hash(&before), Some(hash_str("a=1")));
        assert_eq!(pod_custom_properties_hash(&after), Some(hash_str("a=2")));
        assert_eq!(before.spec.template.spec, after.spec.template.spec);
    }

    #[tokio::test]
    async fn inline_custom_properties_are_hashed_without_reading_secrets() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(MockSecrets::new()));
        let mut f = fleet(vec![CapabilityKind::Routing]);
        f.spec.active_gate.properties.custom_properties = Some(ValueSource {
            value: "a=b".to_string(),
            ..Default::default()
        });

        r.reconcile(&f, &compose(&f)).await.expect("create");

        let sts = store.object("meridian", "fleet-multi").expect("created");
        assert_eq!(pod_custom_properties_hash(&sts), Some(hash_str("a=b")));
    }

    #[tokio::test]
    async fn no_custom_properties_leaves_hash_empty() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(MockSecrets::new()));
        let f = fleet(vec![CapabilityKind::Routing]);

        r.reconcile(&f, &compose(&f)).await.expect("create");

        let sts = store.object("meridian", "fleet-multi").expect("created");
        assert_eq!(pod_custom_properties_hash(&sts), Some(String::new()));
    }

    #[tokio::test]
    async fn secret_without_custom_properties_key_aborts_before_mutation() {
        let mut secrets = MockSecrets::new();
        secrets
            .expect_get()
            .withf(|name, namespace| name == "gateway-props" && namespace == "meridian")
            .returning(|_, _| {
                Ok(Some(SecretData::from([(
                    "other".to_string(),
                    b"a=1".to_vec(),
                )])))
            });
        let r = reconciler(Arc::new(MockWorkloadStore::new()), Arc::new(secrets));
        let f = with_props_ref(fleet(vec![CapabilityKind::Routing]));

        let err = r.reconcile(&f, &compose(&f)).await.expect_err("missing key");
        assert!(matches!(
            err,
            ActiveGateError::Common(Error::MissingReference { key: Some(ref key), .. })
                if key == CUSTOM_PROPERTIES_KEY
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_custom_properties_secret_aborts_before_mutation() {
        let mut secrets = MockSecrets::new();
        secrets.expect_get().returning(|_, _| Ok(None));
        let r = reconciler(Arc::new(MockWorkloadStore::new()), Arc::new(secrets));
        let f = with_props_ref(fleet(vec![CapabilityKind::Routing]));

        let err = r.reconcile(&f, &compose(&f)).await.expect_err("missing secret");
        assert!(matches!(
            err,
            ActiveGateError::Common(Error::MissingReference { .. })
        ));
    }

    #[tokio::test]
    async fn secret_backend_failure_is_surfaced() {
        let mut secrets = MockSecrets::new();
        secrets.expect_get().returning(|_, _| {
            Err(Error::backend("get secret meridian/gateway-props", "timeout"))
        });
        let r = reconciler(Arc::new(MockWorkloadStore::new()), Arc::new(secrets));
        let f = with_props_ref(fleet(vec![CapabilityKind::Routing]));

        let err = r.reconcile(&f, &compose(&f)).await.expect_err("backend down");
        assert!(matches!(
            err,
            ActiveGateError::Common(Error::BackendUnavailable { .. })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn custom_properties_failure_aborts_cycle() {
        let mut cp = MockCustomPropertiesReconciler::new();
        cp.expect_reconcile()
            .withf(|owner, namespace, sa_owner, props| {
                owner.name == "fleet"
                    && namespace == "meridian"
                    && sa_owner == "kubernetes-monitoring"
                    && props.value == "a=b"
            })
            .returning(|_, _, _, _| Err(Error::backend("apply secret", "forbidden")));

        let r = StatefulSetReconciler::new(
            Arc::new(MockWorkloadStore::new()),
            Arc::new(MockSecrets::new()),
            Arc::new(MockVersionProbe::new()),
            Arc::new(cp),
        );
        let mut f = fleet(vec![CapabilityKind::KubernetesMonitoring]);
        f.spec.active_gate.properties.custom_properties = Some(ValueSource {
            value: "a=b".to_string(),
            ..Default::default()
        });

        assert!(r.reconcile(&f, &compose(&f)).await.is_err());
    }

    #[tokio::test]
    async fn version_probe_failure_is_tolerated() {
        let mut probe = MockVersionProbe::new();
        probe
            .expect_server_version()
            .times(1)
            .returning(|| Err(Error::backend("get server version", "refused")));

        let store = Arc::new(FakeStore::default());
        let r = StatefulSetReconciler::new(
            store.clone(),
            Arc::new(FakeSecrets::with(None)),
            Arc::new(probe),
            accepting_custom_properties(),
        );
        let f = fleet(vec![CapabilityKind::DataIngest]);

        let outcome = r.reconcile(&f, &compose(&f)).await.expect("create");
        assert_eq!(outcome, ReconcileOutcome::Created);
        let sts = store.object("meridian", "fleet-multi").expect("created");
        let terms = sts
            .spec
            .template
            .spec
            .affinity
            .and_then(|a| a.node_affinity)
            .and_then(|n| n.required_during_scheduling_ignored_during_execution)
            .map(|s| s.node_selector_terms.len());
        assert_eq!(terms, Some(2));
    }

    #[tokio::test]
    async fn server_version_is_fetched_once_per_cycle() {
        let mut probe = MockVersionProbe::new();
        probe.expect_server_version().times(1).returning(|| {
            Ok(ServerVersion {
                major: "1".to_string(),
                minor: "29".to_string(),
            })
        });

        let store = Arc::new(FakeStore::default());
        let r = StatefulSetReconciler::new(
            store.clone(),
            Arc::new(FakeSecrets::with(None)),
            Arc::new(probe),
            accepting_custom_properties(),
        );
        let f = fleet(vec![CapabilityKind::Routing]);

        r.reconcile(&f, &compose(&f)).await.expect("create");
        let sts = store.object("meridian", "fleet-multi").expect("created");
        let terms = sts
            .spec
            .template
            .spec
            .affinity
            .and_then(|a| a.node_affinity)
            .and_then(|n| n.required_during_scheduling_ignored_during_execution)
            .map(|s| s.node_selector_terms.len());
        assert_eq!(terms, Some(1));
    }

    #[tokio::test]
    async fn missing_uid_fails_before_touching_store() {
        let r = reconciler(
            Arc::new(MockWorkloadStore::new()),
            Arc::new(FakeSecrets::with(None)),
        );
        let mut f = fleet(vec![CapabilityKind::Routing]);
        f.metadata.uid = None;

        let err = r.reconcile(&f, &compose(&f)).await.expect_err("no owner");
        assert!(matches!(err, ActiveGateError::Ownership { .. }));
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let mut store = MockWorkloadStore::new();
        store.expect_get().returning(|ns, name| {
            Err(Error::backend(format!("get statefulset {ns}/{name}"), "eof"))
        });
        let r = reconciler(Arc::new(store), Arc::new(FakeSecrets::with(None)));
        let f = fleet(vec![CapabilityKind::Routing]);

        let err = r.reconcile(&f, &compose(&f)).await.expect_err("get fails");
        assert_eq!(
            err.to_string(),
            "backend unavailable [get statefulset meridian/fleet-multi]: eof"
        );
    }

    #[tokio::test]
    async fn mutators_are_applied() {
        let store = Arc::new(FakeStore::default());
        let team_label: Mutator = Arc::new(|mut sts: StatefulSet| {
            sts.spec
                .template
                .metadata
                .labels
                .insert("team".to_string(), "obs".to_string());
            sts
        });
        let r = reconciler(store.clone(), Arc::new(FakeSecrets::with(None)))
            .with_mutator(team_label);
        let f = fleet(vec![CapabilityKind::Routing]);
        r.reconcile(&f, &compose(&f)).await.expect("create");

        let sts = store.object("meridian", "fleet-multi").expect("created");
        assert_eq!(
            sts.spec.template.metadata.labels.get("team").map(String::as_str),
            Some("obs")
        );
        let again = r.reconcile(&f, &compose(&f)).await.expect("again");
        assert_eq!(again, ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn unhashed_live_object_compares_by_spec() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(FakeSecrets::with(None)));
        let f = fleet(vec![CapabilityKind::Routing]);

        r.reconcile(&f, &compose(&f)).await.expect("create");
        let mut live = store.object("meridian", "fleet-multi").expect("created");
        live.metadata.annotations.remove(ANNOTATION_TEMPLATE_HASH);
        store.insert(live.clone());
        let outcome = r.reconcile(&f, &compose(&f)).await.expect("same spec");
        assert_eq!(outcome, ReconcileOutcome::Unchanged);

        live.spec.replicas = Some(4);
        store.insert(live);
        let outcome = r.reconcile(&f, &compose(&f)).await.expect("spec drift");
        assert_eq!(outcome, ReconcileOutcome::Updated);
    }

    #[tokio::test]
    async fn disabled_capability_removes_only_own_statefulset() {
        let store = Arc::new(FakeStore::default());
        let r = reconciler(store.clone(), Arc::new(FakeSecrets::with(None)));
        let f = fleet(vec![CapabilityKind::Routing]);
        let cap = compose(&f);
        r.reconcile(&f, &cap).await.expect("create");

        let disabled = compose(&fleet(vec![]));
        assert_eq!(
            r.remove_disabled(&f, &disabled).await.expect("remove"),
            ReconcileOutcome::Deleted
        );
        assert!(store.object("meridian", "fleet-multi").is_none());
        assert_eq!(
            r.remove_disabled(&f, &disabled).await.expect("nothing left"),
            ReconcileOutcome::Unchanged
        );

        let mut foreign = StatefulSet::new(meridian_common::kube_utils::ObjectMeta::new(
            "fleet-multi",
            "meridian",
        ));
        foreign
            .metadata
            .labels
            .insert(LABEL_MODULE.to_string(), "other".to_string());
        store.insert(foreign);
        assert_eq!(
            r.remove_disabled(&f, &disabled).await.expect("foreign"),
            ReconcileOutcome::Unchanged
        );
        assert!(store.object("meridian", "fleet-multi").is_some());
    }
}
