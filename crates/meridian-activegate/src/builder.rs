//! Desired-state builder for gateway StatefulSets
//!
//! Turns a [`CapabilityDescriptor`] into a complete StatefulSet. Mutators run
//! after the object is assembled and before it is hashed, so the template
//! hash annotation covers their effect but never itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use meridian_capability::k8s::{
    Affinity, LabelSelector, LocalObjectReference, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, PodSpec, PodTemplateMeta, PodTemplateSpec,
    StatefulSet, StatefulSetSpec, Toleration,
};
use meridian_capability::CapabilityDescriptor;
use meridian_common::crd::AgentFleet;
use meridian_common::kube_utils::{content_hash, ObjectMeta};
use meridian_common::{
    LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_MANAGED_BY_MERIDIAN, LABEL_MODULE, LABEL_NAME,
};

use crate::error::{ActiveGateError, BuildError};

/// Pod annotation with the gateway version being rolled out
pub const ANNOTATION_VERSION: &str = "meridian.dev/version";

/// Pod annotation with the hash of the custom properties the pods mount
pub const ANNOTATION_CUSTOM_PROPERTIES_HASH: &str = "meridian.dev/custom-properties-hash";

/// Object annotation with the content hash of the built StatefulSet
pub const ANNOTATION_TEMPLATE_HASH: &str = "meridian.dev/template-hash";

/// Value of [`LABEL_NAME`] on gateway workloads
pub const GATEWAY_APP_NAME: &str = "meridian-activegate";

/// Post-build adjustment applied before hashing
pub type Mutator = Arc<dyn Fn(StatefulSet) -> StatefulSet + Send + Sync>;

/// Fleet metadata the builder needs
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceMeta {
    /// AgentFleet name
    pub name: String,
    /// AgentFleet namespace
    pub namespace: String,
    /// Gateway version from status
    pub gateway_version: String,
    /// Image pull secret
    pub pull_secret: String,
}

impl ResourceMeta {
    /// Collect builder inputs from an AgentFleet
    pub fn from_fleet(fleet: &AgentFleet) -> Result<Self, ActiveGateError> {
        Ok(Self {
            name: fleet.name_any(),
            namespace: fleet.namespace().ok_or(ActiveGateError::MissingNamespace)?,
            gateway_version: fleet.active_gate_version().to_string(),
            pull_secret: fleet.pull_secret(),
        })
    }
}

/// Labels identifying a gateway workload; also its selector
pub fn workload_labels(instance_name: &str, module_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), GATEWAY_APP_NAME.to_string()),
        (LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_MERIDIAN.to_string()),
        (LABEL_INSTANCE.to_string(), instance_name.to_string()),
        (LABEL_MODULE.to_string(), module_name.to_string()),
    ])
}

/// Builds the desired StatefulSet for one capability descriptor
///
/// ```rust,ignore
/// let sts = DesiredStateBuilder::new(&meta, &capability, &cp_hash)
///     .with_kubernetes_version(&major, &minor)
///     .with_mutator(mutator)
///     .build()?;
/// ```
pub struct DesiredStateBuilder<'a> {
    meta: &'a ResourceMeta,
    capability: &'a CapabilityDescriptor,
    custom_properties_hash: &'a str,
    kube_major: &'a str,
    kube_minor: &'a str,
    mutators: Vec<Mutator>,
}

impl<'a> DesiredStateBuilder<'a> {
    /// Create a builder; the cluster version defaults to unknown
    pub fn new(
        meta: &'a ResourceMeta,
        capability: &'a CapabilityDescriptor,
        custom_properties_hash: &'a str,
    ) -> Self {
        Self {
            meta,
            capability,
            custom_properties_hash,
            kube_major: "",
            kube_minor: "",
            mutators: Vec::new(),
        }
    }

    /// Set the cluster version; empty strings mean unknown
    pub fn with_kubernetes_version(mut self, major: &'a str, minor: &'a str) -> Self {
        self.kube_major = major;
        self.kube_minor = minor;
        self
    }

    /// Append a mutator; mutators run in registration order
    pub fn with_mutator(mut self, mutator: Mutator) -> Self {
        self.mutators.push(mutator);
        self
    }

    /// Append several mutators
    pub fn with_mutators(mut self, mutators: &[Mutator]) -> Self {
        self.mutators.extend(mutators.iter().cloned());
        self
    }

    /// Build the StatefulSet and attach its template hash
    pub fn build(self) -> Result<StatefulSet, BuildError> {
        let name = self.capability.workload_name(&self.meta.name);
        let labels = workload_labels(&self.meta.name, &self.capability.module_name);
        let properties = &self.capability.properties;

        let mut metadata = ObjectMeta::new(&name, &self.meta.namespace);
        metadata.labels = labels.clone();

        let mut sts = StatefulSet::new(metadata);
        sts.spec = StatefulSetSpec {
            replicas: Some(properties.replicas.unwrap_or(1)),
            pod_management_policy: Some("Parallel".to_string()),
            selector: LabelSelector {
                match_labels: labels.clone(),
            },
            template: PodTemplateSpec {
                metadata: PodTemplateMeta {
                    labels,
                    annotations: BTreeMap::from([
                        (
                            ANNOTATION_VERSION.to_string(),
                            self.meta.gateway_version.clone(),
                        ),
                        (
                            ANNOTATION_CUSTOM_PROPERTIES_HASH.to_string(),
                            self.custom_properties_hash.to_string(),
                        ),
                    ]),
                },
                spec: PodSpec {
                    init_containers: self.capability.init_containers.clone(),
                    containers: self.capability.containers.clone(),
                    node_selector: properties.node_selector.clone(),
                    service_account_name: self.capability.service_account_name.clone(),
                    affinity: Some(node_affinity(self.kube_major, self.kube_minor)),
                    tolerations: properties.tolerations.iter().map(Toleration::from).collect(),
                    volumes: self.capability.volumes.clone(),
                    image_pull_secrets: vec![LocalObjectReference {
                        name: self.meta.pull_secret.clone(),
                    }],
                },
            },
        };

        let mut sts = self.mutators.iter().fold(sts, |sts, mutate| mutate(sts));

        let hash = content_hash(&sts).map_err(|source| BuildError::Hash {
            name: name.clone(),
            source,
        })?;
        sts.metadata
            .annotations
            .insert(ANNOTATION_TEMPLATE_HASH.to_string(), hash);
        Ok(sts)
    }
}

/// Required node affinity: amd64 Linux nodes.
///
/// Clusters older than 1.14 (or of unknown version) may only carry the
/// `beta.kubernetes.io` node labels, so a second term matches those.
fn node_affinity(major: &str, minor: &str) -> Affinity {
    let mut terms = vec![platform_term("kubernetes.io")];
    if !has_stable_node_labels(major, minor) {
        terms.push(platform_term("beta.kubernetes.io"));
    }
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: terms,
            }),
        }),
    }
}

fn platform_term(prefix: &str) -> NodeSelectorTerm {
    NodeSelectorTerm {
        match_expressions: vec![
            NodeSelectorRequirement::key_in(format!("{prefix}/arch"), &["amd64"]),
            NodeSelectorRequirement::key_in(format!("{prefix}/os"), &["linux"]),
        ],
    }
}

fn has_stable_node_labels(major: &str, minor: &str) -> bool {
    match (leading_number(major), leading_number(minor)) {
        (Some(major), Some(minor)) => major > 1 || (major == 1 && minor >= 14),
        _ => false,
    }
}

/// Parse leading digits, e.g. `"21+"` on managed clusters
fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
