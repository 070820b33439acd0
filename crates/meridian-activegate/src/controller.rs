//! AgentFleet controller for gateway StatefulSets
//!
//! Each AgentFleet yields three capability descriptors: the merged `multi`
//! gateway and the two legacy single-capability gateways. Enabled
//! descriptors are reconciled, disabled ones have their StatefulSet removed.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use meridian_capability::{compose_capabilities, legacy, CapabilityDescriptor, TemplateRegistry};
use meridian_common::crd::AgentFleet;
use meridian_common::kube_utils::KubeSecretReader;
use tracing::{debug, error, info};

use crate::custom_properties::KubeCustomPropertiesReconciler;
use crate::error::ActiveGateError;
use crate::reconciler::{ReconcileOutcome, StatefulSetReconciler};
use crate::store::{KubeVersionProbe, KubeWorkloadStore};

/// Requeue interval after a cycle that changed the cluster
const CHANGED_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue interval after a cycle with nothing to do
const STEADY_REQUEUE: Duration = Duration::from_secs(5 * 60);

/// Requeue interval after a failed cycle
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Shared state for the AgentFleet controller
pub struct Context {
    /// StatefulSet reconciler
    pub reconciler: StatefulSetReconciler,
    /// Capability templates
    pub registry: TemplateRegistry,
    /// Operator version stamped into deployment metadata
    pub operator_version: String,
}

impl Context {
    /// Create a context from its parts
    pub fn new(
        reconciler: StatefulSetReconciler,
        registry: TemplateRegistry,
        operator_version: impl Into<String>,
    ) -> Self {
        Self {
            reconciler,
            registry,
            operator_version: operator_version.into(),
        }
    }

    /// Create a context talking to the cluster through `client`
    pub fn from_client(client: Client, registry: TemplateRegistry) -> Self {
        let reconciler = StatefulSetReconciler::new(
            Arc::new(KubeWorkloadStore::new(client.clone())),
            Arc::new(KubeSecretReader::new(client.clone())),
            Arc::new(KubeVersionProbe::new(client.clone())),
            Arc::new(KubeCustomPropertiesReconciler::new(client)),
        );
        Self::new(reconciler, registry, env!("CARGO_PKG_VERSION"))
    }
}

/// Capability descriptors derived from one AgentFleet
pub fn descriptors(
    fleet: &AgentFleet,
    registry: &TemplateRegistry,
    operator_version: &str,
) -> Result<Vec<CapabilityDescriptor>, ActiveGateError> {
    Ok(vec![
        compose_capabilities(fleet, registry, operator_version)?,
        legacy::kubernetes_monitoring(fleet, registry, operator_version)?,
        legacy::routing(fleet, registry, operator_version)?,
    ])
}

/// Reconcile the gateway StatefulSets of an AgentFleet
pub async fn reconcile(
    fleet: Arc<AgentFleet>,
    ctx: Arc<Context>,
) -> Result<Action, ActiveGateError> {
    let name = fleet.name_any();
    debug!(fleet = %name, "reconciling gateways");

    let mut changed = false;
    for capability in descriptors(&fleet, &ctx.registry, &ctx.operator_version)? {
        let outcome = if capability.enabled {
            ctx.reconciler.reconcile(&fleet, &capability).await?
        } else {
            ctx.reconciler.remove_disabled(&fleet, &capability).await?
        };
        if outcome != ReconcileOutcome::Unchanged {
            info!(
                fleet = %name,
                module = %capability.module_name,
                ?outcome,
                "gateway statefulset changed"
            );
        }
        changed |= outcome.is_changed();
    }

    if changed {
        Ok(Action::requeue(CHANGED_REQUEUE))
    } else {
        Ok(Action::requeue(STEADY_REQUEUE))
    }
}

/// Error policy for the AgentFleet controller
pub fn error_policy(
    fleet: Arc<AgentFleet>,
    error: &ActiveGateError,
    _ctx: Arc<Context>,
) -> Action {
    error!(
        ?error,
        fleet = %fleet.name_any(),
        retryable = error.is_retryable(),
        "gateway reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
