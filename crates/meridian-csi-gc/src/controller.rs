//! AgentFleet-triggered garbage collection
//!
//! Every AgentFleet change (and an hourly requeue) sweeps the node-local
//! binaries of the fleet's tenant. The sweep is best-effort: failures are
//! logged and retried on the next scheduled run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use meridian_capability::capability::PROXY_SECRET_KEY;
use meridian_common::crd::AgentFleet;
use meridian_common::kube_utils::{read_secret_key, KubeSecretReader, SecretReader};
use tracing::{error, info, warn};

use crate::binaries::{BinaryGarbageCollector, GcReport};
use crate::distribution::{
    DistributionClientFactory, DistributionClientProperties, HttpDistributionClientFactory,
    INSTALLER_TYPE_PAAS, OS_UNIX,
};
use crate::error::GcError;
use crate::fs::OsFilesystem;

/// Interval between sweeps of the same AgentFleet
pub const GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Key of the PaaS token in the tokens secret
pub const PAAS_TOKEN_KEY: &str = "paasToken";

/// Shared state for the garbage collection controller
pub struct GcContext {
    secrets: Arc<dyn SecretReader>,
    clients: Arc<dyn DistributionClientFactory>,
    collector: Arc<BinaryGarbageCollector>,
}

impl GcContext {
    /// Create a context from its parts
    pub fn new(
        secrets: Arc<dyn SecretReader>,
        clients: Arc<dyn DistributionClientFactory>,
        collector: BinaryGarbageCollector,
    ) -> Self {
        Self {
            secrets,
            clients,
            collector: Arc::new(collector),
        }
    }

    /// Create a context sweeping `root_dir` on the local disk
    pub fn from_client(client: Client, root_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            Arc::new(KubeSecretReader::new(client)),
            Arc::new(HttpDistributionClientFactory),
            BinaryGarbageCollector::new(root_dir, Arc::new(OsFilesystem)),
        )
    }
}

/// Sweep unused agent binaries of an AgentFleet's tenant
///
/// Never fails; the next sweep is always scheduled after [`GC_INTERVAL`].
pub async fn reconcile(fleet: Arc<AgentFleet>, ctx: Arc<GcContext>) -> Result<Action, GcError> {
    let name = fleet.name_any();
    info!(fleet = %name, "running agent binary garbage collection");

    match sweep(&fleet, &ctx).await {
        Ok(report) => info!(
            fleet = %name,
            removed = ?report.removed,
            failed = report.failed_paths.len(),
            "garbage collection finished"
        ),
        Err(error) => warn!(?error, fleet = %name, "garbage collection skipped"),
    }

    Ok(Action::requeue(GC_INTERVAL))
}

/// Error policy for the garbage collection controller
pub fn error_policy(fleet: Arc<AgentFleet>, error: &GcError, _ctx: Arc<GcContext>) -> Action {
    error!(?error, fleet = %fleet.name_any(), "garbage collection failed");
    Action::requeue(GC_INTERVAL)
}

async fn sweep(fleet: &AgentFleet, ctx: &GcContext) -> Result<GcReport, GcError> {
    let namespace = fleet.namespace().ok_or(GcError::MissingNamespace)?;
    let paas_token =
        read_secret_key(ctx.secrets.as_ref(), &fleet.tokens(), &namespace, PAAS_TOKEN_KEY).await?;

    let proxy = match fleet.spec.proxy.as_ref().filter(|p| !p.is_empty()) {
        Some(proxy) => match proxy.reference() {
            Some(secret) => Some(
                read_secret_key(ctx.secrets.as_ref(), secret, &namespace, PROXY_SECRET_KEY)
                    .await?,
            ),
            None => Some(proxy.value.clone()),
        },
        None => None,
    };

    let client = ctx.clients.build(DistributionClientProperties {
        api_url: fleet.spec.api_url.clone(),
        paas_token,
        proxy,
        network_zone: fleet.spec.network_zone.clone(),
        skip_cert_check: fleet.spec.skip_cert_check,
    })?;

    let connection = client.connection_info().await?;
    let latest = client
        .latest_agent_version(OS_UNIX, INSTALLER_TYPE_PAAS)
        .await?;

    let collector = ctx.collector.clone();
    tokio::task::spawn_blocking(move || collector.collect(&connection.tenant_uuid, &latest))
        .await
        .map_err(|e| GcError::Task(e.to_string()))
}
