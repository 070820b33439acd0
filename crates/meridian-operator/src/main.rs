//! Meridian Operator - AgentFleet gateways and agent binary cleanup

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};

use meridian_common::crd::AgentFleet;
use meridian_common::telemetry::{init_telemetry, TelemetryConfig};
use meridian_common::FIELD_MANAGER;
use meridian_operator::controller_runner::{build_activegate_controllers, build_gc_controllers};

/// Meridian - operator for AgentFleet gateways
#[derive(Parser, Debug)]
#[command(name = "meridian-operator", version, about, long_about = None)]
struct Cli {
    /// Print the AgentFleet CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "MERIDIAN_LOG_JSON")]
    log_json: bool,

    /// Only watch AgentFleets in this namespace
    #[arg(long, global = true, env = "MERIDIAN_NAMESPACE")]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run the gateway controller (default mode)
    Controller,

    /// Run the node-local agent binary garbage collector
    CsiGc {
        /// Root of the CSI driver's data directory
        #[arg(long, env = "MERIDIAN_CSI_ROOT_DIR", default_value = "/data")]
        root_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&AgentFleet::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: "meridian-operator".to_string(),
        json: cli.log_json,
    })?;

    let namespace = cli.namespace.as_deref();
    match cli.command {
        Some(Commands::Controller) | None => run_controller(namespace).await,
        Some(Commands::CsiGc { root_dir }) => run_csi_gc(namespace, root_dir).await,
    }
}

async fn client() -> anyhow::Result<Client> {
    Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))
}

/// Install the AgentFleet CRD with server-side apply
///
/// Keeps the installed schema in step with the running operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing AgentFleet CRD...");
    crds.patch(
        "agentfleets.meridian.dev",
        &params,
        &Patch::Apply(&AgentFleet::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install AgentFleet CRD: {}", e))?;
    Ok(())
}

async fn run_controller(namespace: Option<&str>) -> anyhow::Result<()> {
    tracing::info!(namespace = ?namespace, "Meridian controller starting...");
    let client = client().await?;
    ensure_crd_installed(&client).await?;

    tracing::info!("Starting controllers:");
    futures::future::join_all(build_activegate_controllers(client, namespace)).await;

    tracing::info!("Meridian controller shutting down");
    Ok(())
}

async fn run_csi_gc(namespace: Option<&str>, root_dir: PathBuf) -> anyhow::Result<()> {
    tracing::info!(root_dir = %root_dir.display(), "Meridian garbage collector starting...");
    let client = client().await?;

    tracing::info!("Starting controllers:");
    futures::future::join_all(build_gc_controllers(client, namespace, root_dir)).await;

    tracing::info!("Meridian garbage collector shutting down");
    Ok(())
}
