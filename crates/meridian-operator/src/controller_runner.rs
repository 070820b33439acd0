//! Controller runner - builds controller futures for each subsystem
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use meridian_activegate::controller::{self as activegate_ctrl, Context};
use meridian_capability::TemplateRegistry;
use meridian_common::crd::AgentFleet;
use meridian_common::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_MERIDIAN};
use meridian_csi_gc::controller::{self as gc_ctrl, GcContext};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// AgentFleet API, cluster-wide or limited to one namespace
pub fn fleet_api(client: Client, namespace: Option<&str>) -> Api<AgentFleet> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build the gateway StatefulSet controller
pub fn build_activegate_controllers(
    client: Client,
    namespace: Option<&str>,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(Context::from_client(
        client.clone(),
        TemplateRegistry::default(),
    ));
    let fleets = fleet_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let managed = format!("{LABEL_MANAGED_BY}={LABEL_MANAGED_BY_MERIDIAN}");

    tracing::info!("- AgentFleet gateway controller");

    vec![Box::pin(
        Controller::new(fleets, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .owns(
                statefulsets,
                WatcherConfig::default()
                    .labels(&managed)
                    .timeout(WATCH_TIMEOUT_SECS),
            )
            .shutdown_on_signal()
            .run(activegate_ctrl::reconcile, activegate_ctrl::error_policy, ctx)
            .for_each(log_reconcile_result("Gateway")),
    )]
}

/// Build the node-local binary garbage collector
pub fn build_gc_controllers(
    client: Client,
    namespace: Option<&str>,
    root_dir: PathBuf,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(GcContext::from_client(client.clone(), root_dir));
    let fleets = fleet_api(client, namespace);

    tracing::info!("- AgentFleet binary garbage collector");

    vec![Box::pin(
        Controller::new(fleets, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(gc_ctrl::reconcile, gc_ctrl::error_policy, ctx)
            .for_each(log_reconcile_result("GarbageCollection")),
    )]
}

/// Create a closure that logs reconciliation results
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
