//! Remote collaborators of the gateway reconciler
//!
//! The reconciler talks to the cluster only through these traits so the
//! decision sequence can be exercised against in-memory fakes and mocks.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use meridian_capability::k8s::StatefulSet;
use meridian_common::{Error, LABEL_MANAGED_BY, LABEL_MANAGED_BY_MERIDIAN};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Key/value store of gateway StatefulSets, addressed by namespace and name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Get a StatefulSet; `Ok(None)` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, Error>;

    /// Create a StatefulSet
    async fn create(&self, sts: &StatefulSet) -> Result<(), Error>;

    /// Replace a StatefulSet; `sts` must carry the live resourceVersion
    async fn update(&self, sts: &StatefulSet) -> Result<(), Error>;

    /// Delete a StatefulSet
    async fn delete(&self, sts: &StatefulSet) -> Result<(), Error>;

    /// List operator-managed StatefulSets in a namespace
    async fn list(&self, namespace: &str) -> Result<Vec<StatefulSet>, Error>;
}

/// Kubernetes server version as reported by `/version`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerVersion {
    /// Major version, e.g. `"1"`
    pub major: String,
    /// Minor version, e.g. `"29"` or `"29+"`
    pub minor: String,
}

/// Kubernetes server version, queried best-effort
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionProbe: Send + Sync {
    /// Major and minor version from a single request
    async fn server_version(&self) -> Result<ServerVersion, Error>;
}

// =============================================================================
// Kubernetes-backed implementations
// =============================================================================

/// [`WorkloadStore`] backed by the apps/v1 StatefulSet API
pub struct KubeWorkloadStore {
    client: Client,
    resource: ApiResource,
}

impl KubeWorkloadStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: ApiResource::erase::<k8s_openapi::api::apps::v1::StatefulSet>(&()),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

fn to_dynamic(sts: &StatefulSet) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(sts)?;
    Ok(serde_json::from_value(value)?)
}

fn from_dynamic(obj: DynamicObject) -> Result<StatefulSet, Error> {
    let value = serde_json::to_value(obj)?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind("StatefulSet", e.to_string()))
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, Error> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::backend(format!("get statefulset {namespace}/{name}"), e))?
            .map(from_dynamic)
            .transpose()
    }

    async fn create(&self, sts: &StatefulSet) -> Result<(), Error> {
        let (namespace, name) = (sts.namespace(), sts.name());
        self.api(namespace)
            .create(&PostParams::default(), &to_dynamic(sts)?)
            .await
            .map_err(|e| Error::backend(format!("create statefulset {namespace}/{name}"), e))?;
        debug!(statefulset = %name, namespace = %namespace, "created statefulset");
        Ok(())
    }

    async fn update(&self, sts: &StatefulSet) -> Result<(), Error> {
        let (namespace, name) = (sts.namespace(), sts.name());
        self.api(namespace)
            .replace(name, &PostParams::default(), &to_dynamic(sts)?)
            .await
            .map_err(|e| Error::backend(format!("update statefulset {namespace}/{name}"), e))?;
        debug!(statefulset = %name, namespace = %namespace, "updated statefulset");
        Ok(())
    }

    async fn delete(&self, sts: &StatefulSet) -> Result<(), Error> {
        let (namespace, name) = (sts.namespace(), sts.name());
        match self
            .api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => {
                return Err(Error::backend(
                    format!("delete statefulset {namespace}/{name}"),
                    e,
                ))
            }
        }
        debug!(statefulset = %name, namespace = %namespace, "deleted statefulset");
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<StatefulSet>, Error> {
        let selector = format!("{LABEL_MANAGED_BY}={LABEL_MANAGED_BY_MERIDIAN}");
        let params = ListParams::default().labels(&selector);
        self.api(namespace)
            .list(&params)
            .await
            .map_err(|e| Error::backend(format!("list statefulsets in {namespace}"), e))?
            .items
            .into_iter()
            .map(from_dynamic)
            .collect()
    }
}

/// [`VersionProbe`] backed by the API server's `/version` endpoint
pub struct KubeVersionProbe {
    client: Client,
}

impl KubeVersionProbe {
    /// Create a probe using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VersionProbe for KubeVersionProbe {
    async fn server_version(&self) -> Result<ServerVersion, Error> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| Error::backend("get server version", e))?;
        Ok(ServerVersion {
            major: info.major,
            minor: info.minor,
        })
    }
}
