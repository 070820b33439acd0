//! Agent distribution service client
//!
//! The collector needs two answers from the tenant's distribution API: the
//! tenant id (to locate the tenant tree on disk) and the latest agent version
//! (which is never collected).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::GcError;

#[cfg(test)]
use mockall::automock;

/// Operating system of the agents installed by the CSI driver
pub const OS_UNIX: &str = "unix";

/// Installer flavour of the agents installed by the CSI driver
pub const INSTALLER_TYPE_PAAS: &str = "paas";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tenant connection details
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Tenant identifier
    #[serde(rename = "tenantUUID")]
    pub tenant_uuid: String,
    /// Token agents use to report to the tenant
    #[serde(default)]
    pub tenant_token: String,
    /// Endpoints agents report to
    #[serde(default)]
    pub communication_endpoints: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestVersion {
    latest_agent_version: String,
}

/// Queries against the agent distribution service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DistributionClient: Send + Sync {
    /// Tenant connection details
    async fn connection_info(&self) -> Result<ConnectionInfo, GcError>;

    /// Latest agent version for an OS and installer type
    async fn latest_agent_version(&self, os: &str, installer_type: &str)
        -> Result<String, GcError>;
}

/// Settings for connecting to a tenant's distribution service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionClientProperties {
    /// Base API URL, e.g. `https://tenant.example.com/api`
    pub api_url: String,
    /// PaaS token authorising installer downloads
    pub paas_token: String,
    /// Proxy URL, if any
    pub proxy: Option<String>,
    /// Network zone passed to connection queries
    pub network_zone: String,
    /// Skip TLS certificate verification
    pub skip_cert_check: bool,
}

/// Creates clients per AgentFleet
#[cfg_attr(test, automock)]
pub trait DistributionClientFactory: Send + Sync {
    /// Build a client for the given settings
    fn build(
        &self,
        properties: DistributionClientProperties,
    ) -> Result<Arc<dyn DistributionClient>, GcError>;
}

/// [`DistributionClientFactory`] producing [`HttpDistributionClient`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpDistributionClientFactory;

impl DistributionClientFactory for HttpDistributionClientFactory {
    fn build(
        &self,
        properties: DistributionClientProperties,
    ) -> Result<Arc<dyn DistributionClient>, GcError> {
        Ok(Arc::new(HttpDistributionClient::new(properties)?))
    }
}

/// [`DistributionClient`] over the distribution service's REST API
pub struct HttpDistributionClient {
    client: reqwest::Client,
    properties: DistributionClientProperties,
}

impl HttpDistributionClient {
    /// Create a client for the given settings
    pub fn new(properties: DistributionClientProperties) -> Result<Self, GcError> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(properties.skip_cert_check);
        if let Some(proxy) = properties.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| GcError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| GcError::Client(e.to_string()))?;
        Ok(Self { client, properties })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.properties.api_url.trim_end_matches('/'))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GcError> {
        debug!(url = %url, "querying distribution service");
        let response = self
            .client
            .get(url)
            .query(query)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Api-Token {}", self.properties.paas_token),
            )
            .send()
            .await
            .map_err(|e| GcError::http(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GcError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GcError::invalid_response(url, e))
    }
}

#[async_trait]
impl DistributionClient for HttpDistributionClient {
    async fn connection_info(&self) -> Result<ConnectionInfo, GcError> {
        let url = self.url("/v1/deployment/installer/agent/connectioninfo");
        let mut query = Vec::new();
        if !self.properties.network_zone.is_empty() {
            query.push(("networkZone", self.properties.network_zone.as_str()));
        }
        self.get(&url, &query).await
    }

    async fn latest_agent_version(
        &self,
        os: &str,
        installer_type: &str,
    ) -> Result<String, GcError> {
        let url = self.url(&format!(
            "/v1/deployment/installer/agent/{os}/{installer_type}/latest/metainfo"
        ));
        let latest: LatestVersion = self.get(&url, &[]).await?;
        Ok(latest.latest_agent_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_info_parses_service_response() {
        let info: ConnectionInfo = serde_json::from_str(
            r#"{"tenantUUID":"abc12345","tenantToken":"t0k","communicationEndpoints":["https://a"]}"#,
        )
        .expect("parse");
        assert_eq!(info.tenant_uuid, "abc12345");
        assert_eq!(info.communication_endpoints, vec!["https://a".to_string()]);

        let minimal: ConnectionInfo =
            serde_json::from_str(r#"{"tenantUUID":"abc12345"}"#).expect("parse");
        assert!(minimal.tenant_token.is_empty());
    }

    #[test]
    fn urls_join_without_double_slash() {
        let client = HttpDistributionClient::new(DistributionClientProperties {
            api_url: "https://tenant.example.com/api/".to_string(),
            ..Default::default()
        })
        .expect("client");
        assert_eq!(
            client.url("/v1/deployment/installer/agent/connectioninfo"),
            "https://tenant.example.com/api/v1/deployment/installer/agent/connectioninfo"
        );
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let result = HttpDistributionClient::new(DistributionClientProperties {
            api_url: "https://tenant.example.com/api".to_string(),
            proxy: Some("http://[::1".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(GcError::Client(_))));
    }
}
