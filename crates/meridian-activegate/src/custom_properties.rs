//! Custom gateway properties
//!
//! Inline properties are written to an operator-owned secret the gateway
//! pods mount. Properties given by reference already live in a user secret
//! and need nothing from us.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use meridian_capability::capability::{custom_properties_secret_name, CUSTOM_PROPERTIES_KEY};
use meridian_common::crd::ValueSource;
use meridian_common::{Error, FIELD_MANAGER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_MERIDIAN};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// Keeps the secret behind a capability's custom properties in place
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CustomPropertiesReconciler: Send + Sync {
    /// Reconcile custom properties for one capability of an AgentFleet
    async fn reconcile(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        service_account_owner: &str,
        properties: &ValueSource,
    ) -> Result<(), Error>;
}

/// [`CustomPropertiesReconciler`] applying secrets through the Kubernetes API
pub struct KubeCustomPropertiesReconciler {
    client: Client,
}

impl KubeCustomPropertiesReconciler {
    /// Create a reconciler using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Secret holding inline custom properties
pub fn custom_properties_secret(
    owner: &OwnerReference,
    namespace: &str,
    service_account_owner: &str,
    value: &str,
) -> Secret {
    Secret {
        metadata: kube::api::ObjectMeta {
            name: Some(custom_properties_secret_name(
                &owner.name,
                service_account_owner,
            )),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_MERIDIAN.to_string(),
            )])),
            owner_references: Some(vec![owner.clone()]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CUSTOM_PROPERTIES_KEY.to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl CustomPropertiesReconciler for KubeCustomPropertiesReconciler {
    async fn reconcile(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        service_account_owner: &str,
        properties: &ValueSource,
    ) -> Result<(), Error> {
        if let Some(reference) = properties.reference() {
            debug!(secret = %reference, "custom properties provided by reference");
            return Ok(());
        }

        let secret =
            custom_properties_secret(owner, namespace, service_account_owner, &properties.value);
        let name = secret.metadata.name.clone().unwrap_or_default();

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await
        .map_err(|e| Error::backend(format!("apply secret {namespace}/{name}"), e))?;

        info!(secret = %name, namespace = %namespace, "applied custom properties secret");
        Ok(())
    }
}
