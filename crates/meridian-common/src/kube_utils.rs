//! Shared Kubernetes utilities using kube-rs
//!
//! Object metadata for built resources, content hashing for change
//! detection, and secret access behind a mockable trait.

use std::collections::BTreeMap;
use std::hash::Hasher;

use async_trait::async_trait;
use fnv::FnvHasher;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::Api;
use kube::Client;
use serde::Serialize;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::Error;

// =============================================================================
// ObjectMeta - metadata for resources built by the operator
// =============================================================================

/// Kubernetes ObjectMeta for built resources.
///
/// Carries only the fields the operator sets or compares. Live objects
/// deserialize into it too; server-populated fields other than
/// `resourceVersion` are dropped.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Owner references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Resource version of a live object (required for replace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    /// Create new metadata with the managed-by label
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_MERIDIAN.to_string(),
        );
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels,
            ..Default::default()
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Content hashing
// =============================================================================

/// FNV-1a (64-bit) over a byte slice.
///
/// Fast and order-sensitive; stable across toolchains, unlike `DefaultHasher`,
/// so it is safe to persist in annotations.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

/// Hash arbitrary text, rendered as a decimal string
pub fn hash_str(input: &str) -> String {
    fnv1a_64(input.as_bytes()).to_string()
}

/// Hash the canonical JSON serialization of an object.
///
/// Struct fields serialize in declaration order and maps are `BTreeMap`s, so
/// equal object graphs (including list order) always hash equally.
pub fn content_hash<T: Serialize>(obj: &T) -> Result<String, Error> {
    let bytes = serde_json::to_vec(obj)
        .map_err(|e| Error::serialization(format!("failed to serialize for hashing: {e}")))?;
    Ok(fnv1a_64(&bytes).to_string())
}

// =============================================================================
// Secret access
// =============================================================================

/// Raw secret payload keyed by data key
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Read access to secrets, abstracted so reconcilers can be tested without a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// Get a secret's data; `Ok(None)` when the secret does not exist
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<SecretData>, Error>;
}

/// [`SecretReader`] backed by the Kubernetes API
pub struct KubeSecretReader {
    client: Client,
}

impl KubeSecretReader {
    /// Create a reader using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretReader for KubeSecretReader {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<SecretData>, Error> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get_opt(name)
            .await
            .map_err(|e| Error::backend(format!("get secret {namespace}/{name}"), e))?;

        trace!(secret = %name, namespace = %namespace, found = secret.is_some(), "read secret");

        Ok(secret.map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect()
        }))
    }
}

/// Read one key from a secret as trimmed UTF-8 text
///
/// Missing secrets and missing keys both surface as [`Error::MissingReference`].
pub async fn read_secret_key(
    reader: &dyn SecretReader,
    name: &str,
    namespace: &str,
    key: &str,
) -> Result<String, Error> {
    let data = reader
        .get(name, namespace)
        .await?
        .ok_or_else(|| Error::missing_reference(namespace, name))?;
    let value = data
        .get(key)
        .ok_or_else(|| Error::missing_key(namespace, name, key))?;
    Ok(String::from_utf8_lossy(value).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn hash_is_order_sensitive() {
        assert_ne!(hash_str("ab"), hash_str("ba"));
    }

    #[test]
    fn content_hash_is_stable_for_equal_objects() {
        let a = ObjectMeta::new("fleet-multi", "meridian").with_label("x", "1");
        let b = ObjectMeta::new("fleet-multi", "meridian").with_label("x", "1");
        assert_eq!(
            content_hash(&a).expect("hash"),
            content_hash(&b).expect("hash")
        );

        let c = a.clone().with_annotation("y", "2");
        assert_ne!(
            content_hash(&a).expect("hash"),
            content_hash(&c).expect("hash")
        );
    }

    #[test]
    fn object_meta_sets_managed_by() {
        let meta = ObjectMeta::new("a", "b");
        assert_eq!(
            meta.labels.get(crate::LABEL_MANAGED_BY).map(String::as_str),
            Some(crate::LABEL_MANAGED_BY_MERIDIAN)
        );
    }

    #[tokio::test]
    async fn read_secret_key_trims_value() {
        let mut reader = MockSecretReader::new();
        reader.expect_get().returning(|_, _| {
            let mut data = SecretData::new();
            data.insert("paasToken".to_string(), b"  token\n".to_vec());
            Ok(Some(data))
        });

        let value = read_secret_key(&reader, "fleet", "meridian", "paasToken")
            .await
            .expect("key should be present");
        assert_eq!(value, "token");
    }

    #[tokio::test]
    async fn read_secret_key_reports_missing_secret_and_key() {
        let mut reader = MockSecretReader::new();
        reader
            .expect_get()
            .withf(|name, _| name == "absent")
            .returning(|_, _| Ok(None));
        reader
            .expect_get()
            .withf(|name, _| name == "present")
            .returning(|_, _| Ok(Some(SecretData::new())));

        let err = read_secret_key(&reader, "absent", "ns", "k")
            .await
            .expect_err("secret is absent");
        assert!(matches!(err, Error::MissingReference { key: None, .. }));

        let err = read_secret_key(&reader, "present", "ns", "k")
            .await
            .expect_err("key is absent");
        assert!(matches!(err, Error::MissingReference { key: Some(_), .. }));
    }
}
