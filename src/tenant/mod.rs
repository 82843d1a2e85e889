//! Tenant records
//!
//! A tenant owns a deterministic namespace and common PVC on every cluster
//! opened for it. The tenant record itself (quota policy, default PVC
//! settings) is stored as JSON in an annotation on the tenant namespace of
//! the control cluster and is read-only to the core.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::client::ClusterClient;
use crate::{Error, Result};

/// Prefix of tenant namespaces
pub const TENANT_NAMESPACE_PREFIX: &str = "cyclone--";
/// Prefix of tenant common PVCs
pub const TENANT_PVC_PREFIX: &str = "cyclone-pvc--";
/// Annotation on the tenant namespace holding the tenant record
pub const TENANT_INFO_ANNOTATION: &str = "cyclone.dev/tenant-info";
/// Name of the resource quota enforced in tenant namespaces
pub const TENANT_QUOTA_NAME: &str = "cyclone-quota";

/// Namespace of a tenant, derived deterministically from the tenant name
pub fn tenant_namespace(tenant: &str) -> String {
    format!("{TENANT_NAMESPACE_PREFIX}{tenant}")
}

/// Common PVC of a tenant, derived deterministically from the tenant name
pub fn tenant_pvc(tenant: &str) -> String {
    format!("{TENANT_PVC_PREFIX}{tenant}")
}

/// A tenant record
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Tenant name
    pub name: String,
    /// Tenant policy
    pub spec: TenantSpec,
}

/// Quota policy and PVC defaults of a tenant
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Defaults for the tenant's common PVC
    #[serde(default)]
    pub persistent_volume_claim: TenantPvc,

    /// Hard quota limits enforced in the tenant namespace, keyed by
    /// Kubernetes resource name (e.g. `limits.cpu`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_quota: BTreeMap<String, String>,
}

/// PVC defaults of a tenant
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantPvc {
    /// Storage class; `None` uses the cluster default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Requested size; empty falls back to the operator default
    #[serde(default)]
    pub size: String,
}

/// Read access to tenant records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Read a tenant record by name
    async fn get(&self, name: &str) -> Result<Tenant>;
}

/// [`TenantStore`] reading the record from the tenant namespace annotation
/// on the control cluster
pub struct NamespaceTenantStore {
    client: Arc<dyn ClusterClient>,
}

impl NamespaceTenantStore {
    /// Create a store reading through the given control-cluster client
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TenantStore for NamespaceTenantStore {
    async fn get(&self, name: &str) -> Result<Tenant> {
        let namespace = self
            .client
            .get_namespace(&tenant_namespace(name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found("tenant", name)
                } else {
                    e
                }
            })?;

        let blob = namespace
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(TENANT_INFO_ANNOTATION))
            .ok_or_else(|| Error::not_found("tenant", name))?;

        let spec: TenantSpec = serde_json::from_str(blob)
            .map_err(|e| Error::decode(format!("tenant record for '{name}': {e}")))?;

        Ok(Tenant {
            name: name.to_string(),
            spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::client::MockClusterClient;

    fn namespace_with_annotation(value: &str) -> Namespace {
        let mut annotations = BTreeMap::new();
        annotations.insert(TENANT_INFO_ANNOTATION.to_string(), value.to_string());
        Namespace {
            metadata: ObjectMeta {
                name: Some("cyclone--t1".to_string()),
                annotations: Some(annotations),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }
    }

    #[test]
    fn derived_names_are_deterministic() {
        assert_eq!(tenant_namespace("t1"), "cyclone--t1");
        assert_eq!(tenant_pvc("t1"), "cyclone-pvc--t1");
    }

    #[tokio::test]
    async fn reads_tenant_record_from_annotation() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_namespace()
            .withf(|name| name == "cyclone--t1")
            .returning(|_| {
                Ok(namespace_with_annotation(
                    r#"{"persistentVolumeClaim":{"storageClass":"fast","size":"20Gi"},
                        "resourceQuota":{"limits.cpu":"4"}}"#,
                ))
            });

        let store = NamespaceTenantStore::new(Arc::new(client));
        let tenant = store.get("t1").await.unwrap();

        assert_eq!(tenant.name, "t1");
        assert_eq!(tenant.spec.persistent_volume_claim.size, "20Gi");
        assert_eq!(
            tenant.spec.persistent_volume_claim.storage_class.as_deref(),
            Some("fast")
        );
        assert_eq!(tenant.spec.resource_quota.get("limits.cpu").unwrap(), "4");
    }

    #[tokio::test]
    async fn missing_annotation_is_not_found() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_namespace()
            .returning(|_| Ok(Namespace::default()));

        let store = NamespaceTenantStore::new(Arc::new(client));
        let err = store.get("t1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn corrupt_record_is_a_decode_error() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_namespace()
            .returning(|_| Ok(namespace_with_annotation("{not json")));

        let store = NamespaceTenantStore::new(Arc::new(client));
        let err = store.get("t1").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
