//! Worker cluster provisioning
//!
//! Opening a cluster for a tenant ensures the substrate the pod compiler
//! assumes: the tenant namespace exists, its resource quota is enforced, and
//! the common PVC is bound. Closing tears the substrate down. Both
//! operations are idempotent under `AlreadyExists`/`NotFound`; every other
//! error surfaces to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceQuota, ResourceQuotaSpec,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::client::ClientFactory;
use crate::config::ControllerConfig;
use crate::integration::ClusterSource;
use crate::tenant::{tenant_namespace, tenant_pvc, Tenant, TenantStore, TENANT_QUOTA_NAME};
use crate::Result;

/// Opens and closes worker clusters for tenants
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Ensure namespace, quota, and common PVC exist on the cluster.
    ///
    /// Derived namespace and PVC names are written back into the source so
    /// the persisted record reflects what the tenant actually uses.
    async fn open(&self, cluster: &mut ClusterSource, tenant: &str) -> Result<()>;

    /// Tear down what `open` created. Destructive: data in the tenant PVC
    /// is lost.
    async fn close(&self, cluster: &ClusterSource, tenant: &str) -> Result<()>;
}

/// Production [`Provisioner`]
pub struct ClusterProvisioner {
    factory: Arc<dyn ClientFactory>,
    tenants: Arc<dyn TenantStore>,
    config: ControllerConfig,
}

impl ClusterProvisioner {
    /// Create a provisioner
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        tenants: Arc<dyn TenantStore>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            factory,
            tenants,
            config,
        }
    }
}

#[async_trait]
impl Provisioner for ClusterProvisioner {
    async fn open(&self, cluster: &mut ClusterSource, tenant: &str) -> Result<()> {
        let client = self
            .factory
            .client_for(&cluster.credential, cluster.is_control_cluster)
            .await?;
        let record = self.tenants.get(tenant).await?;

        if !cluster.namespace.is_empty() {
            // Pre-supplied namespaces must already exist.
            client.get_namespace(&cluster.namespace).await?;
        } else {
            cluster.namespace = tenant_namespace(tenant);
            match client.create_namespace(&cluster.namespace).await {
                Err(e) if e.is_already_exists() => {}
                other => other?,
            }
            info!(tenant = %tenant, namespace = %cluster.namespace, "Tenant namespace ensured");
        }

        let quota = tenant_resource_quota(&record, &cluster.namespace);
        match client.create_resource_quota(&cluster.namespace, quota).await {
            Err(e) if e.is_already_exists() => {}
            other => other?,
        }

        if !cluster.pvc.is_empty() {
            // Pre-supplied PVCs must already exist.
            client.get_pvc(&cluster.namespace, &cluster.pvc).await?;
        } else {
            let claim = tenant_volume_claim(&record, &cluster.namespace, &self.config);
            match client.create_pvc(&cluster.namespace, claim).await {
                Err(e) if e.is_already_exists() => {}
                other => other?,
            }
            cluster.pvc = tenant_pvc(tenant);
            info!(tenant = %tenant, pvc = %cluster.pvc, "Tenant PVC ensured");
        }

        Ok(())
    }

    async fn close(&self, cluster: &ClusterSource, tenant: &str) -> Result<()> {
        let client = self
            .factory
            .client_for(&cluster.credential, cluster.is_control_cluster)
            .await?;

        // A namespace we derived is ours to delete; deletion cascades to the
        // quota and PVC inside it.
        if cluster.namespace == tenant_namespace(tenant) {
            match client.delete_namespace(&cluster.namespace).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
            info!(tenant = %tenant, namespace = %cluster.namespace, "Tenant namespace deleted");
            return Ok(());
        }

        // Externally supplied namespaces are not ours; only remove the PVC
        // we created in them.
        if cluster.pvc == tenant_pvc(tenant) {
            match client.delete_pvc(&cluster.namespace, &cluster.pvc).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
            info!(tenant = %tenant, pvc = %cluster.pvc, "Tenant PVC deleted");
        }

        Ok(())
    }
}

/// Resource quota enforcing the tenant's policy in a namespace
pub fn tenant_resource_quota(tenant: &Tenant, namespace: &str) -> ResourceQuota {
    let hard: BTreeMap<String, Quantity> = tenant
        .spec
        .resource_quota
        .iter()
        .map(|(k, v)| (k.clone(), Quantity(v.clone())))
        .collect();

    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(TENANT_QUOTA_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ResourceQuotaSpec {
            hard: (!hard.is_empty()).then_some(hard),
            ..ResourceQuotaSpec::default()
        }),
        ..ResourceQuota::default()
    }
}

/// Common PVC for the tenant; size falls back from the tenant record to the
/// operator default
pub fn tenant_volume_claim(
    tenant: &Tenant,
    namespace: &str,
    config: &ControllerConfig,
) -> PersistentVolumeClaim {
    let mut size = tenant.spec.persistent_volume_claim.size.clone();
    if size.is_empty() {
        size = config.default_pvc.size.clone();
    }
    let storage_class = tenant
        .spec
        .persistent_volume_claim
        .storage_class
        .clone()
        .or_else(|| config.default_pvc.storage_class.clone());

    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity(size));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(tenant_pvc(&tenant.name)),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteMany".to_string()]),
            storage_class_name: storage_class,
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}
