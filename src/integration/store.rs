//! Integration record store
//!
//! CRUD over integrations persisted as labeled secrets in the tenant
//! namespace. Worker-cluster integrations drive provisioning side effects:
//! creating one (or promoting one on update) opens the cluster for the
//! tenant before the record is written, demoting one closes it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::client::ClusterClient;
use crate::integration::{
    integration_secret_name, integration_to_secret, merge_annotations, secret_to_integration,
    Integration, IntegrationType, Provisioner, LABEL_CLUSTER_ON, LABEL_INTEGRATION_TYPE,
    LABEL_TRUE_VALUE,
};
use crate::retry::{exhausted, retry_on_conflict, ConflictRetry};
use crate::tenant::tenant_namespace;
use crate::{Error, Result};

/// Store for tenant-scoped integration records
pub struct IntegrationStore {
    client: Arc<dyn ClusterClient>,
    provisioner: Arc<dyn Provisioner>,
    retry: ConflictRetry,
}

impl IntegrationStore {
    /// Create a store writing through the given control-cluster client
    pub fn new(client: Arc<dyn ClusterClient>, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            client,
            provisioner,
            retry: ConflictRetry::default(),
        }
    }

    /// List integrations of a tenant.
    ///
    /// Returns the total number of matching records and the page
    /// `[offset, offset+limit)` of the decoded sequence. The total counts
    /// records that fail to decode even though they are skipped in the page
    /// body, so a page can be shorter than `limit` while more items exist.
    pub async fn list(
        &self,
        tenant: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Integration>)> {
        let secrets = self
            .client
            .list_secrets(&tenant_namespace(tenant), LABEL_INTEGRATION_TYPE)
            .await?;
        let total = secrets.len();

        let items = self
            .decode_all(secrets)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();
        Ok((total, items))
    }

    /// List integrations describing worker clusters of the tenant
    pub async fn list_worker_clusters(&self, tenant: &str) -> Result<Vec<Integration>> {
        let selector = format!("{LABEL_CLUSTER_ON}={LABEL_TRUE_VALUE}");
        let secrets = self
            .client
            .list_secrets(&tenant_namespace(tenant), &selector)
            .await?;
        Ok(self.decode_all(secrets))
    }

    /// Create an integration.
    ///
    /// A worker-cluster integration opens the cluster for the tenant before
    /// the record is written, so a failed open leaves no record behind.
    /// Fails with `AlreadyExists` when the record exists.
    pub async fn create(&self, tenant: &str, mut integration: Integration) -> Result<Integration> {
        if integration.name().is_empty() {
            return Err(Error::validation("integration name must be set"));
        }

        if integration.spec.type_ == IntegrationType::Cluster {
            if let Some(cluster) = integration.spec.cluster.as_mut() {
                if cluster.is_worker_cluster {
                    self.provisioner.open(cluster, tenant).await?;
                }
            }
        }

        let secret = integration_to_secret(&integration)?;
        match self
            .client
            .create_secret(&tenant_namespace(tenant), secret)
            .await
        {
            Err(e) if e.is_already_exists() => {
                Err(Error::already_exists("integration", integration.name()))
            }
            Err(e) => Err(e),
            Ok(_) => {
                info!(tenant = %tenant, integration = %integration.name(), "Integration created");
                Ok(integration)
            }
        }
    }

    /// Read an integration by name
    pub async fn get(&self, tenant: &str, name: &str) -> Result<Integration> {
        let secret = self
            .client
            .get_secret(&tenant_namespace(tenant), &integration_secret_name(name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found("integration", name)
                } else {
                    e
                }
            })?;
        secret_to_integration(&secret)
    }

    /// Update an integration.
    ///
    /// Toggling the worker-cluster flag opens (`false→true`) or closes
    /// (`true→false`, destructive) the cluster before the record write. The
    /// write itself retries on conflict, re-reading the record each attempt
    /// and replaying the data/annotation/label merge: caller-supplied
    /// annotations overwrite same-named keys, other existing annotations are
    /// preserved.
    pub async fn update(
        &self,
        tenant: &str,
        name: &str,
        mut integration: Integration,
    ) -> Result<Integration> {
        integration.metadata.name = Some(name.to_string());

        if integration.spec.type_ == IntegrationType::Cluster && integration.spec.cluster.is_some()
        {
            let old = self.get(tenant, name).await?;
            let was_worker = old
                .spec
                .cluster
                .as_ref()
                .map(|c| c.is_worker_cluster)
                .unwrap_or(false);

            if let Some(cluster) = integration.spec.cluster.as_mut() {
                if !was_worker && cluster.is_worker_cluster {
                    self.provisioner.open(cluster, tenant).await?;
                } else if was_worker && !cluster.is_worker_cluster {
                    self.provisioner.close(cluster, tenant).await?;
                    info!(tenant = %tenant, integration = %name, "Worker cluster closed");
                }
            }
        }

        let desired = integration_to_secret(&integration)?;
        let worker = integration.is_worker_cluster();
        let type_label = integration.spec.type_.to_string();
        let namespace = tenant_namespace(tenant);
        let secret_name = integration_secret_name(name);

        retry_on_conflict(&self.retry, "update integration", || {
            let desired = desired.clone();
            let type_label = type_label.clone();
            let namespace = namespace.clone();
            let secret_name = secret_name.clone();
            async move {
                let origin = self.client.get_secret(&namespace, &secret_name).await?;

                let mut updated = origin.clone();
                updated.data = desired.data.clone();
                updated.metadata.annotations = merge_annotations(
                    desired.metadata.annotations.as_ref(),
                    origin.metadata.annotations.as_ref(),
                );

                let labels = updated.metadata.labels.get_or_insert_with(BTreeMap::new);
                labels.insert(LABEL_INTEGRATION_TYPE.to_string(), type_label);
                if worker {
                    labels.insert(LABEL_CLUSTER_ON.to_string(), LABEL_TRUE_VALUE.to_string());
                } else {
                    labels.remove(LABEL_CLUSTER_ON);
                }

                self.client.update_secret(&namespace, updated).await
            }
        })
        .await
        .map_err(|e| exhausted("integration", name, e))?;

        Ok(integration)
    }

    /// Delete an integration record.
    ///
    /// Provisioned cluster resources are left untouched; closing a worker
    /// cluster is a separate, destructive operation.
    pub async fn delete(&self, tenant: &str, name: &str) -> Result<()> {
        self.client
            .delete_secret(&tenant_namespace(tenant), &integration_secret_name(name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found("integration", name)
                } else {
                    e
                }
            })
    }

    fn decode_all(&self, secrets: Vec<k8s_openapi::api::core::v1::Secret>) -> Vec<Integration> {
        secrets
            .iter()
            .filter_map(|secret| match secret_to_integration(secret) {
                Ok(integration) => Some(integration),
                Err(e) => {
                    warn!(
                        secret = secret.metadata.name.as_deref().unwrap_or_default(),
                        error = %e,
                        "Skipping undecodable integration record"
                    );
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;

    use crate::client::MockClusterClient;
    use crate::integration::{
        ClusterCredential, ClusterSource, IntegrationSpec, MockProvisioner, SECRET_KEY_INTEGRATION,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn cluster_integration(name: &str, worker: bool) -> Integration {
        Integration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: IntegrationSpec {
                type_: IntegrationType::Cluster,
                cluster: Some(ClusterSource {
                    credential: ClusterCredential {
                        server: "https://10.0.0.1:6443".to_string(),
                        bearer_token: "t0ken".to_string(),
                        ..ClusterCredential::default()
                    },
                    is_worker_cluster: worker,
                    ..ClusterSource::default()
                }),
                ..IntegrationSpec::default()
            },
        }
    }

    fn stored_secret(name: &str, worker: bool) -> Secret {
        integration_to_secret(&cluster_integration(name, worker)).unwrap()
    }

    fn store(client: MockClusterClient, provisioner: MockProvisioner) -> IntegrationStore {
        IntegrationStore::new(Arc::new(client), Arc::new(provisioner))
    }

    #[tokio::test]
    async fn create_opens_worker_cluster_before_record_write() {
        let opened = Arc::new(AtomicBool::new(false));

        let mut provisioner = MockProvisioner::new();
        let flag = opened.clone();
        provisioner
            .expect_open()
            .times(1)
            .returning(move |cluster, tenant| {
                assert_eq!(tenant, "t1");
                flag.store(true, Ordering::SeqCst);
                cluster.namespace = "cyclone--t1".to_string();
                cluster.pvc = "cyclone-pvc--t1".to_string();
                Ok(())
            });

        let mut client = MockClusterClient::new();
        let flag = opened.clone();
        client
            .expect_create_secret()
            .withf(move |ns, secret| {
                // The cluster must be open by the time the record is written,
                // and the written record carries the derived names.
                assert!(flag.load(Ordering::SeqCst));
                let restored = secret_to_integration(secret).unwrap();
                let cluster = restored.spec.cluster.unwrap();
                ns == "cyclone--t1"
                    && cluster.namespace == "cyclone--t1"
                    && cluster.pvc == "cyclone-pvc--t1"
            })
            .times(1)
            .returning(|_, secret| Ok(secret));

        let store = store(client, provisioner);
        store
            .create("t1", cluster_integration("staging", true))
            .await
            .unwrap();
        assert!(opened.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn create_non_worker_skips_provisioning() {
        let mut client = MockClusterClient::new();
        client
            .expect_create_secret()
            .times(1)
            .returning(|_, secret| Ok(secret));

        // No expectations on the provisioner: any call would panic.
        let store = store(client, MockProvisioner::new());
        store
            .create("t1", cluster_integration("staging", false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_existing_record_fails() {
        let mut client = MockClusterClient::new();
        client
            .expect_create_secret()
            .returning(|_, _| Err(Error::already_exists("secret", "integration.staging")));

        let store = store(client, MockProvisioner::new());
        let err = store
            .create("t1", cluster_integration("staging", false))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn get_missing_record_is_not_found() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_secret()
            .returning(|_, name| Err(Error::not_found("secret", name)));

        let store = store(client, MockProvisioner::new());
        let err = store.get("t1", "staging").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "integration", .. }));
    }

    #[tokio::test]
    async fn get_corrupt_record_is_a_decode_error() {
        let mut client = MockClusterClient::new();
        client.expect_get_secret().returning(|_, _| {
            let mut secret = stored_secret("staging", false);
            secret
                .data
                .as_mut()
                .unwrap()
                .insert(SECRET_KEY_INTEGRATION.to_string(), ByteString(b"garbage".to_vec()));
            Ok(secret)
        });

        let store = store(client, MockProvisioner::new());
        assert!(matches!(
            store.get("t1", "staging").await,
            Err(Error::Decode(_))
        ));
    }

    #[tokio::test]
    async fn list_counts_undecodable_records_but_skips_them() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_secrets()
            .withf(|ns, selector| ns == "cyclone--t1" && selector == LABEL_INTEGRATION_TYPE)
            .returning(|_, _| {
                let mut corrupt = stored_secret("broken", false);
                corrupt
                    .data
                    .as_mut()
                    .unwrap()
                    .insert(SECRET_KEY_INTEGRATION.to_string(), ByteString(b"garbage".to_vec()));
                Ok(vec![
                    stored_secret("alpha", false),
                    corrupt,
                    stored_secret("beta", true),
                ])
            });

        let store = store(client, MockProvisioner::new());
        let (total, items) = store.list("t1", 0, 10).await.unwrap();

        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name(), "alpha");
        assert_eq!(items[1].name(), "beta");
    }

    #[tokio::test]
    async fn list_slices_the_decoded_sequence() {
        let mut client = MockClusterClient::new();
        client.expect_list_secrets().returning(|_, _| {
            Ok(vec![
                stored_secret("alpha", false),
                stored_secret("beta", false),
                stored_secret("gamma", false),
            ])
        });

        let store = store(client, MockProvisioner::new());
        let (total, items) = store.list("t1", 1, 1).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "beta");

        let (_, items) = store.list("t1", 2, 5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "gamma");
    }

    #[tokio::test]
    async fn list_worker_clusters_filters_by_worker_label() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_secrets()
            .withf(|_, selector| selector == "cyclone.dev/cluster-on=true")
            .returning(|_, _| Ok(vec![stored_secret("staging", true)]));

        let store = store(client, MockProvisioner::new());
        let clusters = store.list_worker_clusters("t1").await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].is_worker_cluster());
    }

    #[tokio::test]
    async fn update_promoting_to_worker_opens_cluster() {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_open().times(1).returning(|_, _| Ok(()));

        let mut client = MockClusterClient::new();
        client
            .expect_get_secret()
            .returning(|_, _| Ok(stored_secret("staging", false)));
        client
            .expect_update_secret()
            .returning(|_, secret| Ok(secret));

        let store = store(client, provisioner);
        store
            .update("t1", "staging", cluster_integration("staging", true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_demoting_from_worker_closes_cluster() {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_close().times(1).returning(|_, _| Ok(()));

        let mut client = MockClusterClient::new();
        client
            .expect_get_secret()
            .returning(|_, _| Ok(stored_secret("staging", true)));
        client
            .expect_update_secret()
            .withf(|_, secret| {
                // The worker label is removed along with the demotion.
                let labels = secret.metadata.labels.as_ref().unwrap();
                !labels.contains_key(LABEL_CLUSTER_ON)
            })
            .returning(|_, secret| Ok(secret));

        let store = store(client, provisioner);
        store
            .update("t1", "staging", cluster_integration("staging", false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_merges_annotations_preserving_existing_keys() {
        let mut client = MockClusterClient::new();
        client.expect_get_secret().returning(|_, _| {
            let mut origin = stored_secret("staging", false);
            let mut annotations = BTreeMap::new();
            annotations.insert("existing".to_string(), "kept".to_string());
            annotations.insert("owner".to_string(), "team-a".to_string());
            origin.metadata.annotations = Some(annotations);
            Ok(origin)
        });
        client
            .expect_update_secret()
            .withf(|_, secret| {
                let annotations = secret.metadata.annotations.as_ref().unwrap();
                annotations.get("existing").map(String::as_str) == Some("kept")
                    && annotations.get("owner").map(String::as_str) == Some("team-b")
            })
            .times(1)
            .returning(|_, secret| Ok(secret));

        let mut updated = cluster_integration("staging", false);
        let mut annotations = BTreeMap::new();
        annotations.insert("owner".to_string(), "team-b".to_string());
        updated.metadata.annotations = Some(annotations);

        let store = store(client, MockProvisioner::new());
        store.update("t1", "staging", updated).await.unwrap();
    }

    #[tokio::test]
    async fn update_retries_conflicts_and_converges() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let mut client = MockClusterClient::new();
        client
            .expect_get_secret()
            .returning(|_, _| Ok(stored_secret("staging", false)));
        client.expect_update_secret().returning(move |_, secret| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::conflict("secret", "integration.staging"))
            } else {
                Ok(secret)
            }
        });

        let store = store(client, MockProvisioner::new());
        store
            .update("t1", "staging", cluster_integration("staging", false))
            .await
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_surfaces_conflict_after_retry_budget() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_secret()
            .returning(|_, _| Ok(stored_secret("staging", false)));
        client
            .expect_update_secret()
            .returning(|_, _| Err(Error::conflict("secret", "integration.staging")));

        let store = store(client, MockProvisioner::new());
        let err = store
            .update("t1", "staging", cluster_integration("staging", false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { kind: "integration", .. }));
    }

    #[tokio::test]
    async fn delete_removes_record_only() {
        let mut client = MockClusterClient::new();
        client
            .expect_delete_secret()
            .withf(|ns, name| ns == "cyclone--t1" && name == "integration.staging")
            .times(1)
            .returning(|_, _| Ok(()));

        // Provisioner must not be touched on delete.
        let store = store(client, MockProvisioner::new());
        store.delete("t1", "staging").await.unwrap();
    }
}
