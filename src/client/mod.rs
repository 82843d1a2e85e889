//! Thin façade over the cluster API
//!
//! The core consumes a small set of verbs: namespaces, secrets, PVCs,
//! resource quotas, and typed reads of the cyclone.dev custom resources.
//! [`ClusterClient`] captures exactly that surface so components can be
//! tested against mocks, and [`ClientFactory`] builds clients from stored
//! cluster credentials.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, ResourceQuota, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Resource, Stage, Workflow, WorkflowRun};
use crate::integration::ClusterCredential;
use crate::{Error, Result};

/// Cluster API capabilities consumed by the core.
///
/// Implementations must be safe for concurrent use; components share one
/// client across parallel builds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Read a namespace
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    /// Create a namespace with the given name
    async fn create_namespace(&self, name: &str) -> Result<()>;

    /// Delete a namespace; deletion cascades to namespaced objects
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// List secrets in a namespace matching a label selector
    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>>;

    /// Read a secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// Create a secret
    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<Secret>;

    /// Replace a secret; the resource version carried by the object is the
    /// optimistic-concurrency precondition
    async fn update_secret(&self, namespace: &str, secret: Secret) -> Result<Secret>;

    /// Delete a secret
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    /// Read a persistent volume claim
    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim>;

    /// Create a persistent volume claim
    async fn create_pvc(&self, namespace: &str, pvc: PersistentVolumeClaim) -> Result<()>;

    /// Delete a persistent volume claim
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a resource quota
    async fn create_resource_quota(&self, namespace: &str, quota: ResourceQuota) -> Result<()>;

    /// Read a Stage custom resource
    async fn get_stage(&self, namespace: &str, name: &str) -> Result<Stage>;

    /// Read a Resource custom resource
    async fn get_resource(&self, namespace: &str, name: &str) -> Result<Resource>;

    /// Read a Workflow custom resource
    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow>;

    /// Read a WorkflowRun custom resource
    async fn get_workflowrun(&self, namespace: &str, name: &str) -> Result<WorkflowRun>;
}

/// Production [`ClusterClient`] backed by a kube client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pvcs(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        Ok(self.namespaces().get(name).await?)
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        self.namespaces()
            .create(&PostParams::default(), &namespace)
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn list_secrets(&self, namespace: &str, selector: &str) -> Result<Vec<Secret>> {
        let list = self
            .secrets(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        Ok(self.secrets(namespace).get(name).await?)
    }

    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<Secret> {
        Ok(self
            .secrets(namespace)
            .create(&PostParams::default(), &secret)
            .await?)
    }

    async fn update_secret(&self, namespace: &str, secret: Secret) -> Result<Secret> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        Ok(self
            .secrets(namespace)
            .replace(&name, &PostParams::default(), &secret)
            .await?)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        Ok(self.pvcs(namespace).get(name).await?)
    }

    async fn create_pvc(&self, namespace: &str, pvc: PersistentVolumeClaim) -> Result<()> {
        self.pvcs(namespace)
            .create(&PostParams::default(), &pvc)
            .await?;
        Ok(())
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        self.pvcs(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn create_resource_quota(&self, namespace: &str, quota: ResourceQuota) -> Result<()> {
        let api: Api<ResourceQuota> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), &quota).await?;
        Ok(())
    }

    async fn get_stage(&self, namespace: &str, name: &str) -> Result<Stage> {
        let api: Api<Stage> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn get_resource(&self, namespace: &str, name: &str) -> Result<Resource> {
        let api: Api<Resource> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow> {
        let api: Api<Workflow> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn get_workflowrun(&self, namespace: &str, name: &str) -> Result<WorkflowRun> {
        let api: Api<WorkflowRun> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}

/// Builds [`ClusterClient`]s from stored cluster credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build a client for the given credential.
    ///
    /// `is_control_cluster` selects the in-cluster configuration instead of
    /// the stored credential.
    async fn client_for(
        &self,
        credential: &ClusterCredential,
        is_control_cluster: bool,
    ) -> Result<Arc<dyn ClusterClient>>;
}

/// Production [`ClientFactory`]
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeClientFactory;

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn client_for(
        &self,
        credential: &ClusterCredential,
        is_control_cluster: bool,
    ) -> Result<Arc<dyn ClusterClient>> {
        let client = if is_control_cluster {
            debug!("Using in-cluster configuration for control cluster client");
            Client::try_default().await?
        } else {
            let kubeconfig = kubeconfig_for(credential)?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::dependency(format!("cluster credential rejected: {e}")))?;
            Client::try_from(config)?
        };
        Ok(Arc::new(KubeClusterClient::new(client)))
    }
}

/// Kubeconfig for a credential: the stored blob when present, otherwise one
/// synthesized from the discrete server/user/token fields.
fn kubeconfig_for(credential: &ClusterCredential) -> Result<Kubeconfig> {
    if let Some(blob) = &credential.kube_config {
        return serde_yaml::from_str(blob)
            .map_err(|e| Error::decode(format!("cluster credential kubeconfig: {e}")));
    }

    if credential.server.is_empty() {
        return Err(Error::validation(
            "cluster credential requires either a kubeconfig or a server address",
        ));
    }

    let mut user = serde_json::Map::new();
    if !credential.bearer_token.is_empty() {
        user.insert("token".to_string(), json!(credential.bearer_token));
    } else {
        user.insert("username".to_string(), json!(credential.user));
        user.insert("password".to_string(), json!(credential.password));
    }

    let raw = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": "cyclone",
            "cluster": {
                "server": credential.server,
                "insecure-skip-tls-verify": true,
            },
        }],
        "users": [{"name": "cyclone", "user": user}],
        "contexts": [{
            "name": "cyclone",
            "context": {"cluster": "cyclone", "user": "cyclone"},
        }],
        "current-context": "cyclone",
    });

    serde_json::from_value(raw)
        .map_err(|e| Error::decode(format!("synthesized kubeconfig: {e}")))
}
