//! Integrations: tenant-scoped external-system records
//!
//! An integration stores credentials and bindings for an external system a
//! workflow depends on: a worker cluster, an SCM, a docker registry, or an
//! opaque general system. Records are persisted as labeled secrets in the
//! tenant namespace; the labels make selector-based listing possible and
//! encode whether a cluster integration is a worker cluster.

mod provision;
mod store;

pub use provision::{ClusterProvisioner, Provisioner};
pub use store::IntegrationStore;

#[cfg(test)]
pub(crate) use provision::MockProvisioner;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::ParameterItem;
use crate::{Error, Result};

/// Prefix of the secret holding an integration record
pub const INTEGRATION_SECRET_PREFIX: &str = "integration.";
/// Label carrying the integration type
pub const LABEL_INTEGRATION_TYPE: &str = "cyclone.dev/integration-type";
/// Label marking a cluster integration as a worker cluster
pub const LABEL_CLUSTER_ON: &str = "cyclone.dev/cluster-on";
/// Canonical true value for boolean labels
pub const LABEL_TRUE_VALUE: &str = "true";
/// Data key of the serialized integration spec inside the secret
pub const SECRET_KEY_INTEGRATION: &str = "integration";

/// Secret name for an integration
pub fn integration_secret_name(integration: &str) -> String {
    format!("{INTEGRATION_SECRET_PREFIX}{integration}")
}

/// Integration name encoded in a secret name; names without the expected
/// prefix are returned unchanged
pub fn integration_name(secret_name: &str) -> &str {
    secret_name
        .strip_prefix(INTEGRATION_SECRET_PREFIX)
        .unwrap_or(secret_name)
}

/// A tenant-scoped integration record
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    /// Standard object metadata; the name is the integration name, not the
    /// storage name
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Integration payload
    pub spec: IntegrationSpec,
}

impl Integration {
    /// Integration name, empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// True if this integration describes a worker cluster
    pub fn is_worker_cluster(&self) -> bool {
        self.spec.type_ == IntegrationType::Cluster
            && self
                .spec
                .cluster
                .as_ref()
                .map(|c| c.is_worker_cluster)
                .unwrap_or(false)
    }
}

/// Kinds of integration
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum IntegrationType {
    /// A Kubernetes cluster, possibly usable to run workflow pods
    Cluster,
    /// Source code management system
    #[serde(rename = "SCM")]
    Scm,
    /// Docker registry
    DockerRegistry,
    /// Opaque external system described by key-value items
    #[default]
    General,
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster => write!(f, "Cluster"),
            Self::Scm => write!(f, "SCM"),
            Self::DockerRegistry => write!(f, "DockerRegistry"),
            Self::General => write!(f, "General"),
        }
    }
}

/// Payload of an integration, one source field per type
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    /// Integration type
    #[serde(rename = "type")]
    pub type_: IntegrationType,

    /// Cluster binding, set when `type` is `Cluster`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterSource>,

    /// SCM credentials, set when `type` is `SCM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm: Option<ScmSource>,

    /// Registry credentials, set when `type` is `DockerRegistry`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_registry: Option<DockerRegistrySource>,

    /// Opaque items, set when `type` is `General`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<GeneralSource>,
}

/// A cluster the tenant can run workflow pods on
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSource {
    /// Credential used to reach the cluster
    #[serde(default)]
    pub credential: ClusterCredential,

    /// True when this record describes the control cluster itself
    #[serde(default)]
    pub is_control_cluster: bool,

    /// True when workflow pods may run on this cluster; toggling this flag
    /// opens or closes the cluster for the tenant
    #[serde(default)]
    pub is_worker_cluster: bool,

    /// Pre-existing namespace to run in; empty means derive the tenant
    /// namespace and create it
    #[serde(default)]
    pub namespace: String,

    /// Pre-existing PVC to use; empty means derive the tenant PVC and
    /// create it
    #[serde(default)]
    pub pvc: String,
}

/// Credential blob for a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCredential {
    /// API server address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// Basic-auth user
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Basic-auth password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Bearer token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bearer_token: String,

    /// Full kubeconfig YAML; takes precedence over the discrete fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<String>,
}

/// SCM credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScmSource {
    /// SCM server address
    #[serde(default)]
    pub server: String,
    /// SCM flavor, e.g. GitHub or GitLab
    #[serde(rename = "type", default)]
    pub type_: String,
    /// User name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Access token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

/// Docker registry credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DockerRegistrySource {
    /// Registry server address
    #[serde(default)]
    pub server: String,
    /// User name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// Opaque external system described by key-value items
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSource {
    /// Items of the external system
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ParameterItem>,
}

/// Decode an integration from its stored secret.
///
/// Fails with `Decode` when the spec blob is corrupt.
pub fn secret_to_integration(secret: &Secret) -> Result<Integration> {
    let secret_name = secret.metadata.name.as_deref().unwrap_or_default();
    let name = integration_name(secret_name).to_string();

    let blob = secret
        .data
        .as_ref()
        .and_then(|d| d.get(SECRET_KEY_INTEGRATION))
        .ok_or_else(|| {
            Error::decode(format!(
                "secret '{secret_name}' has no '{SECRET_KEY_INTEGRATION}' data key"
            ))
        })?;

    let spec: IntegrationSpec = serde_json::from_slice(&blob.0).map_err(|e| {
        Error::decode(format!("integration spec in secret '{secret_name}': {e}"))
    })?;

    let mut metadata = secret.metadata.clone();
    metadata.name = Some(name);
    Ok(Integration { metadata, spec })
}

/// Build the secret persisting an integration.
///
/// The storage name is derived from the integration name, and the labels
/// encode the type and, for worker clusters, the worker flag.
pub fn integration_to_secret(integration: &Integration) -> Result<Secret> {
    let name = integration.name();
    if name.is_empty() {
        return Err(Error::validation("integration name must be set"));
    }

    let mut metadata = integration.metadata.clone();
    metadata.name = Some(integration_secret_name(name));

    let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(
        LABEL_INTEGRATION_TYPE.to_string(),
        integration.spec.type_.to_string(),
    );
    if integration.is_worker_cluster() {
        labels.insert(LABEL_CLUSTER_ON.to_string(), LABEL_TRUE_VALUE.to_string());
    } else {
        labels.remove(LABEL_CLUSTER_ON);
    }

    let blob = serde_json::to_vec(&integration.spec)
        .map_err(|e| Error::decode(format!("integration spec for '{name}': {e}")))?;

    let mut data = BTreeMap::new();
    data.insert(SECRET_KEY_INTEGRATION.to_string(), ByteString(blob));

    Ok(Secret {
        metadata,
        data: Some(data),
        ..Secret::default()
    })
}

/// Merge caller-supplied annotations over existing ones.
///
/// Caller keys overwrite same-named existing keys; all other existing
/// annotations are preserved.
pub fn merge_annotations(
    supplied: Option<&BTreeMap<String, String>>,
    existing: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    let mut merged = existing.cloned().unwrap_or_default();
    if let Some(supplied) = supplied {
        for (k, v) in supplied {
            merged.insert(k.clone(), v.clone());
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}
