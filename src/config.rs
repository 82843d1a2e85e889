//! Operator configuration
//!
//! All tunables the compiler and provisioner depend on live in
//! [`ControllerConfig`], passed explicitly to the components that need it.
//! There is no process-global configuration.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use serde::{Deserialize, Serialize};

use crate::crd::ExecutionContext;

/// Image table key for the Git resource resolver
pub const GIT_RESOLVER_IMAGE: &str = "git-resolver";
/// Image table key for the Image resource resolver
pub const IMAGE_RESOLVER_IMAGE: &str = "image-resolver";
/// Image table key for the KV resource resolver
pub const KV_RESOLVER_IMAGE: &str = "kv-resolver";
/// Image table key for the coordinator sidecar
pub const COORDINATOR_IMAGE: &str = "coordinator";

/// Default size of a tenant's common PVC when neither the tenant nor the
/// cluster integration specifies one
pub const DEFAULT_PVC_SIZE: &str = "5Gi";

/// Operator configuration consumed by the core components.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Resolver and coordinator images, keyed by the `*_IMAGE` constants
    pub images: BTreeMap<String, String>,

    /// Pull policy applied to every system container the compiler emits
    pub image_pull_policy: String,

    /// Name of the registry-credentials secret projected into image
    /// resolvers; `None` disables the registry config volume
    pub registry_secret: Option<String>,

    /// Address of the server the coordinator reports to
    pub cyclone_server_addr: String,

    /// Default resource requirements filled into every container that does
    /// not set its own
    pub default_resource_requirements: ResourceRequirements,

    /// Execution context used when a run does not carry its own. Its
    /// service account applies to every compiled pod regardless of the
    /// run's execution context.
    pub execution_context: ExecutionContext,

    /// Defaults for tenant common PVCs
    pub default_pvc: PvcConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            images: BTreeMap::new(),
            image_pull_policy: "IfNotPresent".to_string(),
            registry_secret: None,
            cyclone_server_addr: String::new(),
            default_resource_requirements: ResourceRequirements::default(),
            execution_context: ExecutionContext::default(),
            default_pvc: PvcConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Look up an image from the image table
    pub fn image(&self, key: &str) -> Option<&str> {
        self.images.get(key).map(String::as_str)
    }
}

/// Storage class and size defaults for tenant common PVCs
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PvcConfig {
    /// Storage class; `None` uses the cluster default
    pub storage_class: Option<String>,
    /// Requested size, e.g. `5Gi`
    pub size: String,
}

impl Default for PvcConfig {
    fn default() -> Self {
        Self {
            storage_class: None,
            size: DEFAULT_PVC_SIZE.to_string(),
        }
    }
}
