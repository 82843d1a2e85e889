//! Resource Custom Resource Definition
//!
//! A Resource is a typed external entity (git repository, container image,
//! key-value payload, or a custom kind) pulled into a stage by an input
//! resolver and pushed out by an output resolver. Non-persistent resources
//! live in the run's common PVC and are garbage-collected with the run;
//! persistent resources survive in their own PVC binding.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ParameterItem, PersistentBinding, ResourceType};

/// Specification for a Resource
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cyclone.dev",
    version = "v1alpha1",
    kind = "Resource",
    plural = "resources",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Resource kind; built-in kinds use operator-configured resolver images
    #[serde(rename = "type")]
    pub type_: ResourceType,

    /// Resolver image for custom resource kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,

    /// Parameters projected into the resolver environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterItem>,

    /// Persistent binding; absent means the resource is staged in the
    /// run's common PVC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<PersistentBinding>,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            type_: ResourceType::Git,
            resolver: None,
            parameters: Vec::new(),
            persistent: None,
        }
    }
}
