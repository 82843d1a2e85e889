//! Stage Custom Resource Definition
//!
//! A Stage is a declarative unit of work: a pod template plus typed inputs
//! (arguments, resources, artifacts) and outputs (resources, artifacts).
//! Exactly one container in the template is the workload; all other
//! containers must carry the sidecar name prefix.

use k8s_openapi::api::core::v1::PodSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ParameterItem;

/// Specification for a Stage
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cyclone.dev",
    version = "v1alpha1",
    kind = "Stage",
    plural = "stages",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec {
    /// Pod workload of the stage; required for pod-based stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodWorkload>,
}

/// Pod template plus typed input/output declarations
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodWorkload {
    /// Declared inputs of the stage
    #[serde(default)]
    pub inputs: StageInputs,

    /// Declared outputs of the stage
    #[serde(default)]
    pub outputs: StageOutputs,

    /// Pod spec template; `{{name}}` placeholders in string fields are
    /// substituted from the resolved parameter map
    pub spec: PodSpec,
}

/// Typed inputs of a stage
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageInputs {
    /// Arguments available to the pod template; the value is the default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ParameterItem>,

    /// Resources pulled before the workload starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<StageResource>,

    /// Artifacts consumed from upstream stages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,
}

/// Typed outputs of a stage
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageOutputs {
    /// Resources pushed after the workload completes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<StageResource>,

    /// Artifacts collected from the workload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,
}

/// Reference to a Resource CR with the path it is mounted at (inputs) or
/// read from (outputs)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageResource {
    /// Name of the Resource CR
    pub name: String,
    /// Mount path in workload containers
    #[serde(default)]
    pub path: String,
}

/// Artifact declaration: a name and the container path it lives at
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageArtifact {
    /// Artifact name
    pub name: String,
    /// Container path: mount point for inputs, source path for outputs
    pub path: String,
}
