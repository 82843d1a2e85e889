//! Workflow Custom Resource Definition
//!
//! A Workflow composes stages and wires artifacts between them. Artifact
//! sources use the form `<stageName>/<artifactName>` and always refer to an
//! output artifact of an upstream stage. Workflow-level resource
//! requirements are the defaults applied to stage-authored containers.

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Workflow
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cyclone.dev",
    version = "v1alpha1",
    kind = "Workflow",
    plural = "workflows",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Stages of the workflow with their artifact wiring
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageItem>,

    /// Default resource requirements for stage-authored containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// A stage in the workflow graph
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageItem {
    /// Name of the Stage CR
    pub name: String,

    /// Stages this stage depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,

    /// Input artifact bindings for this stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactBinding>,
}

/// Binds a stage input artifact to an upstream output artifact
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBinding {
    /// Input artifact name declared by the consuming stage
    pub name: String,
    /// Source in the form `<stageName>/<artifactName>`
    pub source: String,
}
