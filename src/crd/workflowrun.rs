//! WorkflowRun Custom Resource Definition
//!
//! A WorkflowRun is one execution of a Workflow: per-stage parameter
//! overrides, per-resource parameter overrides, and the execution context
//! the run targets.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ExecutionContext, ParameterItem};

/// Specification for a WorkflowRun
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cyclone.dev",
    version = "v1alpha1",
    kind = "WorkflowRun",
    plural = "workflowruns",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunSpec {
    /// Name of the Workflow this run executes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_ref: Option<String>,

    /// Per-stage parameter overrides; these win over stage defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageOverride>,

    /// Per-resource parameter overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceOverride>,

    /// Execution context for this run; falls back to the operator default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<ExecutionContext>,
}

/// Parameter overrides for one stage of the run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageOverride {
    /// Stage name
    pub name: String,
    /// Override values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterItem>,
}

/// Parameter overrides for one resource of the run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverride {
    /// Resource name
    pub name: String,
    /// Override values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterItem>,
}
