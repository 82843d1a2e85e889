//! Custom Resource Definitions for the cyclone.dev API group
//!
//! All resources live in `cyclone.dev/v1alpha1`:
//! - [`Stage`] - a pod template with typed inputs and outputs
//! - [`Resource`] - a typed external entity pulled/pushed by resolvers
//! - [`Workflow`] - stage composition and artifact wiring
//! - [`WorkflowRun`] - one execution with concrete parameter values

mod resource;
mod stage;
mod types;
mod workflow;
mod workflowrun;

pub use resource::{Resource, ResourceSpec};
pub use stage::{
    PodWorkload, Stage, StageArtifact, StageInputs, StageOutputs, StageResource, StageSpec,
};
pub use types::{ExecutionContext, ParameterItem, PersistentBinding, ResourceType};
pub use workflow::{ArtifactBinding, StageItem, Workflow, WorkflowSpec};
pub use workflowrun::{ResourceOverride, StageOverride, WorkflowRun, WorkflowRunSpec};
