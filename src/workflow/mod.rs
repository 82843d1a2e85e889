//! Workflow execution: parameter resolution and the stage-to-pod compiler
//!
//! - [`common`] - naming conventions, mount paths, container selectors
//! - [`template`] - `{{name}}` parameter templating over pod specs
//! - [`params`] - argument merging and reference-value resolution
//! - [`pod`] - the nine-pass [`pod::PodBuilder`]

pub mod common;
pub mod params;
pub mod pod;
pub mod template;

pub use params::{ParameterResolver, RefResolver, SecretRefResolver};
pub use pod::{execution_context, PodBuilder};
