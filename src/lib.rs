//! Cyclone - workflow execution engine core on Kubernetes
//!
//! Cyclone compiles stages of a workflow run into concrete pod specs and
//! manages the substrate those pods run against: tenant namespaces, resource
//! quotas, common PVCs, and the integration records binding tenants to
//! worker clusters.
//!
//! # Architecture
//!
//! A workflow-run controller (out of scope here) selects a stage, ensures
//! the tenant substrate through [`integration::IntegrationStore`] and
//! [`integration::ClusterProvisioner`], then compiles the stage with
//! [`workflow::PodBuilder`] and submits the result through the cluster API.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Stage, Resource, Workflow, WorkflowRun)
//! - [`client`] - cluster API façade and credential-based client factory
//! - [`tenant`] - tenant records and derived namespace/PVC naming
//! - [`integration`] - integration store and worker cluster provisioning
//! - [`workflow`] - parameter resolution and the stage-to-pod compiler
//! - [`config`] - operator configuration, passed explicitly
//! - [`retry`] - conflict retry for optimistic-concurrency writes
//! - [`error`] - error types for the engine

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod crd;
pub mod error;
pub mod integration;
pub mod retry;
pub mod tenant;
pub mod workflow;

pub use config::ControllerConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
