//! Parameter resolution
//!
//! Merges a stage's argument declarations with a run's overrides into a
//! flat parameter map, then resolves reference-typed values to their
//! concrete form through a pluggable lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::client::ClusterClient;
use crate::crd::{Stage, WorkflowRun};
use crate::{Error, Result};

/// Prefix marking a value as a reference to be resolved
const REF_VALUE_PREFIX: &str = "$.";

/// Resolves reference-typed string values to their concrete form
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RefResolver: Send + Sync {
    /// Resolve one value; non-reference values pass through unchanged
    async fn resolve(&self, value: &str) -> Result<String>;
}

/// [`RefResolver`] for secret references of the form
/// `$.<namespace>.<secret>/data.<key>`
pub struct SecretRefResolver {
    client: Arc<dyn ClusterClient>,
}

impl SecretRefResolver {
    /// Create a resolver reading through the given client
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RefResolver for SecretRefResolver {
    async fn resolve(&self, value: &str) -> Result<String> {
        let Some(reference) = value.strip_prefix(REF_VALUE_PREFIX) else {
            return Ok(value.to_string());
        };

        let malformed = || {
            Error::validation(format!(
                "malformed reference value '{value}', expected '$.<namespace>.<secret>/data.<key>'"
            ))
        };

        let (namespace, rest) = reference.split_once('.').ok_or_else(malformed)?;
        let (secret_name, data_path) = rest.split_once('/').ok_or_else(malformed)?;
        let key = data_path.strip_prefix("data.").ok_or_else(malformed)?;
        if namespace.is_empty() || secret_name.is_empty() || key.is_empty() {
            return Err(malformed());
        }

        let secret = self
            .client
            .get_secret(namespace, secret_name)
            .await
            .map_err(|e| Error::dependency(format!("resolve ref value '{value}': {e}")))?;

        let bytes = secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .ok_or_else(|| {
                Error::dependency(format!(
                    "resolve ref value '{value}': key '{key}' not found in secret '{secret_name}'"
                ))
            })?;

        String::from_utf8(bytes.0.clone()).map_err(|_| {
            Error::dependency(format!("resolve ref value '{value}': data is not UTF-8"))
        })
    }
}

/// Merges stage defaults with run overrides and resolves references
pub struct ParameterResolver {
    refs: Arc<dyn RefResolver>,
}

impl ParameterResolver {
    /// Create a resolver using the given reference lookup
    pub fn new(refs: Arc<dyn RefResolver>) -> Self {
        Self { refs }
    }

    /// Flat parameter map for one stage of a run.
    ///
    /// Run overrides win over stage defaults. An argument with neither an
    /// override nor a non-empty default is a validation error naming the
    /// argument and the stage.
    pub async fn stage_parameters(
        &self,
        stage: &Stage,
        run: &WorkflowRun,
        stage_name: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut parameters = BTreeMap::new();

        for item in &run.spec.stages {
            if item.name == stage_name {
                for p in &item.parameters {
                    parameters.insert(p.name.clone(), p.value.clone());
                }
            }
        }

        if let Some(pod) = &stage.spec.pod {
            for argument in &pod.inputs.arguments {
                if !parameters.contains_key(&argument.name) {
                    if argument.value.is_empty() {
                        return Err(Error::validation(format!(
                            "argument '{}' not set in stage '{}' and without default value",
                            argument.name, stage_name
                        )));
                    }
                    parameters.insert(argument.name.clone(), argument.value.clone());
                }
            }
        }

        self.resolve_values(parameters).await
    }

    /// Resolve every reference-typed value in a parameter map
    pub async fn resolve_values(
        &self,
        values: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for (name, value) in values {
            let concrete = self.refs.resolve(&value).await?;
            resolved.insert(name, concrete);
        }
        Ok(resolved)
    }
}
