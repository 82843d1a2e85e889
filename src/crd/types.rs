//! Shared spec types for the cyclone.dev custom resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named value used for stage arguments, resource parameters, and per-run
/// overrides. For stage arguments the value is the default; an empty default
/// means the argument must be supplied by the run.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterItem {
    /// Parameter name
    pub name: String,
    /// Parameter value (or default)
    #[serde(default)]
    pub value: String,
}

impl ParameterItem {
    /// Create a named parameter with a value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Runtime substrate a workflow run targets: the namespace pods run in, the
/// common PVC used as scratch space, and the pod service account.
///
/// An empty `pvc` switches the pod compiler to emptyDir-only mode; input
/// artifacts are rejected in that mode.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Namespace the stage pods are created in
    #[serde(default)]
    pub namespace: String,
    /// Common PVC for cross-stage scratch data; empty means none
    #[serde(default)]
    pub pvc: String,
    /// Service account assigned to stage pods
    #[serde(default)]
    pub service_account: String,
}

/// Persistent binding for a resource: data lives in the given PVC under the
/// given path and survives across workflow runs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentBinding {
    /// PVC holding the resource data
    pub pvc: String,
    /// Path of the resource data within the PVC
    pub path: String,
}

/// Resource kind: built-in types resolve through operator-configured images,
/// anything else is a custom type using the resource's own resolver image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceType {
    /// Git repository
    Git,
    /// Container image
    Image,
    /// Key-value payload
    Kv,
    /// Custom type handled by the resolver named in the resource spec
    Custom(String),
}

impl ResourceType {
    /// Wire representation of the type
    pub fn as_str(&self) -> &str {
        match self {
            Self::Git => "Git",
            Self::Image => "Image",
            Self::Kv => "KV",
            Self::Custom(s) => s,
        }
    }

    /// Configuration key of the resolver image for built-in types.
    ///
    /// Returns `None` for custom types, which carry their own resolver image.
    pub fn image_key(&self) -> Option<&'static str> {
        match self {
            Self::Git => Some(crate::config::GIT_RESOLVER_IMAGE),
            Self::Image => Some(crate::config::IMAGE_RESOLVER_IMAGE),
            Self::Kv => Some(crate::config::KV_RESOLVER_IMAGE),
            Self::Custom(_) => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        match s {
            "Git" => Self::Git,
            "Image" => Self::Image,
            "KV" => Self::Kv,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl Serialize for ResourceType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

impl JsonSchema for ResourceType {
    fn schema_name() -> String {
        "ResourceType".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}
