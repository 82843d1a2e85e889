//! Error types for the Cyclone core

use thiserror::Error;

/// Main error type for Cyclone operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A required object (CR, secret, namespace, PVC) does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing object
        kind: &'static str,
        /// Name of the missing object
        name: String,
    },

    /// The object already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of the conflicting object
        kind: &'static str,
        /// Name of the conflicting object
        name: String,
    },

    /// Optimistic-concurrency write conflict
    #[error("write conflict on {kind} '{name}'")]
    Conflict {
        /// Kind of the contended object
        kind: &'static str,
        /// Name of the contended object
        name: String,
    },

    /// Shape violation in user-supplied specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Corrupt stored blob or failed (de)serialization
    #[error("decode error: {0}")]
    Decode(String),

    /// Downstream cluster or custom-resource failure, with context
    #[error("dependency error: {0}")]
    Dependency(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a dependency error with the given message
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }

    /// Create a not-found error for the given object
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an already-exists error for the given object
    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Create a conflict error for the given object
    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    /// True if this error means the object does not exist.
    ///
    /// Also recognizes a wrapped Kubernetes 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }

    /// True if this error means the object already exists.
    ///
    /// Kubernetes reports both creation clashes and write conflicts as 409,
    /// distinguished by the status reason.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::AlreadyExists { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409 && ae.reason == "AlreadyExists",
            _ => false,
        }
    }

    /// True if this error is an optimistic-concurrency write conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409 && ae.reason == "Conflict",
            _ => false,
        }
    }
}
