//! Error types for the APIManager Operator

use std::fmt;

use thiserror::Error;

use crate::component::{RedisRole, ResourceKind};

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a per-resource reconcile at which a failure happened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileStep {
    /// Stamping owner reference and labels onto the descriptor
    InitializeOwnership,
    /// Handing the descriptor to its kind reconciler
    Apply,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileStep::InitializeOwnership => f.write_str("ownership initialization"),
            ReconcileStep::Apply => f.write_str("apply"),
        }
    }
}

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Descriptor or owner cannot carry ownership metadata
    #[error("Ownership error: {0}")]
    Ownership(String),

    /// API server refused the request (HTTP 403)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Write conflicted with the live object (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A single resource of the Redis group failed
    #[error("{step} of {role} {kind} '{name}' failed: {source}")]
    Resource {
        role: RedisRole,
        kind: ResourceKind,
        name: String,
        step: ReconcileStep,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an ownership error
    pub fn ownership(msg: impl Into<String>) -> Self {
        Error::Ownership(msg.into())
    }

    /// The underlying error, with per-resource context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::Resource { source, .. } => source.root(),
            other => other,
        }
    }
}
