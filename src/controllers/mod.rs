//! Kubernetes controllers for the APIManager operator
//!
//! This module contains the controller that watches APIManager resources
//! and the objects they own, and triggers reconciliation.

mod apimanager_controller;

pub use apimanager_controller::requeue_after;
pub use apimanager_controller::run as run_apimanager_controller;

use kube::Client;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}
