//! Operator process configuration
//!
//! Read once at startup from the environment. Log filtering is configured
//! separately through `RUST_LOG`.

use crate::error::{Error, Result};

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Process-level settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Port of the metrics and health endpoint
    pub metrics_port: u16,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            watch_namespace: None,
        }
    }
}

impl OperatorConfig {
    /// Load from `METRICS_PORT` and `WATCH_NAMESPACE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let metrics_port = match lookup("METRICS_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                Error::config(format!("Invalid METRICS_PORT '{}': {}", raw, e))
            })?,
            None => DEFAULT_METRICS_PORT,
        };

        let watch_namespace = lookup("WATCH_NAMESPACE")
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        Ok(Self {
            metrics_port,
            watch_namespace,
        })
    }
}
