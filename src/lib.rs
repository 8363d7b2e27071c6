//! 3scale APIManager Operator
//!
//! Reconciles the Redis resource group (backend and system Redis) owned by
//! an APIManager custom resource.

pub mod adapters;
pub mod component;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
