//! Reconcilers for the APIManager Redis resource group
//!
//! This module contains the reconcile engine:
//! - Mode gate deciding whether a pass runs
//! - Ownership stamping of desired descriptors
//! - Per-kind reconcilers and their field mutators
//! - The resource-group reconciler sequencing a pass
//! - Status updates

mod apply;
mod gate;
mod kind;
pub mod mutators;
mod ownership;
mod redis;
pub mod status;

pub use apply::{classify_api_error, ApiReconciler, Mutator};
pub use gate::{HighAvailabilityGate, ModeGate};
pub use kind::{KindReconciler, KindReconcilers};
pub use ownership::{Ownership, MANAGED_BY};
pub use redis::{reconcile_order, ReconcileOutcome, RedisReconciler};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "apimanager-operator";
