//! Mode gate deciding whether the Redis group is reconciled in a pass

use crate::crd::APIManagerSpec;

/// Pure predicate over the parent specification
pub trait ModeGate: Send + Sync {
    /// `false` skips the whole resource group for this pass
    fn should_reconcile(&self, spec: &APIManagerSpec) -> bool;
}

/// Skips Redis when external high-availability databases are enabled
#[derive(Debug, Default, Clone, Copy)]
pub struct HighAvailabilityGate;

impl ModeGate for HighAvailabilityGate {
    fn should_reconcile(&self, spec: &APIManagerSpec) -> bool {
        !spec.high_availability_enabled()
    }
}
