//! Parking permit lifecycle and capacity allocation.
//!
//! Callers are expected to have been authenticated and authorized by the
//! surrounding permission layer before reaching this module; the one check
//! the engine performs itself is verification of capacity-override grants.

pub mod capacity;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use capacity::{CapacityAvailability, CapacityCaps, CapacitySnapshot, CapacityUsage};
pub use domain::{
    AllocationMethod, Association, AssociationId, CapacityBucket, CapacityRules, Permit, PermitId,
    PermitStatus, PermitType, Unit, UnitId, Vehicle, VehicleId, VehicleStatus, VisitorAllowance,
};
pub use repository::{
    OverrideDenied, OverrideGate, OverrideGrant, PermitRepository, RepositoryError,
};
pub use router::{permit_router, AvailabilityView, PermitView, ReplaceView};
pub use service::{
    CapacityDenial, IssueRequest, PermitService, PermitServiceError, ReplaceOutcome,
    TransitionConflict, ValidationError,
};
