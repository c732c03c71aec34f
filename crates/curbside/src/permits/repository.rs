use serde::{Deserialize, Serialize};

use super::domain::{
    Association, AssociationId, Permit, PermitId, Unit, UnitId, Vehicle, VehicleId,
};

/// Storage abstraction over the hosted record store so the service module can
/// be exercised in isolation.
pub trait PermitRepository: Send + Sync {
    fn association(&self, id: &AssociationId) -> Result<Option<Association>, RepositoryError>;
    fn unit(&self, id: &UnitId) -> Result<Option<Unit>, RepositoryError>;
    fn vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError>;
    fn permit(&self, id: &PermitId) -> Result<Option<Permit>, RepositoryError>;
    fn permits_for_unit(&self, unit: &UnitId) -> Result<Vec<Permit>, RepositoryError>;
    fn permit_number_in_use(
        &self,
        association: &AssociationId,
        number: &str,
    ) -> Result<bool, RepositoryError>;
    fn insert_permit(&self, permit: Permit) -> Result<Permit, RepositoryError>;
    fn update_permit(&self, permit: Permit) -> Result<(), RepositoryError>;
}

/// Error enumeration for record-store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Capability presented by a caller requesting a capacity bypass.
///
/// The engine verifies the grant itself instead of trusting a pre-evaluated
/// boolean from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideGrant {
    pub principal: String,
    pub token: String,
}

/// Authority consulted for every override request.
pub trait OverrideGate: Send + Sync {
    fn authorize(
        &self,
        grant: &OverrideGrant,
        association: &AssociationId,
    ) -> Result<(), OverrideDenied>;
}

/// Override verification failure.
#[derive(Debug, thiserror::Error)]
pub enum OverrideDenied {
    #[error("override grant for '{principal}' was rejected")]
    Rejected { principal: String },
    #[error("override authority unavailable: {0}")]
    Unavailable(String),
}
