use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::capacity::{CapacityCaps, CapacitySnapshot};
use super::domain::{
    CapacityBucket, Permit, PermitId, PermitStatus, PermitType, UnitId, VehicleId, VehicleStatus,
};
use super::repository::{OverrideDenied, OverrideGate, OverrideGrant, PermitRepository, RepositoryError};

/// Service composing the capacity calculator, record store, and override
/// authority into the permit lifecycle operations.
pub struct PermitService<R, G> {
    repository: Arc<R>,
    gate: Arc<G>,
    unit_locks: UnitLocks,
}

static PERMIT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_permit_id() -> PermitId {
    let id = PERMIT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PermitId(format!("prm-{id:06}"))
}

/// Issuance request as supplied by the caller; `issued_at` defaults to now.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub unit_id: UnitId,
    pub permit_type: PermitType,
    pub permit_number: Option<String>,
    pub vehicle_id: Option<VehicleId>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// Result of a vehicle swap: the revoked predecessor and its successor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOutcome {
    pub revoked: Permit,
    pub issued: Permit,
}

/// Machine-readable payload accompanying a capacity denial so callers can
/// render the shortfall and retry with an override grant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityDenial {
    pub bucket: CapacityBucket,
    pub active: u32,
    pub max: u32,
    pub caps: CapacityCaps,
}

/// Request-shape failures detected before any record is touched.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("vehicle '{vehicle}' is not registered to unit '{unit}'")]
    VehicleNotOnUnit { vehicle: VehicleId, unit: UnitId },
    #[error("vehicle '{0}' is archived")]
    VehicleArchived(VehicleId),
    #[error("expiration {expires_at} precedes issuance {issued_at}")]
    ExpiresBeforeIssued {
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    #[error("permit number '{0}' is already in use within the association")]
    DuplicatePermitNumber(String),
    #[error("revocation reason must not be empty")]
    EmptyRevocationReason,
}

/// Rejected state transition: the target permit is not active.
#[derive(Debug, thiserror::Error)]
#[error("permit '{permit}' is {} and the operation requires an active permit", .found.label())]
pub struct TransitionConflict {
    pub permit: PermitId,
    pub found: PermitStatus,
}

/// Error raised by the permit service.
#[derive(Debug, thiserror::Error)]
pub enum PermitServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{} permit cap reached ({}/{})", .0.bucket.label(), .0.active, .0.max)]
    CapacityExceeded(CapacityDenial),
    #[error(transparent)]
    Override(#[from] OverrideDenied),
    #[error(transparent)]
    Conflict(#[from] TransitionConflict),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(
        "replacement of '{permit}' could not be completed or rolled back: \
         reissue failed ({issue_error}); restore failed ({rollback_error})"
    )]
    ReplaceOrphaned {
        permit: PermitId,
        issue_error: String,
        rollback_error: String,
    },
}

impl<R, G> PermitService<R, G>
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    pub fn new(repository: Arc<R>, gate: Arc<G>) -> Self {
        Self {
            repository,
            gate,
            unit_locks: UnitLocks::default(),
        }
    }

    /// Issue a new permit, enforcing the unit's capacity rules unless a
    /// verified override grant is presented.
    pub fn issue(
        &self,
        request: IssueRequest,
        grant: Option<&OverrideGrant>,
    ) -> Result<Permit, PermitServiceError> {
        let cell = self.unit_locks.cell(&request.unit_id);
        let _serial = cell.lock().expect("unit lock poisoned");
        self.issue_locked(request, grant, Utc::now())
    }

    fn issue_locked(
        &self,
        request: IssueRequest,
        grant: Option<&OverrideGrant>,
        now: DateTime<Utc>,
    ) -> Result<Permit, PermitServiceError> {
        let unit = self
            .repository
            .unit(&request.unit_id)?
            .ok_or(RepositoryError::NotFound)?;
        let association = self
            .repository
            .association(&unit.association_id)?
            .ok_or(RepositoryError::NotFound)?;

        if let Some(vehicle_id) = &request.vehicle_id {
            let vehicle = self
                .repository
                .vehicle(vehicle_id)?
                .ok_or(RepositoryError::NotFound)?;
            if vehicle.unit_id != unit.id {
                return Err(ValidationError::VehicleNotOnUnit {
                    vehicle: vehicle.id,
                    unit: unit.id,
                }
                .into());
            }
            if vehicle.status == VehicleStatus::Archived {
                return Err(ValidationError::VehicleArchived(vehicle.id).into());
            }
        }

        let issued_at = request.issued_at.unwrap_or(now);
        if let Some(expires_at) = request.expires_at {
            if expires_at < issued_at {
                return Err(ValidationError::ExpiresBeforeIssued {
                    issued_at,
                    expires_at,
                }
                .into());
            }
        }

        if let Some(number) = request.permit_number.as_deref() {
            if self
                .repository
                .permit_number_in_use(&association.id, number)?
            {
                return Err(ValidationError::DuplicatePermitNumber(number.to_string()).into());
            }
        }

        // Presenting a grant is itself a claim to authority; a grant the gate
        // rejects fails the request even when capacity would have allowed it.
        let override_applied = match grant {
            Some(grant) => {
                self.gate.authorize(grant, &association.id)?;
                true
            }
            None => false,
        };

        if !override_applied {
            if let Some(bucket) = request.permit_type.bucket() {
                let permits = self.repository.permits_for_unit(&unit.id)?;
                let snapshot =
                    CapacitySnapshot::build(unit.clone(), association.clone(), &permits, now);
                if !snapshot.can_issue(bucket) {
                    return Err(PermitServiceError::CapacityExceeded(CapacityDenial {
                        bucket,
                        active: snapshot.current.for_bucket(bucket),
                        // a full bucket implies a finite cap
                        max: snapshot.caps.for_bucket(bucket).unwrap_or(0),
                        caps: snapshot.caps,
                    }));
                }
            }
        }

        let permit = Permit {
            id: next_permit_id(),
            association_id: association.id,
            unit_id: unit.id,
            vehicle_id: request.vehicle_id,
            permit_type: request.permit_type,
            permit_number: request.permit_number,
            issued_at,
            expires_at: request.expires_at,
            status: PermitStatus::Active,
            revoked_at: None,
            revoked_reason: None,
            notes: request.notes,
            created_by: request.created_by,
        };

        let stored = self.repository.insert_permit(permit)?;
        info!(
            permit = %stored.id,
            unit = %stored.unit_id,
            permit_type = stored.permit_type.label(),
            override_applied,
            "permit issued"
        );
        Ok(stored)
    }

    /// Terminal transition to `Revoked` with a mandatory reason.
    pub fn revoke(&self, permit_id: &PermitId, reason: &str) -> Result<Permit, PermitServiceError> {
        let revoked = self.revoke_at(permit_id, reason, Utc::now())?;
        info!(permit = %revoked.id, unit = %revoked.unit_id, "permit revoked");
        Ok(revoked)
    }

    fn revoke_at(
        &self,
        permit_id: &PermitId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Permit, PermitServiceError> {
        if reason.trim().is_empty() {
            return Err(ValidationError::EmptyRevocationReason.into());
        }

        let permit = self
            .repository
            .permit(permit_id)?
            .ok_or(RepositoryError::NotFound)?;

        let display = permit.display_status(now);
        if display != PermitStatus::Active {
            return Err(TransitionConflict {
                permit: permit.id,
                found: display,
            }
            .into());
        }

        let mut revoked = permit;
        revoked.status = PermitStatus::Revoked;
        revoked.revoked_at = Some(now);
        revoked.revoked_reason = Some(reason.to_string());
        self.repository.update_permit(revoked.clone())?;
        Ok(revoked)
    }

    /// Administrative transition to stored `Expired`, regardless of whether
    /// the expiration timestamp has actually elapsed.
    pub fn mark_expired(&self, permit_id: &PermitId) -> Result<Permit, PermitServiceError> {
        let permit = self
            .repository
            .permit(permit_id)?
            .ok_or(RepositoryError::NotFound)?;

        if permit.status != PermitStatus::Active {
            return Err(TransitionConflict {
                permit: permit.id,
                found: permit.status,
            }
            .into());
        }

        let mut expired = permit;
        expired.status = PermitStatus::Expired;
        self.repository.update_permit(expired.clone())?;
        info!(permit = %expired.id, unit = %expired.unit_id, "permit marked expired");
        Ok(expired)
    }

    /// Adjust or clear the expiration of a still-active permit. `None`
    /// removes the expiration; there is no automatic expiry sweep.
    pub fn set_expiration(
        &self,
        permit_id: &PermitId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Permit, PermitServiceError> {
        let permit = self
            .repository
            .permit(permit_id)?
            .ok_or(RepositoryError::NotFound)?;

        if permit.status != PermitStatus::Active {
            return Err(TransitionConflict {
                permit: permit.id,
                found: permit.status,
            }
            .into());
        }

        if let Some(new_expiry) = expires_at {
            if new_expiry < permit.issued_at {
                return Err(ValidationError::ExpiresBeforeIssued {
                    issued_at: permit.issued_at,
                    expires_at: new_expiry,
                }
                .into());
            }
        }

        let mut updated = permit;
        updated.expires_at = expires_at;
        self.repository.update_permit(updated.clone())?;
        info!(permit = %updated.id, unit = %updated.unit_id, "permit expiration updated");
        Ok(updated)
    }

    /// Swap the vehicle on a permit: revoke the old permit and issue a
    /// successor for the same unit and type.
    ///
    /// Replacement is capacity-neutral (a 1-for-1 substitution never adds a
    /// slot), so the successor bypasses the capacity check. The two writes
    /// run as a compensating sequence: if the reissue fails the revocation is
    /// rolled back by restoring the old record.
    pub fn replace(
        &self,
        permit_id: &PermitId,
        new_vehicle_id: &VehicleId,
        notes: Option<String>,
    ) -> Result<ReplaceOutcome, PermitServiceError> {
        let existing = self
            .repository
            .permit(permit_id)?
            .ok_or(RepositoryError::NotFound)?;
        let cell = self.unit_locks.cell(&existing.unit_id);
        let _serial = cell.lock().expect("unit lock poisoned");

        // Re-read under the unit lock so the state we validate is the state
        // we transition.
        let old = self
            .repository
            .permit(permit_id)?
            .ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();

        let display = old.display_status(now);
        if display != PermitStatus::Active {
            return Err(TransitionConflict {
                permit: old.id,
                found: display,
            }
            .into());
        }

        let vehicle = self
            .repository
            .vehicle(new_vehicle_id)?
            .ok_or(RepositoryError::NotFound)?;
        if vehicle.unit_id != old.unit_id {
            return Err(ValidationError::VehicleNotOnUnit {
                vehicle: vehicle.id,
                unit: old.unit_id.clone(),
            }
            .into());
        }
        if vehicle.status == VehicleStatus::Archived {
            return Err(ValidationError::VehicleArchived(vehicle.id).into());
        }

        let mut revoked = old.clone();
        revoked.status = PermitStatus::Revoked;
        revoked.revoked_at = Some(now);
        revoked.revoked_reason = Some(format!("replaced by vehicle {}", vehicle.plate));
        self.repository.update_permit(revoked.clone())?;

        let successor = Permit {
            id: next_permit_id(),
            association_id: old.association_id.clone(),
            unit_id: old.unit_id.clone(),
            vehicle_id: Some(vehicle.id),
            permit_type: old.permit_type,
            permit_number: None,
            issued_at: now,
            expires_at: old.expires_at,
            status: PermitStatus::Active,
            revoked_at: None,
            revoked_reason: None,
            notes,
            created_by: old.created_by.clone(),
        };

        match self.repository.insert_permit(successor) {
            Ok(issued) => {
                info!(
                    revoked = %revoked.id,
                    issued = %issued.id,
                    unit = %issued.unit_id,
                    "permit replaced"
                );
                Ok(ReplaceOutcome { revoked, issued })
            }
            Err(issue_error) => match self.repository.update_permit(old.clone()) {
                Ok(()) => {
                    warn!(
                        permit = %old.id,
                        error = %issue_error,
                        "replacement reissue failed; revocation rolled back"
                    );
                    Err(issue_error.into())
                }
                Err(rollback_error) => Err(PermitServiceError::ReplaceOrphaned {
                    permit: old.id,
                    issue_error: issue_error.to_string(),
                    rollback_error: rollback_error.to_string(),
                }),
            },
        }
    }

    /// Current capacity picture for a unit.
    pub fn availability(&self, unit_id: &UnitId) -> Result<CapacitySnapshot, PermitServiceError> {
        self.snapshot(unit_id, Utc::now())
    }

    pub(crate) fn snapshot(
        &self,
        unit_id: &UnitId,
        now: DateTime<Utc>,
    ) -> Result<CapacitySnapshot, PermitServiceError> {
        let unit = self
            .repository
            .unit(unit_id)?
            .ok_or(RepositoryError::NotFound)?;
        let association = self
            .repository
            .association(&unit.association_id)?
            .ok_or(RepositoryError::NotFound)?;
        let permits = self.repository.permits_for_unit(&unit.id)?;
        Ok(CapacitySnapshot::build(unit, association, &permits, now))
    }

    /// Fetch a stored permit for read paths.
    pub fn get(&self, permit_id: &PermitId) -> Result<Permit, PermitServiceError> {
        let permit = self
            .repository
            .permit(permit_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(permit)
    }
}

/// Per-unit serialization for the check-then-act sections of issue and
/// replace. Lock cells are created on demand and retained for the process
/// lifetime; the key space is bounded by the unit population.
#[derive(Default)]
struct UnitLocks {
    table: Mutex<HashMap<UnitId, Arc<Mutex<()>>>>,
}

impl UnitLocks {
    fn cell(&self, unit: &UnitId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().expect("unit lock table poisoned");
        table.entry(unit.clone()).or_default().clone()
    }
}
