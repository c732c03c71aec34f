use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::permits::domain::{
    AllocationMethod, Association, AssociationId, CapacityRules, Permit, PermitId, PermitStatus,
    PermitType, Unit, UnitId, Vehicle, VehicleId, VehicleStatus, VisitorAllowance,
};
use crate::permits::repository::{
    OverrideDenied, OverrideGate, OverrideGrant, PermitRepository, RepositoryError,
};
use crate::permits::service::{IssueRequest, PermitService};

pub(super) fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

pub(super) fn hours_ahead(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

pub(super) fn per_unit_rules(
    permits_per_count: u32,
    max_permits_per_unit: Option<u32>,
    allow_additional_permits: bool,
) -> CapacityRules {
    CapacityRules {
        allocation_method: AllocationMethod::PerUnit,
        permits_per_count,
        max_permits_per_unit,
        visitor_allowance: VisitorAllowance::Unlimited,
        allow_additional_permits,
    }
}

pub(super) fn association_with(capacity: CapacityRules) -> Association {
    Association {
        id: AssociationId("assoc-oakmont".to_string()),
        name: "Oakmont Commons".to_string(),
        capacity,
    }
}

pub(super) fn unit() -> Unit {
    Unit {
        id: UnitId("unit-12a".to_string()),
        association_id: AssociationId("assoc-oakmont".to_string()),
        label: "12A".to_string(),
        bedrooms: 3,
    }
}

pub(super) fn other_unit() -> Unit {
    Unit {
        id: UnitId("unit-4c".to_string()),
        association_id: AssociationId("assoc-oakmont".to_string()),
        label: "4C".to_string(),
        bedrooms: 1,
    }
}

pub(super) fn vehicle(id: &str, unit_id: &UnitId, plate: &str) -> Vehicle {
    Vehicle {
        id: VehicleId(id.to_string()),
        unit_id: unit_id.clone(),
        plate: plate.to_string(),
        status: VehicleStatus::Active,
    }
}

pub(super) fn archived_vehicle(id: &str, unit_id: &UnitId) -> Vehicle {
    Vehicle {
        id: VehicleId(id.to_string()),
        unit_id: unit_id.clone(),
        plate: "OLD-000".to_string(),
        status: VehicleStatus::Archived,
    }
}

pub(super) fn issue_request(unit_id: &UnitId, permit_type: PermitType) -> IssueRequest {
    IssueRequest {
        unit_id: unit_id.clone(),
        permit_type,
        permit_number: None,
        vehicle_id: None,
        issued_at: None,
        expires_at: None,
        notes: None,
        created_by: Some("front-desk".to_string()),
    }
}

pub(super) fn stored_permit(id: &str, unit: &Unit, permit_type: PermitType) -> Permit {
    Permit {
        id: PermitId(id.to_string()),
        association_id: unit.association_id.clone(),
        unit_id: unit.id.clone(),
        vehicle_id: None,
        permit_type,
        permit_number: None,
        issued_at: hours_ago(24),
        expires_at: None,
        status: PermitStatus::Active,
        revoked_at: None,
        revoked_reason: None,
        notes: None,
        created_by: None,
    }
}

pub(super) fn grant() -> OverrideGrant {
    OverrideGrant {
        principal: "manager-lee".to_string(),
        token: "cap-override-1".to_string(),
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    associations: Arc<Mutex<HashMap<AssociationId, Association>>>,
    units: Arc<Mutex<HashMap<UnitId, Unit>>>,
    vehicles: Arc<Mutex<HashMap<VehicleId, Vehicle>>>,
    permits: Arc<Mutex<HashMap<PermitId, Permit>>>,
}

impl MemoryRepository {
    pub(super) fn seed_association(&self, association: Association) {
        self.associations
            .lock()
            .expect("association mutex poisoned")
            .insert(association.id.clone(), association);
    }

    pub(super) fn seed_unit(&self, unit: Unit) {
        self.units
            .lock()
            .expect("unit mutex poisoned")
            .insert(unit.id.clone(), unit);
    }

    pub(super) fn seed_vehicle(&self, vehicle: Vehicle) {
        self.vehicles
            .lock()
            .expect("vehicle mutex poisoned")
            .insert(vehicle.id.clone(), vehicle);
    }

    pub(super) fn seed_permit(&self, permit: Permit) {
        self.permits
            .lock()
            .expect("permit mutex poisoned")
            .insert(permit.id.clone(), permit);
    }

    pub(super) fn permit_count(&self) -> usize {
        self.permits.lock().expect("permit mutex poisoned").len()
    }

    pub(super) fn stored(&self, id: &PermitId) -> Option<Permit> {
        self.permits
            .lock()
            .expect("permit mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl PermitRepository for MemoryRepository {
    fn association(&self, id: &AssociationId) -> Result<Option<Association>, RepositoryError> {
        Ok(self
            .associations
            .lock()
            .expect("association mutex poisoned")
            .get(id)
            .cloned())
    }

    fn unit(&self, id: &UnitId) -> Result<Option<Unit>, RepositoryError> {
        Ok(self
            .units
            .lock()
            .expect("unit mutex poisoned")
            .get(id)
            .cloned())
    }

    fn vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        Ok(self
            .vehicles
            .lock()
            .expect("vehicle mutex poisoned")
            .get(id)
            .cloned())
    }

    fn permit(&self, id: &PermitId) -> Result<Option<Permit>, RepositoryError> {
        Ok(self
            .permits
            .lock()
            .expect("permit mutex poisoned")
            .get(id)
            .cloned())
    }

    fn permits_for_unit(&self, unit: &UnitId) -> Result<Vec<Permit>, RepositoryError> {
        Ok(self
            .permits
            .lock()
            .expect("permit mutex poisoned")
            .values()
            .filter(|permit| &permit.unit_id == unit)
            .cloned()
            .collect())
    }

    fn permit_number_in_use(
        &self,
        association: &AssociationId,
        number: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .permits
            .lock()
            .expect("permit mutex poisoned")
            .values()
            .any(|permit| {
                &permit.association_id == association
                    && permit.permit_number.as_deref() == Some(number)
            }))
    }

    fn insert_permit(&self, permit: Permit) -> Result<Permit, RepositoryError> {
        let mut guard = self.permits.lock().expect("permit mutex poisoned");
        if guard.contains_key(&permit.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(permit.id.clone(), permit.clone());
        Ok(permit)
    }

    fn update_permit(&self, permit: Permit) -> Result<(), RepositoryError> {
        let mut guard = self.permits.lock().expect("permit mutex poisoned");
        if guard.contains_key(&permit.id) {
            guard.insert(permit.id.clone(), permit);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

/// Wrapper that can be told to fail writes, for exercising the replace
/// compensation path.
#[derive(Clone)]
pub(super) struct FlakyRepository {
    pub(super) inner: MemoryRepository,
    fail_inserts: Arc<AtomicBool>,
    update_budget: Arc<AtomicI64>,
}

impl Default for FlakyRepository {
    fn default() -> Self {
        Self {
            inner: MemoryRepository::default(),
            fail_inserts: Arc::new(AtomicBool::new(false)),
            update_budget: Arc::new(AtomicI64::new(-1)),
        }
    }
}

impl FlakyRepository {
    pub(super) fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    /// Allow `remaining` further successful updates, then fail the rest.
    pub(super) fn fail_updates_after(&self, remaining: i64) {
        self.update_budget.store(remaining, Ordering::SeqCst);
    }
}

impl PermitRepository for FlakyRepository {
    fn association(&self, id: &AssociationId) -> Result<Option<Association>, RepositoryError> {
        self.inner.association(id)
    }

    fn unit(&self, id: &UnitId) -> Result<Option<Unit>, RepositoryError> {
        self.inner.unit(id)
    }

    fn vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        self.inner.vehicle(id)
    }

    fn permit(&self, id: &PermitId) -> Result<Option<Permit>, RepositoryError> {
        self.inner.permit(id)
    }

    fn permits_for_unit(&self, unit: &UnitId) -> Result<Vec<Permit>, RepositoryError> {
        self.inner.permits_for_unit(unit)
    }

    fn permit_number_in_use(
        &self,
        association: &AssociationId,
        number: &str,
    ) -> Result<bool, RepositoryError> {
        self.inner.permit_number_in_use(association, number)
    }

    fn insert_permit(&self, permit: Permit) -> Result<Permit, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("insert rejected".to_string()));
        }
        self.inner.insert_permit(permit)
    }

    fn update_permit(&self, permit: Permit) -> Result<(), RepositoryError> {
        let budget = self.update_budget.load(Ordering::SeqCst);
        if budget >= 0 {
            if budget == 0 {
                return Err(RepositoryError::Unavailable("update rejected".to_string()));
            }
            self.update_budget.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.update_permit(permit)
    }
}

pub(super) struct UnavailableRepository;

impl PermitRepository for UnavailableRepository {
    fn association(&self, _id: &AssociationId) -> Result<Option<Association>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn unit(&self, _id: &UnitId) -> Result<Option<Unit>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn vehicle(&self, _id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn permit(&self, _id: &PermitId) -> Result<Option<Permit>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn permits_for_unit(&self, _unit: &UnitId) -> Result<Vec<Permit>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn permit_number_in_use(
        &self,
        _association: &AssociationId,
        _number: &str,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn insert_permit(&self, _permit: Permit) -> Result<Permit, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn update_permit(&self, _permit: Permit) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }
}

pub(super) struct AllowAllGate;

impl OverrideGate for AllowAllGate {
    fn authorize(
        &self,
        _grant: &OverrideGrant,
        _association: &AssociationId,
    ) -> Result<(), OverrideDenied> {
        Ok(())
    }
}

pub(super) struct DenyAllGate;

impl OverrideGate for DenyAllGate {
    fn authorize(
        &self,
        grant: &OverrideGrant,
        _association: &AssociationId,
    ) -> Result<(), OverrideDenied> {
        Err(OverrideDenied::Rejected {
            principal: grant.principal.clone(),
        })
    }
}

pub(super) fn seeded_repository(capacity: CapacityRules) -> MemoryRepository {
    let repository = MemoryRepository::default();
    repository.seed_association(association_with(capacity));
    repository.seed_unit(unit());
    repository.seed_unit(other_unit());
    repository.seed_vehicle(vehicle("veh-sedan", &unit().id, "ABC-123"));
    repository.seed_vehicle(vehicle("veh-coupe", &unit().id, "XYZ-789"));
    repository.seed_vehicle(vehicle("veh-neighbor", &other_unit().id, "NBR-456"));
    repository.seed_vehicle(archived_vehicle("veh-junked", &unit().id));
    repository
}

pub(super) fn build_service(
    capacity: CapacityRules,
) -> (
    PermitService<MemoryRepository, AllowAllGate>,
    Arc<MemoryRepository>,
) {
    let repository = Arc::new(seeded_repository(capacity));
    let service = PermitService::new(repository.clone(), Arc::new(AllowAllGate));
    (service, repository)
}

pub(super) fn build_service_with_gate<G>(
    capacity: CapacityRules,
    gate: G,
) -> (PermitService<MemoryRepository, G>, Arc<MemoryRepository>)
where
    G: OverrideGate + 'static,
{
    let repository = Arc::new(seeded_repository(capacity));
    let service = PermitService::new(repository.clone(), Arc::new(gate));
    (service, repository)
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 8192)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
