use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use curbside::permits::{
    AllocationMethod, Association, AssociationId, CapacityRules, OverrideDenied, OverrideGate,
    OverrideGrant, Permit, PermitId, PermitRepository, RepositoryError, Unit, UnitId, Vehicle,
    VehicleId, VehicleStatus, VisitorAllowance,
};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory record store standing in for the hosted entity store.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPermitRepository {
    associations: Arc<Mutex<HashMap<AssociationId, Association>>>,
    units: Arc<Mutex<HashMap<UnitId, Unit>>>,
    vehicles: Arc<Mutex<HashMap<VehicleId, Vehicle>>>,
    permits: Arc<Mutex<HashMap<PermitId, Permit>>>,
}

impl InMemoryPermitRepository {
    pub(crate) fn seed_association(&self, association: Association) {
        self.associations
            .lock()
            .expect("association mutex poisoned")
            .insert(association.id.clone(), association);
    }

    pub(crate) fn seed_unit(&self, unit: Unit) {
        self.units
            .lock()
            .expect("unit mutex poisoned")
            .insert(unit.id.clone(), unit);
    }

    pub(crate) fn seed_vehicle(&self, vehicle: Vehicle) {
        self.vehicles
            .lock()
            .expect("vehicle mutex poisoned")
            .insert(vehicle.id.clone(), vehicle);
    }
}

impl PermitRepository for InMemoryPermitRepository {
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

/// Override gate backed by a static principal/token allow list, standing in
/// for the deployment's permission service.
#[derive(Default, Clone)]
pub(crate) struct AllowListOverrideGate {
    grants: HashMap<String, String>,
}

impl AllowListOverrideGate {
    pub(crate) fn with_grant(mut self, principal: &str, token: &str) -> Self {
        self.grants.insert(principal.to_string(), token.to_string());
        self
    }
}

impl OverrideGate for AllowListOverrideGate {
    fn authorize(
        &self,
        grant: &OverrideGrant,
        _association: &AssociationId,
    ) -> Result<(), OverrideDenied> {
        match self.grants.get(&grant.principal) {
            Some(token) if token == &grant.token => Ok(()),
            _ => Err(OverrideDenied::Rejected {
                principal: grant.principal.clone(),
            }),
        }
    }
}

pub(crate) fn default_capacity_rules() -> CapacityRules {
    CapacityRules {
        allocation_method: AllocationMethod::PerUnit,
        permits_per_count: 1,
        max_permits_per_unit: Some(2),
        visitor_allowance: VisitorAllowance::Limited(1),
        allow_additional_permits: true,
    }
}

/// Seed the demo association, one unit, and its registered vehicles.
pub(crate) fn seed_demo_records(repository: &InMemoryPermitRepository) {
    let association_id = AssociationId("assoc-maplecrest".to_string());
    repository.seed_association(Association {
        id: association_id.clone(),
        name: "Maplecrest Commons".to_string(),
        capacity: default_capacity_rules(),
    });

    repository.seed_unit(Unit {
        id: UnitId("unit-2f".to_string()),
        association_id,
        label: "2F".to_string(),
        bedrooms: 2,
    });

    for (id, plate) in [("veh-outback", "KCJ-481"), ("veh-civic", "TRM-092")] {
        repository.seed_vehicle(Vehicle {
            id: VehicleId(id.to_string()),
            unit_id: UnitId("unit-2f".to_string()),
            plate: plate.to_string(),
            status: VehicleStatus::Active,
        });
    }
}
