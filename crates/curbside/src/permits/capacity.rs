use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AllocationMethod, Association, CapacityBucket, CapacityRules, Permit, Unit,
};

/// Live permit counts for a unit, split by capacity pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityUsage {
    pub resident: u32,
    pub visitor: u32,
}

impl CapacityUsage {
    /// Tally permits whose display status at `now` is active.
    pub fn tally(permits: &[Permit], now: DateTime<Utc>) -> Self {
        let mut usage = Self::default();
        for permit in permits {
            if !permit.counts_toward_capacity(now) {
                continue;
            }
            match permit.permit_type.bucket() {
                Some(CapacityBucket::Resident) => usage.resident += 1,
                Some(CapacityBucket::Visitor) => usage.visitor += 1,
                None => {}
            }
        }
        usage
    }

    pub fn for_bucket(&self, bucket: CapacityBucket) -> u32 {
        match bucket {
            CapacityBucket::Resident => self.resident,
            CapacityBucket::Visitor => self.visitor,
        }
    }
}

/// Effective limits for a unit; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityCaps {
    pub baseline_resident: u32,
    pub max_resident: Option<u32>,
    pub max_visitor: Option<u32>,
}

impl CapacityCaps {
    pub fn for_unit(rules: &CapacityRules, unit: &Unit) -> Self {
        let multiplier = match rules.allocation_method {
            AllocationMethod::PerUnit => 1,
            AllocationMethod::PerBedroom => unit.bedrooms,
        };
        let baseline_resident = rules.permits_per_count * multiplier;

        let max_resident = if rules.allow_additional_permits {
            rules.max_permits_per_unit
        } else {
            Some(baseline_resident)
        };

        Self {
            baseline_resident,
            max_resident,
            max_visitor: rules.visitor_allowance.cap(),
        }
    }

    pub fn for_bucket(&self, bucket: CapacityBucket) -> Option<u32> {
        match bucket {
            CapacityBucket::Resident => self.max_resident,
            CapacityBucket::Visitor => self.max_visitor,
        }
    }
}

/// Whether the unit can take one more permit of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityAvailability {
    pub can_issue_resident: bool,
    pub can_issue_visitor: bool,
}

/// Point-in-time capacity picture for a unit.
///
/// Always recomputed from the full permit set; there is no materialized
/// counter to invalidate, so this is the single source of truth for every
/// issuance decision and test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacitySnapshot {
    pub unit: Unit,
    pub association: Association,
    pub current: CapacityUsage,
    pub caps: CapacityCaps,
    pub availability: CapacityAvailability,
}

impl CapacitySnapshot {
    pub fn build(
        unit: Unit,
        association: Association,
        permits: &[Permit],
        now: DateTime<Utc>,
    ) -> Self {
        let caps = CapacityCaps::for_unit(&association.capacity, &unit);
        let current = CapacityUsage::tally(permits, now);
        let availability = CapacityAvailability {
            can_issue_resident: caps
                .max_resident
                .map_or(true, |max| current.resident < max),
            can_issue_visitor: caps.max_visitor.map_or(true, |max| current.visitor < max),
        };

        Self {
            unit,
            association,
            current,
            caps,
            availability,
        }
    }

    pub fn can_issue(&self, bucket: CapacityBucket) -> bool {
        match bucket {
            CapacityBucket::Resident => self.availability.can_issue_resident,
            CapacityBucket::Visitor => self.availability.can_issue_visitor,
        }
    }
}
