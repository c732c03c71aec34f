use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for community associations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationId(pub String);

/// Identifier wrapper for residential units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

/// Identifier wrapper for registered vehicles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub String);

/// Identifier wrapper for issued permits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermitId(pub String);

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an association derives a unit's baseline resident-permit entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    PerUnit,
    PerBedroom,
}

/// Visitor permit policy as an explicit three-way setting.
///
/// Legacy configurations conflated a null cap with a zero cap; the engine
/// keeps the three meanings distinct and treats an absent setting as
/// `Unlimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "limit")]
pub enum VisitorAllowance {
    Unlimited,
    Limited(u32),
    Disabled,
}

impl VisitorAllowance {
    /// The effective visitor cap; `None` means unbounded.
    pub fn cap(self) -> Option<u32> {
        match self {
            VisitorAllowance::Unlimited => None,
            VisitorAllowance::Limited(limit) => Some(limit),
            VisitorAllowance::Disabled => Some(0),
        }
    }
}

impl Default for VisitorAllowance {
    fn default() -> Self {
        Self::Unlimited
    }
}

/// Per-association capacity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRules {
    pub allocation_method: AllocationMethod,
    pub permits_per_count: u32,
    pub max_permits_per_unit: Option<u32>,
    #[serde(default)]
    pub visitor_allowance: VisitorAllowance,
    pub allow_additional_permits: bool,
}

/// Capacity-relevant slice of an association record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: AssociationId,
    pub name: String,
    pub capacity: CapacityRules,
}

/// Residential unit within an association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub association_id: AssociationId,
    pub label: String,
    pub bedrooms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Archived,
}

/// Vehicle registered to a unit; a permit may optionally reference one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub unit_id: UnitId,
    pub plate: String,
    pub status: VehicleStatus,
}

/// Which capacity pool an issuance draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityBucket {
    Resident,
    Visitor,
}

impl CapacityBucket {
    pub const fn label(self) -> &'static str {
        match self {
            CapacityBucket::Resident => "resident",
            CapacityBucket::Visitor => "visitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitType {
    Resident,
    Visitor,
    Temporary,
    Additional,
}

impl PermitType {
    pub const fn label(self) -> &'static str {
        match self {
            PermitType::Resident => "resident",
            PermitType::Visitor => "visitor",
            PermitType::Temporary => "temporary",
            PermitType::Additional => "additional",
        }
    }

    /// Capacity pool the type draws from; temporary permits are exempt.
    pub const fn bucket(self) -> Option<CapacityBucket> {
        match self {
            PermitType::Resident | PermitType::Additional => Some(CapacityBucket::Resident),
            PermitType::Visitor => Some(CapacityBucket::Visitor),
            PermitType::Temporary => None,
        }
    }
}

/// Canonical stored permit state. `Expired` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    Active,
    Expired,
    Revoked,
}

impl PermitStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PermitStatus::Active => "active",
            PermitStatus::Expired => "expired",
            PermitStatus::Revoked => "revoked",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, PermitStatus::Expired | PermitStatus::Revoked)
    }

    /// Parse a stored label, folding the legacy `void` state onto `Revoked`.
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "revoked" | "void" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// Parking permit bound to a unit, optionally to a specific vehicle.
///
/// Permits are never deleted; every state change is a soft transition so the
/// record trail stays auditable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permit {
    pub id: PermitId,
    pub association_id: AssociationId,
    pub unit_id: UnitId,
    pub vehicle_id: Option<VehicleId>,
    pub permit_type: PermitType,
    pub permit_number: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: PermitStatus,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl Permit {
    /// Derived status combining stored state with the expiration clock.
    ///
    /// A stored-`Active` permit whose `expires_at` has elapsed reads as
    /// `Expired` even though no storage transition has happened. Pure and
    /// idempotent; every capacity computation goes through this.
    pub fn display_status(&self, now: DateTime<Utc>) -> PermitStatus {
        match self.status {
            PermitStatus::Revoked => PermitStatus::Revoked,
            PermitStatus::Expired => PermitStatus::Expired,
            PermitStatus::Active => match self.expires_at {
                Some(expires_at) if expires_at <= now => PermitStatus::Expired,
                _ => PermitStatus::Active,
            },
        }
    }

    /// Whether the permit occupies a slot in its unit's live tally.
    pub fn counts_toward_capacity(&self, now: DateTime<Utc>) -> bool {
        self.display_status(now) == PermitStatus::Active
    }
}
