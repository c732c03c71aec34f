use crate::infra::{
    default_capacity_rules, seed_demo_records, AllowListOverrideGate, InMemoryPermitRepository,
};
use chrono::{Duration, Utc};
use clap::Args;
use curbside::error::AppError;
use curbside::permits::{
    CapacitySnapshot, IssueRequest, OverrideGrant, Permit, PermitService, PermitServiceError,
    PermitType, UnitId, VehicleId,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Principal presented with the override grant
    #[arg(long, default_value = "property-manager")]
    pub(crate) principal: String,
    /// Capability token presented with the override grant
    #[arg(long, default_value = "board-approved")]
    pub(crate) token: String,
    /// Skip the vehicle replacement portion of the demo
    #[arg(long)]
    pub(crate) skip_replace: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        principal,
        token,
        skip_replace,
    } = args;

    let repository = Arc::new(InMemoryPermitRepository::default());
    seed_demo_records(&repository);
    let gate = Arc::new(
        AllowListOverrideGate::default().with_grant("property-manager", "board-approved"),
    );
    let service = PermitService::new(repository, gate);
    let unit_id = UnitId("unit-2f".to_string());

    println!("Curbside permit lifecycle demo");
    let rules = default_capacity_rules();
    println!(
        "Association rules: {} baseline permit(s) per unit, hard cap {}, visitors {}",
        rules.permits_per_count,
        rules
            .max_permits_per_unit
            .map(|cap| cap.to_string())
            .unwrap_or_else(|| "unbounded".to_string()),
        match rules.visitor_allowance.cap() {
            None => "unbounded".to_string(),
            Some(0) => "disabled".to_string(),
            Some(cap) => format!("capped at {cap}"),
        }
    );

    render_availability(&service.availability(&unit_id)?);

    let resident = service.issue(
        resident_request(&unit_id, Some("veh-outback")),
        None,
    )?;
    println!("\nIssued resident permit for the registered vehicle");
    render_permit(&resident);

    let additional = {
        let mut request = resident_request(&unit_id, None);
        request.permit_type = PermitType::Additional;
        request.expires_at = Some(Utc::now() + Duration::days(30));
        service.issue(request, None)?
    };
    println!("\nIssued an additional permit expiring in 30 days");
    render_permit(&additional);

    println!("\nRequesting a third resident permit without an override");
    match service.issue(resident_request(&unit_id, None), None) {
        Err(PermitServiceError::CapacityExceeded(denial)) => {
            println!(
                "- denied: {} bucket at {}/{}",
                denial.bucket.label(),
                denial.active,
                denial.max
            );
        }
        Ok(permit) => println!("- unexpectedly issued {}", permit.id),
        Err(other) => return Err(other.into()),
    }

    println!("\nRetrying with an override grant from '{principal}'");
    let grant = OverrideGrant {
        principal,
        token,
    };
    match service.issue(resident_request(&unit_id, None), Some(&grant)) {
        Ok(permit) => {
            println!("- override verified, permit issued past the cap");
            render_permit(&permit);
        }
        Err(PermitServiceError::Override(denied)) => {
            println!("- override rejected: {denied}");
        }
        Err(other) => return Err(other.into()),
    }

    if !skip_replace {
        println!("\nSwapping the resident permit onto the second vehicle");
        let outcome = service.replace(
            &resident.id,
            &VehicleId("veh-civic".to_string()),
            Some("owner traded in the wagon".to_string()),
        )?;
        println!(
            "- revoked {} ({})",
            outcome.revoked.id,
            outcome
                .revoked
                .revoked_reason
                .as_deref()
                .unwrap_or("no reason recorded")
        );
        render_permit(&outcome.issued);
    }

    println!("\nRetiring the additional permit administratively");
    let expired = service.mark_expired(&additional.id)?;
    println!(
        "- {} is now {}",
        expired.id,
        expired.display_status(Utc::now()).label()
    );

    println!();
    render_availability(&service.availability(&unit_id)?);

    Ok(())
}

fn resident_request(unit_id: &UnitId, vehicle: Option<&str>) -> IssueRequest {
    IssueRequest {
        unit_id: unit_id.clone(),
        permit_type: PermitType::Resident,
        permit_number: None,
        vehicle_id: vehicle.map(|id| VehicleId(id.to_string())),
        issued_at: None,
        expires_at: None,
        notes: None,
        created_by: Some("demo".to_string()),
    }
}

fn render_permit(permit: &Permit) {
    let vehicle = permit
        .vehicle_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unassigned".to_string());
    println!(
        "- {} | {} | vehicle {} | status {}",
        permit.id,
        permit.permit_type.label(),
        vehicle,
        permit.display_status(Utc::now()).label()
    );
}

fn render_availability(snapshot: &CapacitySnapshot) {
    println!(
        "Unit {} availability: {} resident (cap {}), {} visitor (cap {})",
        snapshot.unit.label,
        snapshot.current.resident,
        snapshot
            .caps
            .max_resident
            .map(|cap| cap.to_string())
            .unwrap_or_else(|| "unbounded".to_string()),
        snapshot.current.visitor,
        snapshot
            .caps
            .max_visitor
            .map(|cap| cap.to_string())
            .unwrap_or_else(|| "unbounded".to_string()),
    );
    println!(
        "- can issue resident: {} | can issue visitor: {}",
        snapshot.availability.can_issue_resident, snapshot.availability.can_issue_visitor
    );
}
