use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::capacity::{CapacityAvailability, CapacityCaps, CapacitySnapshot, CapacityUsage};
use super::domain::{AssociationId, Permit, PermitId, PermitType, UnitId, VehicleId};
use super::repository::{OverrideGate, OverrideGrant, PermitRepository, RepositoryError};
use super::service::{IssueRequest, PermitService, PermitServiceError, ReplaceOutcome};

/// Router builder exposing the permit lifecycle over HTTP.
pub fn permit_router<R, G>(service: Arc<PermitService<R, G>>) -> Router
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    Router::new()
        .route("/api/v1/permits", post(issue_handler::<R, G>))
        .route("/api/v1/permits/:permit_id", get(permit_handler::<R, G>))
        .route(
            "/api/v1/permits/:permit_id/revoke",
            post(revoke_handler::<R, G>),
        )
        .route(
            "/api/v1/permits/:permit_id/expire",
            post(expire_handler::<R, G>),
        )
        .route(
            "/api/v1/permits/:permit_id/expiration",
            put(expiration_handler::<R, G>),
        )
        .route(
            "/api/v1/permits/:permit_id/replace",
            post(replace_handler::<R, G>),
        )
        .route(
            "/api/v1/units/:unit_id/availability",
            get(availability_handler::<R, G>),
        )
        .with_state(service)
}

/// Issuance payload: the target unit, the permit data, and an optional
/// override grant for capacity bypass.
#[derive(Debug, Deserialize)]
pub struct IssuePayload {
    pub unit_id: UnitId,
    pub permit: PermitData,
    #[serde(default, rename = "override")]
    pub override_grant: Option<OverrideGrant>,
}

#[derive(Debug, Deserialize)]
pub struct PermitData {
    #[serde(rename = "type")]
    pub permit_type: PermitType,
    #[serde(default)]
    pub permit_number: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<VehicleId>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl IssuePayload {
    fn into_parts(self) -> (IssueRequest, Option<OverrideGrant>) {
        let request = IssueRequest {
            unit_id: self.unit_id,
            permit_type: self.permit.permit_type,
            permit_number: self.permit.permit_number,
            vehicle_id: self.permit.vehicle_id,
            issued_at: self.permit.issued_at,
            expires_at: self.permit.expires_at,
            notes: self.permit.notes,
            created_by: self.permit.created_by,
        };
        (request, self.override_grant)
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokePayload {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpirationPayload {
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReplacePayload {
    pub vehicle_id: VehicleId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Sanitized permit representation with the derived display status.
#[derive(Debug, Clone, Serialize)]
pub struct PermitView {
    pub permit_id: PermitId,
    pub association_id: AssociationId,
    pub unit_id: UnitId,
    #[serde(rename = "type")]
    pub permit_type: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit_number: Option<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PermitView {
    pub fn from_permit(permit: &Permit, now: DateTime<Utc>) -> Self {
        Self {
            permit_id: permit.id.clone(),
            association_id: permit.association_id.clone(),
            unit_id: permit.unit_id.clone(),
            permit_type: permit.permit_type.label(),
            status: permit.display_status(now).label(),
            vehicle_id: permit.vehicle_id.clone(),
            permit_number: permit.permit_number.clone(),
            issued_at: permit.issued_at,
            expires_at: permit.expires_at,
            revoked_at: permit.revoked_at,
            revoked_reason: permit.revoked_reason.clone(),
            notes: permit.notes.clone(),
        }
    }
}

/// Capacity snapshot trimmed for API responses.
#[derive(Debug, Serialize)]
pub struct AvailabilityView {
    pub unit_id: UnitId,
    pub association_id: AssociationId,
    pub current: CapacityUsage,
    pub caps: CapacityCaps,
    pub availability: CapacityAvailability,
}

impl From<CapacitySnapshot> for AvailabilityView {
    fn from(snapshot: CapacitySnapshot) -> Self {
        Self {
            unit_id: snapshot.unit.id,
            association_id: snapshot.association.id,
            current: snapshot.current,
            caps: snapshot.caps,
            availability: snapshot.availability,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplaceView {
    pub revoked: PermitView,
    pub issued: PermitView,
}

impl ReplaceView {
    fn from_outcome(outcome: &ReplaceOutcome, now: DateTime<Utc>) -> Self {
        Self {
            revoked: PermitView::from_permit(&outcome.revoked, now),
            issued: PermitView::from_permit(&outcome.issued, now),
        }
    }
}

fn error_response(error: PermitServiceError) -> Response {
    match error {
        PermitServiceError::Validation(err) => {
            let payload = json!({ "code": "VALIDATION", "error": err.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        PermitServiceError::CapacityExceeded(denial) => {
            let payload = json!({
                "code": "CAP_EXCEEDED",
                "error": format!(
                    "{} permit cap reached ({}/{})",
                    denial.bucket.label(),
                    denial.active,
                    denial.max
                ),
                "caps": denial.caps,
                "details": {
                    "active": denial.active,
                    "max": denial.max,
                    "permit_type": denial.bucket.label(),
                },
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        PermitServiceError::Override(err) => {
            let payload = json!({ "code": "AUTHORIZATION", "error": err.to_string() });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        PermitServiceError::Conflict(err) => {
            let payload = json!({ "code": "CONFLICT", "error": err.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        PermitServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "code": "NOT_FOUND", "error": "record not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn issue_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    axum::Json(payload): axum::Json<IssuePayload>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    let (request, grant) = payload.into_parts();
    match service.issue(request, grant.as_ref()) {
        Ok(permit) => {
            let view = PermitView::from_permit(&permit, Utc::now());
            (StatusCode::CREATED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn permit_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    Path(permit_id): Path<String>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    match service.get(&PermitId(permit_id)) {
        Ok(permit) => {
            let view = PermitView::from_permit(&permit, Utc::now());
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn revoke_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    Path(permit_id): Path<String>,
    axum::Json(payload): axum::Json<RevokePayload>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    match service.revoke(&PermitId(permit_id), &payload.reason) {
        Ok(permit) => {
            let view = PermitView::from_permit(&permit, Utc::now());
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn expire_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    Path(permit_id): Path<String>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    match service.mark_expired(&PermitId(permit_id)) {
        Ok(permit) => {
            let view = PermitView::from_permit(&permit, Utc::now());
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn expiration_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    Path(permit_id): Path<String>,
    axum::Json(payload): axum::Json<ExpirationPayload>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    match service.set_expiration(&PermitId(permit_id), payload.expires_at) {
        Ok(permit) => {
            let view = PermitView::from_permit(&permit, Utc::now());
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn replace_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    Path(permit_id): Path<String>,
    axum::Json(payload): axum::Json<ReplacePayload>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    match service.replace(&PermitId(permit_id), &payload.vehicle_id, payload.notes) {
        Ok(outcome) => {
            let view = ReplaceView::from_outcome(&outcome, Utc::now());
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn availability_handler<R, G>(
    State(service): State<Arc<PermitService<R, G>>>,
    Path(unit_id): Path<String>,
) -> Response
where
    R: PermitRepository + 'static,
    G: OverrideGate + 'static,
{
    match service.availability(&UnitId(unit_id)) {
        Ok(snapshot) => {
            let view = AvailabilityView::from(snapshot);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}
