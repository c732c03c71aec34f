use super::common::*;
use crate::permits::domain::{PermitStatus, PermitType};
use chrono::Utc;

#[test]
fn active_permit_without_expiration_reads_active() {
    let permit = stored_permit("prm-a", &unit(), PermitType::Resident);
    assert_eq!(permit.display_status(Utc::now()), PermitStatus::Active);
    assert!(permit.counts_toward_capacity(Utc::now()));
}

#[test]
fn lapsed_active_permit_reads_expired_without_storage_change() {
    let mut permit = stored_permit("prm-b", &unit(), PermitType::Resident);
    permit.expires_at = Some(hours_ago(1));

    assert_eq!(permit.display_status(Utc::now()), PermitStatus::Expired);
    assert_eq!(permit.status, PermitStatus::Active, "stored state untouched");
    assert!(!permit.counts_toward_capacity(Utc::now()));
}

#[test]
fn future_expiration_keeps_permit_active() {
    let mut permit = stored_permit("prm-c", &unit(), PermitType::Resident);
    permit.expires_at = Some(hours_ahead(48));
    assert_eq!(permit.display_status(Utc::now()), PermitStatus::Active);
}

#[test]
fn revocation_wins_over_lapsed_expiry() {
    let mut permit = stored_permit("prm-d", &unit(), PermitType::Resident);
    permit.status = PermitStatus::Revoked;
    permit.revoked_at = Some(hours_ago(2));
    permit.revoked_reason = Some("lost placard".to_string());
    permit.expires_at = Some(hours_ago(10));

    assert_eq!(permit.display_status(Utc::now()), PermitStatus::Revoked);
}

#[test]
fn stored_expired_reads_expired_even_without_timestamp() {
    let mut permit = stored_permit("prm-e", &unit(), PermitType::Visitor);
    permit.status = PermitStatus::Expired;
    assert_eq!(permit.display_status(Utc::now()), PermitStatus::Expired);
}

#[test]
fn display_status_is_idempotent() {
    let mut permit = stored_permit("prm-f", &unit(), PermitType::Resident);
    permit.expires_at = Some(hours_ago(3));
    let before = permit.clone();

    let now = Utc::now();
    let first = permit.display_status(now);
    let second = permit.display_status(now);

    assert_eq!(first, second);
    assert_eq!(permit, before, "derivation must not mutate the record");
}

#[test]
fn legacy_labels_fold_void_onto_revoked() {
    assert_eq!(PermitStatus::from_label("active"), Some(PermitStatus::Active));
    assert_eq!(
        PermitStatus::from_label("EXPIRED"),
        Some(PermitStatus::Expired)
    );
    assert_eq!(
        PermitStatus::from_label("revoked"),
        Some(PermitStatus::Revoked)
    );
    assert_eq!(PermitStatus::from_label("void"), Some(PermitStatus::Revoked));
    assert_eq!(PermitStatus::from_label("VOID"), Some(PermitStatus::Revoked));
    assert_eq!(PermitStatus::from_label("suspended"), None);
}

#[test]
fn terminal_states_are_flagged() {
    assert!(!PermitStatus::Active.is_terminal());
    assert!(PermitStatus::Expired.is_terminal());
    assert!(PermitStatus::Revoked.is_terminal());
}
