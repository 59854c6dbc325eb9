use chrono::Utc;
use docward_types::{
    ContentHash, EntityCode, NewEntry, ProtectionEvent, ProtectionOutcome, SyncAttempt,
    SyncAttemptStatus, SyncScope, SyncStatus, WarehouseEntry,
};
use std::str::FromStr;
use std::time::Duration;

fn code() -> EntityCode {
    EntityCode::parse("0101234567").unwrap()
}

// ── WarehouseEntry ────────────────────────────────────────────────

#[test]
fn create_hashes_content_and_starts_pending() {
    let now = Utc::now();
    let entry = WarehouseEntry::create(NewEntry::new(code(), "A.xml", "ACME", b"<doc/>".to_vec()), now);
    assert_eq!(entry.content(), b"<doc/>");
    assert_eq!(entry.content_hash(), &ContentHash::of(b"<doc/>"));
    assert_eq!(entry.sync_status, SyncStatus::Pending);
    assert_eq!(entry.created_at, now);
    assert_eq!(entry.updated_at, now);
    assert!(entry.remote_locator.is_none());
}

#[test]
fn content_hash_is_lowercase_sha256_hex() {
    let hash = ContentHash::of(b"");
    assert_eq!(
        hash.as_str(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn same_payload_compares_label_and_content() {
    let entry = WarehouseEntry::create(NewEntry::new(code(), "A.xml", "ACME", b"x".to_vec()), Utc::now());
    assert!(entry.same_payload(&NewEntry::new(code(), "A.xml", "ACME", b"x".to_vec())));
    assert!(!entry.same_payload(&NewEntry::new(code(), "A.xml", "Other", b"x".to_vec())));
    assert!(!entry.same_payload(&NewEntry::new(code(), "A.xml", "ACME", b"y".to_vec())));
}

#[test]
fn sync_status_string_roundtrip() {
    for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
        assert_eq!(SyncStatus::from_str(status.as_str()).unwrap(), status);
    }
    assert!(SyncStatus::from_str("done").is_err());
}

// ── Audit records ─────────────────────────────────────────────────

#[test]
fn protection_events_get_distinct_ids() {
    let a = ProtectionEvent::new("a.xml", None, ProtectionOutcome::Ignored, Duration::ZERO);
    let b = ProtectionEvent::new("a.xml", None, ProtectionOutcome::Ignored, Duration::ZERO);
    assert_ne!(a.id, b.id);
    assert!(!a.registered);
}

#[test]
fn outcome_string_roundtrip() {
    for outcome in [
        ProtectionOutcome::Ignored,
        ProtectionOutcome::Restored,
        ProtectionOutcome::NoMatch,
    ] {
        assert_eq!(ProtectionOutcome::from_str(outcome.as_str()).unwrap(), outcome);
    }
}

#[test]
fn attempt_status_from_counts() {
    assert_eq!(SyncAttemptStatus::from_counts(3, 3), SyncAttemptStatus::Success);
    assert_eq!(SyncAttemptStatus::from_counts(3, 2), SyncAttemptStatus::PartialSuccess);
    assert_eq!(SyncAttemptStatus::from_counts(3, 0), SyncAttemptStatus::Failed);
    assert_eq!(SyncAttemptStatus::from_counts(0, 0), SyncAttemptStatus::Success);
}

#[test]
fn scope_entry_ref() {
    assert_eq!(SyncScope::All.as_entry_ref(), "ALL");
    assert_eq!(SyncScope::ByEntity(code()).as_entry_ref(), "0101234567");
    assert!(SyncScope::All.includes(&code()));
    assert!(!SyncScope::ByEntity(EntityCode::parse("0109999999").unwrap()).includes(&code()));
}

#[test]
fn config_failure_is_failed_with_detail() {
    let attempt = SyncAttempt::config_failure(&SyncScope::All, "github", 4, "missing token");
    assert_eq!(attempt.status, SyncAttemptStatus::Failed);
    assert_eq!(attempt.files_attempted, 4);
    assert_eq!(attempt.files_succeeded, 0);
    assert_eq!(attempt.detail.as_deref(), Some("missing token"));
    assert_eq!(attempt.entry_ref, "ALL");
}
