use docward_types::{EntityCode, EntryKey, Error};
use proptest::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;

// ── EntityCode ────────────────────────────────────────────────────

#[test]
fn entity_code_accepts_ten_digits() {
    let code = EntityCode::parse("0101234567").unwrap();
    assert_eq!(code.as_str(), "0101234567");
}

#[test]
fn entity_code_accepts_thirteen_digits() {
    assert!(EntityCode::is_valid("0101234567001"));
}

#[test]
fn entity_code_strips_branch_separator() {
    let code = EntityCode::parse(" 0101234567-001 ").unwrap();
    assert_eq!(code.as_str(), "0101234567001");
}

#[test]
fn entity_code_strips_dots_and_spaces() {
    let code = EntityCode::parse("010.123 4567").unwrap();
    assert_eq!(code.to_string(), "0101234567");
}

#[test]
fn entity_code_rejects_short() {
    let err = EntityCode::parse("123456789").unwrap_err();
    assert!(matches!(err, Error::InvalidEntityCode { .. }));
}

#[test]
fn entity_code_rejects_fourteen_digits() {
    assert!(!EntityCode::is_valid("01012345670011"));
}

#[test]
fn entity_code_rejects_letters() {
    assert!(!EntityCode::is_valid("01012345AB"));
}

#[test]
fn entity_code_rejects_empty() {
    assert!(EntityCode::from_str("   ").is_err());
}

#[test]
fn entity_code_serde_roundtrip() {
    let code = EntityCode::parse("0101234567").unwrap();
    let json = serde_json::to_string(&code).unwrap();
    assert_eq!(json, "\"0101234567\"");
    let parsed: EntityCode = serde_json::from_str(&json).unwrap();
    assert_eq!(code, parsed);
}

#[test]
fn entity_code_serde_rejects_invalid() {
    let parsed: Result<EntityCode, _> = serde_json::from_str("\"12\"");
    assert!(parsed.is_err());
}

#[test]
fn entity_code_hash_eq() {
    let mut set = HashSet::new();
    set.insert(EntityCode::parse("0101234567").unwrap());
    set.insert(EntityCode::parse("010-123-4567").unwrap());
    assert_eq!(set.len(), 1);
}

// ── EntryKey ──────────────────────────────────────────────────────

#[test]
fn entry_key_display_and_hint() {
    let key = EntryKey::new(EntityCode::parse("0101234567").unwrap(), "A.xml");
    assert_eq!(key.to_string(), "0101234567/A.xml");
    assert_eq!(key.locator_hint(), "0101234567/A.xml");
}

#[test]
fn entry_key_orders_by_entity_then_filename() {
    let a = EntryKey::new(EntityCode::parse("0101234567").unwrap(), "B.xml");
    let b = EntryKey::new(EntityCode::parse("0101234568").unwrap(), "A.xml");
    let c = EntryKey::new(EntityCode::parse("0101234567").unwrap(), "C.xml");
    let mut keys = vec![b.clone(), c.clone(), a.clone()];
    keys.sort();
    assert_eq!(keys, vec![a, c, b]);
}

// ── Properties ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn well_formed_codes_always_parse(digits in "[0-9]{10,13}") {
        let code = EntityCode::parse(&digits).unwrap();
        prop_assert_eq!(code.as_str(), digits.as_str());
    }

    #[test]
    fn long_runs_never_parse(digits in "[0-9]{14,20}") {
        prop_assert!(!EntityCode::is_valid(&digits));
    }
}
