//! Variant resolution and capability probing.

mod common;

use battctl_lib::registers::{list_available_keys, probe_exists, resolve_variant};
use common::*;

#[test]
fn test_wide_range_resolves() {
    let mut session = SmcSession::new(wide_range_port());
    assert_eq!(
        resolve_variant(&mut session).unwrap(),
        HardwareVariant::WideRange
    );
}

#[test]
fn test_binary_range_resolves_when_only_binary_key_exists() {
    let mut session = SmcSession::new(binary_range_port());
    assert_eq!(
        resolve_variant(&mut session).unwrap(),
        HardwareVariant::BinaryRange
    );
}

#[test]
fn test_wide_range_wins_when_both_probe() {
    let port = binary_range_port().with_register(CHARGE_LIMIT_WIDE, DataType::Ui8, &[100]);
    let mut session = SmcSession::new(port);
    assert_eq!(
        resolve_variant(&mut session).unwrap(),
        HardwareVariant::WideRange
    );
}

#[test]
fn test_no_limit_key_is_an_error() {
    let mut session = SmcSession::new(MockPort::new());
    assert!(matches!(
        resolve_variant(&mut session),
        Err(SmcError::NoKnownVariant)
    ));
}

#[test]
fn test_probe_is_existence_only() {
    let mut session = SmcSession::new(wide_range_port());
    assert!(probe_exists(&mut session, CHARGE_LIMIT_WIDE));
    assert!(!probe_exists(&mut session, CHARGE_LIMIT_BINARY));
}

#[test]
fn test_probe_fails_cleanly_when_service_is_gone() {
    let port = MockPort {
        open_should_fail: true,
        ..MockPort::default()
    };
    let mut session = SmcSession::new(port);
    assert!(!probe_exists(&mut session, CHARGE_LIMIT_WIDE));
}

#[test]
fn test_key_sweep_covers_full_catalog_in_order() {
    let mut session = SmcSession::new(wide_range_port());
    let keys = list_available_keys(&mut session);
    assert_eq!(keys.len(), CATALOG.len());
    for (entry, listed) in CATALOG.iter().zip(&keys) {
        assert_eq!(entry.key, listed.key);
    }
    let bclm = keys
        .iter()
        .find(|k| k.key == CHARGE_LIMIT_WIDE)
        .unwrap();
    assert!(bclm.available);
    let chwa = keys
        .iter()
        .find(|k| k.key == CHARGE_LIMIT_BINARY)
        .unwrap();
    assert!(!chwa.available);
}
