//! The register catalog: every SMC key this crate ever touches, plus
//! runtime capability probing and hardware-variant resolution.
//!
//! Two incompatible register layouts exist. Wide-range controllers
//! expose `BCLM`, whose raw value is the target percentage. Binary-range
//! controllers expose `CHWA`, a one-bit flag where 0 means "unlimited
//! (100%)" and 1 means "limited (80%)". The two encodings are not
//! linearly related; translation is explicit in the facade. Which layout
//! is present is decided by probing key existence at runtime, not by
//! inspecting the host architecture: register availability is the
//! authoritative signal.

use strum_macros::Display;
use tracing::debug;

use crate::error::SmcError;
use crate::key::Key;
use crate::session::{SmcPort, SmcSession};

/// Charge limit, wide-range layout: raw value is the percentage.
pub const CHARGE_LIMIT_WIDE: Key = Key::new(*b"BCLM");
/// Charge limit, binary-range layout: 0 = 100%, 1 = 80%.
pub const CHARGE_LIMIT_BINARY: Key = Key::new(*b"CHWA");
/// Charging inhibit, primary key: 0 = charging enabled, 1 = inhibited.
pub const CHARGING_INHIBIT_PRIMARY: Key = Key::new(*b"CH0B");
/// Charging inhibit, secondary key (same semantics, some firmwares).
pub const CHARGING_INHIBIT_SECONDARY: Key = Key::new(*b"CH0C");
/// Battery-powered flag: true while running on battery.
pub const BATTERY_POWERED: Key = Key::new(*b"BATP");
/// Number of batteries attached.
pub const BATTERY_COUNT: Key = Key::new(*b"BNum");
/// Battery temperature sensors, in read priority order.
pub const TEMPERATURE_SENSORS: [Key; 4] = [
    Key::new(*b"TB0T"),
    Key::new(*b"TB1T"),
    Key::new(*b"TB2T"),
    Key::new(*b"TB3T"),
];
/// Battery cycle count.
pub const CYCLE_COUNT: Key = Key::new(*b"B0CT");
/// Current charge percentage.
pub const CHARGE_PERCENT: Key = Key::new(*b"BUIC");
/// Full-charge capacity, mAh.
pub const FULL_CHARGE_CAPACITY: Key = Key::new(*b"B0FC");
/// Design capacity, mAh.
pub const DESIGN_CAPACITY: Key = Key::new(*b"B0DC");

/// One catalog row: a key and the logical role it plays.
pub struct CatalogEntry {
    pub key: Key,
    pub role: &'static str,
}

/// The full fixed catalog, in diagnostic enumeration order.
pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { key: CHARGE_LIMIT_WIDE, role: "charge limit (wide-range)" },
    CatalogEntry { key: CHARGE_LIMIT_BINARY, role: "charge limit (binary-range)" },
    CatalogEntry { key: CHARGING_INHIBIT_PRIMARY, role: "charging inhibit (primary)" },
    CatalogEntry { key: CHARGING_INHIBIT_SECONDARY, role: "charging inhibit (secondary)" },
    CatalogEntry { key: BATTERY_POWERED, role: "battery powered flag" },
    CatalogEntry { key: BATTERY_COUNT, role: "battery count" },
    CatalogEntry { key: TEMPERATURE_SENSORS[0], role: "battery temperature sensor 0" },
    CatalogEntry { key: TEMPERATURE_SENSORS[1], role: "battery temperature sensor 1" },
    CatalogEntry { key: TEMPERATURE_SENSORS[2], role: "battery temperature sensor 2" },
    CatalogEntry { key: TEMPERATURE_SENSORS[3], role: "battery temperature sensor 3" },
    CatalogEntry { key: CYCLE_COUNT, role: "battery cycle count" },
    CatalogEntry { key: CHARGE_PERCENT, role: "charge percentage" },
    CatalogEntry { key: FULL_CHARGE_CAPACITY, role: "full-charge capacity" },
    CatalogEntry { key: DESIGN_CAPACITY, role: "design capacity" },
];

/// The two incompatible controller register layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HardwareVariant {
    #[strum(to_string = "wide-range")]
    WideRange,
    #[strum(to_string = "binary-range")]
    BinaryRange,
}

impl HardwareVariant {
    pub fn charge_limit_key(&self) -> Key {
        match self {
            HardwareVariant::WideRange => CHARGE_LIMIT_WIDE,
            HardwareVariant::BinaryRange => CHARGE_LIMIT_BINARY,
        }
    }
}

/// Existence is defined purely by a successful key-info lookup,
/// independent of read permission.
pub fn probe_exists<P: SmcPort>(session: &mut SmcSession<P>, key: Key) -> bool {
    match session.key_info(key) {
        Ok(_) => true,
        Err(SmcError::KeyNotFound(_)) => false,
        Err(e) => {
            debug!("probe of {key} failed: {e}");
            false
        }
    }
}

/// Decide which register layout this controller carries.
///
/// Wide-range candidates are tried first; when both layouts probe
/// successfully, wide-range wins.
pub fn resolve_variant<P: SmcPort>(
    session: &mut SmcSession<P>,
) -> Result<HardwareVariant, SmcError> {
    if probe_exists(session, CHARGE_LIMIT_WIDE) {
        return Ok(HardwareVariant::WideRange);
    }
    if probe_exists(session, CHARGE_LIMIT_BINARY) {
        return Ok(HardwareVariant::BinaryRange);
    }
    Err(SmcError::NoKnownVariant)
}

/// Availability of one catalog key, for diagnostic reporting.
#[derive(Debug, Clone)]
pub struct KeyAvailability {
    pub key: Key,
    pub role: &'static str,
    pub available: bool,
}

/// Probe every catalog key independently. Diagnostic only; control
/// decisions never come from this sweep.
pub fn list_available_keys<P: SmcPort>(session: &mut SmcSession<P>) -> Vec<KeyAvailability> {
    CATALOG
        .iter()
        .map(|entry| KeyAvailability {
            key: entry.key,
            role: entry.role,
            available: probe_exists(session, entry.key),
        })
        .collect()
}
