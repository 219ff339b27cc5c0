//! Battery control facade: the four operations the rest of the system
//! needs, with input validation and the privilege gate applied before
//! anything touches the register map.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::error::SmcError;
use crate::iokit::IoKitPort;
use crate::key::Key;
use crate::registers::{
    self, BATTERY_COUNT, BATTERY_POWERED, CHARGE_PERCENT, CHARGING_INHIBIT_PRIMARY,
    CHARGING_INHIBIT_SECONDARY, CYCLE_COUNT, DESIGN_CAPACITY, FULL_CHARGE_CAPACITY,
    HardwareVariant, KeyAvailability, TEMPERATURE_SENSORS,
};
use crate::session::{SmcPort, SmcSession};
use crate::value::SmcValue;

/// Lowest charge limit any variant supports.
pub const MIN_CHARGE_LIMIT: u8 = 20;
/// Highest charge limit (no limit at all).
pub const MAX_CHARGE_LIMIT: u8 = 100;
/// The single limited setpoint binary-range controllers offer.
const BINARY_LIMITED_PERCENT: u8 = 80;

/// Whether the calling context may write controller registers.
///
/// Passed in explicitly rather than read from ambient process state so
/// the gate is testable without process-level tricks.
pub trait PrivilegeContext: Send {
    fn can_write_registers(&self) -> bool;
}

/// Real-process privilege: effective uid 0.
pub struct ProcessPrivilege;

impl PrivilegeContext for ProcessPrivilege {
    #[cfg(unix)]
    fn can_write_registers(&self) -> bool {
        // SAFETY: geteuid has no preconditions.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn can_write_registers(&self) -> bool {
        false
    }
}

/// Outcome of a control write. Policy outcomes are ordinary values,
/// not errors: callers are expected to route
/// `RequiresElevatedPrivilege` through the privileged agent rather
/// than treat it as terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    Failed(String),
    RequiresElevatedPrivilege,
    NotSupported(String),
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOutcome::Applied => write!(f, "applied"),
            ControlOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            ControlOutcome::RequiresElevatedPrivilege => {
                write!(f, "requires elevated privilege")
            }
            ControlOutcome::NotSupported(reason) => write!(f, "not supported: {reason}"),
        }
    }
}

/// Read-only battery snapshot. Every field is best-effort; a register
/// that cannot be read simply leaves its field empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatteryStatus {
    pub charge_percent: Option<u8>,
    pub is_charging: Option<bool>,
    pub is_plugged_in: Option<bool>,
    pub temperature_c: Option<f32>,
    pub cycle_count: Option<u32>,
    pub health_ratio: Option<f32>,
    pub charge_limit: Option<u8>,
    pub charging_enabled: Option<bool>,
}

/// Support/debug report: resolved variant, per-key availability, and
/// the current readings. Read-only and safe to run without privilege.
#[derive(Debug)]
pub struct DiagnosticsReport {
    pub variant: Option<HardwareVariant>,
    pub keys: Vec<KeyAvailability>,
    pub status: BatteryStatus,
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(v) => writeln!(f, "controller variant: {v}")?,
            None => writeln!(f, "controller variant: unresolved")?,
        }
        writeln!(f, "registers:")?;
        for entry in &self.keys {
            writeln!(
                f,
                "  {:<4}  {:<32}  {}",
                entry.key,
                entry.role,
                if entry.available { "present" } else { "missing" }
            )?;
        }
        writeln!(f, "readings:")?;
        write_reading(f, "charge limit", self.status.charge_limit.map(|v| format!("{v}%")))?;
        write_reading(
            f,
            "charging enabled",
            self.status.charging_enabled.map(|v| v.to_string()),
        )?;
        write_reading(
            f,
            "temperature",
            self.status.temperature_c.map(|v| format!("{v:.1} °C")),
        )?;
        write_reading(
            f,
            "cycle count",
            self.status.cycle_count.map(|v| v.to_string()),
        )?;
        write_reading(
            f,
            "charge",
            self.status.charge_percent.map(|v| format!("{v}%")),
        )?;
        Ok(())
    }
}

fn write_reading(f: &mut fmt::Formatter<'_>, label: &str, value: Option<String>) -> fmt::Result {
    writeln!(f, "  {:<18} {}", label, value.unwrap_or_else(|| "unavailable".to_string()))
}

/// High-level battery control over one controller session.
///
/// Not safe for concurrent use: wrap in a mutex and serialize writes
/// (the agent and CLI both do).
pub struct BatteryControl<P: SmcPort> {
    session: SmcSession<P>,
    privilege: Box<dyn PrivilegeContext>,
    variant: Option<HardwareVariant>,
}

impl BatteryControl<IoKitPort> {
    /// Control over the real system service, with real process
    /// privilege.
    pub fn system() -> Self {
        BatteryControl::new(SmcSession::system(), Box::new(ProcessPrivilege))
    }
}

impl<P: SmcPort> BatteryControl<P> {
    pub fn new(session: SmcSession<P>, privilege: Box<dyn PrivilegeContext>) -> Self {
        BatteryControl {
            session,
            privilege,
            variant: None,
        }
    }

    pub fn session(&self) -> &SmcSession<P> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SmcSession<P> {
        &mut self.session
    }

    /// The resolved hardware variant, probed once and then re-verified
    /// before reuse: if the cached variant's limit key stops resolving,
    /// resolution runs again instead of trusting the stale answer.
    pub fn variant(&mut self) -> Result<HardwareVariant, SmcError> {
        if let Some(v) = self.variant {
            if registers::probe_exists(&mut self.session, v.charge_limit_key()) {
                return Ok(v);
            }
            warn!("cached {v} variant no longer probes; re-resolving");
            self.variant = None;
        }
        let v = registers::resolve_variant(&mut self.session)?;
        debug!("resolved controller variant: {v}");
        self.variant = Some(v);
        Ok(v)
    }

    /// Set the charge limit, in percent.
    ///
    /// Validation order: range check (no hardware touched on failure),
    /// variant rules, privilege gate, then the write.
    pub fn set_charge_limit(&mut self, percent: u8) -> ControlOutcome {
        if !(MIN_CHARGE_LIMIT..=MAX_CHARGE_LIMIT).contains(&percent) {
            return ControlOutcome::Failed(format!(
                "charge limit {percent}% is outside the supported {MIN_CHARGE_LIMIT}-{MAX_CHARGE_LIMIT}% range"
            ));
        }
        let variant = match self.variant() {
            Ok(v) => v,
            Err(e) => return ControlOutcome::Failed(e.to_string()),
        };
        let raw = match variant {
            HardwareVariant::WideRange => percent,
            HardwareVariant::BinaryRange => match percent {
                MAX_CHARGE_LIMIT => 0,
                BINARY_LIMITED_PERCENT => 1,
                _ => {
                    return ControlOutcome::NotSupported(format!(
                        "this controller only supports {BINARY_LIMITED_PERCENT}% or {MAX_CHARGE_LIMIT}% limits, not {percent}%"
                    ));
                }
            },
        };
        if !self.privilege.can_write_registers() {
            return ControlOutcome::RequiresElevatedPrivilege;
        }
        match self.write_u8(variant.charge_limit_key(), raw) {
            Ok(()) => ControlOutcome::Applied,
            Err(e) => ControlOutcome::Failed(e.to_string()),
        }
    }

    /// Current charge limit in percent, translated back from the
    /// variant's raw encoding. Best-effort telemetry: `None` on any
    /// failure.
    pub fn charge_limit(&mut self) -> Option<u8> {
        let variant = self.variant().ok()?;
        let raw = self.read_u8(variant.charge_limit_key()).ok()?;
        Some(match variant {
            HardwareVariant::WideRange => raw,
            HardwareVariant::BinaryRange => {
                if raw == 0 {
                    MAX_CHARGE_LIMIT
                } else {
                    BINARY_LIMITED_PERCENT
                }
            }
        })
    }

    /// Enable or disable charging. Tries the primary inhibit key and
    /// falls through to the secondary one when the primary is absent.
    pub fn set_charging_enabled(&mut self, enabled: bool) -> ControlOutcome {
        if !self.privilege.can_write_registers() {
            return ControlOutcome::RequiresElevatedPrivilege;
        }
        let raw = charging_inhibit_raw(enabled);
        match self.write_u8(CHARGING_INHIBIT_PRIMARY, raw) {
            Ok(()) => ControlOutcome::Applied,
            Err(SmcError::KeyNotFound(_)) => match self.write_u8(CHARGING_INHIBIT_SECONDARY, raw) {
                Ok(()) => ControlOutcome::Applied,
                Err(e) => ControlOutcome::Failed(e.to_string()),
            },
            Err(e) => ControlOutcome::Failed(e.to_string()),
        }
    }

    pub fn is_charging_enabled(&mut self) -> Option<bool> {
        for key in [CHARGING_INHIBIT_PRIMARY, CHARGING_INHIBIT_SECONDARY] {
            if let Ok(raw) = self.read_u8(key) {
                return Some(charging_enabled_from_raw(raw));
            }
        }
        None
    }

    /// First plausible reading across the temperature sensors, in
    /// priority order. A sensor that decodes to 0 °C or below is
    /// treated as absent.
    pub fn battery_temperature(&mut self) -> Option<f32> {
        for key in TEMPERATURE_SENSORS {
            match self.session.read_key(key).and_then(|v| v.as_temperature()) {
                Ok(celsius) if celsius > 0.0 => return Some(celsius),
                Ok(celsius) => debug!("ignoring implausible {key} reading: {celsius} °C"),
                Err(e) => debug!("temperature sensor {key} unavailable: {e}"),
            }
        }
        None
    }

    pub fn cycle_count(&mut self) -> Option<u32> {
        let value = self.session.read_key(CYCLE_COUNT).ok()?;
        value.as_u16().ok().map(u32::from)
    }

    pub fn battery_count(&mut self) -> Option<u8> {
        self.read_u8(BATTERY_COUNT).ok()
    }

    /// True while running on battery power.
    pub fn battery_powered(&mut self) -> Option<bool> {
        let value = self.session.read_key(BATTERY_POWERED).ok()?;
        value.as_bool().ok()
    }

    pub fn charge_percent(&mut self) -> Option<u8> {
        self.read_u8(CHARGE_PERCENT).ok()
    }

    /// Full-charge capacity over design capacity.
    pub fn health_ratio(&mut self) -> Option<f32> {
        let full = self.read_u16(FULL_CHARGE_CAPACITY)?;
        let design = self.read_u16(DESIGN_CAPACITY)?;
        if design == 0 {
            return None;
        }
        Some(f32::from(full) / f32::from(design))
    }

    /// Snapshot of everything, with unbounded reads. Latency-sensitive
    /// callers should go through `telemetry::gather_status` instead.
    pub fn battery_status(&mut self) -> BatteryStatus {
        let mut status = self.status_fast();
        status.temperature_c = self.battery_temperature();
        status.cycle_count = self.cycle_count();
        status
    }

    /// Everything except the slow temperature/cycle-count reads.
    pub(crate) fn status_fast(&mut self) -> BatteryStatus {
        let charging_enabled = self.is_charging_enabled();
        let is_plugged_in = self.battery_powered().map(|on_battery| !on_battery);
        let is_charging = match (is_plugged_in, charging_enabled) {
            (Some(plugged), Some(enabled)) => Some(plugged && enabled),
            _ => None,
        };
        BatteryStatus {
            charge_percent: self.charge_percent(),
            charge_limit: self.charge_limit(),
            charging_enabled,
            is_plugged_in,
            is_charging,
            health_ratio: self.health_ratio(),
            temperature_c: None,
            cycle_count: None,
        }
    }

    /// Full support report. Read-only.
    pub fn run_diagnostics(&mut self) -> DiagnosticsReport {
        DiagnosticsReport {
            variant: self.variant().ok(),
            keys: registers::list_available_keys(&mut self.session),
            status: self.battery_status(),
        }
    }

    fn read_u8(&mut self, key: Key) -> Result<u8, SmcError> {
        self.session.read_key(key)?.as_u8()
    }

    fn read_u16(&mut self, key: Key) -> Option<u16> {
        self.session.read_key(key).ok()?.as_u16().ok()
    }

    fn write_u8(&mut self, key: Key, raw: u8) -> Result<(), SmcError> {
        let info = self.session.key_info(key)?;
        let value = SmcValue::encode_u8(info.data_type, raw)?;
        self.session.write_key(key, &value)
    }
}

/// The single place the charging boolean is inverted: the register
/// holds an inhibit flag, so enabled maps to 0 and disabled to 1.
fn charging_inhibit_raw(enabled: bool) -> u8 {
    if enabled { 0 } else { 1 }
}

fn charging_enabled_from_raw(raw: u8) -> bool {
    raw == 0
}
