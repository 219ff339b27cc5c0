//! Battery telemetry and charge control over the SMC.
//!
//! The crate is split the way the data flows: a typed register codec
//! ([`value`]), a session to the controller service ([`session`],
//! [`iokit`]), the register catalog and hardware-variant resolver
//! ([`registers`]), the battery control facade ([`control`]), and the
//! privilege-separated write path ([`ipc`], [`agent`]) used when the
//! calling process cannot write registers itself.

pub mod agent;
pub mod control;
pub mod error;
pub mod ipc;
pub mod iokit;
pub mod key;
pub mod registers;
pub mod session;
pub mod telemetry;
pub mod value;

pub use control::{BatteryControl, BatteryStatus, ControlOutcome, DiagnosticsReport};
pub use error::SmcError;
pub use key::Key;
pub use registers::HardwareVariant;
pub use session::SmcSession;
pub use value::{DataType, SmcValue};
