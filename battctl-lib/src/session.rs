//! Controller session: the open/close lifecycle of a connection to the
//! SMC user client and the three primitive exchanges the protocol
//! supports (key info, read bytes, write bytes).
//!
//! The session owns zero-or-one open port. `connect()` is idempotent
//! and reports failure as `false` rather than an error; the typed
//! operations attempt the transition themselves and fail cleanly when
//! it cannot be made. Every non-success status from the kernel or the
//! SMC is surfaced as a typed failure carrying the raw code; the
//! session never retries on its own.

use num_enum::{FromPrimitive, IntoPrimitive};
use tracing::{debug, warn};

use crate::error::SmcError;
use crate::iokit::IoKitPort;
use crate::key::Key;
use crate::value::{DataType, PAYLOAD_SIZE, SmcValue};

/// Struct-method index of the AppleSMC user client.
pub const KERNEL_INDEX_SMC: u32 = 2;

/// Command bytes accepted by the SMC user client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Selector {
    ReadBytes = 5,
    WriteBytes = 6,
    KeyInfo = 9,
}

/// Result byte returned in [`SmcKeyData::result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SmcResult {
    Success = 0,
    KeyNotFound = 0x84,
    NotReadable = 0x85,
    NotWritable = 0x86,
    #[num_enum(catch_all)]
    Unknown(u8),
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SmcVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub reserved: u8,
    pub release: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SmcPLimitData {
    pub version: u16,
    pub length: u16,
    pub cpu_plimit: u32,
    pub gpu_plimit: u32,
    pub mem_plimit: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SmcKeyInfoData {
    pub data_size: u32,
    pub data_type: u32,
    pub data_attributes: u8,
}

/// Call structure exchanged with the SMC user client. Layout mirrors
/// the kernel ABI; do not reorder fields.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SmcKeyData {
    pub key: u32,
    pub vers: SmcVersion,
    pub p_limit: SmcPLimitData,
    pub key_info: SmcKeyInfoData,
    pub result: u8,
    pub status: u8,
    pub data8: u8,
    pub data32: u32,
    pub bytes: [u8; PAYLOAD_SIZE],
}

/// Decoded capability probe result for a single key.
///
/// Fetched on demand and not cached across calls; attributes such as
/// lock bits are not assumed stable.
#[derive(Debug, Clone, Copy)]
pub struct SmcKeyInfo {
    pub data_size: u32,
    pub data_type: DataType,
    pub attributes: u8,
}

/// The seam between the session state machine and the OS.
pub trait SmcPort {
    fn open(&mut self) -> Result<(), SmcError>;
    fn call(&mut self, selector: Selector, input: &SmcKeyData) -> Result<SmcKeyData, SmcError>;
    fn close(&mut self);
}

/// A connection to the hardware controller service.
///
/// Not internally synchronized: callers must serialize the
/// connect/call/disconnect sequence (see the facade and agent, which
/// wrap the session in a mutex).
pub struct SmcSession<P: SmcPort> {
    port: P,
    connected: bool,
}

impl SmcSession<IoKitPort> {
    /// Session over the real system service.
    pub fn system() -> Self {
        SmcSession::new(IoKitPort::new())
    }
}

impl<P: SmcPort> SmcSession<P> {
    pub fn new(port: P) -> Self {
        SmcSession {
            port,
            connected: false,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Look up and open the controller service. Idempotent; returns
    /// `false` (not an error) on lookup or open failure.
    pub fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        match self.port.open() {
            Ok(()) => {
                debug!("controller session opened");
                self.connected = true;
                true
            }
            Err(e) => {
                warn!("failed to open controller session: {e}");
                false
            }
        }
    }

    /// Release the handle. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.port.close();
            self.connected = false;
            debug!("controller session closed");
        }
    }

    fn ensure_connected(&mut self) -> Result<(), SmcError> {
        if self.connect() {
            Ok(())
        } else {
            Err(SmcError::ServiceNotFound)
        }
    }

    /// One raw request/response exchange. Fails with `NotOpen` while
    /// disconnected.
    pub fn call(&mut self, selector: Selector, input: &SmcKeyData) -> Result<SmcKeyData, SmcError> {
        if !self.connected {
            return Err(SmcError::NotOpen);
        }
        let mut input = *input;
        input.data8 = selector.into();
        self.port.call(selector, &input)
    }

    /// Capability probe: size, type, and attributes of a key.
    pub fn key_info(&mut self, key: Key) -> Result<SmcKeyInfo, SmcError> {
        self.ensure_connected()?;
        let input = SmcKeyData {
            key: key.as_u32(),
            ..SmcKeyData::default()
        };
        let output = self.call(Selector::KeyInfo, &input)?;
        check_result(key, output.result)?;
        let data_type = DataType::from_code(output.key_info.data_type.to_be_bytes())?;
        Ok(SmcKeyInfo {
            data_size: output.key_info.data_size,
            data_type,
            attributes: output.key_info.data_attributes,
        })
    }

    /// Read the current value of a key, typed per its key info.
    pub fn read_key(&mut self, key: Key) -> Result<SmcValue, SmcError> {
        let info = self.key_info(key)?;
        let size = info.data_size as usize;
        if size > PAYLOAD_SIZE {
            return Err(SmcError::PayloadTooLarge {
                limit: PAYLOAD_SIZE,
                actual: size,
            });
        }
        let input = SmcKeyData {
            key: key.as_u32(),
            key_info: SmcKeyInfoData {
                data_size: info.data_size,
                ..SmcKeyInfoData::default()
            },
            ..SmcKeyData::default()
        };
        let output = self.call(Selector::ReadBytes, &input)?;
        check_result(key, output.result)?;
        SmcValue::new(info.data_type, &output.bytes[..size])
    }

    /// Write a value to a key.
    pub fn write_key(&mut self, key: Key, value: &SmcValue) -> Result<(), SmcError> {
        self.ensure_connected()?;
        let input = SmcKeyData {
            key: key.as_u32(),
            key_info: SmcKeyInfoData {
                data_size: value.len() as u32,
                ..SmcKeyInfoData::default()
            },
            bytes: *value.payload(),
            ..SmcKeyData::default()
        };
        let output = self.call(Selector::WriteBytes, &input)?;
        check_result(key, output.result)
    }
}

impl<P: SmcPort> Drop for SmcSession<P> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn check_result(key: Key, result: u8) -> Result<(), SmcError> {
    match SmcResult::from_primitive(result) {
        SmcResult::Success => Ok(()),
        SmcResult::KeyNotFound => Err(SmcError::KeyNotFound(key)),
        SmcResult::NotReadable => Err(SmcError::NotReadable(key)),
        SmcResult::NotWritable => Err(SmcError::NotWritable(key)),
        SmcResult::Unknown(code) => Err(SmcError::Smc { key, code }),
    }
}
