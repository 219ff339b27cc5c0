//! Shared test fixtures: a programmable mock controller port and
//! ready-made register layouts for both hardware variants.

#[allow(unused_imports)]
pub use battctl_lib::control::{BatteryControl, ControlOutcome, PrivilegeContext};
#[allow(unused_imports)]
pub use battctl_lib::error::SmcError;
#[allow(unused_imports)]
pub use battctl_lib::key::Key;
#[allow(unused_imports)]
pub use battctl_lib::registers::*;
#[allow(unused_imports)]
pub use battctl_lib::session::{Selector, SmcKeyData, SmcPort, SmcSession};
#[allow(unused_imports)]
pub use battctl_lib::value::{DataType, SmcValue};

use std::collections::HashMap;

/// One simulated register.
#[allow(dead_code)]
pub struct MockRegister {
    pub data_type: DataType,
    pub bytes: Vec<u8>,
}

/// In-memory controller port with call counters, standing in for the
/// real SMC user client.
#[derive(Default)]
pub struct MockPort {
    pub registers: HashMap<u32, MockRegister>,
    pub open_should_fail: bool,
    /// Every call, of any selector.
    pub calls: usize,
    /// Write-bytes calls only.
    pub write_calls: usize,
    /// Log of (key, bytes) for every write.
    pub writes: Vec<(Key, Vec<u8>)>,
}

#[allow(dead_code)]
impl MockPort {
    pub fn new() -> Self {
        MockPort::default()
    }

    pub fn with_register(mut self, key: Key, data_type: DataType, bytes: &[u8]) -> Self {
        self.registers.insert(
            key.as_u32(),
            MockRegister {
                data_type,
                bytes: bytes.to_vec(),
            },
        );
        self
    }

    pub fn without_register(mut self, key: Key) -> Self {
        self.registers.remove(&key.as_u32());
        self
    }
}

impl SmcPort for MockPort {
    fn open(&mut self) -> Result<(), SmcError> {
        if self.open_should_fail {
            Err(SmcError::ServiceNotFound)
        } else {
            Ok(())
        }
    }

    fn call(&mut self, selector: Selector, input: &SmcKeyData) -> Result<SmcKeyData, SmcError> {
        self.calls += 1;
        let key = Key::from_u32(input.key);
        let mut output = SmcKeyData {
            key: input.key,
            ..SmcKeyData::default()
        };
        match selector {
            Selector::KeyInfo => match self.registers.get(&input.key) {
                Some(register) => {
                    output.key_info.data_size = register.bytes.len() as u32;
                    output.key_info.data_type = u32::from_be_bytes(register.data_type.code());
                }
                None => output.result = 0x84,
            },
            Selector::ReadBytes => match self.registers.get(&input.key) {
                Some(register) => {
                    output.bytes[..register.bytes.len()].copy_from_slice(&register.bytes);
                }
                None => output.result = 0x84,
            },
            Selector::WriteBytes => {
                self.write_calls += 1;
                let len = input.key_info.data_size as usize;
                match self.registers.get_mut(&input.key) {
                    Some(register) => {
                        register.bytes = input.bytes[..len].to_vec();
                        self.writes.push((key, register.bytes.clone()));
                    }
                    None => output.result = 0x84,
                }
            }
        }
        Ok(output)
    }

    fn close(&mut self) {}
}

/// Fixed-answer privilege for tests.
#[allow(dead_code)]
pub struct StaticPrivilege(pub bool);

impl PrivilegeContext for StaticPrivilege {
    fn can_write_registers(&self) -> bool {
        self.0
    }
}

/// A wide-range controller with a full register set.
#[allow(dead_code)]
pub fn wide_range_port() -> MockPort {
    MockPort::new()
        .with_register(CHARGE_LIMIT_WIDE, DataType::Ui8, &[80])
        .with_register(CHARGING_INHIBIT_PRIMARY, DataType::Ui8, &[0])
        .with_register(CHARGING_INHIBIT_SECONDARY, DataType::Ui8, &[0])
        .with_register(BATTERY_POWERED, DataType::Flag, &[0])
        .with_register(BATTERY_COUNT, DataType::Ui8, &[1])
        // 30.5 °C in signed 8.8 fixed point
        .with_register(TEMPERATURE_SENSORS[0], DataType::Sp78, &[0x1E, 0x80])
        .with_register(CYCLE_COUNT, DataType::Ui16, &[0x01, 0x38])
        .with_register(CHARGE_PERCENT, DataType::Ui8, &[64])
        .with_register(FULL_CHARGE_CAPACITY, DataType::Ui16, &[0x0F, 0xA0])
        .with_register(DESIGN_CAPACITY, DataType::Ui16, &[0x13, 0x88])
}

/// A binary-range controller: `CHWA` instead of `BCLM`, hex-typed
/// inhibit keys.
#[allow(dead_code)]
pub fn binary_range_port() -> MockPort {
    MockPort::new()
        .with_register(CHARGE_LIMIT_BINARY, DataType::Ui8, &[0])
        .with_register(CHARGING_INHIBIT_PRIMARY, DataType::Hex8, &[0])
        .with_register(CHARGING_INHIBIT_SECONDARY, DataType::Hex8, &[0])
        .with_register(BATTERY_POWERED, DataType::Flag, &[1])
        .with_register(BATTERY_COUNT, DataType::Ui8, &[1])
        .with_register(TEMPERATURE_SENSORS[0], DataType::Sp78, &[0x20, 0x00])
        .with_register(CYCLE_COUNT, DataType::Ui16, &[0x00, 0x2A])
        .with_register(CHARGE_PERCENT, DataType::Ui8, &[77])
}

/// Facade over a mock port with a fixed privilege answer.
#[allow(dead_code)]
pub fn control_with(port: MockPort, privileged: bool) -> BatteryControl<MockPort> {
    BatteryControl::new(SmcSession::new(port), Box::new(StaticPrivilege(privileged)))
}
