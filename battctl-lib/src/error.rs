use std::io;
use thiserror::Error;

use crate::key::Key;
use crate::value::DataType;

/// The primary error type for the `battctl-lib` hardware path.
#[derive(Error, Debug)]
pub enum SmcError {
    #[error("SMC service not found. Is this machine exposing an AppleSMC user client?")]
    ServiceNotFound,

    #[error("no known charge-limit register found on this controller")]
    NoKnownVariant,

    #[error("controller session is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("kernel call failed with status {code:#010x}")]
    Kernel { code: i32 },

    #[error("register key {0} not found")]
    KeyNotFound(Key),

    #[error("register key {0} is not readable")]
    NotReadable(Key),

    #[error("register key {0} is not writable")]
    NotWritable(Key),

    #[error("SMC returned result code {code:#04x} for key {key}")]
    Smc { key: Key, code: u8 },

    #[error("register key must be exactly 4 ASCII bytes, got {0:?}")]
    InvalidKey(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("unknown SMC data type {0:?}")]
    UnknownType(String),

    #[error("payload exceeds the {limit}-byte protocol buffer: {actual} bytes")]
    PayloadTooLarge { limit: usize, actual: usize },
}
