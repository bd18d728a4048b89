//! Error types for CH347 operations

use thiserror::Error;

use crate::gpio::{Pin, PinState};

/// Result type for CH347 operations
pub type Result<T> = std::result::Result<T, Ch347Error>;

/// Errors that can occur when talking to a CH347 in HID mode
#[derive(Debug, Error)]
pub enum Ch347Error {
    /// Underlying transport failure, passed through unchanged
    #[error("HID transfer failed: {0}")]
    Transport(#[from] std::io::Error),

    /// UART send failed after some frames were already written
    #[error("UART send failed after {sent} bytes: {source}")]
    PartialSend {
        sent: usize,
        #[source]
        source: std::io::Error,
    },

    /// Acknowledgement opcode/status bytes did not match
    #[error("Invalid response for {command}: expected {expected:02X?}, got {got:02X?}")]
    ProtocolMismatch {
        command: &'static str,
        expected: [u8; 2],
        got: [u8; 2],
    },

    /// Device returned fewer bytes than the response accounting requires
    #[error("Short response: expected {expected} bytes, got {got}")]
    ShortResponse { expected: usize, got: usize },

    /// I2C slave did not acknowledge a WRITE primitive
    #[error("I2C write to 0x{address:02X} not acknowledged")]
    WriteNak { address: u8 },

    /// I2C read request was not acknowledged with 0x01
    #[error("I2C read from 0x{address:02X} not acknowledged (got 0x{ack:02X})")]
    ReadNak { address: u8, ack: u8 },

    /// Requested operation is not supported by the device protocol
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// GPIO echo did not reflect the requested pin configuration
    #[error("{pin:?} verification failed: requested {requested:?}, device reports 0x{raw:02X}")]
    PinStateMismatch {
        pin: Pin,
        requested: PinState,
        raw: u8,
    },

    /// A previous SPI transfer aborted; the SPI engine must be reconfigured
    #[error("SPI interface faulted by an aborted transfer; reconfigure before reuse")]
    SpiFaulted,

    /// Invalid argument passed to a codec operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration option error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
