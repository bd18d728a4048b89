//! Error types for the emulator

use thiserror::Error;

/// Malformed traffic seen by the emulated device
#[derive(Debug, Error)]
pub enum DummyError {
    /// Frame shorter than its fixed layout
    #[error("Frame too short: {len} bytes")]
    ShortFrame { len: usize },

    /// Length prefix disagrees with the frame size
    #[error("Length prefix {announced} does not match payload of {actual} bytes")]
    LengthMismatch { announced: usize, actual: usize },

    /// Frame larger than the device accepts
    #[error("Frame of {0} bytes exceeds the report size")]
    Oversized(usize),

    /// Unknown command byte
    #[error("Unknown command 0x{0:02X}")]
    UnknownCommand(u8),

    /// SPI continuation packet would overrun the announced operation
    #[error("SPI packet of {got} bytes overruns operation ({remaining} bytes left)")]
    OperationOverrun { got: usize, remaining: usize },

    /// Malformed I2C primitive stream
    #[error("Malformed I2C stream: {0}")]
    I2cStream(&'static str),
}

impl From<DummyError> for std::io::Error {
    fn from(e: DummyError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    }
}
