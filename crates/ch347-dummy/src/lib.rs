//! ch347-dummy - In-memory CH347 emulator for testing
//!
//! This crate provides emulated CH347 HID interfaces that implement the
//! `ch347-hid` transport traits, so the codecs can be exercised end to end
//! without hardware:
//!
//! - [`DummyCh347`]: SPI+I2C+GPIO interface with a GPIO status register, an
//!   SPI sink that acknowledges packets and records MOSI bytes, and I2C
//!   memories answering on configurable addresses
//! - [`DummyUart`]: UART interface in loopback, shareable between threads

mod device;
mod error;
mod uart;

pub use device::{DummyCh347, DummyStats};
pub use error::DummyError;
pub use uart::DummyUart;
