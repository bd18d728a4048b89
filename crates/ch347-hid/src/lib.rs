//! ch347-hid - CH347 protocol engine for HID mode
//!
//! The CH347 is a high-speed USB 2.0 bridge. Strapped for HID mode (mode 2)
//! it enumerates as two HID interfaces:
//!
//! - the first carries UART data ([`Uart`])
//! - the second multiplexes SPI, I2C and GPIO ([`Ch347`])
//!
//! Both move reports of at most 512 bytes. This crate turns arbitrary-length
//! requests into correctly bounded reports and reconciles the device's
//! acknowledgements with them. Opening the HID device is left to the caller,
//! who supplies a [`Transport`] (and a [`ControlTransport`] for the UART).
//!
//! # Protocol Overview
//!
//! - UART frames: `[len(2), payload(<=510)]`, no acknowledgement
//! - SPI: write-only, 0xC4 operations of up to 63 packets, acknowledgements
//!   drained per operation; two chip select lines
//! - I2C: 0xAA primitive streams (START/WRITE/READ/STOP), one status byte
//!   per WRITE primitive, read data returned inline
//! - GPIO: a 13-byte status frame, written and echoed back
//!
//! # Example
//!
//! ```ignore
//! use ch347_hid::{ByteOrder, Ch347, Pin, SpiMode, SpiSpeed};
//!
//! let ch347 = Ch347::new(hid_device);
//! ch347.configure_spi(SpiMode::Mode0, SpiSpeed::Speed30M, ByteOrder::MsbFirst)?;
//!
//! ch347.set_cs(true)?;
//! ch347.spi_write(&frame_buffer)?;
//! ch347.set_cs(false)?;
//!
//! // Blink the ACT LED
//! ch347.set_pin(Pin::Gpio4, true, true)?;
//! ```

mod device;
mod error;
mod gpio;
mod i2c;
mod options;
mod protocol;
mod spi;
mod transport;
mod uart;

#[cfg(test)]
mod mock;

pub use device::Ch347;
pub use error::{Ch347Error, Result};
pub use gpio::{Level, Pin, PinCommand, PinState, PinStatus};
pub use options::{parse_i2c_options, parse_spi_options, parse_uart_options};
pub use protocol::{
    ByteOrder, ChipSelect, DataBits, I2cSpeed, Parity, SpiConfig, SpiMode, SpiSpeed, StopBits,
    UartConfig,
};
pub use transport::{ControlTransport, Transport};
pub use uart::Uart;

/// Wire-level constants, for emulators and protocol tooling
pub mod consts {
    pub use crate::protocol::{
        CMD_GPIO, CMD_I2C_STREAM, CMD_SPI_CS_CTRL, CMD_SPI_OUT, CMD_SPI_SET_CFG,
        CMD_UART_SET_CFG, CS_ASSERT, CS_CHANGE, CS_DEASSERT, GPIO_FRAME_LEN, GPIO_PIN_OFFSET,
        I2C_READ_ACK, I2C_STM_END, I2C_STM_IN, I2C_STM_MAX_LEN, I2C_STM_OUT, I2C_STM_SET,
        I2C_STM_START, I2C_STM_STOP, LEN_PREFIX, MAX_FRAME_LEN, SPI_CFG_LEN, SPI_CFG_REPLY_LEN,
        SPI_CS_LEN, SPI_MAX_OP_LEN, SPI_MAX_PACKET_DATA, SPI_WRITE_ACK_LEN, STATUS_OK,
        UART_CFG_LEN, UART_MAX_BAUD, UART_MAX_PAYLOAD,
    };
}
