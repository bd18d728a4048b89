//! Programmer-option parsing
//!
//! Options arrive as `(key, value)` pairs, e.g. from a
//! `ch347:spispeed=30000,spimode=3` style string split by the caller.

use crate::error::{Ch347Error, Result};
use crate::protocol::*;

fn parse_num<N: std::str::FromStr>(key: &str, value: &str) -> Result<N> {
    value
        .parse()
        .map_err(|_| Ch347Error::ConfigError(format!("Invalid {} value: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "yes" | "on" | "true" => Ok(true),
        "0" | "no" | "off" | "false" => Ok(false),
        _ => Err(Ch347Error::ConfigError(format!(
            "Invalid {} value: {}",
            key, value
        ))),
    }
}

/// Parse SPI options
///
/// Supported options:
/// - `spispeed=<khz>`: SPI clock speed in kHz (default: 7500)
/// - `spimode=<0-3>`: SPI mode (default: 0)
/// - `lsb=<bool>`: shift least significant bit first (default: no)
///
/// # Example
///
/// ```ignore
/// let options = [("spispeed", "30000"), ("spimode", "3")];
/// let config = parse_spi_options(&options)?;
/// ```
pub fn parse_spi_options(options: &[(&str, &str)]) -> Result<SpiConfig> {
    let mut config = SpiConfig::default();

    for (key, value) in options {
        match *key {
            "spispeed" => {
                let khz: u32 = parse_num(key, value)?;
                config.speed = SpiSpeed::from_khz(khz);
                log::debug!(
                    "Setting SPI speed to {}kHz (actual: {}kHz)",
                    khz,
                    config.speed.to_khz()
                );
            }
            "spimode" => {
                let mode: u8 = parse_num(key, value)?;
                config.mode = SpiMode::try_from(mode)?;
            }
            "lsb" => {
                config.byte_order = if parse_bool(key, value)? {
                    ByteOrder::LsbFirst
                } else {
                    ByteOrder::MsbFirst
                };
            }
            _ => {
                log::warn!("Unknown CH347 SPI option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

/// Parse I2C options
///
/// Supported options:
/// - `i2cspeed=<khz>`: bus speed in kHz, rounded down to 20/100/400/750
///   (default: 100)
pub fn parse_i2c_options(options: &[(&str, &str)]) -> Result<I2cSpeed> {
    let mut speed = I2cSpeed::default();

    for (key, value) in options {
        match *key {
            "i2cspeed" => {
                let khz: u32 = parse_num(key, value)?;
                speed = I2cSpeed::from_khz(khz);
                log::debug!(
                    "Setting I2C speed to {}kHz (actual: {}kHz)",
                    khz,
                    speed.to_khz()
                );
            }
            _ => {
                log::warn!("Unknown CH347 I2C option: {}={}", key, value);
            }
        }
    }

    Ok(speed)
}

/// Parse UART options
///
/// Supported options:
/// - `baud=<rate>`: baud rate (default: 115200)
/// - `databits=<5|6|7|8|16>` (default: 8)
/// - `parity=<none|odd|even|mark|space>` (default: none)
/// - `stopbits=<1|1.5|2>` (default: 1)
pub fn parse_uart_options(options: &[(&str, &str)]) -> Result<UartConfig> {
    let mut config = UartConfig::default();

    for (key, value) in options {
        match *key {
            "baud" => {
                let baud: u32 = parse_num(key, value)?;
                if baud == 0 || baud > UART_MAX_BAUD {
                    return Err(Ch347Error::ConfigError(format!(
                        "Invalid baud: {} (must be 1-{})",
                        baud, UART_MAX_BAUD
                    )));
                }
                config.baud = baud;
            }
            "databits" => {
                config.data_bits = match *value {
                    "5" => DataBits::Five,
                    "6" => DataBits::Six,
                    "7" => DataBits::Seven,
                    "8" => DataBits::Eight,
                    "16" => DataBits::Sixteen,
                    _ => {
                        return Err(Ch347Error::ConfigError(format!(
                            "Invalid databits: {} (must be 5, 6, 7, 8 or 16)",
                            value
                        )))
                    }
                };
            }
            "parity" => {
                config.parity = match value.to_ascii_lowercase().as_str() {
                    "none" | "n" => Parity::None,
                    "odd" | "o" => Parity::Odd,
                    "even" | "e" => Parity::Even,
                    "mark" | "m" => Parity::Mark,
                    "space" | "s" => Parity::Space,
                    _ => {
                        return Err(Ch347Error::ConfigError(format!(
                            "Invalid parity: {}",
                            value
                        )))
                    }
                };
            }
            "stopbits" => {
                config.stop_bits = match *value {
                    "1" => StopBits::One,
                    "1.5" => StopBits::OneHalf,
                    "2" => StopBits::Two,
                    _ => {
                        return Err(Ch347Error::ConfigError(format!(
                            "Invalid stopbits: {} (must be 1, 1.5 or 2)",
                            value
                        )))
                    }
                };
            }
            _ => {
                log::warn!("Unknown CH347 UART option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}
