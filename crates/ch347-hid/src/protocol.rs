//! CH347 HID protocol constants and configuration structures
//!
//! In HID mode (mode 2) the CH347 exposes two HID interfaces: the first
//! carries UART data, the second multiplexes SPI, I2C and GPIO. Every
//! exchange is a single report of at most 512 bytes.

use crate::error::{Ch347Error, Result};

/// CH347 receives and sends reports of at most 512 bytes
pub const MAX_FRAME_LEN: usize = 512;
/// Size of the little-endian length prefix on streamed frames
pub const LEN_PREFIX: usize = 2;

// UART
/// Maximum UART payload per frame
pub const UART_MAX_PAYLOAD: usize = MAX_FRAME_LEN - LEN_PREFIX;
/// UART configuration command (sent as a feature report)
pub const CMD_UART_SET_CFG: u8 = 0xCB;
/// Length of the UART configuration report
pub const UART_CFG_LEN: usize = 11;

// SPI
/// Set SPI configuration
pub const CMD_SPI_SET_CFG: u8 = 0xC0;
/// Control chip select lines
pub const CMD_SPI_CS_CTRL: u8 = 0xC1;
/// SPI write-only transfer
pub const CMD_SPI_OUT: u8 = 0xC4;
/// Status byte the device returns on success
pub const STATUS_OK: u8 = 0x01;
/// Length of the SPI configuration frame
pub const SPI_CFG_LEN: usize = 31;
/// Length of the SPI configuration reply
pub const SPI_CFG_REPLY_LEN: usize = 6;
/// Length of one SPI write acknowledgement
pub const SPI_WRITE_ACK_LEN: usize = 5;
/// Maximum data bytes carried by one SPI write packet
pub const SPI_MAX_PACKET_DATA: usize = 509;
/// Maximum data bytes of one SPI write operation (at most 63 packets)
pub const SPI_MAX_OP_LEN: usize = 32768 - SPI_MAX_PACKET_DATA * 2;
/// Header of the first packet of an operation: length prefix, opcode, op length
pub const SPI_OP_HEADER_LEN: usize = LEN_PREFIX + 3;
/// Largest SPI write frame (operation header plus a full packet)
pub const SPI_MAX_FRAME_LEN: usize = SPI_OP_HEADER_LEN + SPI_MAX_PACKET_DATA;
/// Length of the chip select frame
pub const SPI_CS_LEN: usize = 15;
/// Offset of the CS0 slot in the chip select frame; CS1 follows 5 bytes later
pub const SPI_CS_SLOT: usize = 5;
/// Width of one chip select slot
pub const SPI_CS_SLOT_LEN: usize = 5;

// Chip select control flags
/// Assert (activate) chip select
pub const CS_ASSERT: u8 = 0x00;
/// Deassert (deactivate) chip select
pub const CS_DEASSERT: u8 = 0x40;
/// Actually change the CS state (required flag)
pub const CS_CHANGE: u8 = 0x80;

// I2C
/// I2C command stream; following bytes are stream primitives
pub const CMD_I2C_STREAM: u8 = 0xAA;
/// Stream primitive: generate start condition
pub const I2C_STM_START: u8 = 0x74;
/// Stream primitive: generate stop condition
pub const I2C_STM_STOP: u8 = 0x75;
/// Stream primitive: output data, bits 5:0 are the length
pub const I2C_STM_OUT: u8 = 0x80;
/// Stream primitive: input data, bits 5:0 are the length; zero reads one
/// byte and NAKs it
pub const I2C_STM_IN: u8 = 0xC0;
/// Stream primitive: set bus speed, bits 1:0 select the rate
pub const I2C_STM_SET: u8 = 0x60;
/// Stream terminator
pub const I2C_STM_END: u8 = 0x00;
/// Largest length encodable in a stream primitive (6 bits)
pub const I2C_STM_MAX_LEN: usize = 63;
/// Read-request acknowledgement the device sends before read data
pub const I2C_READ_ACK: u8 = 0x01;

// GPIO
/// GPIO status command
pub const CMD_GPIO: u8 = 0xCC;
/// Length of the GPIO status frame
pub const GPIO_FRAME_LEN: usize = 13;
/// Offset of the first pin byte in the GPIO status frame
pub const GPIO_PIN_OFFSET: usize = 5;

/// Write the little-endian payload length into the first two bytes of `frame`
pub(crate) fn set_len_prefix(frame: &mut [u8]) {
    let len = (frame.len() - LEN_PREFIX) as u16;
    frame[..LEN_PREFIX].copy_from_slice(&len.to_le_bytes());
}

/// Read the little-endian payload length from the first two bytes of `frame`
pub(crate) fn len_prefix(frame: &[u8]) -> usize {
    u16::from_le_bytes([frame[0], frame[1]]) as usize
}

/// Append `bytes` to a fixed-capacity frame
pub(crate) fn put<const N: usize>(frame: &mut heapless::Vec<u8, N>, bytes: &[u8]) -> Result<()> {
    frame
        .extend_from_slice(bytes)
        .map_err(|_| Ch347Error::InvalidParameter(format!("frame exceeds {} bytes", N)))
}

/// SPI clock divisor settings
///
/// The CH347 has a 120MHz base clock, divided by powers of 2.
/// Divisor = 2^(value + 1), so:
/// - 0 -> 60 MHz
/// - 1 -> 30 MHz
/// - 2 -> 15 MHz
/// - 3 -> 7.5 MHz
/// - 4 -> 3.75 MHz
/// - 5 -> 1.875 MHz
/// - 6 -> 937.5 kHz
/// - 7 -> 468.75 kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiSpeed {
    /// 60 MHz (divisor 0)
    Speed60M = 0,
    /// 30 MHz (divisor 1)
    Speed30M = 1,
    /// 15 MHz (divisor 2)
    Speed15M = 2,
    /// 7.5 MHz (divisor 3, default - safe for most peripherals)
    #[default]
    Speed7_5M = 3,
    /// 3.75 MHz (divisor 4)
    Speed3_75M = 4,
    /// 1.875 MHz (divisor 5)
    Speed1_875M = 5,
    /// 937.5 kHz (divisor 6)
    Speed937_5K = 6,
    /// 468.75 kHz (divisor 7)
    Speed468_75K = 7,
}

impl SpiSpeed {
    const ALL: [SpiSpeed; 8] = [
        SpiSpeed::Speed60M,
        SpiSpeed::Speed30M,
        SpiSpeed::Speed15M,
        SpiSpeed::Speed7_5M,
        SpiSpeed::Speed3_75M,
        SpiSpeed::Speed1_875M,
        SpiSpeed::Speed937_5K,
        SpiSpeed::Speed468_75K,
    ];

    /// Convert a frequency in kHz to the fastest speed not exceeding it
    pub fn from_khz(khz: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|speed| speed.to_khz() <= khz)
            .unwrap_or(SpiSpeed::Speed468_75K)
    }

    /// Get the actual speed in kHz for this divisor
    pub fn to_khz(self) -> u32 {
        const BASE_KHZ: u32 = 120_000;
        BASE_KHZ / (1 << (self as u32 + 1))
    }

    /// Clock field of the configuration frame (bits 5:3)
    pub fn clock_bits(self) -> u8 {
        (self as u8 & 0x7) << 3
    }
}

/// SPI mode (clock polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// Mode 0: CPOL=0, CPHA=0 (clock idle low, sample on rising edge)
    #[default]
    Mode0 = 0,
    /// Mode 1: CPOL=0, CPHA=1 (clock idle low, sample on falling edge)
    Mode1 = 1,
    /// Mode 2: CPOL=1, CPHA=0 (clock idle high, sample on falling edge)
    Mode2 = 2,
    /// Mode 3: CPOL=1, CPHA=1 (clock idle high, sample on rising edge)
    Mode3 = 3,
}

impl SpiMode {
    /// Get clock polarity (CPOL)
    pub fn cpol(self) -> u8 {
        (self as u8 >> 1) & 1
    }

    /// Get clock phase (CPHA)
    pub fn cpha(self) -> u8 {
        self as u8 & 1
    }

    /// Mode field of the configuration frame: `[CPOL<<1, 0, CPHA, 0]`
    pub fn mode_bytes(self) -> [u8; 4] {
        [self.cpol() << 1, 0x00, self.cpha(), 0x00]
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Ch347Error;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            _ => Err(Ch347Error::ConfigError(format!(
                "Invalid spimode: {} (must be 0-3)",
                mode
            ))),
        }
    }
}

/// SPI bit order on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Most significant bit first (standard)
    #[default]
    MsbFirst = 0,
    /// Least significant bit first
    LsbFirst = 1,
}

/// Which chip select line to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipSelect {
    /// CS0 (default)
    #[default]
    CS0 = 0,
    /// CS1
    CS1 = 1,
}

impl ChipSelect {
    /// Offset of this line's slot in the chip select frame
    pub fn slot(self) -> usize {
        SPI_CS_SLOT + SPI_CS_SLOT_LEN * self as usize
    }
}

/// SPI configuration for CH347
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpiConfig {
    /// SPI clock speed
    pub speed: SpiSpeed,
    /// SPI mode (clock polarity and phase)
    pub mode: SpiMode,
    /// Bit order
    pub byte_order: ByteOrder,
}

impl SpiConfig {
    /// Create a new SPI configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SPI clock speed
    pub fn with_speed(mut self, speed: SpiSpeed) -> Self {
        self.speed = speed;
        self
    }

    /// Set the SPI clock speed from a frequency in kHz
    pub fn with_speed_khz(mut self, khz: u32) -> Self {
        self.speed = SpiSpeed::from_khz(khz);
        self
    }

    /// Set the SPI mode
    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the bit order
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Build the 31-byte configuration frame
    pub fn build_config_frame(&self) -> [u8; SPI_CFG_LEN] {
        let mut buf = [0u8; SPI_CFG_LEN];

        // Payload length (29 bytes) followed by command and its length
        buf[0] = (SPI_CFG_LEN - LEN_PREFIX) as u8;
        buf[2] = CMD_SPI_SET_CFG;
        buf[3] = 0x1A;

        // Mystery bytes - vendor library sets these unconditionally
        buf[7] = 0x04;
        buf[8] = 0x01;

        buf[11..15].copy_from_slice(&self.mode.mode_bytes());

        buf[16] = 0x02;
        buf[17] = self.speed.clock_bits();
        buf[19] = (self.byte_order as u8) << 7;
        buf[21] = 0x07;

        // Default output byte while reading
        buf[25] = 0xFF;

        // CS polarity: bit 7 = CS0, bit 6 = CS1. 0 = active low
        buf[26] = 0x00;

        buf
    }
}

/// I2C bus speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I2cSpeed {
    /// Low rate, 20 kHz
    Low20K = 0,
    /// Standard rate, 100 kHz
    #[default]
    Standard100K = 1,
    /// Fast rate, 400 kHz
    Fast400K = 2,
    /// High rate, 750 kHz
    High750K = 3,
}

impl I2cSpeed {
    const ALL: [I2cSpeed; 4] = [
        I2cSpeed::High750K,
        I2cSpeed::Fast400K,
        I2cSpeed::Standard100K,
        I2cSpeed::Low20K,
    ];

    /// Convert a frequency in kHz to the fastest rate not exceeding it
    pub fn from_khz(khz: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|speed| speed.to_khz() <= khz)
            .unwrap_or(I2cSpeed::Low20K)
    }

    /// Nominal bus rate in kHz
    pub fn to_khz(self) -> u32 {
        match self {
            I2cSpeed::Low20K => 20,
            I2cSpeed::Standard100K => 100,
            I2cSpeed::Fast400K => 400,
            I2cSpeed::High750K => 750,
        }
    }

    /// Build the 5-byte configuration frame
    pub fn build_config_frame(self) -> [u8; 5] {
        [
            0x03,
            0x00,
            CMD_I2C_STREAM,
            I2C_STM_SET | self as u8,
            I2C_STM_END,
        ]
    }
}

/// UART data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    Five = 0,
    Six = 1,
    Seven = 2,
    #[default]
    Eight = 3,
    Sixteen = 4,
}

/// UART parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

/// UART stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One = 0,
    OneHalf = 1,
    Two = 2,
}

/// Largest baud rate the 24-bit field can carry
pub const UART_MAX_BAUD: u32 = 0x00FF_FFFF;

/// UART line configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartConfig {
    /// Baud rate
    pub baud: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl UartConfig {
    /// Create an 8N1 configuration at the given baud rate
    pub fn new(baud: u32) -> Self {
        Self {
            baud,
            ..Default::default()
        }
    }

    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Build the 11-byte configuration report
    ///
    /// Layout: `cmd(3) baud(3) ? stop parity data_bits timeout`
    pub fn build_config_report(&self) -> Result<[u8; UART_CFG_LEN]> {
        if self.baud == 0 || self.baud > UART_MAX_BAUD {
            return Err(Ch347Error::InvalidParameter(format!(
                "baud rate {} out of range 1..={}",
                self.baud, UART_MAX_BAUD
            )));
        }

        let baud = self.baud.to_le_bytes();
        Ok([
            CMD_UART_SET_CFG,
            0x08,
            0x00,
            baud[0],
            baud[1],
            baud[2],
            0x00,
            self.stop_bits as u8,
            self.parity as u8,
            self.data_bits as u8,
            0x00,
        ])
    }
}
