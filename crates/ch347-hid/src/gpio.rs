//! GPIO
//!
//! The device keeps one 13-byte GPIO status frame: `[0x0B, 0x00, 0xCC, 0x08,
//! 0x00, pin0..pin7]`. Writing the frame with a pin byte of zero leaves that
//! pin alone; the device always echoes the full status back.
//!
//! Pin bytes use different encodings in each direction. Written bytes are
//! [`PinCommand`] flags; echoed bytes are [`PinStatus`] flags, where the level
//! bit of an input pin is inverted (set when the pin is pulled low).

use bitflags::bitflags;

use crate::device::Ch347;
use crate::error::{Ch347Error, Result};
use crate::protocol::*;
use crate::transport::{read_frame, write_frame, Transport};

bitflags! {
    /// Pin byte written to the GPIO status frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PinCommand: u8 {
        /// Apply this byte to the pin
        const ENABLE    = 1 << 7;
        /// Update the pin direction
        const SET_DIR   = 1 << 6;
        /// Direction: output
        const DIR_OUT   = 1 << 5;
        /// Update the output level
        const SET_DATA  = 1 << 4;
        /// Output level: high
        const DATA_HIGH = 1 << 3;
    }
}

bitflags! {
    /// Pin byte echoed in the GPIO status frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PinStatus: u8 {
        /// Pin is an output
        const OUTPUT = 1 << 7;
        /// Line level; for inputs set means low
        const LEVEL  = 1 << 6;
    }
}

/// GPIO pins, named by their board functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// CTS0/SCK/TCK
    Gpio0 = 0,
    /// RTS0/MISO/TDO
    Gpio1 = 1,
    /// DSR0/SCS0/TMS
    Gpio2 = 2,
    /// SCL
    Gpio3 = 3,
    /// ACT LED
    Gpio4 = 4,
    /// DTR0/TNOW0/SCS1/TRST
    Gpio5 = 5,
    /// CTS1
    Gpio6 = 6,
    /// RTS1
    Gpio7 = 7,
}

impl Pin {
    /// All pins in index order
    pub const ALL: [Pin; 8] = [
        Pin::Gpio0,
        Pin::Gpio1,
        Pin::Gpio2,
        Pin::Gpio3,
        Pin::Gpio4,
        Pin::Gpio5,
        Pin::Gpio6,
        Pin::Gpio7,
    ];

    /// Byte offset of this pin in the GPIO status frame
    pub fn offset(self) -> usize {
        GPIO_PIN_OFFSET + self as usize
    }
}

impl TryFrom<u8> for Pin {
    type Error = Ch347Error;

    fn try_from(index: u8) -> Result<Self> {
        Pin::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| Ch347Error::InvalidParameter(format!("no GPIO{}", index)))
    }
}

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Decoded direction and level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinState {
    /// Driven output; `High` means the pin sits at 3.3 V
    Output(Level),
    /// Input; `High` means the pin is *not* pulled to ground
    Input(Level),
}

impl PinState {
    /// Decode an echoed pin byte
    pub fn from_status(raw: u8) -> Self {
        let status = PinStatus::from_bits_truncate(raw);
        let level_bit = status.contains(PinStatus::LEVEL);
        if status.contains(PinStatus::OUTPUT) {
            PinState::Output(Level::from(level_bit))
        } else {
            PinState::Input(Level::from(!level_bit))
        }
    }

    /// Pin byte that requests this state
    ///
    /// The level of an input request is ignored.
    pub fn command(self) -> PinCommand {
        let base = PinCommand::ENABLE | PinCommand::SET_DIR;
        match self {
            PinState::Output(level) => {
                let mut cmd = base | PinCommand::DIR_OUT | PinCommand::SET_DATA;
                cmd.set(PinCommand::DATA_HIGH, level.is_high());
                cmd
            }
            PinState::Input(_) => base,
        }
    }

    pub fn level(self) -> Level {
        match self {
            PinState::Output(level) | PinState::Input(level) => level,
        }
    }

    pub fn is_output(self) -> bool {
        matches!(self, PinState::Output(_))
    }
}

impl<T: Transport> Ch347<T> {
    /// Configure `pin` as an output at `level`, or as an input
    ///
    /// The device echo is checked: the pin must report the requested
    /// direction, and for outputs the requested level.
    pub fn set_pin(&self, pin: Pin, output: bool, level: bool) -> Result<()> {
        let requested = if output {
            PinState::Output(Level::from(level))
        } else {
            PinState::Input(Level::High)
        };

        let mut frame = empty_frame();
        frame[pin.offset()] = requested.command().bits();

        let status = {
            let mut iface = self.lock();
            exchange(&mut iface.dev, &frame)?
        };

        let raw = status[pin.offset()];
        let actual = PinState::from_status(raw);
        let ok = match requested {
            PinState::Output(_) => actual == requested,
            PinState::Input(_) => !actual.is_output(),
        };
        if !ok {
            return Err(Ch347Error::PinStateMismatch {
                pin,
                requested,
                raw,
            });
        }

        log::debug!("{:?} set to {:?}", pin, actual);
        Ok(())
    }

    /// Read the decoded state of `pin`
    pub fn pin_state(&self, pin: Pin) -> Result<PinState> {
        let status = {
            let mut iface = self.lock();
            exchange(&mut iface.dev, &empty_frame())?
        };
        Ok(PinState::from_status(status[pin.offset()]))
    }

    /// Read the level of `pin`
    ///
    /// For an output pin `true` means the pin is driven high. For an input
    /// pin `true` means the pin is not shorted to ground.
    pub fn get_pin(&self, pin: Pin) -> Result<bool> {
        Ok(self.pin_state(pin)?.level().is_high())
    }
}

/// Status frame with every pin byte zero (no change)
fn empty_frame() -> [u8; GPIO_FRAME_LEN] {
    let mut frame = [0u8; GPIO_FRAME_LEN];
    frame[..GPIO_PIN_OFFSET].copy_from_slice(&[0x0B, 0x00, CMD_GPIO, 0x08, 0x00]);
    frame
}

/// Write a status frame and return the device's echo
fn exchange<T: Transport + ?Sized>(
    dev: &mut T,
    frame: &[u8; GPIO_FRAME_LEN],
) -> Result<[u8; GPIO_FRAME_LEN]> {
    write_frame(dev, frame)?;

    let mut status = [0u8; GPIO_FRAME_LEN];
    let n = read_frame(dev, &mut status)?;
    if n < GPIO_FRAME_LEN {
        return Err(Ch347Error::ShortResponse {
            expected: GPIO_FRAME_LEN,
            got: n,
        });
    }

    if status[0] != 0x0B || status[2] != CMD_GPIO {
        return Err(Ch347Error::ProtocolMismatch {
            command: "GPIO",
            expected: [0x0B, CMD_GPIO],
            got: [status[0], status[2]],
        });
    }

    Ok(status)
}
