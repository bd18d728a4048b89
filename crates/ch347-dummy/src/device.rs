//! Emulated SPI+I2C+GPIO interface
//!
//! Every written frame is decoded immediately; replies are queued and handed
//! out by subsequent reads in order, the way the device's input reports pile
//! up on the interrupt endpoint.

use std::collections::{BTreeMap, VecDeque};
use std::io;

use ch347_hid::consts::*;
use ch347_hid::{ChipSelect, Pin, PinCommand, PinStatus, Transport};

use crate::error::DummyError;

/// Largest SPI frame: header packet with a full data load
const SPI_MAX_FRAME: usize = LEN_PREFIX + 3 + SPI_MAX_PACKET_DATA;

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Frames accepted by `write`
    pub frames: usize,
    /// SPI data packets (header and continuation)
    pub spi_packets: usize,
    /// SPI write acknowledgements handed to the host
    pub spi_acks_read: usize,
    /// I2C stream frames
    pub i2c_frames: usize,
    /// I2C response bytes produced (status bytes plus read data)
    pub i2c_responses: usize,
    /// GPIO status exchanges
    pub gpio_exchanges: usize,
}

/// I2C memory with a one-byte word address
#[derive(Debug, Clone)]
struct I2cMemory {
    data: Vec<u8>,
    pointer: usize,
}

impl I2cMemory {
    fn next(&mut self) -> usize {
        let at = self.pointer;
        self.pointer = (self.pointer + 1) % self.data.len();
        at
    }
}

/// Bus state carried across stream frames
#[derive(Debug, Default)]
struct I2cBus {
    /// Addressed slave, if it acknowledged
    selected: Option<u8>,
    reading: bool,
    /// Next WRITE byte is an address byte
    expect_address: bool,
    /// Next written data byte sets the word address
    expect_word_address: bool,
    /// Last SET primitive seen
    speed: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
struct GpioPin {
    output: bool,
    driven_high: bool,
    /// Level applied from outside while the pin is an input
    external_high: bool,
}

impl GpioPin {
    fn apply(&mut self, raw: u8) {
        let cmd = PinCommand::from_bits_truncate(raw);
        if !cmd.contains(PinCommand::ENABLE) {
            return;
        }
        if cmd.contains(PinCommand::SET_DIR) {
            self.output = cmd.contains(PinCommand::DIR_OUT);
        }
        if cmd.contains(PinCommand::SET_DATA) {
            self.driven_high = cmd.contains(PinCommand::DATA_HIGH);
        }
    }

    fn status(&self) -> u8 {
        let mut status = PinStatus::empty();
        if self.output {
            status |= PinStatus::OUTPUT;
            status.set(PinStatus::LEVEL, self.driven_high);
        } else {
            status.set(PinStatus::LEVEL, !self.external_high);
        }
        status.bits()
    }
}

/// Emulated CH347 SPI+I2C+GPIO HID interface
///
/// # Example
///
/// ```ignore
/// let mut dummy = DummyCh347::new().with_i2c_memory(0x50, 256);
/// let ch347 = Ch347::new(&mut dummy);
/// ch347.i2c_write(0x50, &[0x00, 0xAB])?;
/// ```
#[derive(Debug, Default)]
pub struct DummyCh347 {
    replies: VecDeque<Vec<u8>>,
    stats: DummyStats,
    /// Fail writes once this many frames were accepted
    fail_after: Option<usize>,

    spi_config: Option<[u8; SPI_CFG_LEN]>,
    spi_op_remaining: usize,
    mosi: Vec<u8>,
    cs: [bool; 2],

    i2c: I2cBus,
    memories: BTreeMap<u8, I2cMemory>,

    gpio: [GpioPin; 8],
}

impl DummyCh347 {
    /// Create an emulator with all pins as inputs pulled high and no I2C slaves
    pub fn new() -> Self {
        let mut dummy = Self::default();
        for pin in dummy.gpio.iter_mut() {
            pin.external_high = true;
        }
        dummy
    }

    /// Add an I2C memory of `size` bytes (erased to 0xFF) at `address`
    pub fn with_i2c_memory(mut self, address: u8, size: usize) -> Self {
        self.memories.insert(
            address,
            I2cMemory {
                data: vec![0xFF; size.max(1)],
                pointer: 0,
            },
        );
        self
    }

    /// Make writes fail after `frames` frames were accepted
    pub fn fail_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Traffic counters so far
    pub fn stats(&self) -> DummyStats {
        self.stats
    }

    /// Every byte clocked out on MOSI so far
    pub fn mosi(&self) -> &[u8] {
        &self.mosi
    }

    /// Last SPI configuration frame
    pub fn spi_config(&self) -> Option<&[u8; SPI_CFG_LEN]> {
        self.spi_config.as_ref()
    }

    /// Whether a chip select line is asserted
    pub fn cs_asserted(&self, cs: ChipSelect) -> bool {
        self.cs[cs as usize]
    }

    /// Last I2C speed selector written with a SET primitive
    pub fn i2c_speed(&self) -> Option<u8> {
        self.i2c.speed
    }

    /// Contents of the I2C memory at `address`
    pub fn i2c_memory(&self, address: u8) -> Option<&[u8]> {
        self.memories.get(&address).map(|m| m.data.as_slice())
    }

    /// Drive an input pin from outside
    pub fn set_external_level(&mut self, pin: Pin, high: bool) {
        self.gpio[pin as usize].external_high = high;
    }

    /// Direction and driven level of a pin, `None` for inputs
    pub fn output_level(&self, pin: Pin) -> Option<bool> {
        let p = &self.gpio[pin as usize];
        p.output.then_some(p.driven_high)
    }

    /// Replies queued but not yet read
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), DummyError> {
        if frame.len() < LEN_PREFIX + 1 {
            return Err(DummyError::ShortFrame { len: frame.len() });
        }
        let announced = u16::from_le_bytes([frame[0], frame[1]]) as usize;
        let body = &frame[LEN_PREFIX..];
        if announced != body.len() {
            return Err(DummyError::LengthMismatch {
                announced,
                actual: body.len(),
            });
        }

        if self.spi_op_remaining > 0 {
            return self.spi_continuation(body);
        }

        if frame.len() > MAX_FRAME_LEN && !(body[0] == CMD_SPI_OUT && frame.len() <= SPI_MAX_FRAME)
        {
            return Err(DummyError::Oversized(frame.len()));
        }

        match body[0] {
            CMD_SPI_SET_CFG => self.spi_configure(frame),
            CMD_SPI_CS_CTRL => self.spi_chip_select(frame),
            CMD_SPI_OUT => self.spi_start(body),
            CMD_I2C_STREAM => self.i2c_stream(&body[1..]),
            CMD_GPIO => self.gpio_exchange(frame),
            cmd => Err(DummyError::UnknownCommand(cmd)),
        }
    }

    fn spi_configure(&mut self, frame: &[u8]) -> Result<(), DummyError> {
        let config: [u8; SPI_CFG_LEN] = frame
            .try_into()
            .map_err(|_| DummyError::ShortFrame { len: frame.len() })?;
        self.spi_config = Some(config);
        self.replies
            .push_back(vec![0x04, 0x00, CMD_SPI_SET_CFG, STATUS_OK, 0x00, 0x00]);
        Ok(())
    }

    fn spi_chip_select(&mut self, frame: &[u8]) -> Result<(), DummyError> {
        if frame.len() != SPI_CS_LEN {
            return Err(DummyError::ShortFrame { len: frame.len() });
        }
        for cs in [ChipSelect::CS0, ChipSelect::CS1] {
            let slot = frame[cs.slot()];
            if slot & CS_CHANGE != 0 {
                self.cs[cs as usize] = slot & CS_DEASSERT == 0;
                log::trace!("{:?} asserted={}", cs, self.cs[cs as usize]);
            }
        }
        Ok(())
    }

    /// First packet: `[0xC4, opLen(2), data]`
    fn spi_start(&mut self, body: &[u8]) -> Result<(), DummyError> {
        if body.len() < 3 {
            return Err(DummyError::ShortFrame {
                len: body.len() + LEN_PREFIX,
            });
        }
        let op_len = u16::from_le_bytes([body[1], body[2]]) as usize;
        let data = &body[3..];
        if data.len() > op_len {
            return Err(DummyError::OperationOverrun {
                got: data.len(),
                remaining: op_len,
            });
        }
        self.spi_op_remaining = op_len - data.len();
        self.spi_packet(data);
        Ok(())
    }

    /// Continuation packet: data only
    fn spi_continuation(&mut self, body: &[u8]) -> Result<(), DummyError> {
        if body.len() > self.spi_op_remaining || body.len() > SPI_MAX_PACKET_DATA {
            return Err(DummyError::OperationOverrun {
                got: body.len(),
                remaining: self.spi_op_remaining,
            });
        }
        self.spi_op_remaining -= body.len();
        self.spi_packet(body);
        Ok(())
    }

    fn spi_packet(&mut self, data: &[u8]) {
        self.mosi.extend_from_slice(data);
        self.stats.spi_packets += 1;
        self.replies
            .push_back(vec![0x03, 0x00, CMD_SPI_OUT, STATUS_OK, 0x00]);
    }

    /// Run one frame of I2C primitives
    fn i2c_stream(&mut self, stream: &[u8]) -> Result<(), DummyError> {
        self.stats.i2c_frames += 1;
        let mut response = Vec::new();
        let mut i = 0;

        while i < stream.len() {
            let op = stream[i];
            i += 1;
            match op {
                I2C_STM_END => break,
                I2C_STM_START => {
                    self.i2c.expect_address = true;
                }
                I2C_STM_STOP => {
                    self.i2c = I2cBus {
                        speed: self.i2c.speed,
                        ..I2cBus::default()
                    };
                }
                0x60..=0x63 => {
                    self.i2c.speed = Some(op & 0x03);
                }
                0x80..=0xBF => {
                    let len = (op & 0x3F) as usize;
                    let data = stream
                        .get(i..i + len)
                        .ok_or(DummyError::I2cStream("WRITE runs past end of frame"))?;
                    i += len;
                    let acked = data
                        .iter()
                        .fold(true, |acked, &b| self.i2c_write_byte(b) && acked);
                    response.push(if acked { 0x01 } else { 0x00 });
                }
                0xC0..=0xFF => {
                    let len = match (op & 0x3F) as usize {
                        0 => 1,
                        n => n,
                    };
                    for _ in 0..len {
                        response.push(self.i2c_read_byte());
                    }
                }
                _ => return Err(DummyError::I2cStream("unknown primitive")),
            }
        }

        self.stats.i2c_responses += response.len();
        if !response.is_empty() {
            let mut reply = (response.len() as u16).to_le_bytes().to_vec();
            reply.extend_from_slice(&response);
            self.replies.push_back(reply);
        }
        Ok(())
    }

    /// Clock one byte out; returns whether a slave acknowledged it
    fn i2c_write_byte(&mut self, byte: u8) -> bool {
        let bus = &mut self.i2c;
        if bus.expect_address {
            bus.expect_address = false;
            let address = byte >> 1;
            bus.reading = byte & 1 == 1;
            bus.selected = self.memories.contains_key(&address).then_some(address);
            bus.expect_word_address = !bus.reading;
            log::trace!(
                "I2C address 0x{:02X} read={} ack={}",
                address,
                bus.reading,
                bus.selected.is_some()
            );
            return bus.selected.is_some();
        }

        let Some(memory) = bus.selected.and_then(|a| self.memories.get_mut(&a)) else {
            return false;
        };
        if bus.reading {
            return false;
        }
        if bus.expect_word_address {
            bus.expect_word_address = false;
            memory.pointer = byte as usize % memory.data.len();
        } else {
            let at = memory.next();
            memory.data[at] = byte;
        }
        true
    }

    fn i2c_read_byte(&mut self) -> u8 {
        match self.i2c.selected.and_then(|a| self.memories.get_mut(&a)) {
            Some(memory) if self.i2c.reading => {
                let at = memory.next();
                memory.data[at]
            }
            _ => 0xFF,
        }
    }

    fn gpio_exchange(&mut self, frame: &[u8]) -> Result<(), DummyError> {
        if frame.len() != GPIO_FRAME_LEN {
            return Err(DummyError::ShortFrame { len: frame.len() });
        }
        self.stats.gpio_exchanges += 1;

        let mut status = frame.to_vec();
        for (i, pin) in self.gpio.iter_mut().enumerate() {
            pin.apply(frame[GPIO_PIN_OFFSET + i]);
            status[GPIO_PIN_OFFSET + i] = pin.status();
        }
        self.replies.push_back(status);
        Ok(())
    }
}

impl Transport for DummyCh347 {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        if self.fail_after == Some(self.stats.frames) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.handle_frame(frame)?;
        self.stats.frames += 1;
        Ok(frame.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let reply = self
            .replies
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no input report pending"))?;
        if reply.len() == SPI_WRITE_ACK_LEN && reply[2] == CMD_SPI_OUT {
            self.stats.spi_acks_read += 1;
        }
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ch347_hid::{ByteOrder, Ch347, Ch347Error, I2cSpeed, Level, PinState, SpiMode, SpiSpeed};
    use std::sync::Arc;
    use std::thread;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Packets needed to send `len` bytes
    fn expected_packets(len: usize) -> usize {
        let mut packets = 0;
        let mut remaining = len;
        while remaining > 0 {
            let op = remaining.min(SPI_MAX_OP_LEN);
            packets += op.div_ceil(SPI_MAX_PACKET_DATA);
            remaining -= op;
        }
        packets
    }

    /// WRITE primitives needed to send `len` bytes after the address
    fn write_primitives(len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= I2C_STM_MAX_LEN - 1 {
            1
        } else {
            1 + (len - (I2C_STM_MAX_LEN - 1)).div_ceil(I2C_STM_MAX_LEN)
        }
    }

    #[test]
    fn test_spi_configure_and_cs() {
        init();
        let mut dummy = DummyCh347::new();
        let ch347 = Ch347::new(&mut dummy);
        ch347
            .configure_spi(SpiMode::Mode3, SpiSpeed::Speed15M, ByteOrder::MsbFirst)
            .unwrap();
        ch347.set_cs1(true).unwrap();
        drop(ch347);

        assert!(dummy.spi_config().is_some());
        assert!(dummy.cs_asserted(ChipSelect::CS1));
        assert!(!dummy.cs_asserted(ChipSelect::CS0));
        assert_eq!(dummy.pending_replies(), 0);

        let ch347 = Ch347::new(&mut dummy);
        ch347.set_cs(true).unwrap();
        ch347.set_cs1(false).unwrap();
        drop(ch347);
        assert!(dummy.cs_asserted(ChipSelect::CS0));
        assert!(!dummy.cs_asserted(ChipSelect::CS1));
    }

    #[test]
    fn test_spi_write_lengths() {
        init();
        let lengths = [
            0, 1, 508, 509, 510, 1018, 1019, 4096, 31749, 31750, 31751, 63500, 63501, 65536,
            100_000, 200_000,
        ];
        for len in lengths {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
            let ch347 = Ch347::new(DummyCh347::new());
            ch347.spi_write(&data).unwrap();
            let dummy = ch347.into_inner();

            let stats = dummy.stats();
            assert_eq!(dummy.mosi(), &data[..], "payload mismatch for {}", len);
            assert_eq!(stats.spi_packets, expected_packets(len), "packets for {}", len);
            assert_eq!(stats.spi_acks_read, stats.spi_packets, "acks for {}", len);
            assert_eq!(dummy.pending_replies(), 0);
        }
    }

    #[test]
    fn test_spi_read_rejected_without_traffic() {
        let ch347 = Ch347::new(DummyCh347::new());
        let mut buf = [0u8; 4];
        assert!(matches!(
            ch347.spi_transfer(&[0x9F], &mut buf),
            Err(Ch347Error::UnsupportedOperation(_))
        ));
        assert_eq!(ch347.into_inner().stats().frames, 0);
    }

    #[test]
    fn test_spi_fault_until_reconfigured() {
        init();
        // Second packet of the operation never makes it
        let ch347 = Ch347::new(DummyCh347::new().fail_after(1));
        assert!(matches!(
            ch347.spi_write(&[0u8; 1000]),
            Err(Ch347Error::Transport(_))
        ));
        assert!(ch347.is_spi_faulted());
        assert!(matches!(ch347.spi_write(&[1]), Err(Ch347Error::SpiFaulted)));
    }

    #[test]
    fn test_spi_reconfigure_clears_fault() {
        init();
        let mut dummy = DummyCh347::new();
        // Leave an ack unread so the next transfer sees an unexpected reply
        dummy.replies.push_back(vec![0x04, 0x00, 0xC0, 0x00, 0x00, 0x00]);
        let ch347 = Ch347::new(dummy);
        assert!(matches!(
            ch347.spi_write(&[0xAA; 8]),
            Err(Ch347Error::ProtocolMismatch { .. })
        ));
        assert!(ch347.is_spi_faulted());

        let mut dummy = ch347.into_inner();
        dummy.replies.clear();
        let ch347 = Ch347::new(dummy);
        ch347
            .configure_spi(SpiMode::Mode0, SpiSpeed::Speed7_5M, ByteOrder::MsbFirst)
            .unwrap();
        assert!(!ch347.is_spi_faulted());
        ch347.spi_write(&[0x55; 8]).unwrap();
    }

    #[test]
    fn test_i2c_eeprom_round_trip() {
        init();
        let ch347 = Ch347::new(DummyCh347::new().with_i2c_memory(0x50, 256));
        ch347.configure_i2c(I2cSpeed::Fast400K).unwrap();

        let payload: Vec<u8> = (0..200).map(|i| i as u8 ^ 0x5A).collect();
        let mut write = vec![0x10];
        write.extend_from_slice(&payload);
        ch347.i2c_write(0x50, &write).unwrap();

        let mut read = vec![0u8; payload.len()];
        ch347.i2c_transact(0x50, &[0x10], &mut read).unwrap();
        assert_eq!(read, payload);

        let dummy = ch347.into_inner();
        assert_eq!(dummy.i2c_speed(), Some(I2cSpeed::Fast400K as u8));
        assert_eq!(&dummy.i2c_memory(0x50).unwrap()[0x10..0x10 + 200], &payload[..]);
        assert_eq!(dummy.pending_replies(), 0);
    }

    #[test]
    fn test_i2c_response_accounting() {
        init();
        let cases = [
            (0, 1),
            (1, 0),
            (1, 1),
            (3, 0),
            (62, 0),
            (63, 0),
            (125, 7),
            (126, 0),
            (0, 62),
            (0, 63),
            (0, 509),
            (0, 510),
            (1, 4096),
            (1000, 0),
            (2, 1500),
        ];
        for (w, r) in cases {
            let ch347 = Ch347::new(DummyCh347::new().with_i2c_memory(0x57, 256));
            let write = vec![0x00; w];
            let mut read = vec![0u8; r];
            ch347.i2c_transact(0x57, &write, &mut read).unwrap();

            let dummy = ch347.into_inner();
            let expected = write_primitives(w) + usize::from(r > 0) + r;
            assert_eq!(
                dummy.stats().i2c_responses,
                expected,
                "responses for write {} read {}",
                w,
                r
            );
            assert_eq!(dummy.pending_replies(), 0);
        }
    }

    #[test]
    fn test_i2c_read_wraps_memory() {
        let mut dummy = DummyCh347::new().with_i2c_memory(0x50, 256);
        let ch347 = Ch347::new(&mut dummy);
        let pattern: Vec<u8> = (0..=255).collect();
        for (i, chunk) in pattern.chunks(16).enumerate() {
            let mut write = vec![(i * 16) as u8];
            write.extend_from_slice(chunk);
            ch347.i2c_write(0x50, &write).unwrap();
        }

        let mut buf = vec![0u8; 1000];
        ch347.i2c_transact(0x50, &[0x80], &mut buf).unwrap();
        assert!(buf
            .iter()
            .enumerate()
            .all(|(i, &b)| b == ((0x80 + i) % 256) as u8));
    }

    #[test]
    fn test_i2c_absent_slave() {
        init();
        let ch347 = Ch347::new(DummyCh347::new());
        assert!(matches!(
            ch347.i2c_write(0x21, &[0x00]),
            Err(Ch347Error::WriteNak { address: 0x21 })
        ));

        let mut buf = [0u8; 4];
        assert!(matches!(
            ch347.i2c_read(0x21, &mut buf),
            Err(Ch347Error::ReadNak {
                address: 0x21,
                ack: 0x00
            })
        ));
    }

    #[test]
    fn test_gpio_set_get_all_pins() {
        init();
        let ch347 = Ch347::new(DummyCh347::new());
        for pin in Pin::ALL {
            for level in [true, false] {
                ch347.set_pin(pin, true, level).unwrap();
                assert_eq!(ch347.get_pin(pin).unwrap(), level);
                assert_eq!(
                    ch347.pin_state(pin).unwrap(),
                    PinState::Output(Level::from(level))
                );
            }
        }

        let dummy = ch347.into_inner();
        assert!(Pin::ALL.iter().all(|&p| dummy.output_level(p) == Some(false)));
    }

    #[test]
    fn test_gpio_inputs() {
        init();
        let mut dummy = DummyCh347::new();
        dummy.set_external_level(Pin::Gpio6, false);
        let ch347 = Ch347::new(&mut dummy);

        ch347.set_pin(Pin::Gpio6, true, true).unwrap();
        ch347.set_pin(Pin::Gpio6, false, false).unwrap();
        assert_eq!(
            ch347.pin_state(Pin::Gpio6).unwrap(),
            PinState::Input(Level::Low)
        );
        // Untouched pins stay pulled high
        assert!(ch347.get_pin(Pin::Gpio3).unwrap());
        drop(ch347);
        assert_eq!(dummy.output_level(Pin::Gpio6), None);
    }

    #[test]
    fn test_shared_between_threads() {
        init();
        let ch347 = Arc::new(Ch347::new(DummyCh347::new().with_i2c_memory(0x50, 256)));

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let ch347 = Arc::clone(&ch347);
                thread::spawn(move || {
                    for i in 0..20u8 {
                        let pin = Pin::try_from(t).unwrap();
                        ch347.set_pin(pin, true, i % 2 == 0).unwrap();
                        ch347.spi_write(&[t; 600]).unwrap();
                        ch347.i2c_write(0x50, &[t * 16, i]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let dummy = Arc::try_unwrap(ch347).ok().unwrap().into_inner();
        let stats = dummy.stats();
        assert_eq!(stats.spi_packets, 4 * 20 * 2);
        assert_eq!(stats.spi_acks_read, stats.spi_packets);
        assert_eq!(stats.gpio_exchanges, 80);
        assert_eq!(dummy.pending_replies(), 0);
        // Each 600-byte write lands contiguously
        assert!(dummy.mosi().chunks(600).all(|c| c.iter().all(|&b| b == c[0])));
    }
}
