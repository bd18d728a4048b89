//! SPI master
//!
//! Writes are sent as *operations* of at most [`SPI_MAX_OP_LEN`] bytes, each
//! split into *packets* of at most [`SPI_MAX_PACKET_DATA`] data bytes. The
//! first packet of an operation carries the `0xC4` header with the operation
//! length; continuation packets carry data only. The device clocks the data
//! out once every packet of the operation has been acknowledged, so the acks
//! are drained in one batch per operation rather than after each packet.
//!
//! Chip select is not tracked: callers wrap transfers in
//! [`Ch347::set_cs`]`(true)` / [`Ch347::set_cs`]`(false)` themselves.

use crate::device::Ch347;
use crate::error::{Ch347Error, Result};
use crate::protocol::*;
use crate::transport::{read_frame, write_frame, Transport};

impl<T: Transport> Ch347<T> {
    /// Configure SPI mode, clock and bit order
    ///
    /// A successful configuration clears a fault left by an aborted transfer.
    pub fn configure_spi(&self, mode: SpiMode, speed: SpiSpeed, byte_order: ByteOrder) -> Result<()> {
        self.configure_spi_with(&SpiConfig {
            speed,
            mode,
            byte_order,
        })
    }

    /// Configure the SPI engine from a [`SpiConfig`]
    pub fn configure_spi_with(&self, config: &SpiConfig) -> Result<()> {
        let mut iface = self.lock();
        configure(&mut iface.dev, config)?;
        iface.spi_faulted = false;

        log::info!(
            "CH347 SPI configured: speed={}kHz, mode={}, order={:?}",
            config.speed.to_khz(),
            config.mode as u8,
            config.byte_order
        );
        Ok(())
    }

    /// Perform an SPI transfer
    ///
    /// Only writes are supported; a non-empty `read` fails with
    /// [`Ch347Error::UnsupportedOperation`] without touching the device.
    ///
    /// If the transfer aborts part-way the device's packet counters can no
    /// longer be trusted, and further transfers fail with
    /// [`Ch347Error::SpiFaulted`] until the SPI engine is reconfigured.
    pub fn spi_transfer(&self, write: &[u8], read: &mut [u8]) -> Result<()> {
        if !read.is_empty() {
            return Err(Ch347Error::UnsupportedOperation("SPI read"));
        }

        let mut iface = self.lock();
        if iface.spi_faulted {
            return Err(Ch347Error::SpiFaulted);
        }

        match write_operations(&mut iface.dev, write) {
            Ok(packets) => {
                log::debug!("SPI wrote {} bytes in {} packets", write.len(), packets);
                Ok(())
            }
            Err(e) => {
                log::warn!("SPI transfer aborted, interface faulted: {}", e);
                iface.spi_faulted = true;
                Err(e)
            }
        }
    }

    /// Write-only SPI transfer
    pub fn spi_write(&self, write: &[u8]) -> Result<()> {
        self.spi_transfer(write, &mut [])
    }

    /// Assert or deassert CS0
    pub fn set_cs(&self, enable: bool) -> Result<()> {
        self.set_chip_select(ChipSelect::CS0, enable)
    }

    /// Assert or deassert CS1
    pub fn set_cs1(&self, enable: bool) -> Result<()> {
        self.set_chip_select(ChipSelect::CS1, enable)
    }

    /// Assert or deassert one chip select line, leaving the other untouched
    pub fn set_chip_select(&self, cs: ChipSelect, enable: bool) -> Result<()> {
        let frame = build_cs_frame(cs, enable);
        let mut iface = self.lock();
        write_frame(&mut iface.dev, &frame)?;
        Ok(())
    }
}

/// Build the 15-byte chip select frame
///
/// Format: `[len(2), cmd, sublen(2), cs0 slot(5), cs1 slot(5)]`
fn build_cs_frame(cs: ChipSelect, enable: bool) -> [u8; SPI_CS_LEN] {
    let mut frame = [0u8; SPI_CS_LEN];
    frame[..5].copy_from_slice(&[0x0D, 0x00, CMD_SPI_CS_CTRL, 0x0A, 0x00]);
    frame[cs.slot()] = if enable {
        CS_CHANGE | CS_ASSERT
    } else {
        CS_CHANGE | CS_DEASSERT
    };
    frame
}

fn configure<T: Transport + ?Sized>(dev: &mut T, config: &SpiConfig) -> Result<()> {
    write_frame(dev, &config.build_config_frame())?;

    // 04 00 C0 01 00 00
    let mut reply = [0u8; SPI_CFG_REPLY_LEN];
    let n = read_frame(dev, &mut reply)?;
    check_status(&reply[..n], CMD_SPI_SET_CFG, "SPI configure")
}

/// Check `[len(2), opcode, status, ...]`
fn check_status(reply: &[u8], opcode: u8, command: &'static str) -> Result<()> {
    if reply.len() < 4 {
        return Err(Ch347Error::ShortResponse {
            expected: 4,
            got: reply.len(),
        });
    }

    if reply[2] != opcode || reply[3] != STATUS_OK {
        return Err(Ch347Error::ProtocolMismatch {
            command,
            expected: [opcode, STATUS_OK],
            got: [reply[2], reply[3]],
        });
    }

    Ok(())
}

/// Send `data` as a sequence of write operations, returning the packet count
fn write_operations<T: Transport + ?Sized>(dev: &mut T, data: &[u8]) -> Result<usize> {
    let mut packets = 0;

    for op in data.chunks(SPI_MAX_OP_LEN) {
        let op_len = (op.len() as u16).to_le_bytes();
        let mut pending = 0;

        for (i, chunk) in op.chunks(SPI_MAX_PACKET_DATA).enumerate() {
            let mut frame: heapless::Vec<u8, SPI_MAX_FRAME_LEN> = heapless::Vec::new();
            put(&mut frame, &[0x00, 0x00])?;
            if i == 0 {
                put(&mut frame, &[CMD_SPI_OUT, op_len[0], op_len[1]])?;
            }
            put(&mut frame, chunk)?;
            set_len_prefix(&mut frame);

            write_frame(dev, &frame)?;
            pending += 1;
        }

        confirm_packets(dev, pending)?;
        packets += pending;
    }

    Ok(packets)
}

/// Drain one acknowledgement per packet sent in the current operation
fn confirm_packets<T: Transport + ?Sized>(dev: &mut T, pending: usize) -> Result<()> {
    let mut ack = [0u8; SPI_WRITE_ACK_LEN];
    for _ in 0..pending {
        // 03 00 C4 01 00
        let n = read_frame(dev, &mut ack)?;
        check_status(&ack[..n], CMD_SPI_OUT, "SPI write")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const CFG_OK: [u8; 6] = [0x04, 0x00, 0xC0, 0x01, 0x00, 0x00];
    const WRITE_ACK: [u8; 5] = [0x03, 0x00, 0xC4, 0x01, 0x00];

    fn payload_len(frames: &[Vec<u8>]) -> usize {
        frames
            .iter()
            .map(|f| {
                assert_eq!(len_prefix(f), f.len() - 2);
                if f[2] == CMD_SPI_OUT && f.len() >= 5 {
                    f.len() - 5
                } else {
                    f.len() - 2
                }
            })
            .sum()
    }

    #[test]
    fn test_configure_frame_and_reply() {
        let ch347 = Ch347::new(MockTransport::new().reply(&CFG_OK));
        ch347
            .configure_spi(SpiMode::Mode0, SpiSpeed::Speed60M, ByteOrder::MsbFirst)
            .unwrap();

        let dev = ch347.into_inner();
        assert_eq!(dev.written.len(), 1);
        assert_eq!(&dev.written[0][..4], &[0x1D, 0x00, 0xC0, 0x1A]);
        assert_eq!(dev.written[0].len(), 31);
        assert_eq!(dev.read_lens, vec![6]);
    }

    #[test]
    fn test_configure_rejects_bad_reply() {
        let ch347 = Ch347::new(MockTransport::new().reply(&[0x04, 0x00, 0xC0, 0x00, 0x00, 0x00]));
        let err = ch347.configure_spi_with(&SpiConfig::new()).unwrap_err();
        assert!(matches!(err, Ch347Error::ProtocolMismatch { .. }));

        let ch347 = Ch347::new(MockTransport::new().reply(&[0x04, 0x00, 0xC4, 0x01, 0x00, 0x00]));
        let err = ch347.configure_spi_with(&SpiConfig::new()).unwrap_err();
        assert!(matches!(err, Ch347Error::ProtocolMismatch { .. }));
    }

    #[test]
    fn test_read_is_unsupported() {
        let ch347 = Ch347::new(MockTransport::new());
        let mut buf = [0u8; 4];
        let err = ch347.spi_transfer(&[0x9F], &mut buf).unwrap_err();
        assert!(matches!(err, Ch347Error::UnsupportedOperation(_)));

        let dev = ch347.into_inner();
        assert!(dev.written.is_empty());
        assert!(dev.read_lens.is_empty());
    }

    #[test]
    fn test_empty_write_sends_nothing() {
        let ch347 = Ch347::new(MockTransport::new());
        ch347.spi_write(&[]).unwrap();
        assert!(ch347.into_inner().written.is_empty());
    }

    #[test]
    fn test_single_packet() {
        let ch347 = Ch347::new(MockTransport::new().reply(&WRITE_ACK));
        ch347.spi_write(&[0x06]).unwrap();

        let dev = ch347.into_inner();
        assert_eq!(dev.written, vec![vec![0x04, 0x00, 0xC4, 0x01, 0x00, 0x06]]);
        assert_eq!(dev.read_lens, vec![5]);
    }

    #[test]
    fn test_packet_boundary() {
        let data = vec![0xA5; 509];
        let ch347 = Ch347::new(MockTransport::new().reply(&WRITE_ACK));
        ch347.spi_write(&data).unwrap();
        let dev = ch347.into_inner();
        assert_eq!(dev.written.len(), 1);
        assert_eq!(dev.read_lens.len(), 1);
        assert_eq!(&dev.written[0][2..5], &[0xC4, 0xFD, 0x01]);

        let data = vec![0xA5; 510];
        let ch347 = Ch347::new(MockTransport::new().replies(&WRITE_ACK, 2));
        ch347.spi_write(&data).unwrap();
        let dev = ch347.into_inner();
        assert_eq!(dev.written.len(), 2);
        assert_eq!(dev.read_lens.len(), 2);
        // Continuation packet carries one data byte and no opcode
        assert_eq!(dev.written[1], vec![0x01, 0x00, 0xA5]);
        assert_eq!(payload_len(&dev.written), 510);
    }

    #[test]
    fn test_acks_batched_per_operation() {
        let len = SPI_MAX_OP_LEN + 100;
        let data = vec![0x5A; len];
        let ch347 = Ch347::new(MockTransport::new().replies(&WRITE_ACK, 64));
        ch347.spi_write(&data).unwrap();

        let dev = ch347.into_inner();
        // 63 packets for the full operation, one for the remainder
        assert_eq!(dev.written.len(), 64);
        assert_eq!(dev.read_lens.len(), 64);
        assert_eq!(&dev.written[0][2..5], &[0xC4, 0x06, 0x7C]);
        assert_eq!(&dev.written[63][2..5], &[0xC4, 100, 0x00]);
        assert_eq!(payload_len(&dev.written), len);
    }

    #[test]
    fn test_bad_ack_faults_interface() {
        let ch347 = Ch347::new(
            MockTransport::new()
                .reply(&[0x03, 0x00, 0xC4, 0x00, 0x00])
                .reply(&CFG_OK)
                .reply(&WRITE_ACK),
        );
        let err = ch347.spi_write(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Ch347Error::ProtocolMismatch { .. }));
        assert!(ch347.is_spi_faulted());

        let err = ch347.spi_write(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Ch347Error::SpiFaulted));

        ch347.configure_spi_with(&SpiConfig::new()).unwrap();
        assert!(!ch347.is_spi_faulted());
        ch347.spi_write(&[1, 2, 3]).unwrap();
    }

    #[test]
    fn test_transport_error_aborts_without_draining() {
        let ch347 = Ch347::new(MockTransport::new().failing_write(1));
        let err = ch347.spi_write(&[0u8; 1000]).unwrap_err();
        assert!(matches!(err, Ch347Error::Transport(_)));

        let dev = ch347.into_inner();
        assert_eq!(dev.written.len(), 1);
        assert!(dev.read_lens.is_empty());
    }

    #[test]
    fn test_cs_frames() {
        let ch347 = Ch347::new(MockTransport::new());
        ch347.set_cs(true).unwrap();
        ch347.set_cs(false).unwrap();
        ch347.set_cs1(true).unwrap();
        ch347.set_cs1(false).unwrap();

        let dev = ch347.into_inner();
        let header = [0x0D, 0x00, 0xC1, 0x0A, 0x00];
        for frame in &dev.written {
            assert_eq!(frame.len(), 15);
            assert_eq!(&frame[..5], &header);
        }
        assert_eq!(dev.written[0][5], 0x80);
        assert_eq!(dev.written[1][5], 0xC0);
        assert_eq!(dev.written[2][10], 0x80);
        assert_eq!(dev.written[3][10], 0xC0);
        assert_eq!(dev.written[2][5], 0x00);
        assert!(dev.read_lens.is_empty());
    }
}
