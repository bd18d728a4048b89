//! UART passthrough
//!
//! UART data travels on the first HID interface as `[len(2), payload]`
//! frames of at most 510 payload bytes. There is no acknowledgement and no
//! lock: reader and writer are independent, so a transport that can be
//! cloned (for example a handle wrapping a shared hidraw file) can back one
//! `Uart` per thread.

use std::io;

use crate::error::{Ch347Error, Result};
use crate::protocol::*;
use crate::transport::{read_frame, write_frame, ControlTransport, Transport};

/// CH347 UART over HID
pub struct Uart<T> {
    dev: T,
}

impl<T> Uart<T> {
    /// Wrap the opened UART HID interface
    pub fn new(dev: T) -> Self {
        Self { dev }
    }

    /// Release the underlying transport
    pub fn into_inner(self) -> T {
        self.dev
    }
}

impl<T: ControlTransport> Uart<T> {
    /// Set the line parameters
    pub fn configure(
        &mut self,
        baud: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<()> {
        self.configure_with(&UartConfig {
            baud,
            data_bits,
            parity,
            stop_bits,
        })
    }

    /// Set the line parameters from a [`UartConfig`]
    pub fn configure_with(&mut self, config: &UartConfig) -> Result<()> {
        let report = config.build_config_report()?;
        self.dev.send_control_report(&report)?;
        log::info!(
            "CH347 UART configured: {} baud, {:?}/{:?}/{:?}",
            config.baud,
            config.data_bits,
            config.parity,
            config.stop_bits
        );
        Ok(())
    }
}

impl<T: Transport> Uart<T> {
    /// Receive one frame into `buf`
    ///
    /// Returns the number of bytes stored. A frame longer than `buf` is
    /// truncated and the excess is lost, so size `buf` for the longest
    /// expected message.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let cap = buf.len().min(UART_MAX_PAYLOAD);
        let mut frame = [0u8; MAX_FRAME_LEN];
        let frame = &mut frame[..LEN_PREFIX + cap];

        let n = read_frame(&mut self.dev, frame)?;
        if n < LEN_PREFIX {
            return Ok(0);
        }

        let announced = len_prefix(frame);
        let len = announced.min(cap);
        if announced > len {
            log::debug!("UART frame of {} bytes truncated to {}", announced, len);
        }
        buf[..len].copy_from_slice(&frame[LEN_PREFIX..LEN_PREFIX + len]);
        Ok(len)
    }

    /// Send `data` as one or more frames
    ///
    /// Returns the number of bytes sent. If the transport fails after some
    /// frames went out, the error is [`Ch347Error::PartialSend`] carrying the
    /// count.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let mut sent = 0;

        for chunk in data.chunks(UART_MAX_PAYLOAD) {
            let mut frame: heapless::Vec<u8, MAX_FRAME_LEN> = heapless::Vec::new();
            put(&mut frame, &[0x00, 0x00])?;
            put(&mut frame, chunk)?;
            set_len_prefix(&mut frame);

            if let Err(source) = write_frame(&mut self.dev, &frame) {
                return Err(if sent == 0 {
                    Ch347Error::Transport(source)
                } else {
                    Ch347Error::PartialSend { sent, source }
                });
            }
            sent += chunk.len();
        }

        Ok(sent)
    }
}

impl<T: Transport> io::Read for Uart<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.receive(buf).map_err(into_io_error)
    }
}

impl<T: Transport> io::Write for Uart<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.send(buf) {
            Ok(n) => Ok(n),
            Err(Ch347Error::PartialSend { sent, .. }) => Ok(sent),
            Err(e) => Err(into_io_error(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn into_io_error(e: Ch347Error) -> io::Error {
    match e {
        Ch347Error::Transport(e) => e,
        other => io::Error::other(other),
    }
}
