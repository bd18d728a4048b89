//! I2C master
//!
//! An I2C transaction is a stream of primitives (START, WRITE, READ, STOP)
//! packed into `[len(2), 0xAA, primitives..., 0x00]` frames. After each frame
//! the device answers with one status byte per WRITE primitive, then (once)
//! the read-request acknowledgement, then the bytes read, in that order.
//!
//! Reads must end with the dedicated single-byte READ primitive (`0xC0`,
//! which NAKs the last byte); a bulk READ at the end leaves the bus in a
//! state where the next transaction fails.

use crate::device::Ch347;
use crate::error::{Ch347Error, Result};
use crate::protocol::*;
use crate::transport::{read_frame, write_frame, Transport};

/// Largest number of response bytes one reply frame can carry
const MAX_RESPONSE: usize = MAX_FRAME_LEN - LEN_PREFIX;

impl<T: Transport> Ch347<T> {
    /// Set the I2C bus speed
    pub fn configure_i2c(&self, speed: I2cSpeed) -> Result<()> {
        let mut iface = self.lock();
        write_frame(&mut iface.dev, &speed.build_config_frame())?;
        log::info!("CH347 I2C configured: speed={}kHz", speed.to_khz());
        Ok(())
    }

    /// Write `write` then read `read.len()` bytes from the 7-bit `address`
    ///
    /// Either phase may be empty. When both are present the read uses a
    /// repeated start.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // Random read of a 24C32: set the word address, then read 4 KiB
    /// let mut data = vec![0u8; 4096];
    /// ch347.i2c_transact(0x57, &[0x00, 0x00], &mut data)?;
    /// ```
    pub fn i2c_transact(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        if address > 0x7F {
            return Err(Ch347Error::InvalidParameter(format!(
                "I2C address 0x{:02X} is not a 7-bit address",
                address
            )));
        }

        let mut iface = self.lock();
        let mut stream = Stream::new(&mut iface.dev, address, read);

        if !write.is_empty() {
            stream.start()?;

            // First WRITE carries the address byte, so it has room for one
            // data byte less
            let first = write.len().min(I2C_STM_MAX_LEN - 1);
            let mut chunk: heapless::Vec<u8, I2C_STM_MAX_LEN> = heapless::Vec::new();
            put(&mut chunk, &[address << 1])?;
            put(&mut chunk, &write[..first])?;
            stream.write(&chunk)?;

            for part in write[first..].chunks(I2C_STM_MAX_LEN) {
                stream.write(part)?;
            }
        }

        if !stream.read_buf.is_empty() {
            stream.request_read()?;

            // Everything but the final byte goes out as bulk READs; the first
            // bulk READ is one byte shorter than the rest
            let mut remaining = stream.read_buf.len() - 1;
            let mut max = I2C_STM_MAX_LEN - 1;
            while remaining > 0 {
                remaining -= stream.read(remaining.min(max))?;
                max = I2C_STM_MAX_LEN;
            }
            stream.read_last()?;
        }

        stream.stop()?;
        stream.flush()?;

        log::debug!(
            "I2C 0x{:02X}: wrote {} bytes, read {} bytes in {} frames ({} response bytes)",
            address,
            write.len(),
            stream.read_pos,
            stream.frames,
            stream.responses
        );
        Ok(())
    }

    /// Write `data` to the 7-bit `address`
    pub fn i2c_write(&self, address: u8, data: &[u8]) -> Result<()> {
        self.i2c_transact(address, data, &mut [])
    }

    /// Read `buf.len()` bytes from the 7-bit `address`
    pub fn i2c_read(&self, address: u8, buf: &mut [u8]) -> Result<()> {
        self.i2c_transact(address, &[], buf)
    }
}

/// Frame assembly and response accounting for one transaction
struct Stream<'a, T: ?Sized> {
    dev: &'a mut T,
    address: u8,
    frame: heapless::Vec<u8, MAX_FRAME_LEN>,
    /// WRITE primitives since the last flush
    write_acks: usize,
    /// Read-request ack not yet received
    read_ack_pending: bool,
    /// Read data bytes requested since the last flush
    read_requested: usize,
    read_buf: &'a mut [u8],
    read_pos: usize,
    frames: usize,
    responses: usize,
}

impl<'a, T: Transport + ?Sized> Stream<'a, T> {
    fn new(dev: &'a mut T, address: u8, read_buf: &'a mut [u8]) -> Self {
        let mut stream = Self {
            dev,
            address,
            frame: heapless::Vec::new(),
            write_acks: 0,
            read_ack_pending: false,
            read_requested: 0,
            read_buf,
            read_pos: 0,
            frames: 0,
            responses: 0,
        };
        stream.reset();
        stream
    }

    fn reset(&mut self) {
        self.frame.clear();
        // Length is filled in on flush
        self.frame.extend_from_slice(&[0x00, 0x00, CMD_I2C_STREAM]).ok();
    }

    /// Response bytes the current frame will produce
    fn pending_responses(&self) -> usize {
        self.write_acks + usize::from(self.read_ack_pending) + self.read_requested
    }

    /// Flush first unless `len` more primitive bytes producing `responses`
    /// more reply bytes still fit
    fn reserve(&mut self, len: usize, responses: usize) -> Result<()> {
        let frame_full = self.frame.len() + len + 1 > MAX_FRAME_LEN;
        let reply_full = self.pending_responses() + responses > MAX_RESPONSE;
        if frame_full || reply_full {
            self.flush()?;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.reserve(1, 0)?;
        put(&mut self.frame, &[I2C_STM_START])
    }

    fn stop(&mut self) -> Result<()> {
        self.reserve(1, 0)?;
        put(&mut self.frame, &[I2C_STM_STOP])
    }

    /// WRITE primitive; `data` is at most 63 bytes
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(1 + data.len(), 1)?;
        put(&mut self.frame, &[I2C_STM_OUT | data.len() as u8])?;
        put(&mut self.frame, data)?;
        self.write_acks += 1;
        Ok(())
    }

    /// START plus the address WRITE with R/W=1
    ///
    /// Room for the first READ is reserved too: the device only sends the
    /// read-request ack together with read data.
    fn request_read(&mut self) -> Result<()> {
        self.reserve(4, 2)?;
        put(
            &mut self.frame,
            &[I2C_STM_START, I2C_STM_OUT | 1, (self.address << 1) | 1],
        )?;
        self.read_ack_pending = true;
        Ok(())
    }

    /// Bulk READ of up to `len` bytes; returns how many were requested
    fn read(&mut self, len: usize) -> Result<usize> {
        self.reserve(1, 1)?;
        let len = len.min(MAX_RESPONSE - self.pending_responses());
        put(&mut self.frame, &[I2C_STM_IN | len as u8])?;
        self.read_requested += len;
        Ok(len)
    }

    /// Dedicated single-byte READ that terminates a read
    fn read_last(&mut self) -> Result<()> {
        self.reserve(1, 1)?;
        put(&mut self.frame, &[I2C_STM_IN])?;
        self.read_requested += 1;
        Ok(())
    }

    /// Send the current frame and consume its responses
    fn flush(&mut self) -> Result<()> {
        put(&mut self.frame, &[I2C_STM_END])?;
        set_len_prefix(&mut self.frame);
        write_frame(&mut *self.dev, &self.frame)?;
        self.frames += 1;

        let read_ack = self.read_ack_pending && self.read_requested > 0;
        let expected = self.write_acks + usize::from(read_ack) + self.read_requested;

        if expected > 0 {
            let mut reply = [0u8; MAX_FRAME_LEN];
            let reply = &mut reply[..LEN_PREFIX + expected];
            let n = read_frame(&mut *self.dev, reply)?;
            if n < reply.len() {
                return Err(Ch347Error::ShortResponse {
                    expected: reply.len(),
                    got: n,
                });
            }

            let (acks, rest) = reply[LEN_PREFIX..].split_at(self.write_acks);
            if acks.contains(&0x00) {
                return Err(Ch347Error::WriteNak {
                    address: self.address,
                });
            }

            let data = if read_ack {
                if rest[0] != I2C_READ_ACK {
                    return Err(Ch347Error::ReadNak {
                        address: self.address,
                        ack: rest[0],
                    });
                }
                self.read_ack_pending = false;
                &rest[1..]
            } else {
                rest
            };

            let end = self.read_pos + data.len();
            self.read_buf[self.read_pos..end].copy_from_slice(data);
            self.read_pos = end;
            self.responses += expected;
        }

        self.write_acks = 0;
        self.read_requested = 0;
        self.reset();
        Ok(())
    }
}
