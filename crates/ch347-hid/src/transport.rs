//! Transport layer abstraction for CH347 HID communication
//!
//! Opening the hidraw node (or any other HID backend) is left to the caller;
//! the codecs only need a blocking report exchange. Timeouts, if any, are the
//! transport's business.

use std::io;

/// Raw report exchange with one CH347 HID interface
pub trait Transport {
    /// Write one output report, returning the number of bytes accepted
    fn write(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Read one input report into `buf`, returning the number of bytes read
    ///
    /// Blocks until a report arrives.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Transport that can additionally send feature (control) reports
///
/// Only the UART interface uses the control channel, for line configuration.
pub trait ControlTransport: Transport {
    /// Send one feature report
    fn send_control_report(&mut self, report: &[u8]) -> io::Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        (**self).write(frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

impl<T: ControlTransport + ?Sized> ControlTransport for &mut T {
    fn send_control_report(&mut self, report: &[u8]) -> io::Result<usize> {
        (**self).send_control_report(report)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        (**self).write(frame)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

impl<T: ControlTransport + ?Sized> ControlTransport for Box<T> {
    fn send_control_report(&mut self, report: &[u8]) -> io::Result<usize> {
        (**self).send_control_report(report)
    }
}

/// Write a frame and trace it
pub(crate) fn write_frame<T: Transport + ?Sized>(dev: &mut T, frame: &[u8]) -> io::Result<usize> {
    let n = dev.write(frame)?;
    log::trace!("HID write {} bytes: {:02X?}", n, &frame[..frame.len().min(16)]);
    Ok(n)
}

/// Read a frame and trace it
pub(crate) fn read_frame<T: Transport + ?Sized>(dev: &mut T, buf: &mut [u8]) -> io::Result<usize> {
    let n = dev.read(buf)?;
    log::trace!("HID read {} bytes: {:02X?}", n, &buf[..n.min(16).min(buf.len())]);
    Ok(n)
}
