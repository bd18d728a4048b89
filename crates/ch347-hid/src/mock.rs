//! Scripted transport for unit tests

use std::collections::VecDeque;
use std::io;

use crate::transport::{ControlTransport, Transport};

/// Records every written frame and replays queued replies in order
#[derive(Default)]
pub(crate) struct MockTransport {
    pub written: Vec<Vec<u8>>,
    pub control: Vec<Vec<u8>>,
    /// Buffer length requested by each read
    pub read_lens: Vec<usize>,
    pub replies: VecDeque<Vec<u8>>,
    /// Fail the write with this index (0-based)
    pub fail_write: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, frame: &[u8]) -> Self {
        self.replies.push_back(frame.to_vec());
        self
    }

    pub fn replies(mut self, frame: &[u8], count: usize) -> Self {
        for _ in 0..count {
            self.replies.push_back(frame.to_vec());
        }
        self
    }

    pub fn failing_write(mut self, index: usize) -> Self {
        self.fail_write = Some(index);
        self
    }
}

impl Transport for MockTransport {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        if self.fail_write == Some(self.written.len()) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone"));
        }
        self.written.push(frame.to_vec());
        Ok(frame.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_lens.push(buf.len());
        let reply = self
            .replies
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no reply queued"))?;
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

impl ControlTransport for MockTransport {
    fn send_control_report(&mut self, report: &[u8]) -> io::Result<usize> {
        self.control.push(report.to_vec());
        Ok(report.len())
    }
}
