//! Emulated UART interface in loopback

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use ch347_hid::consts::{CMD_UART_SET_CFG, LEN_PREFIX, MAX_FRAME_LEN, UART_CFG_LEN};
use ch347_hid::{ControlTransport, Transport};

use crate::error::DummyError;

#[derive(Debug, Default)]
struct UartState {
    /// Feature reports received
    configs: Vec<[u8; UART_CFG_LEN]>,
    /// Payloads waiting to be read, one input report each
    rx: VecDeque<Vec<u8>>,
    /// Every payload byte written
    tx: Vec<u8>,
    loopback: bool,
}

/// Emulated CH347 UART HID interface
///
/// Clones share the same line, so one handle can write while another reads
/// from a different thread. In loopback mode (the default) each written frame
/// comes back as one input report.
#[derive(Debug, Clone)]
pub struct DummyUart {
    state: Arc<Mutex<UartState>>,
}

impl Default for DummyUart {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyUart {
    /// Create a UART in loopback mode
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(UartState {
                loopback: true,
                ..UartState::default()
            })),
        }
    }

    /// Create a UART that only delivers injected data
    pub fn without_loopback() -> Self {
        let uart = Self::new();
        uart.state().loopback = false;
        uart
    }

    /// Queue `data` as one incoming input report
    pub fn inject(&self, data: &[u8]) {
        self.state().rx.push_back(data.to_vec());
    }

    /// Every payload byte written so far
    pub fn sent(&self) -> Vec<u8> {
        self.state().tx.clone()
    }

    /// Configuration reports received so far
    pub fn configs(&self) -> Vec<[u8; UART_CFG_LEN]> {
        self.state().configs.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, UartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for DummyUart {
    fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
        if frame.len() < LEN_PREFIX {
            return Err(DummyError::ShortFrame { len: frame.len() }.into());
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(DummyError::Oversized(frame.len()).into());
        }
        let announced = u16::from_le_bytes([frame[0], frame[1]]) as usize;
        let payload = &frame[LEN_PREFIX..];
        if announced != payload.len() {
            return Err(DummyError::LengthMismatch {
                announced,
                actual: payload.len(),
            }
            .into());
        }

        let mut state = self.state();
        state.tx.extend_from_slice(payload);
        if state.loopback {
            state.rx.push_back(payload.to_vec());
        }
        Ok(frame.len())
    }

    /// Copies as much of the next report as fits; the length prefix always
    /// announces the full payload. Returns 0 when nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(payload) = self.state().rx.pop_front() else {
            return Ok(0);
        };

        let mut report = (payload.len() as u16).to_le_bytes().to_vec();
        report.extend_from_slice(&payload);
        let n = report.len().min(buf.len());
        buf[..n].copy_from_slice(&report[..n]);
        Ok(n)
    }
}

impl ControlTransport for DummyUart {
    fn send_control_report(&mut self, report: &[u8]) -> io::Result<usize> {
        let config: [u8; UART_CFG_LEN] = report
            .try_into()
            .map_err(|_| DummyError::ShortFrame { len: report.len() })?;
        if config[0] != CMD_UART_SET_CFG {
            return Err(DummyError::UnknownCommand(config[0]).into());
        }
        self.state().configs.push(config);
        Ok(report.len())
    }
}
