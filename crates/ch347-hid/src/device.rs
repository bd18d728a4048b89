//! CH347 device implementation
//!
//! This module provides the `Ch347` struct that owns the SPI+I2C+GPIO HID
//! interface. The three function blocks share one report pipe, so every
//! operation takes the interface lock for its whole request/response exchange
//! and hands the guard down to the codec as its exclusive-access token.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::transport::Transport;

/// State guarded by the interface lock
pub(crate) struct Interface<T> {
    /// Report pipe to the device
    pub(crate) dev: T,
    /// Set when an SPI transfer aborted part-way; cleared by reconfiguration
    pub(crate) spi_faulted: bool,
}

/// CH347 SPI+I2C+GPIO interface
///
/// Pass the second HID interface of the device (the first one carries UART
/// data and is handled by [`Uart`](crate::Uart)).
///
/// `Ch347` is `Sync` when the transport is `Send`, so it can be shared between
/// threads; calls are fully serialized.
///
/// # Features
///
/// - SPI master, write-only, speeds from 468.75 kHz to 60 MHz, two chip selects
/// - I2C master at 20/100/400/750 kHz with combined write-read transactions
/// - 8 GPIO pins
pub struct Ch347<T> {
    inner: Mutex<Interface<T>>,
}

impl<T: Transport> Ch347<T> {
    /// Wrap an opened SPI+I2C+GPIO HID interface
    pub fn new(dev: T) -> Self {
        Self {
            inner: Mutex::new(Interface {
                dev,
                spi_faulted: false,
            }),
        }
    }

    /// Release the underlying transport
    pub fn into_inner(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .dev
    }

    /// Whether an aborted SPI transfer left the SPI engine faulted
    pub fn is_spi_faulted(&self) -> bool {
        self.lock().spi_faulted
    }

    /// Acquire exclusive access to the interface
    ///
    /// A panic in another caller cannot leave frames half-assembled here, all
    /// assembly state is per call, so a poisoned lock is simply taken over.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Interface<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
