//! UART serial channel adapter.
//!
//! Implements [`SerialPort`] for the controller bus and the modem AT port.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: wraps an `esp_idf_hal` [`UartDriver`]
//!   with non-blocking reads (zero tick timeout).
//! - **all other targets**: in-memory queues; bytes injected with
//!   [`UartChannel::inject`] are read back, writes are collected.
//!
//! [`UartDriver`]: esp_idf_hal::uart::UartDriver

use core::fmt;

use crate::app::ports::{Parity, SerialPort, SerialSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartError {
    /// Driver call failed (ESP-IDF error code).
    Driver(i32),
    /// Line settings the channel cannot apply.
    Unsupported,
}

impl fmt::Display for UartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(rc) => write!(f, "UART driver error (rc={})", rc),
            Self::Unsupported => write!(f, "unsupported line settings"),
        }
    }
}

fn check_settings(settings: &SerialSettings) -> Result<(), UartError> {
    if settings.data_bits == 8 && settings.parity == Parity::None && settings.stop_bits == 1 {
        Ok(())
    } else {
        Err(UartError::Unsupported)
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod platform {
    use esp_idf_hal::delay::BLOCK;
    use esp_idf_hal::uart::UartDriver;
    use esp_idf_hal::units::Hertz;
    use log::info;

    use super::{UartError, check_settings};
    use crate::app::ports::{SerialPort, SerialSettings};

    pub struct UartChannel {
        name: &'static str,
        driver: UartDriver<'static>,
    }

    impl UartChannel {
        pub fn new(name: &'static str, driver: UartDriver<'static>) -> Self {
            info!("UART[{}]: channel ready", name);
            Self { name, driver }
        }

        /// Give the driver back (PPP takes over the modem UART).
        pub fn into_driver(self) -> UartDriver<'static> {
            self.driver
        }
    }

    impl SerialPort for UartChannel {
        type Error = UartError;

        fn write(&mut self, data: &[u8]) -> Result<usize, UartError> {
            self.driver
                .write(data)
                .map_err(|e| UartError::Driver(e.code()))
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, UartError> {
            self.driver
                .read(buf, 0)
                .map_err(|e| UartError::Driver(e.code()))
        }

        fn available(&self) -> usize {
            self.driver.remaining_read().unwrap_or(0)
        }

        fn flush(&mut self) -> Result<(), UartError> {
            self.driver
                .wait_tx_done(BLOCK)
                .map_err(|e| UartError::Driver(e.code()))
        }

        fn reconfigure(&mut self, settings: &SerialSettings) -> Result<(), UartError> {
            check_settings(settings)?;
            self.driver
                .clear_rx()
                .map_err(|e| UartError::Driver(e.code()))?;
            self.driver
                .change_baudrate(Hertz(settings.baud))
                .map_err(|e| UartError::Driver(e.code()))?;
            info!("UART[{}]: {} 8N1", self.name, settings.baud);
            Ok(())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod platform {
    use std::collections::VecDeque;

    use super::{UartError, check_settings};
    use crate::app::ports::{SerialPort, SerialSettings};

    pub struct UartChannel {
        name: &'static str,
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        baud: u32,
    }

    impl UartChannel {
        pub fn new(name: &'static str) -> Self {
            log::info!("UART[{}](sim): channel ready", name);
            Self {
                name,
                rx: VecDeque::new(),
                tx: Vec::new(),
                baud: 0,
            }
        }

        pub fn name(&self) -> &'static str {
            self.name
        }

        /// Queue bytes as if the far end had sent them.
        pub fn inject(&mut self, bytes: &[u8]) {
            self.rx.extend(bytes);
        }

        /// Everything written since the last call.
        pub fn take_written(&mut self) -> Vec<u8> {
            core::mem::take(&mut self.tx)
        }

        pub fn baud(&self) -> u32 {
            self.baud
        }
    }

    impl SerialPort for UartChannel {
        type Error = UartError;

        fn write(&mut self, data: &[u8]) -> Result<usize, UartError> {
            self.tx.extend_from_slice(data);
            Ok(data.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, UartError> {
            let n = buf.len().min(self.rx.len());
            for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn available(&self) -> usize {
            self.rx.len()
        }

        fn flush(&mut self) -> Result<(), UartError> {
            Ok(())
        }

        fn reconfigure(&mut self, settings: &SerialSettings) -> Result<(), UartError> {
            check_settings(settings)?;
            self.rx.clear();
            self.baud = settings.baud;
            log::debug!("UART[{}](sim): {} 8N1", self.name, settings.baud);
            Ok(())
        }
    }
}

pub use platform::UartChannel;
