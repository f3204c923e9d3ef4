//! Modbus RTU master for the refrigeration controller bus.
//!
//! Each transaction writes one request frame, waits a fixed settle time and
//! then takes whatever bytes the UART has collected as the reply. There is
//! no byte-count driven framing: controller firmware answers within the
//! settle window in practice, and a late or partial reply surfaces as a
//! [`ModbusError`] (and, one level up, as [`RegisterValue::NoReply`] or
//! [`RegisterValue::Malformed`]). Register meaning lives elsewhere.

pub mod crc;
pub mod frame;

use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::SerialPort;
use crate::error::ModbusError;

/// Largest reply the engine will collect (255-byte RTU frame + idle bytes).
const RX_CAPACITY: usize = 264;

/// Holding-register read limit per request.
pub const MAX_QUANTITY: u16 = 125;

// ───────────────────────────────────────────────────────────────
// Register value
// ───────────────────────────────────────────────────────────────

/// One register read as seen by the polling layer.
///
/// Absence is explicit so "the controller reports zero" never looks like
/// "the controller did not answer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterValue {
    Value(i32),
    /// Nothing arrived, or the bus was never queried.
    NoReply,
    /// Something arrived but failed validation.
    Malformed,
}

impl RegisterValue {
    pub fn value(self) -> Option<i32> {
        match self {
            Self::Value(v) => Some(v),
            Self::NoReply | Self::Malformed => None,
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl From<Result<i32, ModbusError>> for RegisterValue {
    fn from(result: Result<i32, ModbusError>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(e) if e.is_no_reply() => Self::NoReply,
            Err(_) => Self::Malformed,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::NoReply => write!(f, "none"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Echo of a successful single-register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub register: u16,
    pub value: u16,
}

impl Ack {
    /// The echoed word read as two's complement, as set points are.
    pub fn signed_value(&self) -> i16 {
        self.value as i16
    }
}

// ───────────────────────────────────────────────────────────────
// Master
// ───────────────────────────────────────────────────────────────

pub struct ModbusMaster<S, D> {
    serial: S,
    delay: D,
    settle_ms: u32,
}

impl<S: SerialPort, D: DelayNs> ModbusMaster<S, D> {
    pub fn new(serial: S, delay: D, settle_ms: u32) -> Self {
        Self {
            serial,
            delay,
            settle_ms,
        }
    }

    /// Read `quantity` consecutive holding registers starting at `register`.
    pub fn read_holding_registers(
        &mut self,
        slave: u8,
        register: u16,
        quantity: u16,
        signed: bool,
    ) -> Result<Vec<i32>, ModbusError> {
        let quantity = quantity.clamp(1, MAX_QUANTITY);
        let request = frame::read_holding_request(slave, register, quantity);
        let raw = self.transact(&request)?;
        let reply = frame::validate_reply(slave, frame::READ_HOLDING_REGISTERS, &raw)
            .inspect_err(|e| debug!("Modbus: read {register:#06x} -> {e}"))?;
        frame::decode_words(reply, quantity, signed)
    }

    /// Read a single holding register.
    pub fn read_register(&mut self, slave: u8, register: u16, signed: bool) -> RegisterValue {
        self.read_holding_registers(slave, register, 1, signed)
            .and_then(|words| words.first().copied().ok_or(ModbusError::NoReply))
            .into()
    }

    /// Write one holding register and check the controller's echo.
    pub fn write_single_register(
        &mut self,
        slave: u8,
        register: u16,
        value: u16,
    ) -> Result<Ack, ModbusError> {
        let request = frame::write_single_request(slave, register, value);
        let raw = self.transact(&request)?;
        let echo = frame::validate_reply(slave, frame::WRITE_SINGLE_REGISTER, &raw)?;

        let ack = Ack {
            register: u16::from_be_bytes([echo[2], echo[3]]),
            value: u16::from_be_bytes([echo[4], echo[5]]),
        };
        if ack.register != register || ack.value != value {
            warn!(
                "Modbus: write {register:#06x}={value} echoed {:#06x}={}",
                ack.register, ack.value
            );
            return Err(ModbusError::EchoMismatch);
        }
        Ok(ack)
    }

    /// Hold the bus idle for `ms`; the controller needs a gap between requests.
    pub fn pause_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn transact(&mut self, request: &[u8]) -> Result<heapless::Vec<u8, RX_CAPACITY>, ModbusError> {
        self.drain_stale();

        let written = self.serial.write(request).map_err(|e| {
            warn!("Modbus: serial write failed: {e:?}");
            ModbusError::Serial
        })?;
        if written != request.len() {
            warn!("Modbus: short write ({written}/{})", request.len());
            return Err(ModbusError::Serial);
        }

        self.delay.delay_ms(self.settle_ms);

        let mut raw = heapless::Vec::new();
        let mut chunk = [0u8; 64];
        while raw.len() < RX_CAPACITY {
            let n = self.serial.read(&mut chunk).map_err(|_| ModbusError::Serial)?;
            if n == 0 {
                break;
            }
            let room = (RX_CAPACITY - raw.len()).min(n);
            // `room` never exceeds remaining capacity.
            let _ = raw.extend_from_slice(&chunk[..room]);
        }

        if raw.is_empty() {
            return Err(ModbusError::NoReply);
        }
        Ok(raw)
    }

    /// Discard leftovers from an earlier, late reply so they cannot be
    /// mistaken for the answer to the next request.
    fn drain_stale(&mut self) {
        let mut chunk = [0u8; 64];
        let mut dropped = 0usize;
        while self.serial.available() > 0 {
            match self.serial.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => dropped += n,
            }
        }
        if dropped > 0 {
            debug!("Modbus: dropped {dropped} stale bytes");
        }
    }
}
