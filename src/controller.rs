//! Controller polling service.
//!
//! Turns higher-level questions (temperatures, door and alert state,
//! identity, parameter dump) into register reads on the [`ModbusMaster`].
//! Results are immutable records; the orchestrator decides what changed.
//!
//! The controller needs a quiet gap between consecutive requests or it
//! drops the second one, so every batch pauses `pause_ms` between reads.
//! Until identification succeeds the variant is `Unknown` and every
//! semantic read answers [`RegisterValue::NoReply`] without touching the bus.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::ports::SerialPort;
use crate::error::ModbusError;
use crate::modbus::{Ack, ModbusMaster, RegisterValue};
use crate::registers::{self, ControllerVariant, Param};

// ───────────────────────────────────────────────────────────────
// Result records
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperatures {
    pub cabinet: RegisterValue,
    pub evaporator: RegisterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoorState {
    #[default]
    Closed,
    Open,
    /// No reply, or a value other than 0/1.
    Unknown,
}

impl DoorState {
    pub fn from_register(value: RegisterValue) -> Self {
        match value {
            RegisterValue::Value(0) => Self::Closed,
            RegisterValue::Value(1) => Self::Open,
            _ => Self::Unknown,
        }
    }
}

/// Bit positions in the alert-mask register (bit 0 = LSB).
pub const HIGH_TEMP_BIT: u8 = 9;
pub const LOW_TEMP_BIT: u8 = 10;
pub const DOOR_OPEN_BIT: u8 = 11;

/// Alarm conditions reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertFlags {
    pub high_temp: bool,
    pub low_temp: bool,
    pub door_open: bool,
    pub malfunction: bool,
}

impl AlertFlags {
    /// Decode the alert-mask register. A missing, zero or negative mask
    /// decodes to all-clear. `malfunction` comes from its own register.
    pub fn from_mask(mask: RegisterValue) -> Self {
        let Some(bits) = mask.value().filter(|&v| v > 0) else {
            return Self::default();
        };
        let bit = |n: u8| bits & (1 << n) != 0;
        Self {
            high_temp: bit(HIGH_TEMP_BIT),
            low_temp: bit(LOW_TEMP_BIT),
            door_open: bit(DOOR_OPEN_BIT),
            malfunction: false,
        }
    }

    pub fn any(self) -> bool {
        self.high_temp || self.low_temp || self.door_open || self.malfunction
    }
}

/// One frequent-poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequentPoll {
    pub door: DoorState,
    pub alerts: AlertFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareId {
    pub release: RegisterValue,
    pub revision: RegisterValue,
}

impl core::fmt::Display for FirmwareId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.release, self.revision)
    }
}

/// What boot discovered about the controller; fixed for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerIdentity {
    pub variant: ControllerVariant,
    pub model: String,
    pub serial: String,
    pub firmware: FirmwareId,
}

// ───────────────────────────────────────────────────────────────
// ControllerService
// ───────────────────────────────────────────────────────────────

pub struct ControllerService<S, D> {
    master: ModbusMaster<S, D>,
    slave: u8,
    pause_ms: u32,
    variant: ControllerVariant,
    model: heapless::String<4>,
}

impl<S: SerialPort, D: DelayNs> ControllerService<S, D> {
    pub fn new(master: ModbusMaster<S, D>, slave: u8, pause_ms: u32) -> Self {
        Self {
            master,
            slave,
            pause_ms,
            variant: ControllerVariant::Unknown,
            model: heapless::String::new(),
        }
    }

    pub fn variant(&self) -> ControllerVariant {
        self.variant
    }

    /// Model string read during identification (empty if never recognized).
    pub fn model(&self) -> &str {
        &self.model
    }

    // ── Identification ────────────────────────────────────────

    /// Resolve the controller variant from its model string.
    ///
    /// Tries `attempts` times, waiting `retry_delay_ms` between tries, and
    /// settles on [`ControllerVariant::Unknown`] if none is recognized.
    pub fn identify(&mut self, attempts: u8, retry_delay_ms: u32) -> ControllerVariant {
        for attempt in 1..=attempts.max(1) {
            match self.read_model() {
                Some(model) => {
                    let variant = ControllerVariant::from_model(&model);
                    if variant.is_known() {
                        info!("Controller: model {model} ({variant:?})");
                        self.variant = variant;
                        self.model = model;
                        return variant;
                    }
                    warn!("Controller: unrecognized model {model:?} (attempt {attempt})");
                }
                None => warn!("Controller: no identification reply (attempt {attempt})"),
            }
            if attempt < attempts {
                self.master.pause_ms(retry_delay_ms);
            }
        }
        self.variant = ControllerVariant::Unknown;
        self.model.clear();
        ControllerVariant::Unknown
    }

    /// One character per identification register, stopping at the first zero.
    fn read_model(&mut self) -> Option<heapless::String<4>> {
        let mut model = heapless::String::new();
        for (i, &register) in registers::IDENTIFICATION.iter().enumerate() {
            if i > 0 {
                self.master.pause_ms(self.pause_ms);
            }
            let value = self.master.read_register(self.slave, register, false).value()?;
            if value == 0 {
                break;
            }
            let ch = u32::try_from(value).ok().and_then(char::from_u32)?;
            model.push(ch).ok()?;
        }
        Some(model)
    }

    // ── Polling ───────────────────────────────────────────────

    pub fn read_temperatures(&mut self) -> Temperatures {
        let cabinet = self.read_param(Param::CabinetTemp, true);
        self.master.pause_ms(self.pause_ms);
        let evaporator = self.read_param(Param::EvapTemp, true);
        Temperatures {
            cabinet,
            evaporator,
        }
    }

    /// Door state, alert mask and malfunction indicator, paced for the controller.
    pub fn poll_frequent(&mut self) -> FrequentPoll {
        let door = DoorState::from_register(self.read_param(Param::DoorStatus, true));
        self.master.pause_ms(self.pause_ms);

        let mask = self.read_param(Param::AlertMask, false);
        self.master.pause_ms(self.pause_ms);

        let mut alerts = AlertFlags::from_mask(mask);
        alerts.malfunction = self.read_param(Param::MemoryError, true) == RegisterValue::Value(1);

        FrequentPoll { door, alerts }
    }

    /// Compressor running state, `None` when unreadable.
    pub fn read_compressor(&mut self) -> Option<bool> {
        self.read_param(Param::CompressorStatus, true)
            .value()
            .map(|v| v != 0)
    }

    // ── Diagnostics ───────────────────────────────────────────

    /// Serial number as decimal text, `None` unless all three words read.
    ///
    /// The serial registers are rendered as unpadded hex, concatenated and
    /// read back as one hex number. This is the identity the broker topics
    /// were provisioned with, so the unpadded join is kept as-is.
    pub fn read_serial(&mut self) -> Option<String> {
        if !self.variant.is_known() {
            return None;
        }
        let mut hex = String::new();
        for (i, &register) in registers::SERIAL.iter().enumerate() {
            if i > 0 {
                self.master.pause_ms(self.pause_ms);
            }
            match self.master.read_register(self.slave, register, false) {
                RegisterValue::Value(v) => hex.push_str(&format!("{v:x}")),
                other => {
                    warn!("Controller: serial word {register:#06x} {other}");
                    return None;
                }
            }
        }
        u64::from_str_radix(&hex, 16).ok().map(|n| n.to_string())
    }

    pub fn read_firmware(&mut self) -> FirmwareId {
        let [release_reg, revision_reg] = registers::FIRMWARE;
        let release = self.read_raw(release_reg, false);
        self.master.pause_ms(self.pause_ms);
        let revision = self.read_raw(revision_reg, false);
        FirmwareId { release, revision }
    }

    /// Every parameter of the current variant, in table order.
    pub fn dump_parameters(&mut self) -> Vec<(&'static str, RegisterValue)> {
        let table = self.variant.parameters();
        let mut out = Vec::with_capacity(table.len());
        for (i, &(param, register)) in table.iter().enumerate() {
            if i > 0 {
                self.master.pause_ms(self.pause_ms);
            }
            out.push((param.name(), self.master.read_register(self.slave, register, true)));
        }
        out
    }

    /// Temperature units register reads 0 for Celsius.
    pub fn is_celsius(&mut self) -> Option<bool> {
        self.read_param(Param::TempUnits, true).value().map(|v| v == 0)
    }

    /// `true` when both smart-lock registers report the second-generation lock.
    pub fn has_smart_lock(&mut self) -> Option<bool> {
        let [first, second] = registers::SMART_LOCK;
        let a = self.read_raw(first, true).value()?;
        self.master.pause_ms(self.pause_ms);
        let b = self.read_raw(second, true).value()?;
        Some(a == registers::SMART_LOCK_CONFIGURED && b == registers::SMART_LOCK_CONFIGURED)
    }

    // ── Remote commands ───────────────────────────────────────

    /// Ad hoc read of any register.
    pub fn read_register(&mut self, register: u16) -> RegisterValue {
        self.read_raw(register, true)
    }

    /// Ad hoc single-register write.
    pub fn write(&mut self, register: u16, value: u16) -> Result<Ack, ModbusError> {
        if !self.variant.is_known() {
            return Err(ModbusError::NoReply);
        }
        self.master.write_single_register(self.slave, register, value)
    }

    /// Hold the bus for `ms` before another task may use it.
    pub fn hold_bus(&mut self, ms: u32) {
        self.master.pause_ms(ms);
    }

    fn read_param(&mut self, param: Param, signed: bool) -> RegisterValue {
        match self.variant.address(param) {
            Some(register) => self.master.read_register(self.slave, register, signed),
            None => RegisterValue::NoReply,
        }
    }

    fn read_raw(&mut self, register: u16, signed: bool) -> RegisterValue {
        if !self.variant.is_known() {
            return RegisterValue::NoReply;
        }
        self.master.read_register(self.slave, register, signed)
    }
}
