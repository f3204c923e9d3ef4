//! Controller register map.
//!
//! Two controller families share the same semantic parameters at different
//! holding-register addresses. The tables are plain static slices so the
//! parameter dump iterates them directly and lookups need no allocation.
//! The unrecognized variant exposes an empty table.

/// Controller family, resolved once at boot from the identification registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerVariant {
    /// Model strings starting with `T` or `Y`.
    TypeA,
    /// Model strings starting with `X`.
    TypeB,
    Unknown,
}

impl ControllerVariant {
    /// Classify a decoded model string by its leading letter.
    pub fn from_model(model: &str) -> Self {
        match model.chars().next() {
            Some('T' | 'Y') => Self::TypeA,
            Some('X') => Self::TypeB,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    /// Full parameter table for this variant, in dump order.
    pub fn parameters(self) -> &'static [(Param, u16)] {
        match self {
            Self::TypeA => TYPE_A,
            Self::TypeB => TYPE_B,
            Self::Unknown => &[],
        }
    }

    /// Address of `param`, `None` if this variant lacks it (or is unknown).
    pub fn address(self, param: Param) -> Option<u16> {
        self.parameters()
            .iter()
            .find(|(p, _)| *p == param)
            .map(|&(_, addr)| addr)
    }
}

/// Semantic controller parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    CabinetTemp,
    EvapTemp,
    CompressorStatus,
    DefrostStatus,
    DoorStatus,
    SetPoint,
    HighTempThreshold,
    HighTempDelay,
    RestockDuration,
    HighTempDefrostDelay,
    MemoryError,
    StartupTimer,
    HighTempPowerUpTimer,
    HighTempTimer,
    HighTempDefrostTimer,
    HighTempRestockingTimer,
    DoorOpenAlarmDelay,
    RestockingDelay,
    Buzzer,
    TempUnits,
    AlertMask,
    OperatingConfig,
}

impl Param {
    /// Name used in the remote parameter dump.
    pub fn name(self) -> &'static str {
        match self {
            Self::CabinetTemp => "cabinet_temp",
            Self::EvapTemp => "evap_temp",
            Self::CompressorStatus => "compressor_status",
            Self::DefrostStatus => "defrost_status",
            Self::DoorStatus => "door_status",
            Self::SetPoint => "set_point",
            Self::HighTempThreshold => "high_temp_thresh",
            Self::HighTempDelay => "high_temp_delay",
            Self::RestockDuration => "restock_duration",
            Self::HighTempDefrostDelay => "high_temp_defrost_delay",
            Self::MemoryError => "rcu_memory_error",
            Self::StartupTimer => "startup_timer",
            Self::HighTempPowerUpTimer => "ht_power_up_timer",
            Self::HighTempTimer => "ht_timer",
            Self::HighTempDefrostTimer => "ht_defrost_timer",
            Self::HighTempRestockingTimer => "ht_restocking_timer",
            Self::DoorOpenAlarmDelay => "door_open_alarm_delay",
            Self::RestockingDelay => "restocking_delay",
            Self::Buzzer => "buzzer",
            Self::TempUnits => "temp_units",
            Self::AlertMask => "alert_mask",
            Self::OperatingConfig => "operating_config",
        }
    }
}

// ── Variant-independent registers ────────────────────────────

/// Model string, one character per register, zero-terminated.
pub const IDENTIFICATION: [u16; 4] = [0xCF38, 0xCF39, 0xCF3A, 0xCF3B];

/// Serial number words, most significant first.
pub const SERIAL: [u16; 3] = [0xCF44, 0xCF43, 0xCF42];

/// Firmware release words.
pub const FIRMWARE: [u16; 2] = [0xCF12, 0xCF13];

/// Both read 4 when a second-generation smart lock is configured.
pub const SMART_LOCK: [u16; 2] = [0x2853, 0x2855];
pub const SMART_LOCK_CONFIGURED: i32 = 4;

// ── Per-variant tables ───────────────────────────────────────

static TYPE_A: &[(Param, u16)] = &[
    (Param::CabinetTemp, 0x0200),
    (Param::EvapTemp, 0x0201),
    (Param::CompressorStatus, 0x0210),
    (Param::DefrostStatus, 0x0211),
    (Param::DoorStatus, 0x020E),
    (Param::SetPoint, 0x2801),
    (Param::HighTempThreshold, 0x282E),
    (Param::HighTempDelay, 0x2831),
    (Param::RestockDuration, 0x2845),
    (Param::HighTempDefrostDelay, 0x2834),
    (Param::MemoryError, 0x0299),
    (Param::StartupTimer, 0x0230),
    (Param::HighTempPowerUpTimer, 0x0232),
    (Param::HighTempTimer, 0x0231),
    (Param::HighTempDefrostTimer, 0x0233),
    (Param::HighTempRestockingTimer, 0x0235),
    (Param::DoorOpenAlarmDelay, 0x2836),
    (Param::RestockingDelay, 0x2845),
    (Param::Buzzer, 0x0290),
    (Param::TempUnits, 0x2809),
    (Param::AlertMask, 0x0207),
];

static TYPE_B: &[(Param, u16)] = &[
    (Param::CabinetTemp, 0x0200),
    (Param::EvapTemp, 0x0201),
    (Param::CompressorStatus, 0x0210),
    (Param::DefrostStatus, 0x0211),
    (Param::DoorStatus, 0x0220),
    (Param::SetPoint, 0x2802),
    (Param::HighTempThreshold, 0x283D),
    (Param::HighTempDelay, 0x2840),
    (Param::RestockDuration, 0x0244),
    (Param::HighTempDefrostDelay, 0x284A),
    (Param::MemoryError, 0x0299),
    (Param::StartupTimer, 0x283B),
    (Param::HighTempPowerUpTimer, 0x2848),
    (Param::HighTempTimer, 0x2840),
    (Param::HighTempDefrostTimer, 0x284A),
    (Param::HighTempRestockingTimer, 0x2861),
    (Param::DoorOpenAlarmDelay, 0x0247),
    (Param::RestockingDelay, 0x0244),
    (Param::Buzzer, 0x0290),
    (Param::TempUnits, 0x2806),
    (Param::AlertMask, 0x0207),
    (Param::OperatingConfig, 0x285C),
];

/// Parse a register address written as hexadecimal text (`"2801"`, `"0x2801"`).
pub fn parse_register(text: &str) -> Option<u16> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}
