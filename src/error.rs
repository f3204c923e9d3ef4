//! Unified error types for the gateway firmware.
//!
//! Every subsystem has its own small `Copy` error enum. Modbus failures
//! end as [`RegisterValue`](crate::modbus::RegisterValue) markers, command
//! failures as reply text and modem failures as a [`LinkFault`]. Only
//! faults that stop the device reach the top-level [`Error`].

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// A failure that ends in a device restart or refuses to boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The uplink or the controller could not be brought up.
    Link(LinkFault),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Modbus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusError {
    /// Nothing arrived within the settle window.
    NoReply,
    /// Fewer bytes than the reply layout requires.
    ShortFrame { expected: usize, got: usize },
    /// Trailing CRC does not match the frame body.
    CrcMismatch { expected: u16, got: u16 },
    /// Reply came from a different slave address.
    AddressMismatch { expected: u8, got: u8 },
    /// Reply function code does not answer the request.
    FunctionMismatch { expected: u8, got: u8 },
    /// Controller answered with a Modbus exception code.
    Exception(u8),
    /// Write echo names a different register or value.
    EchoMismatch,
    /// The serial channel reported an error.
    Serial,
}

impl ModbusError {
    /// `true` when the controller never answered, as opposed to answering badly.
    pub fn is_no_reply(self) -> bool {
        matches!(self, Self::NoReply | Self::Serial)
    }
}

impl fmt::Display for ModbusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReply => write!(f, "no reply"),
            Self::ShortFrame { expected, got } => {
                write!(f, "short frame ({got} of {expected} bytes)")
            }
            Self::CrcMismatch { expected, got } => {
                write!(f, "CRC mismatch (expected {expected:#06x}, got {got:#06x})")
            }
            Self::AddressMismatch { expected, got } => {
                write!(f, "reply from slave {got}, expected {expected}")
            }
            Self::FunctionMismatch { expected, got } => {
                write!(f, "function {got:#04x} does not answer {expected:#04x}")
            }
            Self::Exception(code) => write!(f, "exception code {code}"),
            Self::EchoMismatch => write!(f, "write echo mismatch"),
            Self::Serial => write!(f, "serial channel error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Modem errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// The modem UART could not be written or reconfigured.
    Serial,
    /// `+GSN` never returned Success within the retry budget.
    IdentificationFailed,
    /// `+CPIN?` did not report a ready SIM.
    SimNotReady,
    /// `+CCID` returned the failure token.
    IccidRejected,
    /// `+CSQ` reply missing, malformed, or "not detectable" (99).
    SignalUnreadable,
    /// The data call was never confirmed within the attempt budget.
    DataCallFailed,
    /// `+CFUN=1,1` never reported the modem ready again.
    RestartFailed,
    /// Operation requested from a state that does not allow it.
    InvalidState,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial channel error"),
            Self::IdentificationFailed => write!(f, "identification failed"),
            Self::SimNotReady => write!(f, "SIM not ready"),
            Self::IccidRejected => write!(f, "ICCID check rejected"),
            Self::SignalUnreadable => write!(f, "signal quality unreadable"),
            Self::DataCallFailed => write!(f, "data call failed"),
            Self::RestartFailed => write!(f, "soft restart failed"),
            Self::InvalidState => write!(f, "invalid session state"),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Payload was empty or not UTF-8.
    Empty,
    /// A required comma-separated argument is missing.
    MissingArgument,
    /// Register text is not a hexadecimal 16-bit address.
    BadRegister,
    /// Value text is not a 16-bit integer.
    BadValue,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::MissingArgument => write!(f, "missing argument"),
            Self::BadRegister => write!(f, "bad register address"),
            Self::BadValue => write!(f, "bad register value"),
        }
    }
}

// ---------------------------------------------------------------------------
// Link faults
// ---------------------------------------------------------------------------

/// Link faults are accumulated in a bitfield by the
/// [`LinkSupervisor`](crate::supervisor::LinkSupervisor); any fault that
/// exhausts its retry budget escalates to a device restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkFault {
    /// The modem never confirmed the PPP data call.
    DataCall = 0b0000_0001,
    /// PPP interface lost its address.
    LinkDown = 0b0000_0010,
    /// NTP sync failed after all attempts.
    TimeSync = 0b0000_0100,
    /// Broker connect or subscribe failed.
    BrokerConnect = 0b0000_1000,
    /// A publish did not reach the broker.
    Publish = 0b0001_0000,
    /// The refrigeration controller could not be identified.
    Identification = 0b0010_0000,
}

impl LinkFault {
    pub const ALL: [Self; 6] = [
        Self::DataCall,
        Self::LinkDown,
        Self::TimeSync,
        Self::BrokerConnect,
        Self::Publish,
        Self::Identification,
    ];

    pub fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LinkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataCall => write!(f, "data call not established"),
            Self::LinkDown => write!(f, "PPP link down"),
            Self::TimeSync => write!(f, "time sync failed"),
            Self::BrokerConnect => write!(f, "broker connect failed"),
            Self::Publish => write!(f, "publish failed"),
            Self::Identification => write!(f, "controller not identified"),
        }
    }
}

impl From<LinkFault> for Error {
    fn from(e: LinkFault) -> Self {
        Self::Link(e)
    }
}

/// Convenience alias used throughout the firmware.
pub type Result<T> = core::result::Result<T, Error>;
