//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Modbus / AT engines, GatewayService (domain)
//! ```
//!
//! UART drivers, the modem power line, the broker client and the PPP
//! interface implement these traits. The engines and the
//! [`GatewayService`](super::service::GatewayService) consume them via
//! generics, so the domain core never touches ESP-IDF directly and every
//! protocol path can be driven from scripted mocks on the host.

use core::fmt;

use crate::codec::WallTime;

// ───────────────────────────────────────────────────────────────
// Serial port (driven adapter: UART ↔ protocol engines)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Line parameters applied when a channel is (re)opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl SerialSettings {
    /// Both the controller bus and the modem bus run 9600 8N1.
    pub const BUS_9600_8N1: Self = Self {
        baud: 9600,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
    };
}

/// Byte-oriented, non-blocking serial channel.
///
/// `read` must return `Ok(0)` immediately when nothing is pending; the
/// engines built on top do their own bounded waiting.
pub trait SerialPort {
    type Error: fmt::Debug;

    /// Write `data`, returning how many bytes were queued.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read whatever is pending into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Number of bytes waiting to be read.
    fn available(&self) -> usize;

    /// Block until queued output has left the UART.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Drop pending input and re-apply line settings.
    fn reconfigure(&mut self, settings: &SerialSettings) -> Result<(), Self::Error>;
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic and wall-clock time.
pub trait Clock {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Local wall-clock time, `None` until NTP has synced.
    fn wall_time(&self) -> Option<WallTime> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Telemetry bus port (driven adapter: domain → broker)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
}

/// Receive callback invoked by the bus for every inbound message.
pub type ReceiveCallback = fn(topic: &str, payload: &[u8]);

/// Publish/subscribe client that rides on the PPP link.
pub trait TelemetryBus {
    /// Connect using `client_id`.
    fn connect(&mut self, client_id: &str) -> Result<(), BusError>;

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), BusError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), BusError>;

    /// Register the function that receives inbound messages.
    fn set_receive_callback(&mut self, callback: ReceiveCallback);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// `connect` was never called or the session dropped.
    NotConnected,
    /// The broker refused the request.
    Rejected,
    /// The underlying network transport failed.
    Transport,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Rejected => write!(f, "rejected by broker"),
            Self::Transport => write!(f, "transport failure"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Network link port (driven adapter: domain ↔ PPP interface)
// ───────────────────────────────────────────────────────────────

/// The IP interface layered over the modem's data call.
pub trait NetworkLink {
    /// `true` while the interface holds a non-zero address.
    fn is_up(&self) -> bool;

    /// Human-readable interface configuration (address, mask, gateway, DNS).
    fn describe(&self) -> String;

    /// One NTP sync attempt; sets the RTC on success.
    fn sync_time(&mut self) -> Result<(), BusError>;

    /// Tear down the data call before a restart.
    fn shut_down(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Reset port
// ───────────────────────────────────────────────────────────────

/// Full device restart. The production adapter never returns.
pub trait ResetPort {
    fn restart(&mut self);
}
