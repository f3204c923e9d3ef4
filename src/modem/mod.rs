//! Cellular modem control over its AT command UART.
//!
//! [`at`] runs single command/reply transactions; [`session`] sequences
//! them into power-up, network setup and the PPP data call.

pub mod at;
pub mod session;

pub use at::{AtEngine, ModemReply, Outcome};
pub use session::{ModemSession, SessionSettings, SessionState, SignalCategory, SignalQuality};
