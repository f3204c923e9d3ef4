//! GPIO / UART assignments for the gateway board.
//!
//! Single source of truth: every adapter and driver references this
//! module rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Controller bus (RS-485 transceiver, Modbus RTU)
// ---------------------------------------------------------------------------

/// UART peripheral wired to the refrigeration controller.
pub const CONTROLLER_UART: u8 = 2;
pub const CONTROLLER_RX_GPIO: i32 = 32;
pub const CONTROLLER_TX_GPIO: i32 = 33;

// ---------------------------------------------------------------------------
// Cellular modem
// ---------------------------------------------------------------------------

/// UART peripheral wired to the modem AT/PPP port.
pub const MODEM_UART: u8 = 1;
pub const MODEM_RX_GPIO: i32 = 26;
pub const MODEM_TX_GPIO: i32 = 27;

/// Digital output: HIGH = modem powered.
pub const MODEM_POWER_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// Line settings
// ---------------------------------------------------------------------------

/// Both buses run 9600 8N1.
pub const BUS_BAUD: u32 = 9_600;

/// UART driver RX ring buffer (bytes).
pub const UART_RX_BUFFER: usize = 1_024;
