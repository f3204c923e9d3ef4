//! On-board peripheral drivers.

pub mod modem_power;
pub mod watchdog;
