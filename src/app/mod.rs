//! Application core: gateway logic behind port traits.
//!
//! The service folds controller readings into payloads and answers remote
//! commands; the boot steps bring the link up. All interaction with the
//! UARTs, the PPP interface and the broker happens through the **port
//! traits** in [`ports`], so this layer runs on the host under test.

pub mod boot;
pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
