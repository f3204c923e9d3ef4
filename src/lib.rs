//! ColdLink gateway firmware library.
//!
//! Exposes the protocol engines, the gateway core and the adapters for
//! integration testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod channels;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod modbus;
pub mod modem;
pub mod registers;
pub mod scheduler;
pub mod supervisor;
pub mod tasks;

pub mod adapters;
pub mod drivers;
pub mod pins;
