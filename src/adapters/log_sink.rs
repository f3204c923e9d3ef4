//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to the UART console in production).
//! Level follows severity: raised alerts warn, restarts are errors.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { variant, serial } => {
                info!("START | controller={:?} serial={}", variant, serial);
            }
            AppEvent::DoorChanged { to, code } => {
                info!("DOOR | {:?} ('{}')", to, code);
            }
            AppEvent::DoorUnreadable => {
                warn!("DOOR | unreadable");
            }
            AppEvent::AlertRaised(alert) => {
                warn!("ALERT | {:?} active", alert);
            }
            AppEvent::AlertCleared(alert) => {
                info!("ALERT | {:?} cleared", alert);
            }
            AppEvent::CompressorChanged { running, token } => {
                info!(
                    "COMPRESSOR | {} | token={}",
                    if *running { "on" } else { "off" },
                    token
                );
            }
            AppEvent::ReadingSkipped => {
                warn!("TEMP | reading skipped");
            }
            AppEvent::BatchReady { chars } => {
                info!("BATCH | ready ({} chars)", chars);
            }
            AppEvent::PayloadPublished { bytes } => {
                info!("PUBLISH | {} bytes", bytes);
            }
            AppEvent::PublishFailed(e) => {
                warn!("PUBLISH | failed: {}", e);
            }
            AppEvent::CommandHandled { command } => {
                info!("COMMAND | {}", command);
            }
            AppEvent::RestartRequested(Some(fault)) => {
                error!("RESTART | {}", fault);
            }
            AppEvent::RestartRequested(None) => {
                error!("RESTART | remote request");
            }
        }
    }
}
