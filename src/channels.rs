//! Inbound command channel.
//!
//! The telemetry bus delivers inbound messages on its own context through
//! a plain function callback. [`deliver_inbound`] copies the payload into
//! a bounded `embassy-sync` channel; the frequent-poll duty drains it
//! while it holds the bus lock, so command register I/O never interleaves
//! with polling.
//!
//! ```text
//! ┌──────────────┐  InboundCommand  ┌────────────────────┐
//! │ bus callback │─────────────────▶│ frequent-poll duty │
//! └──────────────┘                  └────────────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

/// Largest command payload accepted (`w,<reg>,<value>` fits easily).
pub const MAX_COMMAND_LEN: usize = 64;

const COMMAND_DEPTH: usize = 4;

pub struct InboundCommand {
    pub payload: Vec<u8, MAX_COMMAND_LEN>,
}

pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, InboundCommand, COMMAND_DEPTH> =
    Channel::new();

/// Receive callback registered with the telemetry bus.
pub fn deliver_inbound(topic: &str, payload: &[u8]) {
    let Ok(payload) = Vec::from_slice(payload) else {
        warn!("Channel: {}-byte command on {topic} too large, dropped", payload.len());
        return;
    };
    if COMMAND_CHANNEL.try_send(InboundCommand { payload }).is_err() {
        warn!("Channel: command queue full, dropping message on {topic}");
    }
}

/// Next queued command, if any.
pub fn try_next() -> Option<InboundCommand> {
    COMMAND_CHANNEL.try_receive().ok()
}
