//! Outbound application events.
//!
//! The [`GatewayService`](super::service::GatewayService) and the gateway
//! tasks emit these through the [`EventSink`](super::ports::EventSink)
//! port. The production sink writes them to the log; tests record them.

use crate::controller::DoorState;
use crate::error::LinkFault;
use crate::registers::ControllerVariant;

use super::ports::BusError;

/// One of the alarm conditions decoded from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    HighTemp,
    LowTemp,
    DoorOpen,
    Malfunction,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Polling started against an identified controller.
    Started {
        variant: ControllerVariant,
        serial: String,
    },

    /// The door switched state (carries the published event character).
    DoorChanged { to: DoorState, code: char },

    /// The door register could not be read or held an unexpected value.
    DoorUnreadable,

    AlertRaised(Alert),
    AlertCleared(Alert),

    /// Compressor switched; `token` was appended to the duration run.
    CompressorChanged { running: bool, token: heapless::String<2> },

    /// A temperature pair could not be read and was left out of the batch.
    ReadingSkipped,

    /// The temperature buffer reached its batch size.
    BatchReady { chars: usize },

    /// A batch payload was handed to the broker and the buffer cleared.
    PayloadPublished { bytes: usize },

    /// A publish failed; the buffer was kept.
    PublishFailed(BusError),

    /// A remote command was answered.
    CommandHandled { command: &'static str },

    /// The device is restarting: a link fault exhausted its budget, or
    /// `None` when a remote `restart` command asked for it.
    RestartRequested(Option<LinkFault>),
}
