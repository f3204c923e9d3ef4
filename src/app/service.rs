//! Gateway service: the hexagonal core.
//!
//! [`GatewayService`] owns everything the three gateway duties share: the
//! encoded temperature buffer, the optional compressor-duration run, and
//! the last seen door, alert and compressor states. Polling results come
//! in as immutable records; what goes out is payload text and
//! [`AppEvent`]s. Register I/O happens only through the
//! [`ControllerService`] passed into [`GatewayService::handle_command`].
//!
//! ```text
//!  FrequentPoll ──▶ ┌──────────────────────────┐ ──▶ door event ("C" / "c")
//!  Temperatures ──▶ │      GatewayService      │ ──▶ batch ("T" + tokens)
//!  command text ──▶ │  buffer · last states    │ ──▶ command reply
//!                   └──────────────────────────┘ ──▶ EventSink
//! ```

use embedded_hal::delay::DelayNs;
use log::{info, warn};
use serde_json::{Map, Value};

use crate::codec::{self, WallTime};
use crate::config::GatewayConfig;
use crate::controller::{
    AlertFlags, ControllerIdentity, ControllerService, DoorState, FrequentPoll, Temperatures,
};
use crate::modbus::RegisterValue;

use super::commands::{DISPATCH_ERROR, NOT_RECOGNIZED, RemoteCommand};
use super::events::{Alert, AppEvent};
use super::ports::{EventSink, NetworkLink, SerialPort};

/// Leading tag of a temperature batch.
pub const BATCH_TAG: char = 'T';
pub const DOOR_OPEN_EVENT: char = 'C';
pub const DOOR_CLOSED_EVENT: char = 'c';

/// What the caller must do after a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Publish this text back to the broker.
    Reply(String),
    /// Run the restart sequence.
    Restart,
}

// ───────────────────────────────────────────────────────────────
// GatewayService
// ───────────────────────────────────────────────────────────────

pub struct GatewayService {
    identity: ControllerIdentity,
    command_topic: String,
    batch_chars: usize,
    track_compressor: bool,
    timestamp_payloads: bool,

    temperatures: String,
    durations: String,

    door: DoorState,
    alerts: AlertFlags,
    compressor: Option<bool>,
    long_poll_started_secs: u64,
}

impl GatewayService {
    pub fn new(config: &GatewayConfig, identity: ControllerIdentity) -> Self {
        let command_topic = format!("{}-C", identity.serial);
        Self {
            identity,
            command_topic,
            batch_chars: config.batch_chars(),
            track_compressor: config.track_compressor,
            timestamp_payloads: config.timestamp_payloads,
            temperatures: String::with_capacity(config.batch_chars()),
            durations: String::new(),
            door: DoorState::Closed,
            alerts: AlertFlags::default(),
            compressor: None,
            long_poll_started_secs: 0,
        }
    }

    /// Uplink topic: the controller serial number.
    pub fn topic(&self) -> &str {
        &self.identity.serial
    }

    /// Inbound command topic.
    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.identity
    }

    pub fn tracks_compressor(&self) -> bool {
        self.track_compressor
    }

    /// Encoded temperatures collected since the last flush.
    pub fn buffer(&self) -> &str {
        &self.temperatures
    }

    pub fn start(&self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started {
            variant: self.identity.variant,
            serial: self.identity.serial.clone(),
        });
        info!(
            "Gateway: polling {} {} (firmware {})",
            self.identity.model, self.identity.serial, self.identity.firmware
        );
    }

    // ── Frequent poll ─────────────────────────────────────────

    /// Fold one frequent poll into the last seen state.
    ///
    /// Returns the door event to publish when the door changed.
    pub fn on_frequent_poll(
        &mut self,
        poll: FrequentPoll,
        wall: Option<WallTime>,
        sink: &mut impl EventSink,
    ) -> Option<String> {
        self.update_alerts(poll.alerts, sink);

        let code = match poll.door {
            DoorState::Unknown => {
                sink.emit(&AppEvent::DoorUnreadable);
                return None;
            }
            door if door == self.door => return None,
            DoorState::Open => DOOR_OPEN_EVENT,
            DoorState::Closed => DOOR_CLOSED_EVENT,
        };
        self.door = poll.door;
        sink.emit(&AppEvent::DoorChanged { to: poll.door, code });

        let mut event = String::from(code);
        if let Some(stamp) = self.stamp(wall) {
            event.push_str(&stamp);
        }
        Some(event)
    }

    fn update_alerts(&mut self, now: AlertFlags, sink: &mut impl EventSink) {
        let pairs = [
            (Alert::HighTemp, self.alerts.high_temp, now.high_temp),
            (Alert::LowTemp, self.alerts.low_temp, now.low_temp),
            (Alert::DoorOpen, self.alerts.door_open, now.door_open),
            (Alert::Malfunction, self.alerts.malfunction, now.malfunction),
        ];
        for (alert, before, after) in pairs {
            match (before, after) {
                (false, true) => sink.emit(&AppEvent::AlertRaised(alert)),
                (true, false) => sink.emit(&AppEvent::AlertCleared(alert)),
                _ => {}
            }
        }
        self.alerts = now;
    }

    /// Record a compressor reading; a change appends a duration token
    /// measured from the start of the current long-poll period.
    pub fn on_compressor(&mut self, running: Option<bool>, now_secs: u64, sink: &mut impl EventSink) {
        let Some(running) = running else {
            return;
        };
        let previous = self.compressor.replace(running);
        if previous.is_some_and(|was| was != running) {
            let token = codec::encode_duration(self.long_poll_started_secs, now_secs, running);
            self.durations.push_str(&token);
            sink.emit(&AppEvent::CompressorChanged { running, token });
        }
    }

    // ── Long poll ─────────────────────────────────────────────

    pub fn mark_long_poll_start(&mut self, now_secs: u64) {
        self.long_poll_started_secs = now_secs;
    }

    /// Append one temperature pair. A pair with a missing reading is
    /// skipped whole so the batch stays in cabinet/evaporator lockstep.
    ///
    /// Returns `true` once the buffer holds a full batch.
    pub fn append_temperatures(&mut self, temps: Temperatures, sink: &mut impl EventSink) -> bool {
        match (temps.cabinet, temps.evaporator) {
            (RegisterValue::Value(cabinet), RegisterValue::Value(evaporator)) => {
                self.temperatures.push_str(&codec::encode(cabinet));
                self.temperatures.push_str(&codec::encode(evaporator));
            }
            _ => {
                warn!("Gateway: temperature read incomplete {temps:?}");
                sink.emit(&AppEvent::ReadingSkipped);
            }
        }

        let ready = self.is_batch_ready();
        if ready {
            sink.emit(&AppEvent::BatchReady {
                chars: self.temperatures.len(),
            });
        }
        ready
    }

    pub fn is_batch_ready(&self) -> bool {
        self.temperatures.len() >= self.batch_chars
    }

    // ── Flush ─────────────────────────────────────────────────

    /// The batch payload for the current buffer, `None` when empty.
    ///
    /// Nothing is cleared here; call [`commit_flush`](Self::commit_flush)
    /// once the bus has accepted the payload.
    pub fn pending_payload(&self, wall: Option<WallTime>) -> Option<String> {
        if self.temperatures.is_empty() && self.durations.is_empty() {
            return None;
        }
        let mut payload = String::with_capacity(1 + 6 + self.temperatures.len() + self.durations.len());
        payload.push(BATCH_TAG);
        if let Some(stamp) = self.stamp(wall) {
            payload.push_str(&stamp);
        }
        payload.push_str(&self.temperatures);
        payload.push_str(&self.durations);
        Some(payload)
    }

    pub fn commit_flush(&mut self, published_bytes: usize, sink: &mut impl EventSink) {
        self.temperatures.clear();
        self.durations.clear();
        sink.emit(&AppEvent::PayloadPublished {
            bytes: published_bytes,
        });
    }

    fn stamp(&self, wall: Option<WallTime>) -> Option<heapless::String<6>> {
        if self.timestamp_payloads {
            wall.map(|w| codec::encode_timestamp(&w))
        } else {
            None
        }
    }

    // ── Remote commands ───────────────────────────────────────

    /// Parse and execute one inbound command.
    pub fn handle_command<S, D>(
        &mut self,
        payload: &[u8],
        controller: &mut ControllerService<S, D>,
        link: &dyn NetworkLink,
        sink: &mut impl EventSink,
    ) -> CommandOutcome
    where
        S: SerialPort,
        D: DelayNs,
    {
        let command = match RemoteCommand::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Gateway: command rejected: {e}");
                return CommandOutcome::Reply(DISPATCH_ERROR.to_owned());
            }
        };
        info!("Gateway: command {command:?}");
        sink.emit(&AppEvent::CommandHandled {
            command: command.name(),
        });

        let reply = match command {
            RemoteCommand::Read { register } => controller.read_register(register).to_string(),
            RemoteCommand::Write { register, value } => match controller.write(register, value) {
                Ok(ack) => format!("e: {}", ack.signed_value()),
                Err(e) => {
                    warn!("Gateway: write {register:#06x} failed: {e}");
                    "e: none".to_owned()
                }
            },
            RemoteCommand::Dump => self.dump(controller),
            RemoteCommand::LinkInfo => link.describe(),
            RemoteCommand::Restart => return CommandOutcome::Restart,
            RemoteCommand::Unknown => NOT_RECOGNIZED.to_owned(),
        };
        CommandOutcome::Reply(reply)
    }

    fn dump<S: SerialPort, D: DelayNs>(&self, controller: &mut ControllerService<S, D>) -> String {
        let mut params = Map::new();
        for (name, value) in controller.dump_parameters() {
            params.insert(name.to_owned(), register_json(value));
        }

        let mut root = Map::new();
        root.insert("RCU Type".into(), Value::String(self.identity.model.clone()));
        root.insert("RCU Serial".into(), Value::String(self.identity.serial.clone()));
        root.insert(
            "RCU Firmware".into(),
            Value::String(self.identity.firmware.to_string()),
        );
        root.insert("RCU Parameters".into(), Value::Object(params));

        serde_json::to_string(&Value::Object(root)).unwrap_or_else(|_| DISPATCH_ERROR.to_owned())
    }
}

fn register_json(value: RegisterValue) -> Value {
    match value {
        RegisterValue::Value(v) => Value::from(v),
        RegisterValue::NoReply | RegisterValue::Malformed => Value::Null,
    }
}
