//! Mock hardware for integration tests.
//!
//! A register-table Modbus slave, a scripted AT modem, a manual clock and
//! recording versions of the broker, link, reset and event ports. Every
//! mock hands out cheap clones sharing one state so tests can keep a
//! handle after moving the mock into the code under test.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use coldlink::app::events::AppEvent;
use coldlink::app::ports::{
    BusError, Clock, EventSink, NetworkLink, QoS, ReceiveCallback, ResetPort, SerialPort,
    SerialSettings, TelemetryBus,
};
use coldlink::codec::WallTime;
use coldlink::modbus::crc::crc16;
use embedded_hal::delay::DelayNs;

// ── Clock ─────────────────────────────────────────────────────

/// Manual clock; every delay advances it.
#[derive(Clone, Default)]
pub struct FakeClock {
    now_ms: Rc<Cell<u64>>,
    wall: Rc<Cell<Option<WallTime>>>,
}

#[allow(dead_code)]
impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_secs(&self, secs: u64) {
        self.now_ms.set(self.now_ms.get() + secs * 1_000);
    }

    pub fn set_wall(&self, wall: WallTime) {
        self.wall.set(Some(wall));
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn wall_time(&self) -> Option<WallTime> {
        self.wall.get()
    }
}

impl DelayNs for FakeClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ms.set(self.now_ms.get() + u64::from(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now_ms.set(self.now_ms.get() + u64::from(ms));
    }
}

// ── Modbus slave ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveMode {
    Normal,
    /// Never answers.
    Silent,
    /// Answers with the last CRC byte flipped.
    Corrupt,
}

struct SlaveState {
    address: u8,
    registers: HashMap<u16, u16>,
    mode: SlaveMode,
    rx: VecDeque<u8>,
    requests: Vec<[u8; 8]>,
}

/// Refrigeration controller answering function 0x03 and 0x06 from a
/// register table. Unknown registers answer exception 0x02.
#[derive(Clone)]
pub struct MockController {
    state: Rc<RefCell<SlaveState>>,
}

#[allow(dead_code)]
impl MockController {
    pub fn new(address: u8) -> Self {
        Self {
            state: Rc::new(RefCell::new(SlaveState {
                address,
                registers: HashMap::new(),
                mode: SlaveMode::Normal,
                rx: VecDeque::new(),
                requests: Vec::new(),
            })),
        }
    }

    /// Controller of the first family with model "T39" and serial 1234567.
    pub fn type_a(address: u8) -> Self {
        let slave = Self::new(address);
        slave.set_model("T39");
        // 0x12D687 == 1234567, split as the unpadded words 1, 2d, 687.
        slave.set(0xCF44, 0x0001);
        slave.set(0xCF43, 0x002D);
        slave.set(0xCF42, 0x0687);
        slave.set(0xCF12, 3);
        slave.set(0xCF13, 14);
        slave.set(0x0200, 40);
        slave.set(0x0201, -55i16 as u16);
        slave.set(0x020E, 0);
        slave.set(0x0207, 0);
        slave.set(0x0299, 0);
        slave.set(0x0210, 0);
        slave.set(0x2809, 0);
        slave
    }

    pub fn set_model(&self, model: &str) {
        let mut chars = model.chars().map(|c| c as u16).chain(core::iter::repeat(0));
        for register in coldlink::registers::IDENTIFICATION {
            self.set(register, chars.next().unwrap_or(0));
        }
    }

    pub fn set(&self, register: u16, value: u16) {
        self.state.borrow_mut().registers.insert(register, value);
    }

    pub fn get(&self, register: u16) -> Option<u16> {
        self.state.borrow().registers.get(&register).copied()
    }

    pub fn set_mode(&self, mode: SlaveMode) {
        self.state.borrow_mut().mode = mode;
    }

    /// Number of requests seen on the wire.
    pub fn request_count(&self) -> usize {
        self.state.borrow().requests.len()
    }

    pub fn write_count(&self) -> usize {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|r| r[1] == 0x06)
            .count()
    }

    /// Queue bytes that arrive late, ahead of the next request.
    pub fn inject_stale(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes);
    }
}

fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

impl SlaveState {
    fn answer(&mut self, request: [u8; 8]) -> Option<Vec<u8>> {
        if request[0] != self.address || crc16(&request[..6]).to_le_bytes() != [request[6], request[7]] {
            return None;
        }
        let register = u16::from_be_bytes([request[2], request[3]]);
        let argument = u16::from_be_bytes([request[4], request[5]]);

        let reply = match request[1] {
            0x03 => {
                let mut words = Vec::new();
                for offset in 0..argument {
                    match self.registers.get(&register.wrapping_add(offset)) {
                        Some(value) => words.extend_from_slice(&value.to_be_bytes()),
                        None => return Some(with_crc(vec![self.address, 0x83, 0x02])),
                    }
                }
                let mut frame = vec![self.address, 0x03, words.len() as u8];
                frame.extend(words);
                with_crc(frame)
            }
            0x06 => {
                self.registers.insert(register, argument);
                request.to_vec()
            }
            other => with_crc(vec![self.address, other | 0x80, 0x01]),
        };
        Some(reply)
    }
}

impl SerialPort for MockController {
    type Error = ();

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        let mut state = self.state.borrow_mut();
        let Ok(request) = <[u8; 8]>::try_from(data) else {
            return Ok(data.len());
        };
        state.requests.push(request);

        let mode = state.mode;
        if mode == SlaveMode::Silent {
            return Ok(data.len());
        }
        if let Some(mut reply) = state.answer(request) {
            if mode == SlaveMode::Corrupt {
                if let Some(last) = reply.last_mut() {
                    *last ^= 0xFF;
                }
            }
            state.rx.extend(reply);
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut state = self.state.borrow_mut();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn available(&self) -> usize {
        self.state.borrow().rx.len()
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn reconfigure(&mut self, _: &SerialSettings) -> Result<(), ()> {
        self.state.borrow_mut().rx.clear();
        Ok(())
    }
}

// ── AT modem ──────────────────────────────────────────────────

#[derive(Default)]
struct ModemState {
    scripts: HashMap<String, VecDeque<String>>,
    rx: VecDeque<u8>,
    commands: Vec<String>,
    reconfigured: usize,
}

/// Modem that answers each `AT<cmd>` from a per-command script.
///
/// Scripted replies are consumed in order; an empty reply means silence.
/// Unscripted commands answer `OK`.
#[derive(Clone, Default)]
pub struct MockModem {
    state: Rc<RefCell<ModemState>>,
}

#[allow(dead_code)]
impl MockModem {
    pub fn new() -> Self {
        Self::default()
    }

    /// A modem that brings the data call up on the second request.
    pub fn healthy() -> Self {
        let modem = Self::new();
        modem.script("+GSN", &["861234567890123\r\nOK"]);
        modem.script("+CCID", &["8944500102198304826\r\nOK"]);
        modem.script("+CSQ", &["+CSQ: 17,0\r\nOK"]);
        modem.script("+CGDATA=\"PPP\",1", &["NO CARRIER", "CONNECT", ""]);
        modem
    }

    pub fn script(&self, command: &str, replies: &[&str]) {
        self.state.borrow_mut().scripts.insert(
            command.to_owned(),
            replies.iter().map(|r| (*r).to_owned()).collect(),
        );
    }

    /// Commands received, without the `AT` prefix and line ending.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    pub fn reconfigured(&self) -> usize {
        self.state.borrow().reconfigured
    }
}

impl SerialPort for MockModem {
    type Error = ();

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        let text = String::from_utf8_lossy(data);
        let Some(command) = text.strip_prefix("AT").map(|c| c.trim_end().to_owned()) else {
            return Ok(data.len());
        };

        let mut state = self.state.borrow_mut();
        state.commands.push(command.clone());
        let reply = state
            .scripts
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| "OK".to_owned());
        if !reply.is_empty() {
            let framed = format!("AT{command}\r\n{reply}\r\n");
            state.rx.extend(framed.bytes());
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut state = self.state.borrow_mut();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn available(&self) -> usize {
        self.state.borrow().rx.len()
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn reconfigure(&mut self, _: &SerialSettings) -> Result<(), ()> {
        let mut state = self.state.borrow_mut();
        state.rx.clear();
        state.reconfigured += 1;
        Ok(())
    }
}

/// Modem power line that remembers its level.
#[derive(Clone, Default)]
pub struct MockPowerLine {
    pub high: Rc<Cell<bool>>,
    pub toggles: Rc<Cell<u32>>,
}

impl embedded_hal::digital::ErrorType for MockPowerLine {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for MockPowerLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        self.toggles.set(self.toggles.get() + 1);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(true);
        self.toggles.set(self.toggles.get() + 1);
        Ok(())
    }
}

// ── Broker ────────────────────────────────────────────────────

#[derive(Default)]
struct BusState {
    connected: Option<String>,
    subscribed: Vec<String>,
    published: Vec<(String, String, QoS)>,
    failing: bool,
}

#[derive(Clone, Default)]
pub struct RecordingBus {
    state: Rc<RefCell<BusState>>,
}

#[allow(dead_code)]
impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    /// `(topic, payload, qos)` of every accepted publish.
    pub fn published(&self) -> Vec<(String, String, QoS)> {
        self.state.borrow().published.clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.state
            .borrow()
            .published
            .iter()
            .map(|(_, p, _)| p.clone())
            .collect()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.state.borrow().subscribed.clone()
    }
}

impl TelemetryBus for RecordingBus {
    fn connect(&mut self, client_id: &str) -> Result<(), BusError> {
        self.state.borrow_mut().connected = Some(client_id.to_owned());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), BusError> {
        let mut state = self.state.borrow_mut();
        if state.failing {
            return Err(BusError::Transport);
        }
        state.published.push((
            topic.to_owned(),
            String::from_utf8_lossy(payload).into_owned(),
            qos,
        ));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        self.state.borrow_mut().subscribed.push(topic.to_owned());
        Ok(())
    }

    fn set_receive_callback(&mut self, _: ReceiveCallback) {}
}

// ── Link and reset ────────────────────────────────────────────

#[derive(Clone)]
pub struct RecordingLink {
    pub up: Rc<Cell<bool>>,
    pub shut_down: Rc<Cell<bool>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self {
            up: Rc::new(Cell::new(true)),
            shut_down: Rc::new(Cell::new(false)),
        }
    }
}

impl NetworkLink for RecordingLink {
    fn is_up(&self) -> bool {
        self.up.get()
    }

    fn describe(&self) -> String {
        "('10.64.64.64', '255.255.255.255', '10.64.64.64', '8.8.8.8')".into()
    }

    fn sync_time(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn shut_down(&mut self) {
        self.shut_down.set(true);
    }
}

#[derive(Clone, Default)]
pub struct RecordingReset {
    pub restarts: Rc<Cell<u32>>,
}

impl ResetPort for RecordingReset {
    fn restart(&mut self) {
        self.restarts.set(self.restarts.get() + 1);
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
