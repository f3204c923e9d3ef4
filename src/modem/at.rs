//! AT command engine for the cellular modem UART.
//!
//! One transaction writes `AT<command>\r\n` and then polls the channel
//! until a reply line starts with the success or failure token, or the
//! timeout expires:
//!
//! ```text
//!   write ──▶ ┌─ poll every poll_ms ───────────────────────────┐
//!             │  line == echo of command     → drop            │
//!             │  line starts with success    → Success         │
//!             │  line starts with failure    → Error           │
//!             │  other line                  → keep, continue  │
//!             └─ elapsed >= timeout          → Timeout ────────┘
//! ```
//!
//! The engine never fails: undecodable lines are dropped and serial
//! errors end the transaction as a `Timeout`.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::{Clock, SerialPort, SerialSettings};

pub const DEFAULT_SUCCESS: &str = "OK";
pub const DEFAULT_FAILURE: &str = "+CME ERROR";

const LINE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    Timeout,
}

/// Result of one AT transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemReply {
    pub outcome: Outcome,
    /// Trimmed reply lines in arrival order, echo excluded.
    pub lines: Vec<String>,
    pub elapsed_ms: u64,
}

impl ModemReply {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// First line starting with `prefix`.
    pub fn line_starting_with(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .find(|line| line.starts_with(prefix))
    }
}

pub struct AtEngine<S, D, C> {
    serial: S,
    delay: D,
    clock: C,
    poll_ms: u32,
    default_timeout_ms: u64,
    pending: heapless::Vec<u8, LINE_CAPACITY>,
}

impl<S: SerialPort, D: DelayNs, C: Clock> AtEngine<S, D, C> {
    pub fn new(serial: S, delay: D, clock: C, poll_ms: u32, default_timeout_ms: u64) -> Self {
        Self {
            serial,
            delay,
            clock,
            poll_ms,
            default_timeout_ms,
            pending: heapless::Vec::new(),
        }
    }

    /// Send with the default timeout and tokens.
    pub fn send(&mut self, command: &str) -> ModemReply {
        self.send_command(
            command,
            self.default_timeout_ms,
            DEFAULT_SUCCESS,
            DEFAULT_FAILURE,
        )
    }

    /// Send with a custom timeout and the default tokens.
    pub fn send_timeout(&mut self, command: &str, timeout_ms: u64) -> ModemReply {
        self.send_command(command, timeout_ms, DEFAULT_SUCCESS, DEFAULT_FAILURE)
    }

    /// Run one AT transaction.
    pub fn send_command(
        &mut self,
        command: &str,
        timeout_ms: u64,
        success: &str,
        failure: &str,
    ) -> ModemReply {
        let echo = format!("AT{command}");
        let start = self.clock.now_ms();
        let mut lines = Vec::new();

        let framed = format!("{echo}\r\n");
        if let Err(e) = self.serial.write(framed.as_bytes()) {
            warn!("AT: write of {echo} failed: {e:?}");
            return self.finish(Outcome::Timeout, lines, start);
        }

        loop {
            if let Err(e) = self.fill() {
                warn!("AT: read during {echo} failed: {e:?}");
                return self.finish(Outcome::Timeout, lines, start);
            }

            while let Some(raw) = self.next_line() {
                let Ok(text) = core::str::from_utf8(&raw) else {
                    debug!("AT: dropped undecodable line ({} bytes)", raw.len());
                    continue;
                };
                let text = text.trim();
                if text.is_empty() || text.ends_with(echo.as_str()) {
                    continue;
                }
                lines.push(text.to_owned());
                if text.starts_with(success) {
                    return self.finish(Outcome::Success, lines, start);
                }
                if text.starts_with(failure) {
                    return self.finish(Outcome::Error, lines, start);
                }
            }

            if self.clock.now_ms().saturating_sub(start) >= timeout_ms {
                if let Ok(partial) = core::str::from_utf8(&self.pending) {
                    let partial = partial.trim();
                    if !partial.is_empty() {
                        lines.push(partial.to_owned());
                    }
                }
                self.pending.clear();
                return self.finish(Outcome::Timeout, lines, start);
            }
            self.delay.delay_ms(self.poll_ms);
        }
    }

    /// Write raw bytes with no prefix or terminator (`+++` escape).
    pub fn write_raw(&mut self, bytes: &[u8]) -> bool {
        self.serial.write(bytes).is_ok()
    }

    /// Discard everything the modem has sent so far.
    pub fn discard_input(&mut self) {
        let mut chunk = [0u8; 64];
        while self.serial.available() > 0 {
            match self.serial.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        self.pending.clear();
    }

    /// Re-open the channel with `settings`, dropping buffered input.
    pub fn reopen(&mut self, settings: &SerialSettings) -> bool {
        self.pending.clear();
        match self.serial.reconfigure(settings) {
            Ok(()) => true,
            Err(e) => {
                warn!("AT: reconfigure failed: {e:?}");
                false
            }
        }
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Give the channel back (PPP takes it over once the data call is up).
    pub fn into_serial(self) -> S {
        self.serial
    }

    fn finish(&self, outcome: Outcome, lines: Vec<String>, start: u64) -> ModemReply {
        let elapsed_ms = self.clock.now_ms().saturating_sub(start);
        debug!("AT: {outcome:?} after {elapsed_ms} ms: {lines:?}");
        ModemReply {
            outcome,
            lines,
            elapsed_ms,
        }
    }

    fn fill(&mut self) -> Result<(), S::Error> {
        let mut chunk = [0u8; 64];
        while self.serial.available() > 0 && !self.pending.is_full() {
            let room = (LINE_CAPACITY - self.pending.len()).min(chunk.len());
            let n = self.serial.read(&mut chunk[..room])?;
            if n == 0 {
                break;
            }
            let _ = self.pending.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Pop one `\n`-terminated line; a full buffer with no newline is
    /// returned whole so an unterminated flood cannot stall the engine.
    fn next_line(&mut self) -> Option<heapless::Vec<u8, LINE_CAPACITY>> {
        let end = match self.pending.iter().position(|&b| b == b'\n') {
            Some(i) => i + 1,
            None if self.pending.is_full() => self.pending.len(),
            None => return None,
        };
        let line = heapless::Vec::from_slice(&self.pending[..end]).ok()?;
        let rest: heapless::Vec<u8, LINE_CAPACITY> =
            heapless::Vec::from_slice(&self.pending[end..]).ok()?;
        self.pending = rest;
        Some(line)
    }
}
