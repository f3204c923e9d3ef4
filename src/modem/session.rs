//! Modem session state machine.
//!
//! ```text
//!  PoweredOff ──power_cycle──▶ Booting ──initialize──▶ Initialized
//!                                                        │ configure_apn_and_network
//!                                                        ▼
//!  DataCallActive ◀──establish_data_call── DataCallRequested ◀── SignalChecked
//!        ▲                         │
//!        │                         └──▶ Degraded (call not confirmed)
//!   (any failure past the retry budget) ──▶ Failed ──▶ device restart
//! ```
//!
//! Only this machine changes the session state. It never loops forever:
//! every step has a bounded retry count, and `Failed` is handed to the
//! supervisor, which restarts the whole device.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use crate::app::ports::{Clock, SerialPort, SerialSettings};
use crate::config::GatewayConfig;
use crate::error::ModemError;

use super::at::{AtEngine, DEFAULT_FAILURE, Outcome};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    PoweredOff = 0,
    Booting = 1,
    Initialized = 2,
    SignalChecked = 3,
    DataCallRequested = 4,
    DataCallActive = 5,
    Degraded = 6,
    Failed = 7,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::PoweredOff => "PoweredOff",
            Self::Booting => "Booting",
            Self::Initialized => "Initialized",
            Self::SignalChecked => "SignalChecked",
            Self::DataCallRequested => "DataCallRequested",
            Self::DataCallActive => "DataCallActive",
            Self::Degraded => "Degraded",
            Self::Failed => "Failed",
        }
    }

    /// The modem has answered identification and is ready for network commands.
    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            Self::Initialized
                | Self::SignalChecked
                | Self::DataCallRequested
                | Self::DataCallActive
                | Self::Degraded
        )
    }
}

// ---------------------------------------------------------------------------
// Signal quality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalCategory {
    Poor,
    Ok,
    Good,
    Excellent,
}

impl SignalCategory {
    pub fn from_rssi(rssi: u8) -> Self {
        match rssi {
            0..10 => Self::Poor,
            10..15 => Self::Ok,
            15..20 => Self::Good,
            _ => Self::Excellent,
        }
    }
}

/// `+CSQ` reading on the 0..31 scale (99 = not detectable, never stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    pub rssi: u8,
    pub category: SignalCategory,
}

impl SignalQuality {
    /// Strength as a percentage of the usable 0..28 range.
    pub fn percent(self) -> u8 {
        (u16::from(self.rssi) * 100 / 28).min(100) as u8
    }
}

/// Parse `+CSQ: <rssi>,<ber>`.
pub fn parse_csq(line: &str) -> Option<SignalQuality> {
    let (_, values) = line.split_once(':')?;
    let rssi: u8 = values.split(',').next()?.trim().parse().ok()?;
    if rssi == 99 || rssi > 31 {
        return None;
    }
    Some(SignalQuality {
        rssi,
        category: SignalCategory::from_rssi(rssi),
    })
}

// ---------------------------------------------------------------------------
// Timings
// ---------------------------------------------------------------------------

/// Modem timings and carrier settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub apn: String,
    pub power_settle_ms: u32,
    pub boot_settle_ms: u32,
    pub probe_timeout_ms: u64,
    pub identify_retries: u8,
    pub signal_settle_ms: u32,
    pub data_call_timeout_ms: u64,
    pub data_call_confirm_ms: u64,
    pub data_call_attempts: u8,
    pub escape_guard_ms: u32,
    pub restart_timeout_ms: u64,
}

impl From<&GatewayConfig> for SessionSettings {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            apn: cfg.apn.clone(),
            power_settle_ms: cfg.modem_power_settle_ms,
            boot_settle_ms: cfg.modem_boot_settle_ms,
            probe_timeout_ms: cfg.modem_probe_timeout_ms,
            identify_retries: cfg.modem_identify_retries,
            signal_settle_ms: cfg.signal_settle_ms,
            data_call_timeout_ms: cfg.data_call_timeout_ms,
            data_call_confirm_ms: cfg.data_call_confirm_ms,
            data_call_attempts: cfg.data_call_attempts,
            escape_guard_ms: 1_000,
            restart_timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct ModemSession<S, D, C, P> {
    at: AtEngine<S, D, C>,
    power: P,
    settings: SessionSettings,
    state: SessionState,
    imei: Option<String>,
    iccid: Option<String>,
}

impl<S, D, C, P> ModemSession<S, D, C, P>
where
    S: SerialPort,
    D: DelayNs,
    C: Clock,
    P: OutputPin,
{
    pub fn new(at: AtEngine<S, D, C>, power: P, settings: SessionSettings) -> Self {
        Self {
            at,
            power,
            settings,
            state: SessionState::PoweredOff,
            imei: None,
            iccid: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn imei(&self) -> Option<&str> {
        self.imei.as_deref()
    }

    pub fn iccid(&self) -> Option<&str> {
        self.iccid.as_deref()
    }

    // ── Lifecycle steps ───────────────────────────────────────

    /// Switch the modem off and on again and wait for it to boot.
    pub fn power_cycle(&mut self) {
        info!("Modem: power cycle");
        for _ in 0..2 {
            if self.power.set_low().is_err() {
                warn!("Modem: power line set_low failed");
            }
            self.at.delay_ms(self.settings.power_settle_ms);
        }

        self.at.discard_input();
        self.at.send_timeout("", 0);

        if self.power.set_high().is_err() {
            warn!("Modem: power line set_high failed");
        }
        self.at.delay_ms(self.settings.boot_settle_ms);
        self.at.discard_input();

        let probe = self.at.send("");
        if !probe.is_success() {
            warn!("Modem: boot probe {:?}", probe.outcome);
        }
        self.transition(SessionState::Booting);
    }

    /// Re-open the modem UART and confirm the modem identifies itself.
    pub fn initialize(&mut self) -> Result<(), ModemError> {
        self.require(self.state == SessionState::Booting)?;

        if !self.at.reopen(&SerialSettings::BUS_9600_8N1) {
            return self.fail(ModemError::Serial);
        }
        for _ in 0..2 {
            self.at.send_timeout("", self.settings.probe_timeout_ms);
        }
        self.at.send("+IPR=9600");

        let mut sim_error = false;
        for attempt in 1..=self.settings.identify_retries.max(1) {
            let sim = self.at.send("+CPIN?");
            sim_error = sim.outcome == Outcome::Error;

            let gsn = self.at.send("+GSN");
            if gsn.is_success() {
                self.imei = gsn
                    .lines
                    .iter()
                    .find(|l| !l.is_empty() && l.bytes().all(|b| b.is_ascii_digit()))
                    .cloned();
                info!("Modem: identified (IMEI {:?})", self.imei);
                self.transition(SessionState::Initialized);
                return Ok(());
            }
            warn!("Modem: +GSN {:?} (attempt {attempt})", gsn.outcome);
            self.at.delay_ms(self.settings.power_settle_ms);
        }

        self.fail(if sim_error {
            ModemError::SimNotReady
        } else {
            ModemError::IdentificationFailed
        })
    }

    /// Carrier and APN setup, in the order the modem firmware expects.
    ///
    /// Only the final ICCID check is fatal; the earlier commands are
    /// logged and tolerated because several of them answer `ERROR` when
    /// the setting is already in effect.
    pub fn configure_apn_and_network(&mut self) -> Result<(), ModemError> {
        self.require(self.state.is_initialized())?;

        let apn = self.settings.apn.clone();
        let commands = [
            "+CFUN=1".to_owned(),
            "+CMNB=1".to_owned(),
            format!("+CSTT=\"{apn}\",\"\",\"\""),
            format!("+CGDCONT=1,\"IP\",\"{apn}\""),
            "S7=10".to_owned(),
        ];
        for command in &commands {
            let reply = self.at.send(command);
            if !reply.is_success() {
                warn!("Modem: AT{command} -> {:?}", reply.outcome);
            }
        }

        let ccid = self.at.send("+CCID");
        if ccid.outcome == Outcome::Error {
            error!("Modem: ICCID check failed: {:?}", ccid.lines);
            return self.fail(ModemError::IccidRejected);
        }
        self.iccid = ccid.lines.iter().find(|l| l.as_str() != "OK").cloned();
        info!("Modem: network configured (APN {apn}, ICCID {:?})", self.iccid);
        Ok(())
    }

    /// Query `+CSQ` and bucket the result.
    pub fn signal_quality(&mut self) -> Result<SignalQuality, ModemError> {
        self.require(self.state.is_initialized())?;

        let reply = self.at.send("+CSQ");
        if self.state == SessionState::Initialized {
            self.transition(SessionState::SignalChecked);
        }
        let quality = reply
            .line_starting_with("+CSQ")
            .and_then(parse_csq)
            .ok_or(ModemError::SignalUnreadable)?;
        info!(
            "Modem: signal {:?} (rssi {}, {}%)",
            quality.category,
            quality.rssi,
            quality.percent()
        );
        Ok(quality)
    }

    /// Request the PPP data call.
    ///
    /// The first `+CGDATA` is expected to end in `NO CARRIER` or a timeout;
    /// the modem firmware only enters data mode on the second request. That
    /// second request timing out (no `OK`, no error, the line has switched
    /// to PPP framing) is the success signal.
    pub fn establish_data_call(&mut self) -> Result<(), ModemError> {
        self.require(self.state.is_initialized())?;
        self.transition(SessionState::DataCallRequested);

        let command = "+CGDATA=\"PPP\",1";
        let first = self.at.send_command(
            command,
            self.settings.data_call_timeout_ms,
            "NO CARRIER",
            DEFAULT_FAILURE,
        );
        info!("Modem: data call request 1 -> {:?}", first.outcome);

        let second = self.at.send_timeout(command, self.settings.data_call_confirm_ms);
        if second.outcome == Outcome::Timeout {
            self.transition(SessionState::DataCallActive);
            Ok(())
        } else {
            warn!("Modem: data call not confirmed ({:?} {:?})", second.outcome, second.lines);
            self.transition(SessionState::Degraded);
            Err(ModemError::DataCallFailed)
        }
    }

    /// Full bring-up: power cycle through an active data call.
    pub fn bring_up(&mut self) -> Result<(), ModemError> {
        self.power_cycle();
        self.initialize()?;
        self.configure_apn_and_network()?;

        self.at.delay_ms(self.settings.signal_settle_ms);
        if let Err(e) = self.signal_quality() {
            warn!("Modem: {e}, continuing");
        }

        for attempt in 1..=self.settings.data_call_attempts.max(1) {
            if self.establish_data_call().is_ok() {
                return Ok(());
            }
            warn!("Modem: data call attempt {attempt} failed");
        }
        self.fail(ModemError::DataCallFailed)
    }

    // ── Recovery helpers ──────────────────────────────────────

    /// Leave PPP data mode (`+++` with guard time on both sides).
    pub fn escape_data_mode(&mut self) {
        self.at.delay_ms(self.settings.escape_guard_ms);
        if !self.at.write_raw(b"+++") {
            warn!("Modem: escape write failed");
        }
        self.at.delay_ms(self.settings.escape_guard_ms);
        self.at.discard_input();
        if self.state == SessionState::DataCallActive {
            self.transition(SessionState::Degraded);
        }
    }

    /// Close IP sessions and reset the modem's radio stack in place.
    pub fn soft_restart(&mut self) -> Result<(), ModemError> {
        self.at.discard_input();
        self.at
            .send_command("+CIPSHUT", self.settings.data_call_timeout_ms, "SHUT OK", "ERROR");
        let reply = self.at.send_command(
            "+CFUN=1,1",
            self.settings.restart_timeout_ms,
            "SMS Ready",
            DEFAULT_FAILURE,
        );
        if reply.is_success() {
            self.transition(SessionState::Booting);
            Ok(())
        } else {
            self.fail(ModemError::RestartFailed)
        }
    }

    /// Hand the serial channel to the PPP interface.
    pub fn release(self) -> S {
        self.at.into_serial()
    }

    // ── Internal ──────────────────────────────────────────────

    fn require(&self, allowed: bool) -> Result<(), ModemError> {
        if allowed {
            Ok(())
        } else {
            warn!("Modem: operation not allowed in {}", self.state.name());
            Err(ModemError::InvalidState)
        }
    }

    fn fail(&mut self, err: ModemError) -> Result<(), ModemError> {
        error!("Modem: {err}");
        self.transition(SessionState::Failed);
        Err(err)
    }

    fn transition(&mut self, next: SessionState) {
        if next != self.state {
            info!("Session: {} -> {}", self.state.name(), next.name());
            self.state = next;
        }
    }
}
