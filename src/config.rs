//! Gateway configuration parameters
//!
//! Every tunable for the gateway: poll cadence, controller bus pacing,
//! modem timings, carrier and broker settings. Loading and persisting the
//! values is up to the platform; the firmware ships with [`Default`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    // --- Cadence ---
    /// Door/alert polling period (seconds)
    pub frequent_poll_interval_secs: u32,
    /// Temperature polling period (seconds)
    pub long_poll_interval_secs: u32,
    /// Payload publish period (seconds)
    pub send_interval_secs: u32,
    /// How long before the send deadline the flush task starts waiting for a full buffer
    pub flush_lead_secs: u32,
    /// Temperature pairs per published batch
    pub batch_readings: u16,

    // --- Controller bus ---
    /// Modbus slave address of the controller
    pub slave_address: u8,
    /// Wait after a request before collecting the reply (milliseconds)
    pub modbus_settle_ms: u32,
    /// Gap between consecutive requests (milliseconds)
    pub inter_request_pause_ms: u32,
    /// Extra bus hold after a poll batch (milliseconds)
    pub post_poll_hold_ms: u32,
    /// Identification attempts before giving up
    pub identify_attempts: u8,
    /// Delay between identification attempts (seconds)
    pub identify_retry_delay_secs: u32,

    // --- Modem ---
    pub apn: String,
    /// Default AT reply timeout (milliseconds)
    pub at_timeout_ms: u64,
    /// AT reply polling period (milliseconds)
    pub at_poll_ms: u32,
    /// Power line settle time (milliseconds)
    pub modem_power_settle_ms: u32,
    /// Boot time after power-on (milliseconds)
    pub modem_boot_settle_ms: u32,
    /// Timeout for the bare `AT` probes (milliseconds)
    pub modem_probe_timeout_ms: u64,
    /// `+GSN` identification attempts
    pub modem_identify_retries: u8,
    /// Network registration wait before `+CSQ` (milliseconds)
    pub signal_settle_ms: u32,
    /// First data-call request timeout (milliseconds)
    pub data_call_timeout_ms: u64,
    /// Second data-call request window; a timeout here means data mode (milliseconds)
    pub data_call_confirm_ms: u64,
    pub data_call_attempts: u8,

    // --- Link ---
    /// Wait for the PPP interface to come up (milliseconds)
    pub ppp_settle_ms: u32,
    pub ntp_attempts: u8,
    pub ntp_retry_delay_secs: u32,
    /// Wait between link teardown and reset (seconds)
    pub restart_settle_secs: u32,
    /// Consecutive publish failures tolerated before restarting
    pub max_publish_failures: u8,

    // --- Broker ---
    pub broker_host: String,
    pub broker_port: u16,
    /// Connect over TLS (`mqtts://`), verified against the IDF CA bundle
    pub broker_tls: bool,
    pub broker_user: String,
    pub broker_password: String,
    pub broker_keepalive_secs: u16,

    // --- Optional payload content ---
    /// Append compressor on/off duration tokens after the temperature run
    pub track_compressor: bool,
    /// Prefix batches and door events with a wall-clock stamp
    pub timestamp_payloads: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            // Cadence
            frequent_poll_interval_secs: 3,
            long_poll_interval_secs: 60,
            send_interval_secs: 600,
            flush_lead_secs: 30,
            batch_readings: 10,

            // Controller bus
            slave_address: 1,
            modbus_settle_ms: 100,
            inter_request_pause_ms: 200,
            post_poll_hold_ms: 100,
            identify_attempts: 3,
            identify_retry_delay_secs: 10,

            // Modem
            apn: "m2minternet.apn".into(),
            at_timeout_ms: 10_000,
            at_poll_ms: 20,
            modem_power_settle_ms: 1_000,
            modem_boot_settle_ms: 7_000,
            modem_probe_timeout_ms: 1_000,
            modem_identify_retries: 3,
            signal_settle_ms: 4_000,
            data_call_timeout_ms: 5_000,
            data_call_confirm_ms: 1_000,
            data_call_attempts: 3,

            // Link
            ppp_settle_ms: 6_000,
            ntp_attempts: 3,
            ntp_retry_delay_secs: 3,
            restart_settle_secs: 10,
            max_publish_failures: 3,

            // Broker
            broker_host: "broker.local".into(),
            broker_port: 8883,
            broker_tls: true,
            broker_user: String::new(),
            broker_password: String::new(),
            broker_keepalive_secs: 120,

            track_compressor: false,
            timestamp_payloads: false,
        }
    }
}

impl GatewayConfig {
    /// Characters in a full temperature batch (two readings, two chars each).
    pub fn batch_chars(&self) -> usize {
        usize::from(self.batch_readings) * 4
    }

    /// Task watchdog timeout: one missed long poll plus margin.
    pub fn watchdog_timeout_ms(&self) -> u32 {
        (self.long_poll_interval_secs + 120) * 1_000
    }

    /// Reject settings that would stall or spin the scheduler.
    pub fn validate(&self) -> Result<()> {
        if self.frequent_poll_interval_secs == 0
            || self.long_poll_interval_secs == 0
            || self.send_interval_secs == 0
        {
            return Err(Error::Config("poll intervals must be non-zero"));
        }
        if self.flush_lead_secs >= self.send_interval_secs {
            return Err(Error::Config("flush lead must be shorter than send interval"));
        }
        if self.batch_readings == 0 {
            return Err(Error::Config("batch must hold at least one reading"));
        }
        if self.apn.is_empty() {
            return Err(Error::Config("APN is empty"));
        }
        if self.broker_host.is_empty() {
            return Err(Error::Config("broker host is empty"));
        }
        Ok(())
    }
}
