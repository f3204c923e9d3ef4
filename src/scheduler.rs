//! Duty cadences.
//!
//! Each gateway duty runs on its own self-correcting period: the time
//! spent doing the work is subtracted from the sleep, so a slow Modbus
//! exchange does not push every later poll back.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  period start                                    next start  │
//! │  ├── work (elapsed) ──┤──────── remaining ─────────┤         │
//! │                                                              │
//! │  FrequentPoll   every frequent_poll_interval_secs            │
//! │  LongPoll       every long_poll_interval_secs                │
//! │  Flush          send_interval_secs - flush_lead_secs, then   │
//! │                 wait for the batch-ready signal              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use core::time::Duration;

use log::info;

use crate::config::GatewayConfig;

// ═══════════════════════════════════════════════════════════════
//  Duty identity
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duty {
    /// Door, alert mask and malfunction indicator.
    FrequentPoll,
    /// Temperatures (and compressor) into the batch buffer.
    LongPoll,
    /// Publish the batch.
    Flush,
}

impl Duty {
    pub const ALL: [Self; 3] = [Self::FrequentPoll, Self::LongPoll, Self::Flush];

    pub fn label(self) -> &'static str {
        match self {
            Self::FrequentPoll => "frequent-poll",
            Self::LongPoll => "long-poll",
            Self::Flush => "flush",
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Cadence
// ═══════════════════════════════════════════════════════════════

/// A fixed period that absorbs the time spent in each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period: Duration,
    started_ms: u64,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started_ms: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of an iteration.
    pub fn begin(&mut self, now_ms: u64) {
        self.started_ms = now_ms;
    }

    /// Sleep owed until the next iteration; zero once the work overran.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        let elapsed = Duration::from_millis(now_ms.saturating_sub(self.started_ms));
        self.period.saturating_sub(elapsed)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Plan
// ═══════════════════════════════════════════════════════════════

/// The cadence of every duty, derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePlan {
    pub frequent: Cadence,
    pub long: Cadence,
    pub flush: Cadence,
}

impl SchedulePlan {
    pub fn new(config: &GatewayConfig) -> Self {
        let secs = |s: u32| Duration::from_secs(u64::from(s));
        let plan = Self {
            frequent: Cadence::new(secs(config.frequent_poll_interval_secs)),
            long: Cadence::new(secs(config.long_poll_interval_secs)),
            flush: Cadence::new(secs(
                config
                    .send_interval_secs
                    .saturating_sub(config.flush_lead_secs),
            )),
        };
        for duty in Duty::ALL {
            info!(
                "Scheduler: {} every {:?}",
                duty.label(),
                plan.cadence(duty).period()
            );
        }
        plan
    }

    pub fn cadence(&self, duty: Duty) -> Cadence {
        match duty {
            Duty::FrequentPoll => self.frequent,
            Duty::LongPoll => self.long,
            Duty::Flush => self.flush,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
