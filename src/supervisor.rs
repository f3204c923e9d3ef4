//! Link supervisor.
//!
//! Accumulates [`LinkFault`]s in a bitmask. Boot faults are fatal on the
//! spot; publish failures are counted and only escalate once
//! `max_publish_failures` consecutive publishes have failed.
//!
//! ## Restart lifecycle
//!
//! 1. A step fails and records its fault.
//! 2. [`LinkSupervisor::should_restart`] reports the escalation.
//! 3. [`restart_device`] tears the data call down, waits
//!    `restart_settle_secs`, and resets the chip.
//!
//! A successful publish clears [`LinkFault::Publish`] and the counter.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::app::ports::{NetworkLink, ResetPort};
use crate::config::GatewayConfig;
use crate::error::LinkFault;

pub struct LinkSupervisor {
    faults: u8,
    publish_failures: u8,
    max_publish_failures: u8,
}

impl LinkSupervisor {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            faults: 0,
            publish_failures: 0,
            max_publish_failures: config.max_publish_failures.max(1),
        }
    }

    /// Record a fault. Returns `true` when it calls for a restart.
    pub fn record(&mut self, fault: LinkFault) -> bool {
        if self.faults & fault.mask() == 0 {
            error!("LINK FAULT SET: {fault}");
        }
        self.faults |= fault.mask();

        if fault == LinkFault::Publish {
            self.publish_failures = self.publish_failures.saturating_add(1);
            warn!(
                "Supervisor: publish failure {}/{}",
                self.publish_failures, self.max_publish_failures
            );
        }
        self.should_restart()
    }

    pub fn clear(&mut self, fault: LinkFault) {
        if self.faults & fault.mask() != 0 {
            info!("LINK FAULT CLEARED: {fault}");
        }
        self.faults &= !fault.mask();
        if fault == LinkFault::Publish {
            self.publish_failures = 0;
        }
    }

    pub fn faults(&self) -> u8 {
        self.faults
    }

    pub fn has_fault(&self, fault: LinkFault) -> bool {
        self.faults & fault.mask() != 0
    }

    /// The fault that escalated, if any.
    pub fn escalated(&self) -> Option<LinkFault> {
        LinkFault::ALL.into_iter().find(|&fault| {
            self.has_fault(fault)
                && (fault != LinkFault::Publish
                    || self.publish_failures >= self.max_publish_failures)
        })
    }

    pub fn should_restart(&self) -> bool {
        self.escalated().is_some()
    }
}

/// Shut the link down, let the modem settle, then reset the chip.
pub fn restart_device(
    link: &mut dyn NetworkLink,
    reset: &mut dyn ResetPort,
    settle_secs: u32,
    delay: &mut impl DelayNs,
) {
    warn!("Supervisor: restarting in {settle_secs} s");
    link.shut_down();
    delay.delay_ms(settle_secs * 1_000);
    reset.restart();
}
