//! Device reset adapter.
//!
//! Implements [`ResetPort`]. On ESP-IDF this calls `esp_restart()` and
//! never returns; the simulation only records the request.

use log::error;

use crate::app::ports::ResetPort;

#[derive(Default)]
pub struct SystemReset {
    #[cfg(not(target_os = "espidf"))]
    requested: bool,
}

impl SystemReset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a restart was requested (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn requested(&self) -> bool {
        self.requested
    }
}

impl ResetPort for SystemReset {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        error!("System: reset");
        // SAFETY: esp_restart has no preconditions; it does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        error!("System(sim): reset requested");
        self.requested = true;
    }
}
