//! Long-poll watchdog.
//!
//! The long-poll duty is the heartbeat: it feeds once per temperature
//! read. If it stops (bus lock never released, executor wedged) the ESP-IDF
//! Task Watchdog Timer panics the chip after
//! [`GatewayConfig::watchdog_timeout_ms`](crate::config::GatewayConfig::watchdog_timeout_ms).
//!
//! The last feed time is tracked on every target so the host build can
//! check for an overdue heartbeat in tests.

use core::cell::Cell;

use log::{info, warn};

pub struct Watchdog {
    timeout_ms: u32,
    last_feed_ms: Cell<Option<u64>>,
    armed: bool,
}

impl Watchdog {
    /// Arm the TWDT for the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        let armed = arm(timeout_ms);
        if armed {
            info!("Watchdog: armed ({timeout_ms} ms, panic on trigger)");
        }
        Self {
            timeout_ms,
            last_feed_ms: Cell::new(None),
            armed,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Record a heartbeat at `now_ms`.
    pub fn feed(&self, now_ms: u64) {
        self.last_feed_ms.set(Some(now_ms));
        if self.armed {
            reset_timer();
        }
    }

    /// `true` once a fed watchdog has gone a full timeout without a feed.
    pub fn is_overdue(&self, now_ms: u64) -> bool {
        self.last_feed_ms
            .get()
            .is_some_and(|last| now_ms.saturating_sub(last) >= u64::from(self.timeout_ms))
    }
}

// ── Platform ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn arm(timeout_ms: u32) -> bool {
    use esp_idf_svc::sys::{
        ESP_OK, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_reconfigure,
    };

    let cfg = esp_task_wdt_config_t {
        timeout_ms,
        idle_core_mask: 0,
        trigger_panic: true,
    };
    // SAFETY: plain configuration calls on the running task.
    let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
    if ret != ESP_OK {
        warn!("Watchdog: reconfigure returned {ret}, keeping existing TWDT");
    }
    let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
    if ret != ESP_OK {
        warn!("Watchdog: subscribe failed ({ret})");
    }
    ret == ESP_OK
}

#[cfg(target_os = "espidf")]
fn reset_timer() {
    // SAFETY: only called after this task subscribed.
    unsafe {
        esp_idf_svc::sys::esp_task_wdt_reset();
    }
}

#[cfg(not(target_os = "espidf"))]
fn arm(timeout_ms: u32) -> bool {
    warn!("Watchdog(sim): not armed ({timeout_ms} ms)");
    false
}

#[cfg(not(target_os = "espidf"))]
fn reset_timer() {}
