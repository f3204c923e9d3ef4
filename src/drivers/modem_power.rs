//! Modem power line driver.
//!
//! The modem supply is switched by a single GPIO. The session state
//! machine drives it through the `embedded-hal` [`OutputPin`] trait.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: configures the pin as a push-pull output and writes the
//! level with raw sys calls.
//! On host/test: tracks the level in-memory only.

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

/// GPIO call failed with the given ESP-IDF return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLineError(pub i32);

impl embedded_hal::digital::Error for PowerLineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct ModemPower {
    pin: i32,
    high: bool,
}

impl ModemPower {
    /// Configure `pin` as an output, initially low (modem off).
    #[cfg(target_os = "espidf")]
    pub fn new(pin: i32) -> Result<Self, PowerLineError> {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: one-time configuration of a pin nothing else owns.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(PowerLineError(ret));
        }
        let mut line = Self { pin, high: true };
        line.write(false)?;
        info!("ModemPower: GPIO{} configured", pin);
        Ok(line)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(pin: i32) -> Result<Self, PowerLineError> {
        log::info!("ModemPower(sim): GPIO{}", pin);
        Ok(Self { pin, high: false })
    }

    pub fn is_on(&self) -> bool {
        self.high
    }

    #[cfg(target_os = "espidf")]
    fn write(&mut self, high: bool) -> Result<(), PowerLineError> {
        // SAFETY: the pin was configured as an output in `new`.
        let ret = unsafe { gpio_set_level(self.pin, u32::from(high)) };
        if ret != ESP_OK as i32 {
            return Err(PowerLineError(ret));
        }
        self.high = high;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&mut self, high: bool) -> Result<(), PowerLineError> {
        log::debug!("ModemPower(sim): GPIO{} -> {}", self.pin, high);
        self.high = high;
        Ok(())
    }
}

impl ErrorType for ModemPower {
    type Error = PowerLineError;
}

impl OutputPin for ModemPower {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}
