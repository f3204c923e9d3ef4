//! Boot sequence steps.
//!
//! ```text
//!  bring_up_modem ─▶ await_link ─▶ sync_time ─▶ identify_controller ─▶ connect_bus
//! ```
//!
//! Every step is bounded and reports the [`LinkFault`] that should
//! restart the device when it gives up.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::config::GatewayConfig;
use crate::controller::{ControllerIdentity, ControllerService};
use crate::error::LinkFault;
use crate::modem::ModemSession;

use super::ports::{Clock, NetworkLink, ReceiveCallback, SerialPort, TelemetryBus};

/// Power the modem up and open the data call.
pub fn bring_up_modem<S, D, C, P>(session: &mut ModemSession<S, D, C, P>) -> Result<(), LinkFault>
where
    S: SerialPort,
    D: DelayNs,
    C: Clock,
    P: OutputPin,
{
    session.bring_up().map_err(|e| {
        warn!("Boot: modem bring-up failed: {e}");
        LinkFault::DataCall
    })?;
    info!(
        "Boot: data call active (IMEI {:?}, ICCID {:?})",
        session.imei(),
        session.iccid()
    );
    Ok(())
}

/// Identify the controller and read the identity every payload is keyed by.
///
/// An unrecognized model or an unreadable serial number is fatal: without
/// them the gateway has no register table and no topic.
pub fn identify_controller<S, D>(
    controller: &mut ControllerService<S, D>,
    config: &GatewayConfig,
) -> Result<ControllerIdentity, LinkFault>
where
    S: SerialPort,
    D: DelayNs,
{
    let variant = controller.identify(
        config.identify_attempts,
        config.identify_retry_delay_secs * 1_000,
    );
    if !variant.is_known() {
        warn!("Boot: controller not identified");
        return Err(LinkFault::Identification);
    }

    let Some(serial) = controller.read_serial() else {
        warn!("Boot: controller serial unreadable");
        return Err(LinkFault::Identification);
    };
    let firmware = controller.read_firmware();

    for (name, value) in controller.dump_parameters() {
        info!("Boot: {name} = {value}");
    }
    match controller.is_celsius() {
        Some(true) => info!("Boot: controller reports Celsius"),
        Some(false) => warn!("Boot: controller reports Fahrenheit"),
        None => warn!("Boot: temperature units unreadable"),
    }
    if let Some(lock) = controller.has_smart_lock() {
        info!("Boot: smart lock {}", if lock { "present" } else { "absent" });
    }

    Ok(ControllerIdentity {
        variant,
        model: controller.model().to_owned(),
        serial,
        firmware,
    })
}

/// Wait for the PPP interface to acquire an address.
pub fn await_link(
    link: &dyn NetworkLink,
    settle_ms: u32,
    delay: &mut impl DelayNs,
) -> Result<(), LinkFault> {
    delay.delay_ms(settle_ms);
    if link.is_up() {
        info!("Boot: link up ({})", link.describe());
        Ok(())
    } else {
        warn!("Boot: link down after {settle_ms} ms");
        Err(LinkFault::LinkDown)
    }
}

/// Set the wall clock over NTP, retrying a bounded number of times.
pub fn sync_time(
    link: &mut dyn NetworkLink,
    attempts: u8,
    retry_delay_ms: u32,
    delay: &mut impl DelayNs,
) -> Result<(), LinkFault> {
    for attempt in 1..=attempts.max(1) {
        match link.sync_time() {
            Ok(()) => {
                info!("Boot: time synced (attempt {attempt})");
                return Ok(());
            }
            Err(e) => warn!("Boot: NTP attempt {attempt} failed: {e}"),
        }
        if attempt < attempts {
            delay.delay_ms(retry_delay_ms);
        }
    }
    Err(LinkFault::TimeSync)
}

/// Connect to the broker as `serial` and subscribe to its command topic.
///
/// The receive callback is registered first: some clients bind it when
/// the session opens.
pub fn connect_bus(
    bus: &mut dyn TelemetryBus,
    serial: &str,
    on_receive: ReceiveCallback,
) -> Result<(), LinkFault> {
    bus.set_receive_callback(on_receive);
    bus.connect(serial).map_err(|e| {
        warn!("Boot: broker connect failed: {e}");
        LinkFault::BrokerConnect
    })?;

    let command_topic = format!("{serial}-C");
    bus.subscribe(&command_topic).map_err(|e| {
        warn!("Boot: subscribe to {command_topic} failed: {e}");
        LinkFault::BrokerConnect
    })?;
    info!("Boot: listening on {command_topic}");
    Ok(())
}
