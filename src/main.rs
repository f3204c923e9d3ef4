//! ColdLink Gateway Firmware: Main Entry Point
//!
//! Hexagonal architecture: protocol engines and the gateway core behind
//! port traits, ESP-IDF adapters on the outside.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartChannel ×2   Esp32Time      MqttBus        PppLink        │
//! │  (SerialPort)     (Clock+Delay)  (TelemetryBus) (NetworkLink)  │
//! │  ModemPower       SystemReset    LogEventSink   Watchdog       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  ModbusMaster · ControllerService · AtEngine · Session │    │
//! │  │  GatewayService (payloads, commands)                   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Gateway tasks (frequent · long · flush) · LinkSupervisor      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::rc::Rc;

use anyhow::{Result, anyhow};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use log::{error, info};

use coldlink::adapters::link::PppLink;
use coldlink::adapters::log_sink::LogEventSink;
use coldlink::adapters::mqtt::{BrokerSettings, MqttBus};
use coldlink::adapters::serial::UartChannel;
use coldlink::adapters::system::SystemReset;
use coldlink::adapters::time::Esp32TimeAdapter;
use coldlink::app::boot;
use coldlink::app::ports::{NetworkLink, ResetPort};
use coldlink::app::service::GatewayService;
use coldlink::channels;
use coldlink::config::GatewayConfig;
use coldlink::controller::ControllerService;
use coldlink::drivers::modem_power::ModemPower;
use coldlink::drivers::watchdog::Watchdog;
use coldlink::error::Error;
use coldlink::modbus::ModbusMaster;
use coldlink::modem::{AtEngine, ModemSession, SessionSettings};
use coldlink::pins;
use coldlink::supervisor;
use coldlink::tasks::{self, Gateway, Platform};
use embedded_hal::delay::DelayNs;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  ColdLink v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = GatewayConfig::default();
    config.validate()?;

    let peripherals = Peripherals::take()?;
    let mut time = Esp32TimeAdapter::new();
    let mut reset = SystemReset::new();
    let uart_config = UartConfig::new().baudrate(Hertz(pins::BUS_BAUD));

    // ── 2. Modem bring-up ─────────────────────────────────────
    let modem_uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio27,
        peripherals.pins.gpio26,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let modem_power = ModemPower::new(pins::MODEM_POWER_GPIO)
        .map_err(|e| anyhow!("modem power line: {:?}", e))?;
    let at = AtEngine::new(
        UartChannel::new("modem", modem_uart),
        time.clone(),
        time.clone(),
        config.at_poll_ms,
        config.at_timeout_ms,
    );
    let mut session = ModemSession::new(at, modem_power, SessionSettings::from(&config));
    if let Err(fault) = boot::bring_up_modem(&mut session) {
        reboot(fault.into(), None, &mut reset, &mut time, config.restart_settle_secs);
    }

    // ── 3. PPP link + wall clock ──────────────────────────────
    let mut link = PppLink::new(session.release())?;
    let link_ready = boot::await_link(&link, config.ppp_settle_ms, &mut time).and_then(|()| {
        boot::sync_time(
            &mut link,
            config.ntp_attempts,
            config.ntp_retry_delay_secs * 1_000,
            &mut time,
        )
    });
    if let Err(fault) = link_ready {
        reboot(fault.into(), Some(&mut link), &mut reset, &mut time, config.restart_settle_secs);
    }

    // ── 4. Controller identification ──────────────────────────
    let controller_uart = UartDriver::new(
        peripherals.uart2,
        peripherals.pins.gpio33,
        peripherals.pins.gpio32,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let master = ModbusMaster::new(
        UartChannel::new("controller", controller_uart),
        time.clone(),
        config.modbus_settle_ms,
    );
    let mut controller =
        ControllerService::new(master, config.slave_address, config.inter_request_pause_ms);
    let identity = match boot::identify_controller(&mut controller, &config) {
        Ok(identity) => identity,
        Err(fault) => {
            reboot(fault.into(), Some(&mut link), &mut reset, &mut time, config.restart_settle_secs);
        }
    };

    // ── 5. Broker ─────────────────────────────────────────────
    let mut bus = MqttBus::new(BrokerSettings::from(&config));
    if let Err(fault) = boot::connect_bus(&mut bus, &identity.serial, channels::deliver_inbound) {
        reboot(fault.into(), Some(&mut link), &mut reset, &mut time, config.restart_settle_secs);
    }

    // ── 6. Gateway duties ─────────────────────────────────────
    let service = GatewayService::new(&config, identity);
    let gateway = Rc::new(Gateway::new(
        &config,
        service,
        tasks::Peripherals { controller, bus },
        Platform {
            clock: time,
            link: Box::new(link),
            reset: Box::new(reset),
            sink: LogEventSink::new(),
            watchdog: Watchdog::new(config.watchdog_timeout_ms()),
        },
    ));

    info!("System ready. Entering gateway loop.");
    gateway.run();

    // The reset port does not return on hardware.
    Ok(())
}

/// Boot-time fatal path: tear the link down if there is one, then reset.
fn reboot(
    cause: Error,
    link: Option<&mut dyn NetworkLink>,
    reset: &mut SystemReset,
    time: &mut Esp32TimeAdapter,
    settle_secs: u32,
) -> ! {
    error!("Boot: {cause}, restarting");
    match link {
        Some(link) => supervisor::restart_device(link, reset, settle_secs, time),
        None => {
            time.delay_ms(settle_secs * 1_000);
            reset.restart();
        }
    }
    #[allow(clippy::empty_loop)]
    loop {}
}
