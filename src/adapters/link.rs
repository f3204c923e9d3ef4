//! PPP network link adapter.
//!
//! Implements [`NetworkLink`]: the IP interface layered over the modem's
//! data call, plus SNTP for the wall clock.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: a PPP client `EspNetif` driven by the
//!   modem UART (PPPoS), plus `EspSntp`.
//! - **all other targets**: simulation that holds the modem channel and
//!   has a settable link state.

use log::{info, warn};

use crate::adapters::serial::UartChannel;
use crate::app::ports::{BusError, NetworkLink};

/// SNTP status polls per sync attempt.
#[cfg(target_os = "espidf")]
const SNTP_POLLS: u32 = 10;
#[cfg(target_os = "espidf")]
const SNTP_POLL_MS: u32 = 500;

/// PPP receive pump: read slice and wait per read.
#[cfg(target_os = "espidf")]
const PPP_RX_CHUNK: usize = 256;
#[cfg(target_os = "espidf")]
const PPP_RX_WAIT_MS: u64 = 20;
#[cfg(target_os = "espidf")]
const PPP_RX_STACK: usize = 4 * 1024;

#[cfg(target_os = "espidf")]
type PppDriver = esp_idf_svc::netif::EspNetifDriver<'static, esp_idf_svc::netif::EspNetif>;

pub struct PppLink {
    #[cfg(target_os = "espidf")]
    driver: Option<std::sync::Arc<PppDriver>>,
    #[cfg(target_os = "espidf")]
    running: std::sync::Arc<core::sync::atomic::AtomicBool>,
    #[cfg(target_os = "espidf")]
    rx_task: Option<std::thread::JoinHandle<()>>,
    #[cfg(target_os = "espidf")]
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
    #[cfg(not(target_os = "espidf"))]
    transport: Option<UartChannel>,
    #[cfg(not(target_os = "espidf"))]
    up: bool,
}

impl PppLink {
    /// Bring up PPP over the modem channel released from data mode.
    ///
    /// The UART is split: the netif transmit hook owns the TX half and a
    /// receive thread feeds everything from the RX half into the netif.
    #[cfg(target_os = "espidf")]
    pub fn new(modem: UartChannel) -> Result<Self, esp_idf_svc::sys::EspError> {
        use core::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        use esp_idf_hal::delay::TickType;
        use esp_idf_svc::netif::{EspNetif, EspNetifDriver, NetifConfiguration};
        use esp_idf_svc::sys::{
            ESP_ERR_NO_MEM, EspError, esp, esp_netif_ppp_config_t, esp_netif_ppp_set_params,
        };

        let (mut tx, rx) = modem.into_driver().into_split();
        let netif = EspNetif::new_with_conf(&NetifConfiguration::ppp_default_client())?;
        let mut driver = EspNetifDriver::new(
            netif,
            |netif| {
                let params = esp_netif_ppp_config_t {
                    ppp_phase_event_enabled: true,
                    ppp_error_event_enabled: true,
                    ..Default::default()
                };
                // SAFETY: the handle is live for the duration of the call.
                esp!(unsafe { esp_netif_ppp_set_params(netif.handle(), &params) })
            },
            move |frame| tx.write(frame).map(|_| ()),
        )?;
        driver.start()?;
        let driver = Arc::new(driver);

        let running = Arc::new(AtomicBool::new(true));
        let rx_task = {
            let driver = driver.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("ppp-rx".into())
                .stack_size(PPP_RX_STACK)
                .spawn(move || {
                    let wait = TickType::new_millis(PPP_RX_WAIT_MS).ticks();
                    let mut buf = [0u8; PPP_RX_CHUNK];
                    while running.load(Ordering::Relaxed) {
                        match rx.read(&mut buf, wait) {
                            Ok(0) => {}
                            Ok(n) => {
                                if let Err(e) = driver.rx(&buf[..n]) {
                                    warn!("PPP: netif rejected {n} bytes: {e}");
                                }
                            }
                            Err(e) => warn!("PPP: UART read failed: {e}"),
                        }
                    }
                    info!("PPP: receive pump stopped");
                })
                .map_err(|_| EspError::from_infallible::<{ ESP_ERR_NO_MEM as i32 }>())?
        };

        info!("PPP: interface attached to modem UART");
        Ok(Self {
            driver: Some(driver),
            running,
            rx_task: Some(rx_task),
            sntp: None,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(modem: UartChannel) -> Result<Self, BusError> {
        info!("PPP(sim): interface attached to {} channel", modem.name());
        Ok(Self {
            transport: Some(modem),
            up: true,
        })
    }

    /// Force the simulated link state.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_up(&mut self, up: bool) {
        self.up = up;
    }

    /// Name of the serial channel carrying PPP, while attached.
    #[cfg(not(target_os = "espidf"))]
    pub fn transport(&self) -> Option<&'static str> {
        self.transport.as_ref().map(UartChannel::name)
    }
}

#[cfg(target_os = "espidf")]
impl NetworkLink for PppLink {
    fn is_up(&self) -> bool {
        self.driver
            .as_ref()
            .and_then(|d| d.netif().get_ip_info().ok())
            .is_some_and(|info| !info.ip.is_unspecified())
    }

    fn describe(&self) -> String {
        let Some(info) = self
            .driver
            .as_ref()
            .and_then(|d| d.netif().get_ip_info().ok())
        else {
            return "link down".into();
        };
        format!(
            "('{}', '{}', '{}', '{}')",
            info.ip,
            info.subnet.mask,
            info.subnet.gateway,
            info.dns.map(|d| d.to_string()).unwrap_or_default()
        )
    }

    fn sync_time(&mut self) -> Result<(), BusError> {
        use esp_idf_svc::sntp::{EspSntp, SyncStatus};

        if self.sntp.is_none() {
            self.sntp = Some(EspSntp::new_default().map_err(|e| {
                warn!("SNTP: start failed: {}", e);
                BusError::Transport
            })?);
        }
        let Some(sntp) = self.sntp.as_ref() else {
            return Err(BusError::Transport);
        };
        for _ in 0..SNTP_POLLS {
            if sntp.get_sync_status() == SyncStatus::Completed {
                info!("SNTP: synced");
                return Ok(());
            }
            esp_idf_hal::delay::FreeRtos::delay_ms(SNTP_POLL_MS);
        }
        Err(BusError::Transport)
    }

    fn shut_down(&mut self) {
        info!("PPP: shutting down");
        self.sntp = None;
        self.running
            .store(false, core::sync::atomic::Ordering::Relaxed);
        if let Some(task) = self.rx_task.take() {
            let _ = task.join();
        }
        self.driver = None;
    }
}

#[cfg(not(target_os = "espidf"))]
impl NetworkLink for PppLink {
    fn is_up(&self) -> bool {
        self.up
    }

    fn describe(&self) -> String {
        if self.up {
            "('10.64.64.64', '255.255.255.255', '10.64.64.1', '8.8.8.8')".into()
        } else {
            "link down".into()
        }
    }

    fn sync_time(&mut self) -> Result<(), BusError> {
        if self.up {
            info!("SNTP(sim): synced");
            Ok(())
        } else {
            warn!("SNTP(sim): link down");
            Err(BusError::NotConnected)
        }
    }

    fn shut_down(&mut self) {
        info!("PPP(sim): shutting down");
        self.up = false;
        self.transport = None;
    }
}
