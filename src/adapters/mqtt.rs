//! MQTT telemetry bus adapter.
//!
//! Implements [`TelemetryBus`] over the ESP-IDF MQTT client. The session
//! rides on the PPP interface, so it is only opened once the link is up.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`;
//!   inbound `Received` events are forwarded to the registered callback.
//! - **all other targets**: simulation that logs and records publishes.

use log::{info, warn};

use crate::app::ports::{BusError, QoS, ReceiveCallback, TelemetryBus};
use crate::config::GatewayConfig;

/// Broker endpoint and credentials.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub keepalive_secs: u16,
}

impl From<&GatewayConfig> for BrokerSettings {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            url: format!(
                "{}://{}:{}",
                if cfg.broker_tls { "mqtts" } else { "mqtt" },
                cfg.broker_host,
                cfg.broker_port
            ),
            user: cfg.broker_user.clone(),
            password: cfg.broker_password.clone(),
            keepalive_secs: cfg.broker_keepalive_secs,
        }
    }
}

pub struct MqttBus {
    settings: BrokerSettings,
    callback: Option<ReceiveCallback>,
    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(not(target_os = "espidf"))]
    connected: bool,
    #[cfg(not(target_os = "espidf"))]
    published: Vec<(String, Vec<u8>)>,
}

impl MqttBus {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            callback: None,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            connected: false,
            #[cfg(not(target_os = "espidf"))]
            published: Vec::new(),
        }
    }

    /// Messages published so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }

    /// Hand an inbound message to the registered callback (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        match self.callback {
            Some(cb) => cb(topic, payload),
            None => warn!("MQTT(sim): no receive callback for {}", topic),
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, client_id: &str) -> Result<(), BusError> {
        use core::time::Duration;
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};

        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            username: (!self.settings.user.is_empty()).then_some(self.settings.user.as_str()),
            password: (!self.settings.password.is_empty())
                .then_some(self.settings.password.as_str()),
            keep_alive_interval: Some(Duration::from_secs(u64::from(
                self.settings.keepalive_secs,
            ))),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };

        let callback = self.callback;
        let client = EspMqttClient::new_cb(&self.settings.url, &conf, move |event| {
            match event.payload() {
                EventPayload::Received { topic, data, .. } => {
                    if let Some(cb) = callback {
                        cb(topic.unwrap_or(""), data);
                    }
                }
                EventPayload::Connected(_) => info!("MQTT: connected"),
                EventPayload::Disconnected => warn!("MQTT: disconnected"),
                EventPayload::Error(e) => warn!("MQTT: {:?}", e),
                _ => {}
            }
        })
        .map_err(|e| {
            warn!("MQTT: client start failed: {}", e);
            BusError::Transport
        })?;

        self.client = Some(client);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, client_id: &str) -> Result<(), BusError> {
        info!("MQTT(sim): {} as {}", self.settings.url, client_id);
        self.connected = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), BusError> {
        let client = self.client.as_mut().ok_or(BusError::NotConnected)?;
        client
            .publish(topic, map_qos(qos), false, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: publish to {} failed: {}", topic, e);
                BusError::Transport
            })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        log::debug!("MQTT(sim): {} {:?} {} bytes", topic, qos, payload.len());
        self.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        let client = self.client.as_mut().ok_or(BusError::NotConnected)?;
        client
            .subscribe(topic, map_qos(QoS::AtMostOnce))
            .map(|_| ())
            .map_err(|_| BusError::Rejected)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        info!("MQTT(sim): subscribed {}", topic);
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
fn map_qos(qos: QoS) -> esp_idf_svc::mqtt::client::QoS {
    match qos {
        QoS::AtMostOnce => esp_idf_svc::mqtt::client::QoS::AtMostOnce,
        QoS::AtLeastOnce => esp_idf_svc::mqtt::client::QoS::AtLeastOnce,
    }
}

impl TelemetryBus for MqttBus {
    fn connect(&mut self, client_id: &str) -> Result<(), BusError> {
        self.platform_connect(client_id)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), BusError> {
        self.platform_publish(topic, payload, qos)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        self.platform_subscribe(topic)
    }

    fn set_receive_callback(&mut self, callback: ReceiveCallback) {
        self.callback = Some(callback);
    }
}
