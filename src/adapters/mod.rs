//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements        | Connects to                  |
//! |------------|-------------------|------------------------------|
//! | `serial`   | SerialPort        | ESP32 UART driver            |
//! | `time`     | Clock, DelayNs    | ESP32 system timer, FreeRTOS |
//! | `mqtt`     | TelemetryBus      | ESP-IDF MQTT client          |
//! | `link`     | NetworkLink       | PPP netif, SNTP              |
//! | `system`   | ResetPort         | `esp_restart()`              |
//! | `log_sink` | EventSink         | Serial log output            |

pub mod link;
pub mod log_sink;
pub mod mqtt;
pub mod serial;
pub mod system;
pub mod time;
