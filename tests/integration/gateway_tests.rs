//! Gateway duty tests.
//!
//! Drive the `*_once` steps of [`Gateway`] against a mock controller and a
//! recording broker: batching and flush, door events, compressor
//! durations, remote commands and the restart paths.

use std::sync::Mutex;

use coldlink::app::boot;
use coldlink::app::events::AppEvent;
use coldlink::app::ports::{Clock, QoS};
use coldlink::app::service::GatewayService;
use coldlink::channels;
use coldlink::codec;
use coldlink::config::GatewayConfig;
use coldlink::controller::ControllerService;
use coldlink::drivers::watchdog::Watchdog;
use coldlink::error::LinkFault;
use coldlink::modbus::ModbusMaster;
use coldlink::tasks::{Gateway, Peripherals, Platform};
use edge_executor::LocalExecutor;
use futures_lite::future::{block_on, poll_once, yield_now};

use crate::mock_hw::{
    FakeClock, MockController, RecordingBus, RecordingLink, RecordingReset, RecordingSink,
};

/// The inbound command channel is process-wide; tests that run the
/// frequent poll (which drains it) take this lock.
static COMMAND_LOCK: Mutex<()> = Mutex::new(());

type TestGateway = Gateway<MockController, FakeClock, RecordingBus, FakeClock, RecordingSink>;

struct Rig {
    slave: MockController,
    bus: RecordingBus,
    clock: FakeClock,
    link: RecordingLink,
    reset: RecordingReset,
    gateway: TestGateway,
}

/// Zero bus pacing keeps the fake clock where the test puts it.
fn config() -> GatewayConfig {
    GatewayConfig {
        batch_readings: 2,
        modbus_settle_ms: 0,
        inter_request_pause_ms: 0,
        post_poll_hold_ms: 0,
        identify_retry_delay_secs: 0,
        restart_settle_secs: 0,
        max_publish_failures: 3,
        ..GatewayConfig::default()
    }
}

fn rig(config: &GatewayConfig, slave: MockController) -> Rig {
    let clock = FakeClock::new();
    let master = ModbusMaster::new(slave.clone(), clock.clone(), config.modbus_settle_ms);
    let mut controller =
        ControllerService::new(master, config.slave_address, config.inter_request_pause_ms);
    let identity = boot::identify_controller(&mut controller, config).expect("controller identifies");

    let mut bus = RecordingBus::new();
    boot::connect_bus(&mut bus, &identity.serial, channels::deliver_inbound).expect("bus connects");

    let link = RecordingLink::new();
    let reset = RecordingReset::default();
    let gateway = Gateway::new(
        config,
        GatewayService::new(config, identity),
        Peripherals {
            controller,
            bus: bus.clone(),
        },
        Platform {
            clock: clock.clone(),
            link: Box::new(link.clone()),
            reset: Box::new(reset.clone()),
            sink: RecordingSink::default(),
            watchdog: Watchdog::new(config.watchdog_timeout_ms()),
        },
    );

    Rig {
        slave,
        bus,
        clock,
        link,
        reset,
        gateway,
    }
}

fn cold_cabinet() -> MockController {
    let slave = MockController::type_a(1);
    slave.set(0x0200, -5i16 as u16);
    slave.set(0x0201, -20i16 as u16);
    slave
}

// ── Batching ──────────────────────────────────────────────────

#[test]
fn two_long_polls_publish_one_batch() {
    let rig = rig(&config(), cold_cabinet());

    block_on(rig.gateway.long_poll_once());
    assert!(!rig.gateway.service().is_batch_ready());
    block_on(rig.gateway.long_poll_once());
    assert!(rig.gateway.service().is_batch_ready());

    rig.clock.advance_secs(60);
    assert!(!rig.gateway.watchdog().is_overdue(rig.clock.now_ms()));

    block_on(rig.gateway.flush_once());

    assert_eq!(
        rig.bus.published(),
        vec![("1234567".to_owned(), "T,l,],l,]".to_owned(), QoS::AtLeastOnce)]
    );
    assert!(rig.gateway.service().buffer().is_empty());
    assert!(
        rig.gateway
            .sink()
            .events
            .contains(&AppEvent::PayloadPublished { bytes: 9 })
    );
}

#[test]
fn empty_buffer_flushes_nothing() {
    let rig = rig(&config(), cold_cabinet());
    block_on(rig.gateway.flush_once());
    assert!(rig.bus.published().is_empty());
}

#[test]
fn flush_waits_for_a_full_batch_and_publishes_once() {
    let rig = rig(&config(), cold_cabinet());
    let gateway = &rig.gateway;
    let executor: LocalExecutor<'_, 4> = LocalExecutor::new();
    let flush = executor.spawn(gateway.flush_when_ready());

    block_on(executor.run(async {
        yield_now().await;
        assert!(rig.bus.published().is_empty());

        gateway.long_poll_once().await;
        yield_now().await;
        assert!(rig.bus.published().is_empty());

        gateway.long_poll_once().await;
        flush.await;
    }));

    assert_eq!(rig.bus.payloads(), vec!["T,l,],l,]".to_owned()]);

    assert!(block_on(poll_once(gateway.flush_when_ready())).is_none());
    block_on(gateway.long_poll_once());
    assert!(block_on(poll_once(gateway.flush_when_ready())).is_none());
    assert_eq!(rig.bus.published().len(), 1);
}

#[test]
fn unreadable_temperature_is_left_out() {
    let rig = rig(&config(), cold_cabinet());
    block_on(rig.gateway.long_poll_once());

    rig.slave.set_mode(crate::mock_hw::SlaveMode::Silent);
    block_on(rig.gateway.long_poll_once());
    rig.slave.set_mode(crate::mock_hw::SlaveMode::Normal);

    assert_eq!(rig.gateway.service().buffer(), ",l,]");
    assert_eq!(
        rig.gateway
            .sink()
            .count(|e| *e == AppEvent::ReadingSkipped),
        1
    );
}

// ── Publish failures ──────────────────────────────────────────

#[test]
fn failed_publish_keeps_the_batch() {
    let rig = rig(&config(), cold_cabinet());
    block_on(rig.gateway.long_poll_once());
    block_on(rig.gateway.long_poll_once());

    rig.bus.set_failing(true);
    block_on(rig.gateway.flush_once());
    assert_eq!(rig.gateway.service().buffer(), ",l,],l,]");
    assert!(!rig.gateway.is_restarting());

    rig.bus.set_failing(false);
    block_on(rig.gateway.flush_once());
    assert_eq!(rig.bus.payloads(), vec!["T,l,],l,]".to_owned()]);
    assert!(rig.gateway.service().buffer().is_empty());
}

#[test]
fn repeated_publish_failures_restart_the_device() {
    let rig = rig(&config(), cold_cabinet());
    block_on(rig.gateway.long_poll_once());
    rig.bus.set_failing(true);

    for _ in 0..2 {
        block_on(rig.gateway.flush_once());
    }
    assert_eq!(rig.reset.restarts.get(), 0);

    block_on(rig.gateway.flush_once());
    assert!(rig.gateway.is_restarting());
    assert_eq!(rig.reset.restarts.get(), 1);
    assert!(rig.link.shut_down.get());
    assert!(
        rig.gateway
            .sink()
            .events
            .contains(&AppEvent::RestartRequested(Some(LinkFault::Publish)))
    );
}

#[test]
fn a_good_publish_resets_the_failure_budget() {
    let rig = rig(&config(), cold_cabinet());
    block_on(rig.gateway.long_poll_once());

    rig.bus.set_failing(true);
    block_on(rig.gateway.flush_once());
    block_on(rig.gateway.flush_once());
    rig.bus.set_failing(false);
    block_on(rig.gateway.flush_once());

    block_on(rig.gateway.long_poll_once());
    rig.bus.set_failing(true);
    block_on(rig.gateway.flush_once());
    block_on(rig.gateway.flush_once());

    assert!(!rig.gateway.is_restarting());
    assert_eq!(rig.reset.restarts.get(), 0);
}

// ── Frequent poll ─────────────────────────────────────────────

#[test]
fn door_changes_publish_single_events() {
    let _lock = COMMAND_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let rig = rig(&config(), cold_cabinet());

    block_on(rig.gateway.frequent_poll_once());
    assert!(rig.bus.published().is_empty());

    rig.slave.set(0x020E, 1);
    block_on(rig.gateway.frequent_poll_once());
    block_on(rig.gateway.frequent_poll_once());
    rig.slave.set(0x020E, 0);
    block_on(rig.gateway.frequent_poll_once());

    assert_eq!(
        rig.bus.published(),
        vec![
            ("1234567".to_owned(), "C".to_owned(), QoS::AtMostOnce),
            ("1234567".to_owned(), "c".to_owned(), QoS::AtMostOnce),
        ]
    );
}

#[test]
fn door_event_carries_wall_clock_stamp() {
    let _lock = COMMAND_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = GatewayConfig {
        timestamp_payloads: true,
        ..config()
    };
    let rig = rig(&config, cold_cabinet());
    let wall = codec::WallTime {
        year: 2024,
        month: 6,
        day: 1,
        hour: 12,
        minute: 30,
        second: 0,
    };
    rig.clock.set_wall(wall);

    rig.slave.set(0x020E, 1);
    block_on(rig.gateway.frequent_poll_once());

    let expected = format!("C{}", codec::encode_timestamp(&wall));
    assert_eq!(rig.bus.payloads(), vec![expected]);
}

#[test]
fn alert_mask_bits_raise_and_clear() {
    let _lock = COMMAND_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let rig = rig(&config(), cold_cabinet());

    rig.slave.set(0x0207, 1 << 9);
    block_on(rig.gateway.frequent_poll_once());
    rig.slave.set(0x0207, 0);
    block_on(rig.gateway.frequent_poll_once());

    use coldlink::app::events::Alert;
    let sink = rig.gateway.sink();
    assert_eq!(sink.count(|e| *e == AppEvent::AlertRaised(Alert::HighTemp)), 1);
    assert_eq!(sink.count(|e| *e == AppEvent::AlertCleared(Alert::HighTemp)), 1);
    assert!(rig.bus.published().is_empty());
}

#[test]
fn compressor_change_appends_duration_token() {
    let _lock = COMMAND_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = GatewayConfig {
        track_compressor: true,
        batch_readings: 10,
        ..config()
    };
    let rig = rig(&config, cold_cabinet());

    block_on(rig.gateway.long_poll_once());
    block_on(rig.gateway.frequent_poll_once());

    rig.clock.advance_secs(125);
    rig.slave.set(0x0210, 1);
    block_on(rig.gateway.frequent_poll_once());

    block_on(rig.gateway.flush_once());
    let expected = format!("T{}{}CF", codec::encode(-5), codec::encode(-20));
    assert_eq!(rig.bus.payloads(), vec![expected]);
}

#[test]
fn lost_link_restarts_the_device() {
    let _lock = COMMAND_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let rig = rig(&config(), cold_cabinet());
    rig.link.up.set(false);

    block_on(rig.gateway.frequent_poll_once());

    assert_eq!(rig.reset.restarts.get(), 1);
    assert!(
        rig.gateway
            .sink()
            .events
            .contains(&AppEvent::RestartRequested(Some(LinkFault::LinkDown)))
    );
}

// ── Remote commands ───────────────────────────────────────────

/// Send one command and run the poll that answers it.
fn command(rig: &Rig, payload: &str) -> Option<String> {
    let before = rig.bus.published().len();
    channels::deliver_inbound("1234567-C", payload.as_bytes());
    block_on(rig.gateway.frequent_poll_once());
    let published = rig.bus.published();
    assert!(published.len() <= before + 1);
    published.get(before).map(|(topic, reply, qos)| {
        assert_eq!(topic, "1234567");
        assert_eq!(*qos, QoS::AtMostOnce);
        reply.clone()
    })
}

#[test]
fn remote_commands_are_answered_on_the_uplink_topic() {
    let _lock = COMMAND_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let rig = rig(&config(), MockController::type_a(1));
    assert_eq!(rig.bus.subscribed(), vec!["1234567-C".to_owned()]);

    assert_eq!(command(&rig, "r,200").as_deref(), Some("40"));
    assert_eq!(command(&rig, "r,0201").as_deref(), Some("-55"));
    assert_eq!(command(&rig, "r,ffff").as_deref(), Some("malformed"));

    let writes = rig.slave.write_count();
    assert_eq!(command(&rig, "w,2801,-30").as_deref(), Some("e: -30"));
    assert_eq!(rig.slave.write_count(), writes + 1);
    assert_eq!(rig.slave.get(0x2801), Some(-30i16 as u16));

    assert_eq!(
        command(&rig, "ip").as_deref(),
        Some("('10.64.64.64', '255.255.255.255', '10.64.64.64', '8.8.8.8')")
    );
    assert_eq!(command(&rig, "zz").as_deref(), Some("Command Not Recognized!"));
    assert_eq!(command(&rig, "w,2801").as_deref(), Some("Error processing the command!"));

    let dump = command(&rig, "p").expect("dump reply");
    let json: serde_json::Value = serde_json::from_str(&dump).expect("dump is JSON");
    assert_eq!(json["RCU Type"], "T39");
    assert_eq!(json["RCU Serial"], "1234567");
    assert_eq!(json["RCU Firmware"], "3.14");
    assert_eq!(json["RCU Parameters"]["cabinet_temp"], 40);
    assert_eq!(json["RCU Parameters"]["set_point"], -30);

    assert_eq!(command(&rig, "restart"), None);
    assert_eq!(rig.reset.restarts.get(), 1);
    assert!(rig.link.shut_down.get());
    assert!(
        rig.gateway
            .sink()
            .events
            .contains(&AppEvent::RestartRequested(None))
    );
}
