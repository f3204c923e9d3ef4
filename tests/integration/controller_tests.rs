//! Controller polling tests over the Modbus engine.
//!
//! A [`MockController`] answers real RTU frames, so these exercise CRC,
//! framing, identification and the register map end to end.

use coldlink::app::boot;
use coldlink::config::GatewayConfig;
use coldlink::controller::{ControllerService, DoorState};
use coldlink::error::{LinkFault, ModbusError};
use coldlink::modbus::{ModbusMaster, RegisterValue};
use coldlink::registers::ControllerVariant;

use crate::mock_hw::{FakeClock, MockController, SlaveMode};

fn service(slave: &MockController) -> ControllerService<MockController, FakeClock> {
    let master = ModbusMaster::new(slave.clone(), FakeClock::new(), 100);
    ControllerService::new(master, 1, 200)
}

#[test]
fn identifies_and_reads_serial() {
    let slave = MockController::type_a(1);
    let mut controller = service(&slave);

    assert_eq!(controller.identify(3, 10_000), ControllerVariant::TypeA);
    assert_eq!(controller.model(), "T39");
    assert_eq!(controller.read_serial().as_deref(), Some("1234567"));
}

#[test]
fn serial_needs_every_word() {
    let slave = MockController::new(1);
    slave.set_model("T39");
    slave.set(0xCF44, 0x0001);
    slave.set(0xCF42, 0x0687);
    let mut controller = service(&slave);
    controller.identify(1, 0);

    assert_eq!(controller.read_serial(), None);

    slave.set(0xCF43, 0x002D);
    assert_eq!(controller.read_serial().as_deref(), Some("1234567"));
}

#[test]
fn second_family_uses_its_own_door_register() {
    let slave = MockController::type_a(1);
    slave.set_model("X22");
    slave.set(0x0220, 1);
    let mut controller = service(&slave);

    assert_eq!(controller.identify(1, 0), ControllerVariant::TypeB);
    assert_eq!(controller.poll_frequent().door, DoorState::Open);
}

#[test]
fn unrecognized_model_suppresses_all_reads() {
    let slave = MockController::type_a(1);
    slave.set_model("Q39");
    let mut controller = service(&slave);

    assert_eq!(controller.identify(3, 10_000), ControllerVariant::Unknown);
    // Four identification registers per attempt.
    assert_eq!(slave.request_count(), 12);

    let temps = controller.read_temperatures();
    assert_eq!(temps.cabinet, RegisterValue::NoReply);
    assert_eq!(temps.evaporator, RegisterValue::NoReply);
    assert_eq!(controller.poll_frequent().door, DoorState::Unknown);
    assert_eq!(controller.read_serial(), None);
    assert_eq!(controller.write(0x2801, 5), Err(ModbusError::NoReply));
    assert_eq!(slave.request_count(), 12);
}

#[test]
fn boot_identification_failure_is_fatal() {
    let slave = MockController::type_a(1);
    slave.set_model("Q39");
    let mut controller = service(&slave);
    let config = GatewayConfig {
        identify_retry_delay_secs: 0,
        ..GatewayConfig::default()
    };

    assert_eq!(
        boot::identify_controller(&mut controller, &config),
        Err(LinkFault::Identification)
    );
}

#[test]
fn alert_mask_decodes_bits_nine_to_eleven() {
    let slave = MockController::type_a(1);
    let mut controller = service(&slave);
    controller.identify(1, 0);

    slave.set(0x0207, 0x0E00);
    slave.set(0x0299, 1);
    let alerts = controller.poll_frequent().alerts;
    assert!(alerts.high_temp && alerts.low_temp && alerts.door_open);
    assert!(alerts.malfunction);

    slave.set(0x0207, 0x0400);
    slave.set(0x0299, 0);
    let alerts = controller.poll_frequent().alerts;
    assert!(!alerts.high_temp && alerts.low_temp && !alerts.door_open);
    assert!(!alerts.malfunction);

    slave.set(0x0207, 0);
    assert!(!controller.poll_frequent().alerts.any());
}

#[test]
fn signed_temperatures_and_silent_bus() {
    let slave = MockController::type_a(1);
    let mut controller = service(&slave);
    controller.identify(1, 0);

    let temps = controller.read_temperatures();
    assert_eq!(temps.cabinet, RegisterValue::Value(40));
    assert_eq!(temps.evaporator, RegisterValue::Value(-55));

    slave.set_mode(SlaveMode::Silent);
    assert_eq!(controller.read_temperatures().cabinet, RegisterValue::NoReply);

    slave.set_mode(SlaveMode::Corrupt);
    assert_eq!(controller.read_temperatures().cabinet, RegisterValue::Malformed);
}

#[test]
fn stale_bytes_do_not_shadow_the_reply() {
    let slave = MockController::type_a(1);
    let mut controller = service(&slave);
    controller.identify(1, 0);

    slave.inject_stale(&[0x01, 0x03, 0x02, 0x00]);
    assert_eq!(controller.read_register(0x0200), RegisterValue::Value(40));
}

#[test]
fn write_is_checked_against_the_echo() {
    let slave = MockController::type_a(1);
    let mut controller = service(&slave);
    controller.identify(1, 0);

    let ack = controller.write(0x2801, 25).expect("echo matches");
    assert_eq!((ack.register, ack.value), (0x2801, 25));
    assert_eq!(slave.get(0x2801), Some(25));
}

#[test]
fn parameter_dump_follows_the_variant_table() {
    let slave = MockController::type_a(1);
    let mut controller = service(&slave);
    controller.identify(1, 0);

    let dump = controller.dump_parameters();
    assert_eq!(dump.len(), ControllerVariant::TypeA.parameters().len());
    assert_eq!(dump[0], ("cabinet_temp", RegisterValue::Value(40)));
    assert_eq!(controller.is_celsius(), Some(true));
}
