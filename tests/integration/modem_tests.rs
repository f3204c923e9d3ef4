//! Modem session tests against a scripted AT modem.

use coldlink::app::boot;
use coldlink::config::GatewayConfig;
use coldlink::error::{LinkFault, ModemError};
use coldlink::modem::{AtEngine, ModemSession, Outcome, SessionSettings, SessionState, SignalCategory};

use crate::mock_hw::{FakeClock, MockModem, MockPowerLine};

type Session = ModemSession<MockModem, FakeClock, FakeClock, MockPowerLine>;

fn session(modem: &MockModem, power: &MockPowerLine) -> Session {
    let config = GatewayConfig::default();
    let clock = FakeClock::new();
    let at = AtEngine::new(
        modem.clone(),
        clock.clone(),
        clock,
        config.at_poll_ms,
        config.at_timeout_ms,
    );
    ModemSession::new(at, power.clone(), SessionSettings::from(&config))
}

const DATA_CALL: &str = "+CGDATA=\"PPP\",1";

#[test]
fn healthy_modem_reaches_data_mode() {
    let modem = MockModem::healthy();
    let power = MockPowerLine::default();
    let mut session = session(&modem, &power);

    assert_eq!(session.bring_up(), Ok(()));
    assert_eq!(session.state(), SessionState::DataCallActive);
    assert_eq!(session.imei(), Some("861234567890123"));
    assert_eq!(session.iccid(), Some("8944500102198304826"));
    assert!(power.high.get());
    assert_eq!(modem.reconfigured(), 1);

    let commands = modem.commands();
    let position = |c: &str| commands.iter().position(|x| x == c);
    assert!(position("+CFUN=1") < position("+CCID"));
    assert!(position("+CCID") < position("+CSQ"));
    assert!(commands.contains(&"+CSTT=\"m2minternet.apn\",\"\",\"\"".to_owned()));
    assert_eq!(modem.count(DATA_CALL), 2);
}

#[test]
fn answered_second_data_request_is_a_failure() {
    let modem = MockModem::healthy();
    modem.script(
        DATA_CALL,
        &["NO CARRIER", "OK", "NO CARRIER", "OK", "NO CARRIER", "OK"],
    );
    let mut session = session(&modem, &MockPowerLine::default());

    assert_eq!(session.bring_up(), Err(ModemError::DataCallFailed));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(modem.count(DATA_CALL), 6);
}

#[test]
fn iccid_error_aborts_before_the_data_call() {
    let modem = MockModem::healthy();
    modem.script("+CCID", &["+CME ERROR: 10"]);
    let mut session = session(&modem, &MockPowerLine::default());

    assert_eq!(boot::bring_up_modem(&mut session), Err(LinkFault::DataCall));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(modem.count(DATA_CALL), 0);
}

#[test]
fn setup_errors_before_iccid_are_tolerated() {
    let modem = MockModem::healthy();
    modem.script("+CMNB=1", &["+CME ERROR: 3"]);
    let mut session = session(&modem, &MockPowerLine::default());

    assert_eq!(session.bring_up(), Ok(()));
}

#[test]
fn undetectable_signal_does_not_stop_bring_up() {
    let modem = MockModem::healthy();
    modem.script("+CSQ", &["+CSQ: 99,99\r\nOK"]);
    let mut session = session(&modem, &MockPowerLine::default());

    assert_eq!(session.bring_up(), Ok(()));
    assert_eq!(session.signal_quality(), Err(ModemError::SignalUnreadable));
}

#[test]
fn silent_modem_fails_identification() {
    let modem = MockModem::new();
    modem.script("+GSN", &["", "", ""]);
    let mut session = session(&modem, &MockPowerLine::default());

    assert_eq!(session.bring_up(), Err(ModemError::IdentificationFailed));
    assert_eq!(modem.count("+GSN"), 3);
}

#[test]
fn signal_quality_is_bucketed() {
    let modem = MockModem::healthy();
    let mut session = session(&modem, &MockPowerLine::default());
    session.power_cycle();
    session.initialize().expect("modem identifies");

    let quality = session.signal_quality().expect("signal readable");
    assert_eq!(quality.rssi, 17);
    assert_eq!(quality.category, SignalCategory::Good);
    assert_eq!(quality.percent(), 60);
    assert_eq!(session.state(), SessionState::SignalChecked);
}

#[test]
fn engine_keeps_unmatched_lines_on_timeout() {
    let modem = MockModem::new();
    modem.script("+CGDATA", &["CONNECT 115200"]);
    let clock = FakeClock::new();
    let mut at = AtEngine::new(modem.clone(), clock.clone(), clock, 20, 500);

    let reply = at.send("+CGDATA");
    assert_eq!(reply.outcome, Outcome::Timeout);
    assert_eq!(reply.lines, vec!["CONNECT 115200".to_owned()]);
    assert!(reply.elapsed_ms >= 500);

    let ok = at.send("");
    assert!(ok.is_success());
}

#[test]
fn escape_and_soft_restart_return_to_booting() {
    let modem = MockModem::healthy();
    modem.script("+CIPSHUT", &["SHUT OK"]);
    modem.script("+CFUN=1,1", &["OK\r\nRDY\r\nSMS Ready"]);
    let mut session = session(&modem, &MockPowerLine::default());
    session.bring_up().expect("data call up");

    session.escape_data_mode();
    assert_eq!(session.state(), SessionState::Degraded);

    assert_eq!(session.soft_restart(), Ok(()));
    assert_eq!(session.state(), SessionState::Booting);
    assert_eq!(session.initialize(), Ok(()));
}

#[test]
fn soft_restart_without_ready_banner_fails() {
    let modem = MockModem::healthy();
    modem.script("+CIPSHUT", &["SHUT OK"]);
    modem.script("+CFUN=1,1", &["+CME ERROR: 4"]);
    let mut session = session(&modem, &MockPowerLine::default());
    session.bring_up().expect("data call up");
    session.escape_data_mode();

    assert_eq!(session.soft_restart(), Err(ModemError::RestartFailed));
    assert_eq!(session.state(), SessionState::Failed);
}
