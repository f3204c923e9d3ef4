//! Fuzz target: `frame::validate_reply` + `frame::decode_words`
//!
//! Feeds arbitrary bytes as a controller reply and asserts that a frame
//! accepted by validation always carries a good CRC and decodes without
//! panicking.
//!
//! cargo fuzz run fuzz_modbus_reply

#![no_main]

use coldlink::modbus::crc;
use coldlink::modbus::frame::{self, READ_HOLDING_REGISTERS, WRITE_SINGLE_REGISTER};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&slave, raw)) = data.split_first() else {
        return;
    };

    if let Ok(reply) = frame::validate_reply(slave, READ_HOLDING_REGISTERS, raw) {
        assert!(crc::check(reply), "accepted frame must carry a valid CRC");
        assert_eq!(reply[0], slave);
        let _ = frame::decode_words(reply, 1, true);
    }

    if let Ok(echo) = frame::validate_reply(slave, WRITE_SINGLE_REGISTER, raw) {
        assert_eq!(echo.len(), frame::FIXED_REPLY_LEN);
    }
});
