//! Fuzz target: `RemoteCommand::parse`
//!
//! Inbound broker payloads are untrusted; parsing must never panic and
//! every accepted write must carry a register and a 16-bit value.
//!
//! cargo fuzz run fuzz_command_parse

#![no_main]

use coldlink::app::commands::RemoteCommand;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(command) = RemoteCommand::parse(data) {
        let _ = command.name();
    }
});
