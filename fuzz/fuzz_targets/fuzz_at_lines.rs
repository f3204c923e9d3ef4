//! Fuzz target: `AtEngine::send_command`
//!
//! Replays arbitrary modem output (line noise, binary PPP frames, broken
//! UTF-8) into one AT transaction and asserts the engine terminates with
//! an outcome instead of panicking or spinning.
//!
//! cargo fuzz run fuzz_at_lines

#![no_main]

use core::cell::Cell;

use coldlink::app::ports::{Clock, SerialPort, SerialSettings};
use coldlink::modem::{AtEngine, Outcome};
use embedded_hal::delay::DelayNs;
use libfuzzer_sys::fuzz_target;

struct Replay<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl SerialPort for Replay<'_> {
    type Error = ();

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.data.len()).min(self.chunk);
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }

    fn available(&self) -> usize {
        self.data.len()
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn reconfigure(&mut self, _: &SerialSettings) -> Result<(), ()> {
        Ok(())
    }
}

#[derive(Default)]
struct Ticks(Cell<u64>);

impl Clock for &Ticks {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

impl DelayNs for &Ticks {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns / 1_000_000).max(1));
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, rest)) = data.split_first() else {
        return;
    };
    let ticks = Ticks::default();
    let serial = Replay {
        data: rest,
        chunk: usize::from(chunk).max(1),
    };
    let mut at = AtEngine::new(serial, &ticks, &ticks, 10, 200);

    let reply = at.send("+CSQ");
    assert!(reply.lines.iter().all(|l| !l.is_empty()));
    if reply.outcome == Outcome::Success {
        assert!(reply.lines.last().is_some_and(|l| l.starts_with("OK")));
    }
});
