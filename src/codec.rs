//! Compact telemetry codec for the metered cellular uplink.
//!
//! Readings are signed decimals (tenths of a degree, timer seconds, ...).
//! Each one is shifted by [`DECIMAL_OFFSET`] and written as two base-92
//! digits, each mapped into printable ASCII starting at [`ASCII_OFFSET`]:
//!
//! ```text
//!   v = -5  ──▶  shifted 994  ──▶  (10, 74)  ──▶  ",l"
//! ```
//!
//! Values outside `[DECIMAL_OFFSET, CEILING]` become one of two sentinel
//! tokens whose characters lie outside the digit alphabet, so a decoder
//! can always tell a real reading from an out-of-range marker.

use core::fmt::Write as _;

/// First printable character of the digit alphabet (`"`).
pub const ASCII_OFFSET: u8 = 34;

/// Number of symbols per digit.
pub const BASE: i32 = 92;

/// Lowest value that encodes as a real token.
pub const DECIMAL_OFFSET: i32 = -999;

/// Highest value that encodes as a real token.
pub const CEILING: i32 = DECIMAL_OFFSET + BASE * BASE - 1;

/// Token for values above [`CEILING`].
pub const OVERFLOW: &str = "~~";

/// Token for values below [`DECIMAL_OFFSET`].
pub const UNDERFLOW: &str = "!!";

/// What [`decode`] returns for [`OVERFLOW`].
pub const OVERFLOW_VALUE: i32 = 10_000;

/// What [`decode`] returns for [`UNDERFLOW`].
pub const UNDERFLOW_VALUE: i32 = -10_000;

/// Two printable characters.
pub type Token = heapless::String<2>;

/// Encode one reading as a two-character token.
pub fn encode(value: i32) -> Token {
    if value > CEILING {
        return sentinel(OVERFLOW);
    }
    if value < DECIMAL_OFFSET {
        return sentinel(UNDERFLOW);
    }

    let shifted = value - DECIMAL_OFFSET;
    let msd = (shifted / BASE) as u8 + ASCII_OFFSET;
    let lsd = (shifted % BASE) as u8 + ASCII_OFFSET;

    let mut token = Token::new();
    let _ = token.push(char::from(msd));
    let _ = token.push(char::from(lsd));
    token
}

/// Decode a token produced by [`encode`].
///
/// Sentinels map to [`OVERFLOW_VALUE`] / [`UNDERFLOW_VALUE`]. Anything that is
/// not two characters from the digit alphabet yields `None`.
pub fn decode(token: &str) -> Option<i32> {
    match token {
        OVERFLOW => return Some(OVERFLOW_VALUE),
        UNDERFLOW => return Some(UNDERFLOW_VALUE),
        _ => {}
    }

    let &[msd, lsd] = token.as_bytes() else {
        return None;
    };
    let msd = digit(msd)?;
    let lsd = digit(lsd)?;
    Some(msd * BASE + lsd + DECIMAL_OFFSET)
}

fn digit(byte: u8) -> Option<i32> {
    let d = i32::from(byte) - i32::from(ASCII_OFFSET);
    (0..BASE).contains(&d).then_some(d)
}

fn sentinel(text: &str) -> Token {
    let mut token = Token::new();
    let _ = token.push_str(text);
    token
}

// ═══════════════════════════════════════════════════════════════
//  State-duration tokens
// ═══════════════════════════════════════════════════════════════

/// Letter for zero minutes / zero seconds.
const DURATION_BASE: u8 = b'A';

/// Longest minute count whose letter still has an upper and lower case.
pub const MAX_DURATION_MINUTES: u64 = 25;

/// Encode the time between `start` and `now` (seconds) as two letters.
///
/// The first letter counts whole minutes and carries `flag` in its case:
/// uppercase for `true` (an on-transition), lowercase for `false`. The
/// second letter counts the remaining seconds starting at `A`. Minutes
/// saturate at [`MAX_DURATION_MINUTES`] so the case flag stays readable.
pub fn encode_duration(start: u64, now: u64, flag: bool) -> Token {
    let elapsed = now.saturating_sub(start);
    let minutes = (elapsed / 60).min(MAX_DURATION_MINUTES) as u8;
    let seconds = (elapsed % 60) as u8;

    let minute_char = char::from(DURATION_BASE + minutes);
    let minute_char = if flag {
        minute_char
    } else {
        minute_char.to_ascii_lowercase()
    };

    let mut token = Token::new();
    let _ = token.push(minute_char);
    let _ = token.push(char::from(DURATION_BASE + seconds));
    token
}

/// Inverse of [`encode_duration`]: `(elapsed_seconds, flag)`.
pub fn decode_duration(token: &str) -> Option<(u64, bool)> {
    let &[minute_char, second_char] = token.as_bytes() else {
        return None;
    };
    if !minute_char.is_ascii_alphabetic() {
        return None;
    }
    let flag = minute_char.is_ascii_uppercase();
    let minutes = minute_char.to_ascii_uppercase().checked_sub(DURATION_BASE)?;
    let seconds = second_char.checked_sub(DURATION_BASE)?;
    if seconds >= 60 {
        return None;
    }
    Some((u64::from(minutes) * 60 + u64::from(seconds), flag))
}

// ═══════════════════════════════════════════════════════════════
//  Wall-clock stamps
// ═══════════════════════════════════════════════════════════════

/// Offset applied to every timestamp field.
const STAMP_OFFSET: u8 = 33;

/// Broken-down local time as read from the RTC after NTP sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Encode `time` as six characters: years since 2000, month, day, hour,
/// minute, second, each offset into printable ASCII.
pub fn encode_timestamp(time: &WallTime) -> heapless::String<6> {
    let fields = [
        time.year.saturating_sub(2000).min(93) as u8,
        time.month,
        time.day,
        time.hour,
        time.minute,
        time.second,
    ];
    let mut out = heapless::String::new();
    for field in fields {
        let _ = out.write_char(char::from(STAMP_OFFSET + field.min(93)));
    }
    out
}
