//! RTU frame layout: request builders and reply validation.
//!
//! ```text
//!  request   [slave][fn][addr hi][addr lo][arg hi][arg lo][crc lo][crc hi]
//!  read      [slave][0x03][byte count][data ...][crc lo][crc hi]
//!  exception [slave][fn | 0x80][code][crc lo][crc hi]
//! ```

use crate::error::ModbusError;

use super::crc;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Function codes at or above this value signal an exception reply.
pub const ERROR_BIAS: u8 = 0x80;
/// Exception replies: slave, function, code, CRC.
pub const ERROR_REPLY_LEN: usize = 5;
/// Slave address plus function code.
pub const REPLY_HEADER_LEN: usize = 2;
pub const CRC_LEN: usize = 2;
/// Echo replies (write single register) are always this long.
pub const FIXED_REPLY_LEN: usize = 8;

/// Controllers drive the line high between frames; a UART sampling that
/// idle period reports 0xFF bytes ahead of the real reply.
const IDLE_BYTE: u8 = 0xFF;

/// Build a fixed-size request with two 16-bit arguments.
pub fn request(slave: u8, function: u8, address: u16, argument: u16) -> [u8; 8] {
    let [a_hi, a_lo] = address.to_be_bytes();
    let [v_hi, v_lo] = argument.to_be_bytes();
    let mut frame = [slave, function, a_hi, a_lo, v_hi, v_lo, 0, 0];
    let [c_lo, c_hi] = crc::crc16(&frame[..6]).to_le_bytes();
    frame[6] = c_lo;
    frame[7] = c_hi;
    frame
}

pub fn read_holding_request(slave: u8, register: u16, quantity: u16) -> [u8; 8] {
    request(slave, READ_HOLDING_REGISTERS, register, quantity)
}

pub fn write_single_request(slave: u8, register: u16, value: u16) -> [u8; 8] {
    request(slave, WRITE_SINGLE_REGISTER, register, value)
}

/// Minimum length a reply must have, judged from what has arrived so far.
fn expected_len(frame: &[u8]) -> Option<usize> {
    let function = *frame.get(1)?;
    if function >= ERROR_BIAS {
        Some(ERROR_REPLY_LEN)
    } else if (1..=4).contains(&function) {
        let byte_count = *frame.get(2)? as usize;
        Some(REPLY_HEADER_LEN + 1 + byte_count + CRC_LEN)
    } else {
        Some(FIXED_REPLY_LEN)
    }
}

/// Validate raw bytes read after a request and return the reply frame.
///
/// Leading idle bytes are skipped and anything past the expected length is
/// ignored. The CRC is checked before the slave address and function code
/// so corrupted frames report as corrupted.
pub fn validate_reply(slave: u8, function: u8, raw: &[u8]) -> Result<&[u8], ModbusError> {
    let start = if slave == IDLE_BYTE {
        0
    } else {
        raw.iter().position(|&b| b != IDLE_BYTE).unwrap_or(raw.len())
    };
    let frame = &raw[start..];
    if frame.is_empty() {
        return Err(ModbusError::NoReply);
    }

    let Some(expected) = expected_len(frame) else {
        return Err(ModbusError::ShortFrame {
            expected: ERROR_REPLY_LEN,
            got: frame.len(),
        });
    };
    if frame.len() < expected {
        return Err(ModbusError::ShortFrame {
            expected,
            got: frame.len(),
        });
    }
    let frame = &frame[..expected];

    if !crc::check(frame) {
        let body = expected - CRC_LEN;
        return Err(ModbusError::CrcMismatch {
            expected: crc::crc16(&frame[..body]),
            got: u16::from_le_bytes([frame[body], frame[body + 1]]),
        });
    }
    if frame[0] != slave {
        return Err(ModbusError::AddressMismatch {
            expected: slave,
            got: frame[0],
        });
    }
    if frame[1] == function | ERROR_BIAS {
        return Err(ModbusError::Exception(frame[2]));
    }
    if frame[1] != function {
        return Err(ModbusError::FunctionMismatch {
            expected: function,
            got: frame[1],
        });
    }
    Ok(frame)
}

/// Decode `quantity` big-endian words from a validated read reply.
pub fn decode_words(
    frame: &[u8],
    quantity: u16,
    signed: bool,
) -> Result<Vec<i32>, ModbusError> {
    let wanted = usize::from(quantity) * 2;
    let byte_count = frame.get(2).map_or(0, |&b| b as usize);
    let data = frame.get(3..3 + byte_count).unwrap_or_default();
    if byte_count < wanted || data.len() < wanted {
        return Err(ModbusError::ShortFrame {
            expected: REPLY_HEADER_LEN + 1 + wanted + CRC_LEN,
            got: frame.len(),
        });
    }

    Ok(data[..wanted]
        .chunks_exact(2)
        .map(|pair| {
            let raw = u16::from_be_bytes([pair[0], pair[1]]);
            if signed {
                i32::from(raw as i16)
            } else {
                i32::from(raw)
            }
        })
        .collect())
}
