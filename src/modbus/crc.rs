//! Modbus CRC-16 (reflected polynomial 0xA001, initial value 0xFFFF).
//!
//! The lookup table is built at compile time. On the wire the CRC is sent
//! low byte first.

const POLY: u16 = 0xA001;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| {
        let idx = ((crc ^ u16::from(byte)) & 0x00FF) as usize;
        (crc >> 8) ^ TABLE[idx]
    })
}

/// `true` when the last two bytes of `frame` are the little-endian CRC of the rest.
pub fn check(frame: &[u8]) -> bool {
    match frame.len().checked_sub(2) {
        Some(body) => crc16(&frame[..body]).to_le_bytes() == frame[body..],
        None => false,
    }
}
