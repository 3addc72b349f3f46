//! CRC-8 used on the control channel and the coprocessor link
//!
//! Dallas/Maxim 1-Wire (iButton) polynomial, LSB first, seeded with 0.
//! The transmitter folds every payload byte into the running value and sends
//! the final value inverted (XOR 0xFF) as the last byte of the transfer;
//! the receiver recomputes and compares before the inversion.

/// Fold one byte into a running CRC-8 value.
pub fn crc8_update(crc: u8, data: u8) -> u8 {
    let mut crc = crc ^ data;
    for _ in 0..8 {
        if crc & 0x01 != 0 {
            crc = (crc >> 1) ^ 0x8C;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// Finalize a running CRC-8 value for transmission.
pub fn crc8_final(crc: u8) -> u8 {
    crc ^ 0xFF
}

/// CRC-8 over a whole buffer, seeded with 0, not inverted.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| crc8_update(crc, b))
}
