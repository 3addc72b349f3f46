//! Button coprocessor wire protocol
//!
//! The coprocessor link is command/response on single bytes: the CPU clocks
//! an opcode out and the answer arrives in a later bus cycle. Data-fetch
//! opcodes return button/encoder state; bootloader opcodes drive the remote
//! flashing sequence.

// Opcodes
/// No operation; clocks the peer's pending answer byte in
pub const CMD_NOP: u8 = 0x00;
/// Application identification probe; answered with [`RESULT_OK`] by the app
pub const CMD_TESTAPP: u8 = 0x01;
/// Fetch low button state byte
pub const CMD_GETLOW: u8 = 0x02;
/// Fetch high button state byte
pub const CMD_GETHIGH: u8 = 0x03;
/// Fetch the signed encoder delta
pub const CMD_GETENC: u8 = 0x04;
/// Fetch the XOR sum over the preceding three answers
pub const CMD_GETSUM: u8 = 0x05;

// Bootloader opcodes
/// Enter the coprocessor bootloader (first stage)
pub const CMD_ENTERBOOT: u8 = 0xA0;
/// Enter the coprocessor bootloader (second stage)
pub const CMD_ENTERBOOT2: u8 = 0xA1;
/// Leave the bootloader for the application
pub const CMD_ENTERAPP: u8 = 0xA2;
/// Begin a page flashing sequence
pub const CMD_STARTFLASH: u8 = 0xA3;

// Result sentinels
/// Positive answer
pub const RESULT_OK: u8 = 0xFA;
/// Negative answer
pub const RESULT_FAIL: u8 = 0x8A;

/// XOR sum over a state-poll answer, as computed by the coprocessor
pub fn state_poll_sum(low: u8, high: u8, enc: u8) -> u8 {
    low ^ high ^ enc ^ 0xFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_poll_sum() {
        assert_eq!(state_poll_sum(0, 0, 0), 0xFF);
        assert_eq!(state_poll_sum(0x12, 0x34, 0x56), 0x12 ^ 0x34 ^ 0x56 ^ 0xFF);
    }
}
