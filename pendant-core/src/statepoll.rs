//! Periodic button/encoder state poll
//!
//! The main loop triggers one poll frame per tick through the asynchronous
//! transport engine; the completion closure hands the response here. Answers
//! lag the opcodes by one bus cycle, so the frame ends with a NOP to clock
//! the last answer in and the first received byte carries no information.

use pendant_hal::bus::BusPort;
use pendant_protocol::coproc::{
    state_poll_sum, CMD_GETENC, CMD_GETHIGH, CMD_GETLOW, CMD_GETSUM, CMD_NOP,
};

use crate::devstate::DeviceState;
use crate::transport::SerialEngine;

/// The opcodes of one poll frame
pub const STATE_POLL_SEQUENCE: [u8; 5] = [CMD_GETLOW, CMD_GETHIGH, CMD_GETENC, CMD_GETSUM, CMD_NOP];

/// Inter-byte pause; the coprocessor polls its receive register in software
pub const STATE_POLL_WAIT_MS: u32 = 1;

/// Result of one completed poll frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// Checksum mismatch; the frame is discarded
    Retry,
    /// Button and encoder state taken over
    Updated,
}

/// Kick off a poll frame unless a transfer is already running
pub fn trigger<const CAP: usize, B: BusPort>(engine: &SerialEngine<CAP>, bus: &mut B) {
    if !engine.running() {
        engine.start(bus, &STATE_POLL_SEQUENCE, STATE_POLL_WAIT_MS);
    }
}

/// Digest one completed poll frame
///
/// Call from the engine's completion closure with the full response. A
/// frame whose XOR sum does not match is dropped; the next trigger simply
/// polls again.
pub fn on_poll_done(state: &DeviceState, rx: &[u8]) -> PollOutcome {
    debug_assert_eq!(rx.len(), STATE_POLL_SEQUENCE.len());
    let low = rx[1];
    let high = rx[2];
    let enc = rx[3];
    let sum = rx[4];

    if sum != state_poll_sum(low, high, enc) {
        #[cfg(feature = "defmt")]
        defmt::warn!("state poll checksum mismatch");
        return PollOutcome::Retry;
    }

    let buttons = u16::from_le_bytes([low, high]);
    state.update_console_state(buttons, enc as i8);
    PollOutcome::Updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBus;

    fn frame(low: u8, high: u8, enc: u8) -> [u8; 5] {
        [0x00, low, high, enc, state_poll_sum(low, high, enc)]
    }

    #[test]
    fn test_good_frame_updates_state() {
        let state = DeviceState::new();
        let outcome = on_poll_done(&state, &frame(0x21, 0x01, 0xFE));
        assert_eq!(outcome, PollOutcome::Updated);
        assert_eq!(state.buttons(), 0x0121);
        // Encoder delta is signed
        assert_eq!(state.take_jog_detents(), -1);
    }

    #[test]
    fn test_bad_sum_is_discarded() {
        let state = DeviceState::new();
        let mut rx = frame(0x21, 0x01, 0x02);
        rx[4] ^= 0x40;
        let outcome = on_poll_done(&state, &rx);
        assert_eq!(outcome, PollOutcome::Retry);
        assert_eq!(state.buttons(), 0);
        assert_eq!(state.take_jog_detents(), 0);
    }

    #[test]
    fn test_trigger_is_a_noop_while_running() {
        let engine: SerialEngine<8> = SerialEngine::new();
        let mut bus = MockBus::new();
        trigger(&engine, &mut bus);
        assert!(engine.running());
        assert_eq!(bus.tx_log().len(), 1);
        // A second trigger must not restart the frame
        trigger(&engine, &mut bus);
        assert_eq!(bus.tx_log().len(), 1);
    }

    #[test]
    fn test_full_poll_cycle_through_engine() {
        let engine: SerialEngine<8> = SerialEngine::new();
        let state = DeviceState::new();
        let mut bus = MockBus::new();
        bus.script_rx(&frame(0x05, 0x00, 0x04));

        trigger(&engine, &mut bus);
        let mut outcome = None;
        let mut guard = 0;
        while engine.running() {
            if let Some(rx) = bus.complete_exchange() {
                engine.byte_complete(&mut bus, rx, |resp| {
                    outcome = Some(on_poll_done(&state, resp));
                });
            } else {
                engine.ms_tick(&mut bus);
            }
            guard += 1;
            assert!(guard < 100);
        }

        assert_eq!(outcome, Some(PollOutcome::Updated));
        assert_eq!(bus.tx_log(), &STATE_POLL_SEQUENCE);
        assert_eq!(state.buttons(), 0x0005);
        assert_eq!(state.take_jog_detents(), 2);
    }
}
