//! Shared serial transport engine
//!
//! One bus port carries both the coprocessor link and the firmware-update
//! stream. Small transfers run synchronously; longer ones go through
//! [`SerialEngine`], which sends a buffered frame byte by byte from the
//! transfer-complete interrupt, with an optional millisecond pause between
//! bytes for slow peers that poll their receive register.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use pendant_hal::bus::BusPort;

/// Pre-transfer settle time for slow synchronous exchanges
const SLOW_SYNC_DELAY_MS: u32 = 10;

/// Exchange one byte synchronously. The caller controls peer selection.
pub fn transfer_sync<B: BusPort>(bus: &mut B, tx: u8) -> u8 {
    bus.exchange(tx)
}

/// Exchange one byte synchronously with a settle delay in front
///
/// Used when the peer needs time to prepare its transmit register, for
/// example right after it was reset into its bootloader.
pub fn transfer_slow_sync<B: BusPort, D: DelayNs>(bus: &mut B, delay: &mut D, tx: u8) -> u8 {
    delay.delay_ms(SLOW_SYNC_DELAY_MS);
    bus.exchange(tx)
}

struct EngineState<const CAP: usize> {
    running: bool,
    tx: [u8; CAP],
    rx: [u8; CAP],
    /// Frame length; valid while `running`
    len: usize,
    /// Next byte to hand to the bus
    pos_tx: usize,
    /// Next receive slot; trails `pos_tx` by the one byte in flight
    pos_rx: usize,
    /// Inter-byte pause, 0 for back to back transmission
    wait_ms: u32,
    /// Milliseconds left before the next byte goes out
    wait_left: u32,
}

impl<const CAP: usize> EngineState<CAP> {
    const fn new() -> Self {
        EngineState {
            running: false,
            tx: [0; CAP],
            rx: [0; CAP],
            len: 0,
            pos_tx: 0,
            pos_rx: 0,
            wait_ms: 0,
            wait_left: 0,
        }
    }
}

/// Interrupt-driven multi-byte transfer engine
///
/// `start` selects the peer and sends the first byte; the transfer-complete
/// interrupt feeds each received byte to [`byte_complete`](Self::byte_complete),
/// which either schedules the next byte or finishes the frame and invokes the
/// completion closure with the full response. With a nonzero inter-byte wait
/// the next byte is released from the millisecond tick instead.
pub struct SerialEngine<const CAP: usize> {
    state: Mutex<RefCell<EngineState<CAP>>>,
}

impl<const CAP: usize> SerialEngine<CAP> {
    pub const fn new() -> Self {
        SerialEngine {
            state: Mutex::new(RefCell::new(EngineState::new())),
        }
    }

    /// True while a transfer is in progress
    pub fn running(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).running)
    }

    /// Begin transmitting `tx_bytes`, pausing `wait_ms` between bytes
    ///
    /// Must not be called while a transfer is running. Selects the peer and
    /// sends the first byte before returning.
    pub fn start<B: BusPort>(&self, bus: &mut B, tx_bytes: &[u8], wait_ms: u32) {
        assert!(!tx_bytes.is_empty() && tx_bytes.len() <= CAP);

        critical_section::with(|cs| {
            let state = &mut *self.state.borrow_ref_mut(cs);
            assert!(!state.running);
            state.running = true;
            state.tx[..tx_bytes.len()].copy_from_slice(tx_bytes);
            state.len = tx_bytes.len();
            state.pos_tx = 0;
            state.pos_rx = 0;
            state.wait_ms = wait_ms;
            state.wait_left = 0;
        });

        bus.select(true);
        self.send_next(bus);
    }

    /// Hand the next buffered byte to the bus
    fn send_next<B: BusPort>(&self, bus: &mut B) {
        let byte = critical_section::with(|cs| {
            let state = &mut *self.state.borrow_ref_mut(cs);
            let byte = state.tx[state.pos_tx];
            state.pos_tx += 1;
            byte
        });
        bus.begin_exchange(byte);
    }

    /// Transfer-complete interrupt handler
    ///
    /// Stores the byte the bus clocked in. When the frame is complete the
    /// engine stops, `on_done` runs with the full response, and only then is
    /// the peer deselected, so the closure may inspect peer state.
    pub fn byte_complete<B: BusPort>(
        &self,
        bus: &mut B,
        rx: u8,
        on_done: impl FnOnce(&[u8]),
    ) {
        enum Next {
            SendNow,
            WaitTick,
            Done,
        }

        let mut response: heapless::Vec<u8, CAP> = heapless::Vec::new();
        let next = critical_section::with(|cs| {
            let state = &mut *self.state.borrow_ref_mut(cs);
            if !state.running {
                // Stray completion after a finished or reset transfer
                return Next::WaitTick;
            }
            state.rx[state.pos_rx] = rx;
            state.pos_rx += 1;

            if state.pos_rx < state.len {
                if state.wait_ms > 0 {
                    // +1 so the first tick cannot cut the pause short
                    state.wait_left = state.wait_ms + 1;
                    Next::WaitTick
                } else {
                    Next::SendNow
                }
            } else {
                state.running = false;
                // len <= CAP, asserted at start
                let _ = response.extend_from_slice(&state.rx[..state.len]);
                Next::Done
            }
        });

        match next {
            Next::SendNow => self.send_next(bus),
            Next::WaitTick => {}
            Next::Done => {
                on_done(&response);
                bus.select(false);
            }
        }
    }

    /// Millisecond tick; releases the next byte when the inter-byte pause ends
    pub fn ms_tick<B: BusPort>(&self, bus: &mut B) {
        let fire = critical_section::with(|cs| {
            let state = &mut *self.state.borrow_ref_mut(cs);
            if !state.running || state.wait_left == 0 {
                return false;
            }
            state.wait_left -= 1;
            state.wait_left == 0
        });
        if fire {
            self.send_next(bus);
        }
    }
}

impl<const CAP: usize> Default for SerialEngine<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBus;
    use std::cell::Cell;

    /// Drive the mock bus until the engine finishes, like the ISR would
    fn pump<const CAP: usize>(
        engine: &SerialEngine<CAP>,
        bus: &mut MockBus,
        done: &Cell<Option<std::vec::Vec<u8>>>,
        ticks_between: u32,
    ) {
        let mut guard = 0;
        while engine.running() {
            if let Some(rx) = bus.complete_exchange() {
                engine.byte_complete(bus, rx, |resp| {
                    done.set(Some(resp.to_vec()));
                });
            } else {
                for _ in 0..ticks_between.max(1) {
                    engine.ms_tick(bus);
                }
            }
            guard += 1;
            assert!(guard < 1000, "engine stuck");
        }
    }

    #[test]
    fn test_five_byte_transfer() {
        let engine: SerialEngine<8> = SerialEngine::new();
        let mut bus = MockBus::new();
        bus.script_rx(&[0x10, 0x11, 0x12, 0x13, 0x14]);
        let done: Cell<Option<std::vec::Vec<u8>>> = Cell::new(None);

        engine.start(&mut bus, &[1, 2, 3, 4, 5], 0);
        assert!(engine.running());
        pump(&engine, &mut bus, &done, 0);

        assert_eq!(done.take().unwrap(), &[0x10, 0x11, 0x12, 0x13, 0x14]);
        assert_eq!(bus.tx_log(), &[1, 2, 3, 4, 5]);
        assert!(!bus.selected());
        assert!(!engine.running());
    }

    #[test]
    fn test_done_callback_runs_before_deselect() {
        let engine: SerialEngine<4> = SerialEngine::new();
        let mut bus = MockBus::new();
        bus.script_rx(&[0xAA]);

        engine.start(&mut bus, &[0x55], 0);
        let rx = bus.complete_exchange().unwrap();
        let selected_at_done = Cell::new(false);
        engine.byte_complete(&mut bus, rx, |_| {
            // Deselect happens after this closure returns; observed via
            // the flag set below
            selected_at_done.set(true);
        });
        assert!(selected_at_done.get());
        assert!(!bus.selected());
    }

    #[test]
    fn test_interbyte_wait_gates_transmission() {
        let engine: SerialEngine<4> = SerialEngine::new();
        let mut bus = MockBus::new();
        bus.script_rx(&[0, 0]);
        let done: Cell<Option<std::vec::Vec<u8>>> = Cell::new(None);

        engine.start(&mut bus, &[0xA0, 0xA1], 3);
        let rx = bus.complete_exchange().unwrap();
        engine.byte_complete(&mut bus, rx, |_| {});

        // Nothing goes out until the pause has elapsed
        assert_eq!(bus.tx_log(), &[0xA0]);
        for _ in 0..3 {
            engine.ms_tick(&mut bus);
            assert_eq!(bus.tx_log(), &[0xA0]);
        }
        engine.ms_tick(&mut bus);
        assert_eq!(bus.tx_log(), &[0xA0, 0xA1]);

        let rx = bus.complete_exchange().unwrap();
        engine.byte_complete(&mut bus, rx, |resp| done.set(Some(resp.to_vec())));
        assert!(done.take().is_some());
        pump(&engine, &mut bus, &done, 1);
    }

    #[test]
    fn test_callback_fires_exactly_once() {
        let engine: SerialEngine<8> = SerialEngine::new();
        let mut bus = MockBus::new();
        bus.script_rx(&[9, 8, 7]);
        let count = Cell::new(0u32);

        engine.start(&mut bus, &[1, 2, 3], 0);
        while let Some(rx) = bus.complete_exchange() {
            engine.byte_complete(&mut bus, rx, |_| count.set(count.get() + 1));
        }
        assert_eq!(count.get(), 1);

        // A stray completion after the frame is ignored
        engine.byte_complete(&mut bus, 0xFF, |_| count.set(count.get() + 1));
        assert_eq!(count.get(), 1);
    }

    #[test]
    #[should_panic]
    fn test_start_while_running_panics() {
        let engine: SerialEngine<4> = SerialEngine::new();
        let mut bus = MockBus::new();
        bus.script_rx(&[0, 0]);
        engine.start(&mut bus, &[1, 2], 0);
        engine.start(&mut bus, &[3], 0);
    }
}
