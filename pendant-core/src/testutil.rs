//! Mock collaborators for host-side tests

use std::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use pendant_hal::bus::BusPort;
use pendant_hal::nvm::{Eeprom, ProgramMemory};
use pendant_hal::supervisor::ModeSupervisor;

/// Scriptable bus port
///
/// Transmitted bytes are logged; received bytes come from a script and
/// default to 0xFF when the script runs dry, matching an idle serial line.
pub struct MockBus {
    selected: bool,
    /// Busy answers left before the peer reads as ready
    busy_remaining: Cell<u32>,
    /// Number of times the busy line was sampled
    busy_polls: Cell<u32>,
    tx_log: Vec<u8>,
    rx_script: VecDeque<u8>,
    /// Byte armed by `begin_exchange`, consumed by `complete_exchange`
    armed: Option<u8>,
    select_log: Vec<bool>,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            selected: false,
            busy_remaining: Cell::new(0),
            busy_polls: Cell::new(0),
            tx_log: Vec::new(),
            rx_script: VecDeque::new(),
            armed: None,
            select_log: Vec::new(),
        }
    }

    pub fn script_rx(&mut self, bytes: &[u8]) {
        self.rx_script.extend(bytes.iter().copied());
    }

    /// Answer busy for the next `polls` samples of the handshake line
    pub fn set_busy_for(&mut self, polls: u32) {
        self.busy_remaining.set(polls);
    }

    /// How often the busy line was sampled
    pub fn busy_polls(&self) -> u32 {
        self.busy_polls.get()
    }

    pub fn tx_log(&self) -> &[u8] {
        &self.tx_log
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn select_log(&self) -> &[bool] {
        &self.select_log
    }

    fn next_rx(&mut self) -> u8 {
        self.rx_script.pop_front().unwrap_or(0xFF)
    }

    /// Finish an armed asynchronous exchange, as the ISR would
    pub fn complete_exchange(&mut self) -> Option<u8> {
        self.armed.take()?;
        Some(self.next_rx())
    }
}

impl BusPort for MockBus {
    fn select(&mut self, selected: bool) {
        self.selected = selected;
        self.select_log.push(selected);
    }

    fn exchange(&mut self, tx: u8) -> u8 {
        self.tx_log.push(tx);
        self.next_rx()
    }

    fn begin_exchange(&mut self, tx: u8) {
        assert!(self.armed.is_none(), "exchange armed twice");
        self.tx_log.push(tx);
        self.armed = Some(tx);
    }

    fn peer_busy(&self) -> bool {
        self.busy_polls.set(self.busy_polls.get() + 1);
        let remaining = self.busy_remaining.get();
        if remaining > 0 {
            self.busy_remaining.set(remaining - 1);
            true
        } else {
            false
        }
    }
}

/// In-memory program flash with 128-byte pages
pub struct MockFlash {
    pub mem: Vec<u8>,
    pub erase_log: Vec<u16>,
    pub write_log: Vec<u16>,
    pub rww_reenabled: u32,
    /// Corrupt the first byte of every written page, for verify-failure tests
    pub corrupt_writes: bool,
}

impl MockFlash {
    pub const PAGE: usize = 128;

    pub fn new(size: usize) -> Self {
        MockFlash {
            mem: vec![0xFF; size],
            erase_log: Vec::new(),
            write_log: Vec::new(),
            rww_reenabled: 0,
            corrupt_writes: false,
        }
    }
}

impl ProgramMemory for MockFlash {
    const PAGE_SIZE: usize = Self::PAGE;

    fn erase_page(&mut self, address: u16) {
        let base = address as usize & !(Self::PAGE - 1);
        self.mem[base..base + Self::PAGE].fill(0xFF);
        self.erase_log.push(base as u16);
    }

    fn write_page(&mut self, address: u16, data: &[u8]) {
        assert_eq!(data.len(), Self::PAGE);
        let base = address as usize & !(Self::PAGE - 1);
        self.mem[base..base + Self::PAGE].copy_from_slice(data);
        if self.corrupt_writes {
            self.mem[base] ^= 0x01;
        }
        self.write_log.push(base as u16);
    }

    fn reenable_rww(&mut self) {
        self.rww_reenabled += 1;
    }

    fn read(&self, address: u16, buf: &mut [u8]) {
        let a = address as usize;
        buf.copy_from_slice(&self.mem[a..a + buf.len()]);
    }
}

/// In-memory EEPROM
pub struct MockEeprom {
    pub mem: Vec<u8>,
    /// Corrupt the first written byte, for verify-failure tests
    pub corrupt_writes: bool,
}

impl MockEeprom {
    pub const CAPACITY: usize = 1024;

    pub fn new() -> Self {
        MockEeprom {
            mem: vec![0xFF; Self::CAPACITY],
            corrupt_writes: false,
        }
    }
}

impl Eeprom for MockEeprom {
    const SIZE: usize = Self::CAPACITY;

    fn write(&mut self, address: u16, data: &[u8]) {
        let a = address as usize;
        self.mem[a..a + data.len()].copy_from_slice(data);
        if self.corrupt_writes && !data.is_empty() {
            self.mem[a] ^= 0x01;
        }
    }

    fn read(&self, address: u16, buf: &mut [u8]) {
        let a = address as usize;
        buf.copy_from_slice(&self.mem[a..a + buf.len()]);
    }
}

/// Records mode-transition requests
#[derive(Default)]
pub struct MockSupervisor {
    pub update_requests: u32,
    pub application_requests: u32,
}

impl ModeSupervisor for MockSupervisor {
    fn request_update_mode(&mut self) {
        self.update_requests += 1;
    }

    fn request_application_mode(&mut self) {
        self.application_requests += 1;
    }
}

/// Delay provider that returns immediately
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
