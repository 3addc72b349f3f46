//! Synchronous coprocessor link
//!
//! Blocking command/response exchanges with the button coprocessor, used
//! from the main loop for mode transitions and remote flashing. The
//! periodic button/encoder poll runs asynchronously instead, see
//! [`statepoll`](crate::statepoll).

use embedded_hal::delay::DelayNs;
use pendant_hal::bus::BusPort;
use pendant_protocol::coproc::{
    CMD_ENTERAPP, CMD_ENTERBOOT, CMD_ENTERBOOT2, CMD_NOP, CMD_STARTFLASH, CMD_TESTAPP, RESULT_OK,
};
use pendant_protocol::crc::{crc8_final, crc8_update};

use crate::transport::{transfer_slow_sync, transfer_sync};

/// Coprocessor program-memory page size in bytes
pub const COPROC_PAGE_SIZE: usize = 64;

/// Settle time after a mode transition before probing the new context
const MODE_SETTLE_MS: u32 = 150;

/// Handshake pre-delay before each exchange in application context
const TRANSFER_DELAY_MS: u32 = 1;

/// Remote flashing failure causes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RemoteError {
    /// The peer rejected the transferred checksum
    Checksum,
    /// The peer accepted the data but failed to commit it
    CmdFail,
}

/// Blocking command interface to the coprocessor
///
/// Borrows the bus and a delay provider for the duration of one operation;
/// the shared bus goes back to the asynchronous engine afterwards.
pub struct CoprocLink<'a, B, D> {
    bus: &'a mut B,
    delay: &'a mut D,
}

impl<'a, B: BusPort, D: DelayNs> CoprocLink<'a, B, D> {
    pub fn new(bus: &'a mut B, delay: &'a mut D) -> Self {
        CoprocLink { bus, delay }
    }

    /// One exchange with the busy/ready handshake observed
    fn transfer(&mut self, tx: u8) -> u8 {
        self.delay.delay_ms(TRANSFER_DELAY_MS);
        while self.bus.peer_busy() {}
        transfer_sync(self.bus, tx)
    }

    /// One exchange ignoring the handshake line
    ///
    /// The coprocessor bootloader does not drive the busy line; it is slow
    /// instead, hence the settle delay in front.
    fn transfer_nobusy(&mut self, tx: u8) -> u8 {
        transfer_slow_sync(self.bus, self.delay, tx)
    }

    /// Probe whether the coprocessor application is running
    pub fn is_in_application(&mut self) -> bool {
        self.bus.select(true);
        self.transfer_nobusy(CMD_TESTAPP);
        let answer = self.transfer_nobusy(CMD_NOP);
        self.bus.select(false);
        answer == RESULT_OK
    }

    /// Reset the coprocessor into its bootloader
    ///
    /// Returns `true` if the application is confirmed gone afterwards.
    /// The application may stop driving the busy line at any point during
    /// the sequence, so both bytes go out on the no-busy path.
    pub fn enter_bootloader(&mut self) -> bool {
        self.bus.select(true);
        self.transfer_nobusy(CMD_ENTERBOOT);
        self.transfer_nobusy(CMD_ENTERBOOT2);
        self.bus.select(false);
        self.delay.delay_ms(MODE_SETTLE_MS);
        !self.is_in_application()
    }

    /// Leave the coprocessor bootloader for the application
    ///
    /// Returns `true` if the application answers the probe afterwards.
    pub fn exit_bootloader(&mut self) -> bool {
        self.bus.select(true);
        self.transfer_nobusy(CMD_ENTERAPP);
        self.bus.select(false);
        self.delay.delay_ms(MODE_SETTLE_MS);
        self.is_in_application()
    }

    /// Stream one page into the coprocessor bootloader and commit it
    ///
    /// The page goes out as opcode, little-endian address, data and a
    /// final checksum byte. The peer answers twice: once for the checksum
    /// over the stream, once for the committed page. The bootloader drives
    /// the busy line while it checksums and programs, so every byte of the
    /// sequence waits on the handshake.
    pub fn flash_page(&mut self, address: u16, page: &[u8; COPROC_PAGE_SIZE]) -> Result<(), RemoteError> {
        let mut crc = 0u8;

        self.bus.select(true);
        self.transfer(CMD_STARTFLASH);
        for byte in address.to_le_bytes() {
            crc = crc8_update(crc, byte);
            self.transfer(byte);
        }
        for &byte in page.iter() {
            crc = crc8_update(crc, byte);
            self.transfer(byte);
        }
        self.transfer(crc8_final(crc));

        let crc_answer = self.transfer(CMD_NOP);
        if crc_answer != RESULT_OK {
            self.bus.select(false);
            return Err(RemoteError::Checksum);
        }
        let commit_answer = self.transfer(CMD_NOP);
        self.bus.select(false);
        if commit_answer != RESULT_OK {
            return Err(RemoteError::CmdFail);
        }
        Ok(())
    }
}
