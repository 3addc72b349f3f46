//! Non-volatile memory programming abstractions
//!
//! Used by the firmware-update path to commit the page buffer to local
//! program memory or EEPROM. The operations themselves are infallible on the
//! target hardware; integrity is established by reading back and comparing,
//! which is the caller's job.

/// Self-programmable program memory (flash), page oriented.
pub trait ProgramMemory {
    /// Size of one program-memory page in bytes.
    const PAGE_SIZE: usize;

    /// Erase the page containing `address`.
    fn erase_page(&mut self, address: u16);

    /// Write one full page starting at the page containing `address`.
    ///
    /// `data` must be exactly [`Self::PAGE_SIZE`] bytes.
    fn write_page(&mut self, address: u16, data: &[u8]);

    /// Re-enable the read-while-write section after programming.
    fn reenable_rww(&mut self);

    /// Read `buf.len()` bytes starting at `address`.
    fn read(&self, address: u16, buf: &mut [u8]);
}

/// Byte-addressable EEPROM.
pub trait Eeprom {
    /// Total EEPROM size in bytes.
    const SIZE: usize;

    /// Write `data` starting at `address`, waiting for completion.
    fn write(&mut self, address: u16, data: &[u8]);

    /// Read `buf.len()` bytes starting at `address`.
    fn read(&self, address: u16, buf: &mut [u8]);
}
