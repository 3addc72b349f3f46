//! Update-context control message dispatcher and flasher
//!
//! Firmware images arrive as checksummed 32-byte chunks into a RAM page
//! buffer, which is then committed to local program memory or EEPROM, or
//! streamed to the coprocessor bootloader. All commits are verified by
//! reading back before the OK reply goes out.

use embedded_hal::delay::DelayNs;
use pendant_hal::bus::BusPort;
use pendant_hal::nvm::{Eeprom, ProgramMemory};
use pendant_hal::supervisor::ModeSupervisor;
use pendant_protocol::crc::{crc8, crc8_final};
use pendant_protocol::message::{
    ControlMessage, DecodeError, McuTarget, Request, WRITEBUF_DATA_SIZE,
};
use pendant_protocol::reply::{ControlReply, ErrorCode, ReplyKind};
use pendant_protocol::HEADER_SIZE;

use crate::coproc::{CoprocLink, RemoteError, COPROC_PAGE_SIZE};

/// Page buffer size; covers the largest commit target (local EEPROM)
pub const PAGE_BUFFER_SIZE: usize = 1024;

/// Coprocessor EEPROM size in bytes
pub const COPROC_EEPROM_SIZE: usize = 512;

/// The update-context dispatcher
///
/// Owns all collaborators of the update path. The application dispatcher
/// never runs concurrently; the two contexts are separate firmware images.
pub struct UpdateDispatcher<B, P, E, S, D> {
    bus: B,
    flash: P,
    eeprom: E,
    supervisor: S,
    delay: D,
    page_buffer: [u8; PAGE_BUFFER_SIZE],
}

impl<B, P, E, S, D> UpdateDispatcher<B, P, E, S, D>
where
    B: BusPort,
    P: ProgramMemory,
    E: Eeprom,
    S: ModeSupervisor,
    D: DelayNs,
{
    pub fn new(bus: B, flash: P, eeprom: E, supervisor: S, delay: D) -> Self {
        UpdateDispatcher {
            bus,
            flash,
            eeprom,
            supervisor,
            delay,
            page_buffer: [0xFF; PAGE_BUFFER_SIZE],
        }
    }

    /// Handle one raw control message, encode the reply into `reply_buf`
    ///
    /// Always produces a reply; returns its size. `reply_buf` must hold at
    /// least [`pendant_protocol::reply::REPLY_MAX_SIZE`] bytes.
    pub fn dispatch(&mut self, raw: &[u8], reply_buf: &mut [u8]) -> usize {
        let seqno = if raw.len() >= HEADER_SIZE { raw[3] } else { 0 };

        let kind = self.handle(raw);
        ControlReply { seqno, kind }.encode(reply_buf)
    }

    fn handle(&mut self, raw: &[u8]) -> ReplyKind {
        if raw.len() < HEADER_SIZE {
            return ReplyKind::Error(ErrorCode::Size);
        }
        let msg = match ControlMessage::decode(raw) {
            Ok(msg) => msg,
            Err(DecodeError::Truncated) => return ReplyKind::Error(ErrorCode::Size),
            Err(DecodeError::UnknownId) => return ReplyKind::Error(ErrorCode::Command),
        };
        // Application traffic is not for us
        if !msg.is_bootloader() {
            return ReplyKind::Error(ErrorCode::Context);
        }

        match msg.request {
            Request::Ping => ReplyKind::Ok,
            Request::EnterBoot { magic, target } => {
                if !ControlMessage::enterboot_magic_ok(&magic) {
                    return ReplyKind::Error(ErrorCode::Inval);
                }
                match McuTarget::from_byte(target) {
                    // Already here
                    Some(McuTarget::Cpu) => ReplyKind::Ok,
                    Some(McuTarget::Coproc) => {
                        let mut link = CoprocLink::new(&mut self.bus, &mut self.delay);
                        if link.enter_bootloader() {
                            ReplyKind::Ok
                        } else {
                            ReplyKind::Error(ErrorCode::CmdFail)
                        }
                    }
                    None => ReplyKind::Error(ErrorCode::Context),
                }
            }
            Request::ExitBoot { target } => match McuTarget::from_byte(target) {
                Some(McuTarget::Cpu) => {
                    // Granted; the transition happens after the reply has
                    // gone out
                    self.supervisor.request_application_mode();
                    ReplyKind::Ok
                }
                Some(McuTarget::Coproc) => {
                    let mut link = CoprocLink::new(&mut self.bus, &mut self.delay);
                    if link.exit_bootloader() {
                        ReplyKind::Ok
                    } else {
                        ReplyKind::Error(ErrorCode::CmdFail)
                    }
                }
                None => ReplyKind::Error(ErrorCode::Context),
            },
            Request::BootWriteBuf {
                offset,
                size,
                crc,
                data,
            } => self.write_buf(offset, size, crc, &data),
            Request::BootFlashPg { address, target } => match McuTarget::from_byte(target) {
                Some(McuTarget::Cpu) => self.flash_local_page(address),
                Some(McuTarget::Coproc) => self.flash_remote_page(address),
                None => ReplyKind::Error(ErrorCode::Context),
            },
            Request::BootEepWrite {
                address,
                size,
                target,
            } => match McuTarget::from_byte(target) {
                Some(McuTarget::Cpu) => self.write_local_eeprom(address, size),
                Some(McuTarget::Coproc) => {
                    // Bounds are still validated so the host learns about
                    // bad images before learning about the missing feature
                    if size as usize > PAGE_BUFFER_SIZE
                        || address as usize + size as usize > COPROC_EEPROM_SIZE
                    {
                        ReplyKind::Error(ErrorCode::Inval)
                    } else {
                        // Remote EEPROM writing is not implemented by the
                        // coprocessor bootloader
                        ReplyKind::Error(ErrorCode::CmdFail)
                    }
                }
                None => ReplyKind::Error(ErrorCode::Context),
            },
            // Application-context command in the update context
            _ => ReplyKind::Error(ErrorCode::Command),
        }
    }

    /// Verify and copy one chunk into the page buffer
    ///
    /// The buffer is untouched unless the checksum matches.
    fn write_buf(&mut self, offset: u16, size: u8, crc: u8, data: &[u8]) -> ReplyKind {
        let offset = offset as usize;
        let size = size as usize;
        if size > WRITEBUF_DATA_SIZE || offset + size > PAGE_BUFFER_SIZE {
            return ReplyKind::Error(ErrorCode::Inval);
        }
        if crc8_final(crc8(&data[..size])) != crc {
            return ReplyKind::Error(ErrorCode::Checksum);
        }
        self.page_buffer[offset..offset + size].copy_from_slice(&data[..size]);
        ReplyKind::Ok
    }

    /// Commit the page buffer to one local program-memory page
    fn flash_local_page(&mut self, address: u16) -> ReplyKind {
        let base = address & !(P::PAGE_SIZE as u16 - 1);

        self.flash.erase_page(base);
        self.flash.write_page(base, &self.page_buffer[..P::PAGE_SIZE]);
        self.flash.reenable_rww();

        let mut readback = [0u8; PAGE_BUFFER_SIZE];
        let readback = &mut readback[..P::PAGE_SIZE];
        self.flash.read(base, readback);
        if readback != &self.page_buffer[..P::PAGE_SIZE] {
            return ReplyKind::Error(ErrorCode::CmdFail);
        }

        // A fresh buffer reads as erased flash
        self.page_buffer.fill(0xFF);
        ReplyKind::Ok
    }

    /// Stream the page buffer to the coprocessor bootloader
    fn flash_remote_page(&mut self, address: u16) -> ReplyKind {
        let mut page = [0u8; COPROC_PAGE_SIZE];
        page.copy_from_slice(&self.page_buffer[..COPROC_PAGE_SIZE]);

        let mut link = CoprocLink::new(&mut self.bus, &mut self.delay);
        match link.flash_page(address, &page) {
            Ok(()) => ReplyKind::Ok,
            Err(RemoteError::Checksum) => ReplyKind::Error(ErrorCode::Checksum),
            Err(RemoteError::CmdFail) => ReplyKind::Error(ErrorCode::CmdFail),
        }
    }

    /// Commit part of the page buffer to local EEPROM
    fn write_local_eeprom(&mut self, address: u16, size: u16) -> ReplyKind {
        let size = size as usize;
        if size > PAGE_BUFFER_SIZE || address as usize + size > E::SIZE {
            return ReplyKind::Error(ErrorCode::Inval);
        }

        self.eeprom.write(address, &self.page_buffer[..size]);

        let mut readback = [0u8; PAGE_BUFFER_SIZE];
        let readback = &mut readback[..size];
        self.eeprom.read(address, readback);
        if readback != &self.page_buffer[..size] {
            return ReplyKind::Error(ErrorCode::CmdFail);
        }
        ReplyKind::Ok
    }
}
