//! Device → host control replies
//!
//! Every control message is answered with exactly one reply carrying the
//! request's sequence number. The reply size is exactly determined by the
//! reply ID.

use crate::HEADER_SIZE;

// Reply IDs
pub const REPLY_OK: u8 = 0x00;
pub const REPLY_ERROR: u8 = 0x01;
pub const REPLY_VAL16: u8 = 0x02;

/// Maximum encoded reply size in bytes
pub const REPLY_MAX_SIZE: usize = HEADER_SIZE + 2;

/// Typed error codes carried by an ERROR reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    /// Undefined error
    Undefined = 0,
    /// Unknown command
    Command = 1,
    /// Command size mismatch
    Size = 2,
    /// Busy / action already committed
    Busy = 3,
    /// Permission denied
    Permission = 4,
    /// Invalid input data
    Inval = 5,
    /// Invalid context (bootloader vs. application)
    Context = 6,
    /// Checksum/parity error
    Checksum = 7,
    /// Command attempted but failed
    CmdFail = 8,
}

impl ErrorCode {
    /// Parse an error code from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ErrorCode::Undefined),
            1 => Some(ErrorCode::Command),
            2 => Some(ErrorCode::Size),
            3 => Some(ErrorCode::Busy),
            4 => Some(ErrorCode::Permission),
            5 => Some(ErrorCode::Inval),
            6 => Some(ErrorCode::Context),
            7 => Some(ErrorCode::Checksum),
            8 => Some(ErrorCode::CmdFail),
            _ => None,
        }
    }
}

/// Reply payload variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyKind {
    /// Command executed
    Ok,
    /// Command rejected or failed
    Error(ErrorCode),
    /// Command executed, 16-bit result attached
    Val16(u16),
}

/// A device → host control reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlReply {
    /// Echo of the request sequence number
    pub seqno: u8,
    /// Result
    pub kind: ReplyKind,
}

impl ControlReply {
    /// An OK reply for the given request sequence number
    pub fn ok(seqno: u8) -> Self {
        ControlReply {
            seqno,
            kind: ReplyKind::Ok,
        }
    }

    /// An error reply for the given request sequence number
    pub fn error(seqno: u8, code: ErrorCode) -> Self {
        ControlReply {
            seqno,
            kind: ReplyKind::Error(code),
        }
    }

    /// A 16-bit value reply for the given request sequence number
    pub fn val16(seqno: u8, value: u16) -> Self {
        ControlReply {
            seqno,
            kind: ReplyKind::Val16(value),
        }
    }

    /// Encode this reply into a byte buffer
    ///
    /// The buffer must hold at least [`REPLY_MAX_SIZE`] bytes; the dispatch
    /// entry points guarantee that. Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        assert!(buf.len() >= REPLY_MAX_SIZE);

        buf[1] = 0;
        buf[2] = 0;
        buf[3] = self.seqno;
        match self.kind {
            ReplyKind::Ok => {
                buf[0] = REPLY_OK;
                HEADER_SIZE
            }
            ReplyKind::Error(code) => {
                buf[0] = REPLY_ERROR;
                buf[4] = code as u8;
                HEADER_SIZE + 1
            }
            ReplyKind::Val16(value) => {
                buf[0] = REPLY_VAL16;
                buf[4..6].copy_from_slice(&value.to_le_bytes());
                HEADER_SIZE + 2
            }
        }
    }

    /// Decode a reply from raw bytes (host-side driver and tests)
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let seqno = buf[3];
        let kind = match buf[0] {
            REPLY_OK => ReplyKind::Ok,
            REPLY_ERROR => ReplyKind::Error(ErrorCode::from_byte(*buf.get(4)?)?),
            REPLY_VAL16 => {
                ReplyKind::Val16(u16::from_le_bytes([*buf.get(4)?, *buf.get(5)?]))
            }
            _ => return None,
        };
        Some(ControlReply { seqno, kind })
    }
}
