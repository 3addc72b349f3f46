//! Control/event wire protocol for the CNC pendant
//!
//! This crate defines the binary formats spoken on the two links of the
//! pendant:
//!
//! - the **control channel** to the CNC host: request/reply control messages
//!   and asynchronous host-bound events ("device interrupts"),
//! - the **coprocessor link**: single-byte opcodes and result sentinels
//!   exchanged with the button coprocessor.
//!
//! # Control channel format
//!
//! Every control message, reply and event starts with the same fixed header:
//! ```text
//! ┌──────┬───────┬──────────┬───────┬──────────────────────┐
//! │ ID   │ FLAGS │ RESERVED │ SEQNO │ VARIANT PAYLOAD      │
//! │ 1B   │ 1B    │ 1B       │ 1B    │ id-specific, LE      │
//! └──────┴───────┴──────────┴───────┴──────────────────────┘
//! ```
//!
//! The payload size is determined solely by the ID; multi-byte fields are
//! little-endian. Replies echo the request sequence number. Event sequence
//! numbers are stamped by the transmit path and wrap at 256 so the host can
//! detect lost events.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod coproc;
pub mod crc;
pub mod event;
pub mod fixpt;
pub mod message;
pub mod reply;

pub use crc::{crc8_final, crc8_update};
pub use event::{Event, EventKind};
pub use fixpt::Fixpt;
pub use message::{ControlMessage, DecodeError, McuTarget, Request, CONTROL_FLG_BOOTLOADER};
pub use reply::{ControlReply, ErrorCode, ReplyKind};

/// Size of the fixed message/reply/event header in bytes
pub const HEADER_SIZE: usize = 4;
