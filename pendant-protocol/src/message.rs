//! Host → device control messages
//!
//! A control message is the fixed 4-byte header followed by a payload whose
//! size and layout are selected by the ID byte. Messages with bit 7 of the
//! FLAGS byte set are intended for the update (bootloader) context; the two
//! dispatchers reject messages addressed to the other one.

use crate::fixpt::Fixpt;
use crate::HEADER_SIZE;

/// FLAGS bit: intended message recipient is the bootloader
pub const CONTROL_FLG_BOOTLOADER: u8 = 0x80;

/// Magic byte pair required in any enter-update-mode request
pub const ENTERBOOT_MAGIC: [u8; 2] = [0xB0, 0x07];

/// Number of axes addressable by axis-related commands (X,Y,Z,U,V,W,A,B,C)
pub const NUM_AXES: usize = 9;

/// Number of jog increment table entries
pub const NUM_INCREMENTS: usize = 6;

/// Size of the data block carried by one page-buffer write
pub const WRITEBUF_DATA_SIZE: usize = 32;

/// Maximum encoded control message size in bytes
pub const MESSAGE_MAX_SIZE: usize = HEADER_SIZE + 4 + WRITEBUF_DATA_SIZE;

// Message IDs: application context
pub const MSG_PING: u8 = 0x00;
pub const MSG_RESET: u8 = 0x01;
pub const MSG_DEVFLAGS: u8 = 0x02;
pub const MSG_AXISUPDATE: u8 = 0x03;
pub const MSG_SPINDLEUPDATE: u8 = 0x04;
pub const MSG_FOUPDATE: u8 = 0x05;
pub const MSG_AXISENABLE: u8 = 0x06;
pub const MSG_ESTOPUPDATE: u8 = 0x07;
pub const MSG_SETINCREMENT: u8 = 0x08;

// Message IDs: bootloader context
pub const MSG_ENTERBOOT: u8 = 0xA0;
pub const MSG_EXITBOOT: u8 = 0xA1;
pub const MSG_BOOT_WRITEBUF: u8 = 0xA2;
pub const MSG_BOOT_FLASHPG: u8 = 0xA3;
pub const MSG_BOOT_EEPWRITE: u8 = 0xA4;

/// Which of the two microcontrollers a cross-device command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum McuTarget {
    /// The pendant CPU itself
    Cpu,
    /// The button coprocessor
    Coproc,
}

impl McuTarget {
    /// Parse a target selector from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(McuTarget::Cpu),
            1 => Some(McuTarget::Coproc),
            _ => None,
        }
    }

    /// Convert to the wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            McuTarget::Cpu => 0,
            McuTarget::Coproc => 1,
        }
    }
}

/// Spindle state values carried by SPINDLEUPDATE
pub const SPINDLE_OFF: u8 = 0;
pub const SPINDLE_CW: u8 = 1;
pub const SPINDLE_CCW: u8 = 2;

/// Errors from decoding a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Message shorter than the header or than the payload its ID requires
    Truncated,
    /// ID byte does not name a known command
    UnknownId,
}

/// Errors from encoding a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Output buffer too small for the encoded message
    BufferTooSmall,
}

/// Command-specific payload of a control message
///
/// Semantic validation (axis range, nonzero masks, magic bytes, target
/// selectors) is the dispatcher's job; the codec only enforces sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Pong request
    Ping,
    /// Reset device state
    Reset,
    /// Update and read back device flags
    DevFlags { mask: u16, set: u16 },
    /// Absolute axis position update
    AxisUpdate { pos: Fixpt, axis: u8 },
    /// Spindle state update
    SpindleUpdate { state: u8 },
    /// Feed override feedback update
    FeedOverride { percent: u8 },
    /// Set the axis-enable mask
    AxisEnable { mask: u16 },
    /// E-stop status update
    EstopUpdate { asserted: bool },
    /// Upload one jog increment definition
    SetIncrement { increment: Fixpt, index: u8 },
    /// Enter the CPU or coprocessor bootloader
    EnterBoot { magic: [u8; 2], target: u8 },
    /// Exit the CPU or coprocessor bootloader
    ExitBoot { target: u8 },
    /// Write a checksummed sub-range of the flash page buffer
    BootWriteBuf {
        offset: u16,
        size: u8,
        crc: u8,
        data: [u8; WRITEBUF_DATA_SIZE],
    },
    /// Commit the page buffer to program memory
    BootFlashPg { address: u16, target: u8 },
    /// Commit the page buffer to EEPROM
    BootEepWrite { address: u16, size: u16, target: u8 },
}

impl Request {
    /// The wire ID byte for this request
    pub fn id(&self) -> u8 {
        match self {
            Request::Ping => MSG_PING,
            Request::Reset => MSG_RESET,
            Request::DevFlags { .. } => MSG_DEVFLAGS,
            Request::AxisUpdate { .. } => MSG_AXISUPDATE,
            Request::SpindleUpdate { .. } => MSG_SPINDLEUPDATE,
            Request::FeedOverride { .. } => MSG_FOUPDATE,
            Request::AxisEnable { .. } => MSG_AXISENABLE,
            Request::EstopUpdate { .. } => MSG_ESTOPUPDATE,
            Request::SetIncrement { .. } => MSG_SETINCREMENT,
            Request::EnterBoot { .. } => MSG_ENTERBOOT,
            Request::ExitBoot { .. } => MSG_EXITBOOT,
            Request::BootWriteBuf { .. } => MSG_BOOT_WRITEBUF,
            Request::BootFlashPg { .. } => MSG_BOOT_FLASHPG,
            Request::BootEepWrite { .. } => MSG_BOOT_EEPWRITE,
        }
    }

    /// Payload size in bytes for a given ID, `None` for unknown IDs
    pub fn payload_size(id: u8) -> Option<usize> {
        match id {
            MSG_PING | MSG_RESET => Some(0),
            MSG_DEVFLAGS => Some(4),
            MSG_AXISUPDATE => Some(5),
            MSG_SPINDLEUPDATE => Some(1),
            MSG_FOUPDATE => Some(1),
            MSG_AXISENABLE => Some(2),
            MSG_ESTOPUPDATE => Some(1),
            MSG_SETINCREMENT => Some(5),
            MSG_ENTERBOOT => Some(3),
            MSG_EXITBOOT => Some(1),
            MSG_BOOT_WRITEBUF => Some(4 + WRITEBUF_DATA_SIZE),
            MSG_BOOT_FLASHPG => Some(3),
            MSG_BOOT_EEPWRITE => Some(5),
            _ => None,
        }
    }
}

/// A decoded host → device control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlMessage {
    /// Header FLAGS byte
    pub flags: u8,
    /// Host-chosen sequence number, echoed in the reply
    pub seqno: u8,
    /// Command payload
    pub request: Request,
}

impl ControlMessage {
    /// Create a message with no flags set
    pub fn new(seqno: u8, request: Request) -> Self {
        ControlMessage {
            flags: 0,
            seqno,
            request,
        }
    }

    /// Create a message addressed to the update (bootloader) context
    pub fn new_boot(seqno: u8, request: Request) -> Self {
        ControlMessage {
            flags: CONTROL_FLG_BOOTLOADER,
            seqno,
            request,
        }
    }

    /// True if this message is addressed to the update context
    pub fn is_bootloader(&self) -> bool {
        self.flags & CONTROL_FLG_BOOTLOADER != 0
    }

    /// Decode a message from raw bytes
    ///
    /// Trailing bytes beyond the ID's payload size are tolerated, matching
    /// transports that deliver fixed-size frames.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated);
        }
        let id = buf[0];
        let flags = buf[1];
        let seqno = buf[3];

        let size = Request::payload_size(id).ok_or(DecodeError::UnknownId)?;
        if buf.len() < HEADER_SIZE + size {
            return Err(DecodeError::Truncated);
        }
        let p = &buf[HEADER_SIZE..];

        let request = match id {
            MSG_PING => Request::Ping,
            MSG_RESET => Request::Reset,
            MSG_DEVFLAGS => Request::DevFlags {
                mask: u16::from_le_bytes([p[0], p[1]]),
                set: u16::from_le_bytes([p[2], p[3]]),
            },
            MSG_AXISUPDATE => Request::AxisUpdate {
                pos: Fixpt::from_le_bytes([p[0], p[1], p[2], p[3]]),
                axis: p[4],
            },
            MSG_SPINDLEUPDATE => Request::SpindleUpdate { state: p[0] },
            MSG_FOUPDATE => Request::FeedOverride { percent: p[0] },
            MSG_AXISENABLE => Request::AxisEnable {
                mask: u16::from_le_bytes([p[0], p[1]]),
            },
            MSG_ESTOPUPDATE => Request::EstopUpdate {
                asserted: p[0] != 0,
            },
            MSG_SETINCREMENT => Request::SetIncrement {
                increment: Fixpt::from_le_bytes([p[0], p[1], p[2], p[3]]),
                index: p[4],
            },
            MSG_ENTERBOOT => Request::EnterBoot {
                magic: [p[0], p[1]],
                target: p[2],
            },
            MSG_EXITBOOT => Request::ExitBoot { target: p[0] },
            MSG_BOOT_WRITEBUF => {
                let mut data = [0u8; WRITEBUF_DATA_SIZE];
                data.copy_from_slice(&p[4..4 + WRITEBUF_DATA_SIZE]);
                Request::BootWriteBuf {
                    offset: u16::from_le_bytes([p[0], p[1]]),
                    size: p[2],
                    crc: p[3],
                    data,
                }
            }
            MSG_BOOT_FLASHPG => Request::BootFlashPg {
                address: u16::from_le_bytes([p[0], p[1]]),
                target: p[2],
            },
            MSG_BOOT_EEPWRITE => Request::BootEepWrite {
                address: u16::from_le_bytes([p[0], p[1]]),
                size: u16::from_le_bytes([p[2], p[3]]),
                target: p[4],
            },
            _ => unreachable!(),
        };

        Ok(ControlMessage {
            flags,
            seqno,
            request,
        })
    }

    /// Encode this message into a byte buffer
    ///
    /// Returns the number of bytes written. Used by the host-side driver and
    /// by tests; the firmware itself only decodes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let id = self.request.id();
        // id() always yields a known ID
        let size = HEADER_SIZE + Request::payload_size(id).unwrap();
        if buf.len() < size {
            return Err(EncodeError::BufferTooSmall);
        }

        buf[0] = id;
        buf[1] = self.flags;
        buf[2] = 0;
        buf[3] = self.seqno;
        let p = &mut buf[HEADER_SIZE..];

        match self.request {
            Request::Ping | Request::Reset => {}
            Request::DevFlags { mask, set } => {
                p[0..2].copy_from_slice(&mask.to_le_bytes());
                p[2..4].copy_from_slice(&set.to_le_bytes());
            }
            Request::AxisUpdate { pos, axis } => {
                p[0..4].copy_from_slice(&pos.to_le_bytes());
                p[4] = axis;
            }
            Request::SpindleUpdate { state } => p[0] = state,
            Request::FeedOverride { percent } => p[0] = percent,
            Request::AxisEnable { mask } => {
                p[0..2].copy_from_slice(&mask.to_le_bytes());
            }
            Request::EstopUpdate { asserted } => p[0] = asserted as u8,
            Request::SetIncrement { increment, index } => {
                p[0..4].copy_from_slice(&increment.to_le_bytes());
                p[4] = index;
            }
            Request::EnterBoot { magic, target } => {
                p[0] = magic[0];
                p[1] = magic[1];
                p[2] = target;
            }
            Request::ExitBoot { target } => p[0] = target,
            Request::BootWriteBuf {
                offset,
                size,
                crc,
                data,
            } => {
                p[0..2].copy_from_slice(&offset.to_le_bytes());
                p[2] = size;
                p[3] = crc;
                p[4..4 + WRITEBUF_DATA_SIZE].copy_from_slice(&data);
            }
            Request::BootFlashPg { address, target } => {
                p[0..2].copy_from_slice(&address.to_le_bytes());
                p[2] = target;
            }
            Request::BootEepWrite {
                address,
                size,
                target,
            } => {
                p[0..2].copy_from_slice(&address.to_le_bytes());
                p[2..4].copy_from_slice(&size.to_le_bytes());
                p[4] = target;
            }
        }

        Ok(size)
    }

    /// Encode this message into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<heapless::Vec<u8, MESSAGE_MAX_SIZE>, EncodeError> {
        let mut buf = [0u8; MESSAGE_MAX_SIZE];
        let len = self.encode(&mut buf)?;
        let mut vec = heapless::Vec::new();
        vec.extend_from_slice(&buf[..len])
            .map_err(|_| EncodeError::BufferTooSmall)?;
        Ok(vec)
    }

    /// True if an enter-update request carries the required magic pair
    pub fn enterboot_magic_ok(magic: &[u8; 2]) -> bool {
        *magic == ENTERBOOT_MAGIC
    }
}
