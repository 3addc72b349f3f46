//! Device → host asynchronous notifications ("device interrupts")
//!
//! Events are not solicited by a specific request; they are queued on the
//! device and drained by the host polling the notification channel. The
//! transmit path stamps the sequence number and may set the queue-overflow
//! flag bit; both header bytes are therefore rewritten after encoding.

use crate::fixpt::Fixpt;
use crate::HEADER_SIZE;

// Event flag bits
/// The event queue overflowed since the last delivered event
pub const EVENT_FLG_TXQOVR: u8 = 1 << 0;
/// Higher priority; may evict a droppable queued event under pressure
pub const EVENT_FLG_PRIO: u8 = 1 << 1;
/// May be dropped in favor of higher priority events
pub const EVENT_FLG_DROPPABLE: u8 = 1 << 2;

// Event IDs
pub const EV_JOG: u8 = 0x00;
pub const EV_JOG_KEEPALIVE: u8 = 0x01;
pub const EV_SPINDLE: u8 = 0x02;
pub const EV_FEEDOVERRIDE: u8 = 0x03;
pub const EV_DEVFLAGS: u8 = 0x04;
pub const EV_HALT: u8 = 0x05;
pub const EV_LOGMSG: u8 = 0x06;

// Jog event flag bits
/// Continuous jog
pub const JOG_FLG_CONTINUOUS: u8 = 1 << 0;
/// Rapid jog
pub const JOG_FLG_RAPID: u8 = 1 << 1;

/// Bytes of log text carried by one LOGMSG event
pub const LOGMSG_SIZE: usize = 10;

/// Maximum encoded event size in bytes
pub const EVENT_MAX_SIZE: usize = HEADER_SIZE + 10;

/// Event payload variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Jog motion request from the pendant
    Jog {
        increment: Fixpt,
        velocity: Fixpt,
        axis: u8,
        flags: u8,
    },
    /// Jog keepalive; the host halts continuous jog when these stop
    JogKeepalive,
    /// Master spindle on/off request
    Spindle { state: u8 },
    /// Feed override dial moved
    FeedOverride { state: u8 },
    /// Device flags changed
    DevFlags { flags: u16 },
    /// Halt all motion
    Halt,
    /// Log message fragment
    LogMsg { msg: [u8; LOGMSG_SIZE] },
}

impl EventKind {
    /// The wire ID byte for this event
    pub fn id(&self) -> u8 {
        match self {
            EventKind::Jog { .. } => EV_JOG,
            EventKind::JogKeepalive => EV_JOG_KEEPALIVE,
            EventKind::Spindle { .. } => EV_SPINDLE,
            EventKind::FeedOverride { .. } => EV_FEEDOVERRIDE,
            EventKind::DevFlags { .. } => EV_DEVFLAGS,
            EventKind::Halt => EV_HALT,
            EventKind::LogMsg { .. } => EV_LOGMSG,
        }
    }

    /// Payload size in bytes for a given ID, `None` for unknown IDs
    pub fn payload_size(id: u8) -> Option<usize> {
        match id {
            EV_JOG => Some(10),
            EV_JOG_KEEPALIVE => Some(0),
            EV_SPINDLE => Some(1),
            EV_FEEDOVERRIDE => Some(1),
            EV_DEVFLAGS => Some(2),
            EV_HALT => Some(0),
            EV_LOGMSG => Some(LOGMSG_SIZE),
            _ => None,
        }
    }
}

/// A host-bound event with its transmit flags
///
/// The sequence number is not part of this type; the queue's transmit poll
/// assigns it when the event is copied out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    /// Transmit flag bits (PRIO, DROPPABLE; TXQOVR is set by the queue)
    pub flags: u8,
    /// Payload
    pub kind: EventKind,
}

impl Event {
    /// Create an event with no flags set
    pub fn new(kind: EventKind) -> Self {
        Event { flags: 0, kind }
    }

    /// Create an event with the given flag bits
    pub fn with_flags(kind: EventKind, flags: u8) -> Self {
        Event { flags, kind }
    }

    /// True if the queue may drop this event under pressure
    pub fn is_droppable(&self) -> bool {
        self.flags & EVENT_FLG_DROPPABLE != 0
    }

    /// True if this event may evict a droppable one
    pub fn is_priority(&self) -> bool {
        self.flags & EVENT_FLG_PRIO != 0
    }

    /// Encode this event into a byte buffer, sequence number zeroed
    ///
    /// The buffer must hold at least [`EVENT_MAX_SIZE`] bytes. Returns the
    /// number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        assert!(buf.len() >= EVENT_MAX_SIZE);

        buf[0] = self.kind.id();
        buf[1] = self.flags;
        buf[2] = 0;
        buf[3] = 0;
        let p = &mut buf[HEADER_SIZE..];

        match self.kind {
            EventKind::Jog {
                increment,
                velocity,
                axis,
                flags,
            } => {
                p[0..4].copy_from_slice(&increment.to_le_bytes());
                p[4..8].copy_from_slice(&velocity.to_le_bytes());
                p[8] = axis;
                p[9] = flags;
            }
            EventKind::JogKeepalive | EventKind::Halt => {}
            EventKind::Spindle { state } => p[0] = state,
            EventKind::FeedOverride { state } => p[0] = state,
            EventKind::DevFlags { flags } => {
                p[0..2].copy_from_slice(&flags.to_le_bytes());
            }
            EventKind::LogMsg { msg } => p[..LOGMSG_SIZE].copy_from_slice(&msg),
        }

        HEADER_SIZE + EventKind::payload_size(self.kind.id()).unwrap()
    }

    /// Encode this event into a heapless Vec, sequence number zeroed
    pub fn encode_to_vec(&self) -> heapless::Vec<u8, EVENT_MAX_SIZE> {
        let mut buf = [0u8; EVENT_MAX_SIZE];
        let len = self.encode(&mut buf);
        let mut vec = heapless::Vec::new();
        // len <= EVENT_MAX_SIZE by construction
        let _ = vec.extend_from_slice(&buf[..len]);
        vec
    }

    /// Decode an event from raw bytes (host-side driver and tests)
    ///
    /// Returns the event and the stamped sequence number.
    pub fn decode(buf: &[u8]) -> Option<(Self, u8)> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let id = buf[0];
        let flags = buf[1];
        let seqno = buf[3];
        let size = EventKind::payload_size(id)?;
        if buf.len() < HEADER_SIZE + size {
            return None;
        }
        let p = &buf[HEADER_SIZE..];

        let kind = match id {
            EV_JOG => EventKind::Jog {
                increment: Fixpt::from_le_bytes([p[0], p[1], p[2], p[3]]),
                velocity: Fixpt::from_le_bytes([p[4], p[5], p[6], p[7]]),
                axis: p[8],
                flags: p[9],
            },
            EV_JOG_KEEPALIVE => EventKind::JogKeepalive,
            EV_SPINDLE => EventKind::Spindle { state: p[0] },
            EV_FEEDOVERRIDE => EventKind::FeedOverride { state: p[0] },
            EV_DEVFLAGS => EventKind::DevFlags {
                flags: u16::from_le_bytes([p[0], p[1]]),
            },
            EV_HALT => EventKind::Halt,
            EV_LOGMSG => {
                let mut msg = [0u8; LOGMSG_SIZE];
                msg.copy_from_slice(&p[..LOGMSG_SIZE]);
                EventKind::LogMsg { msg }
            }
            _ => return None,
        };

        Some((Event { flags, kind }, seqno))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_devflags_layout() {
        let ev = Event::new(EventKind::DevFlags { flags: 0x0104 });
        let mut buf = [0u8; EVENT_MAX_SIZE];
        let len = ev.encode(&mut buf);
        assert_eq!(&buf[..len], &[EV_DEVFLAGS, 0, 0, 0, 0x04, 0x01]);
    }

    #[test]
    fn test_flag_helpers() {
        let ev = Event::with_flags(EventKind::Halt, EVENT_FLG_PRIO);
        assert!(ev.is_priority());
        assert!(!ev.is_droppable());

        let ev = Event::with_flags(
            EventKind::FeedOverride { state: 7 },
            EVENT_FLG_DROPPABLE,
        );
        assert!(ev.is_droppable());
    }

    #[test]
    fn test_jog_layout() {
        let ev = Event::new(EventKind::Jog {
            increment: Fixpt::from_int(1),
            velocity: Fixpt::from_int(100),
            axis: 3,
            flags: JOG_FLG_RAPID,
        });
        let mut buf = [0u8; EVENT_MAX_SIZE];
        let len = ev.encode(&mut buf);
        assert_eq!(len, EVENT_MAX_SIZE);
        assert_eq!(buf[0], EV_JOG);
        assert_eq!(buf[12], 3);
        assert_eq!(buf[13], JOG_FLG_RAPID);
    }

    fn arb_kind() -> impl Strategy<Value = EventKind> {
        prop_oneof![
            (any::<i32>(), any::<i32>(), any::<u8>(), any::<u8>()).prop_map(
                |(inc, vel, axis, flags)| EventKind::Jog {
                    increment: Fixpt::from_raw(inc),
                    velocity: Fixpt::from_raw(vel),
                    axis,
                    flags,
                }
            ),
            Just(EventKind::JogKeepalive),
            any::<u8>().prop_map(|state| EventKind::Spindle { state }),
            any::<u8>().prop_map(|state| EventKind::FeedOverride { state }),
            any::<u16>().prop_map(|flags| EventKind::DevFlags { flags }),
            Just(EventKind::Halt),
            any::<[u8; LOGMSG_SIZE]>().prop_map(|msg| EventKind::LogMsg { msg }),
        ]
    }

    proptest! {
        #[test]
        fn prop_event_roundtrip(kind in arb_kind(), flags in 0u8..8) {
            let ev = Event::with_flags(kind, flags);
            let mut buf = [0u8; EVENT_MAX_SIZE];
            let len = ev.encode(&mut buf);
            prop_assert_eq!(len, HEADER_SIZE + EventKind::payload_size(ev.kind.id()).unwrap());
            let (decoded, seqno) = Event::decode(&buf[..len]).unwrap();
            prop_assert_eq!(decoded, ev);
            prop_assert_eq!(seqno, 0);
        }
    }
}
