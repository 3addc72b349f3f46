//! Device state shared between the main loop and interrupt context
//!
//! Positions, flags and console state are mutated from both the main loop
//! and interrupt handlers. The state lives behind a critical-section cell
//! and is only reachable through mutator methods, so the concurrency
//! contract is visible at every call site.

use core::cell::RefCell;

use critical_section::Mutex;
use pendant_protocol::event::{Event, EventKind};
use pendant_protocol::message::{NUM_AXES, NUM_INCREMENTS};
use pendant_protocol::Fixpt;

use crate::queue::EventQueue;

// Device flag bits (host-visible via DEVFLAGS / the DevFlags event)
/// Debugging disabled
pub const DEVICE_FLG_NODEBUG: u16 = 1 << 0;
/// Verbose debugging
pub const DEVICE_FLG_VERBOSEDBG: u16 = 1 << 1;
/// The pendant is turned on
pub const DEVICE_FLG_ON: u16 = 1 << 2;
/// Two-hand security switch enabled
pub const DEVICE_FLG_TWOHANDEN: u16 = 1 << 3;
/// Send log messages through the control channel
pub const DEVICE_FLG_USBLOGMSG: u16 = 1 << 4;

/// Axis-enable mask after reset: X, Y, Z and A
const DEFAULT_AXIS_MASK: u16 = (1 << 0) | (1 << 1) | (1 << 2) | (1 << 6);

/// Maximum feed-override feedback percentage
const FEED_OVERRIDE_MAX: u8 = 200;

#[derive(Clone, Copy)]
struct StateInner {
    /// Absolute axis positions as reported by the host
    positions: [Fixpt; NUM_AXES],
    /// Host-controlled axis-enable mask, never zero after reset
    axis_enable_mask: u16,
    /// Currently selected axis
    axis: u8,
    /// Master spindle running
    spindle_on: bool,
    /// Feed override feedback from the host, percent
    fo_feedback_percent: u8,
    /// E-stop asserted
    estop: bool,
    /// Jog increment table uploaded by the host
    increments: [Fixpt; NUM_INCREMENTS],
    /// Device flags word
    devflags: u16,
    /// Pushbutton state fetched from the coprocessor
    buttons: u16,
    /// Accumulated encoder increments (two per detent)
    jogwheel: i16,
}

impl StateInner {
    const fn new() -> Self {
        StateInner {
            positions: [Fixpt::ZERO; NUM_AXES],
            axis_enable_mask: DEFAULT_AXIS_MASK,
            axis: 0,
            spindle_on: false,
            fo_feedback_percent: 0,
            estop: false,
            increments: [Fixpt::ZERO; NUM_INCREMENTS],
            devflags: 0,
            buttons: 0,
            jogwheel: 0,
        }
    }
}

/// The pendant's device state
///
/// All methods are safe to call from the main loop; the ones documented as
/// interrupt-context mutators are also safe from interrupt handlers (the
/// dispatcher runs from the transport's receive path).
pub struct DeviceState {
    inner: Mutex<RefCell<StateInner>>,
}

impl DeviceState {
    /// Create a device state with power-on defaults
    pub const fn new() -> Self {
        DeviceState {
            inner: Mutex::new(RefCell::new(StateInner::new())),
        }
    }

    /// Reset everything to power-on defaults
    pub fn reset(&self) {
        critical_section::with(|cs| {
            *self.inner.borrow_ref_mut(cs) = StateInner::new();
        });
    }

    /// Update one absolute axis position. Interrupt-context mutator.
    ///
    /// The dispatcher validates the axis index; an out-of-range index here
    /// is a core invariant violation.
    pub fn axis_pos_update(&self, axis: u8, pos: Fixpt) {
        assert!((axis as usize) < NUM_AXES);
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).positions[axis as usize] = pos;
        });
    }

    /// Read back one absolute axis position
    pub fn axis_pos(&self, axis: u8) -> Fixpt {
        assert!((axis as usize) < NUM_AXES);
        critical_section::with(|cs| self.inner.borrow_ref(cs).positions[axis as usize])
    }

    /// Set the axis-enable mask. Interrupt-context mutator.
    ///
    /// If the currently selected axis got disabled, selection moves to the
    /// lowest enabled axis. A zero mask is rejected by the dispatcher and is
    /// a core invariant violation here.
    pub fn set_axis_enable_mask(&self, mask: u16) {
        assert!(mask != 0);
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            inner.axis_enable_mask = mask;
            if mask & (1 << inner.axis) == 0 {
                inner.axis = mask.trailing_zeros() as u8;
            }
        });
    }

    /// Current axis-enable mask
    pub fn axis_enable_mask(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).axis_enable_mask)
    }

    /// Currently selected axis
    pub fn selected_axis(&self) -> u8 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).axis)
    }

    /// Update the spindle state. Interrupt-context mutator.
    pub fn spindle_state_update(&self, on: bool) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).spindle_on = on;
        });
    }

    /// Spindle running?
    pub fn spindle_is_on(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).spindle_on)
    }

    /// Update the feed-override feedback, clamped to 200 %. Interrupt-context
    /// mutator.
    pub fn feed_override_feedback_update(&self, percent: u8) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).fo_feedback_percent =
                percent.min(FEED_OVERRIDE_MAX);
        });
    }

    /// Last feed-override feedback percentage
    pub fn feed_override_feedback(&self) -> u8 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).fo_feedback_percent)
    }

    /// Update the e-stop state. Interrupt-context mutator.
    pub fn set_estop_state(&self, asserted: bool) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).estop = asserted;
        });
    }

    /// E-stop asserted?
    pub fn estop_asserted(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).estop)
    }

    /// Store one jog increment definition. Interrupt-context mutator.
    ///
    /// The dispatcher validates the index.
    pub fn set_increment(&self, index: u8, increment: Fixpt) {
        assert!((index as usize) < NUM_INCREMENTS);
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).increments[index as usize] = increment;
        });
    }

    /// Read back one jog increment definition
    pub fn increment(&self, index: u8) -> Fixpt {
        assert!((index as usize) < NUM_INCREMENTS);
        critical_section::with(|cs| self.inner.borrow_ref(cs).increments[index as usize])
    }

    /// Current device flags word
    pub fn devflags(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).devflags)
    }

    /// True if all `flags` bits are set
    pub fn devflag_is_set(&self, flags: u16) -> bool {
        self.devflags() & flags == flags
    }

    /// Modify the device flags word and return the new value
    ///
    /// Bits in `mask` are set to the corresponding bits of `set`; other bits
    /// are left alone.
    pub fn modify_devflags(&self, mask: u16, set: u16) -> u16 {
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            let mut flags = inner.devflags;
            flags |= mask & set;
            flags &= !mask | set;
            inner.devflags = flags;
            flags
        })
    }

    /// Modify the device flags and notify the host. Interrupt-context
    /// mutator.
    ///
    /// Pushes a coalesced DevFlags event; only the newest flags word matters
    /// to the host.
    pub fn modify_devflags_notify(&self, queue: &EventQueue, mask: u16, set: u16) -> u16 {
        let flags = self.modify_devflags(mask, set);
        let event = Event::new(EventKind::DevFlags { flags });
        queue.send_discard_old_from_irq(&event);
        flags
    }

    /// Merge a fetched coprocessor answer into the console state.
    /// Interrupt-context mutator (runs from the transport done callback).
    pub fn update_console_state(&self, buttons: u16, encoder_delta: i8) {
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            inner.buttons = buttons;
            inner.jogwheel += encoder_delta as i16;
        });
    }

    /// Current pushbutton state
    pub fn buttons(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).buttons)
    }

    /// Consume accumulated encoder movement as whole detents
    ///
    /// One detent is two encoder increments; the remainder stays accumulated.
    pub fn take_jog_detents(&self) -> i8 {
        critical_section::with(|cs| {
            let inner = &mut *self.inner.borrow_ref_mut(cs);
            let detents = inner.jogwheel / 2;
            inner.jogwheel %= 2;
            detents as i8
        })
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}
