//! Application-context control message dispatcher
//!
//! Decodes a raw control message, applies it to the device state and encodes
//! exactly one reply. Semantic validation happens here; the codec in
//! `pendant-protocol` only enforces sizes.

use pendant_hal::supervisor::ModeSupervisor;
use pendant_protocol::message::{
    ControlMessage, DecodeError, McuTarget, Request, NUM_AXES, NUM_INCREMENTS, SPINDLE_CW,
};
use pendant_protocol::reply::{ControlReply, ErrorCode, ReplyKind};
use pendant_protocol::HEADER_SIZE;

use crate::devstate::DeviceState;

/// The application-context dispatcher
///
/// Owns the mode supervisor; everything else it needs is passed per call.
pub struct Dispatcher<S> {
    supervisor: S,
}

impl<S: ModeSupervisor> Dispatcher<S> {
    pub fn new(supervisor: S) -> Self {
        Dispatcher { supervisor }
    }

    /// Handle one raw control message, encode the reply into `reply_buf`
    ///
    /// Always produces a reply; returns its size. `reply_buf` must hold at
    /// least [`pendant_protocol::reply::REPLY_MAX_SIZE`] bytes.
    pub fn dispatch(&mut self, state: &DeviceState, raw: &[u8], reply_buf: &mut [u8]) -> usize {
        let seqno = if raw.len() >= HEADER_SIZE { raw[3] } else { 0 };

        let kind = self.handle(state, raw);
        ControlReply { seqno, kind }.encode(reply_buf)
    }

    fn handle(&mut self, state: &DeviceState, raw: &[u8]) -> ReplyKind {
        if raw.len() < HEADER_SIZE {
            return ReplyKind::Error(ErrorCode::Size);
        }
        let msg = match ControlMessage::decode(raw) {
            Ok(msg) => msg,
            Err(DecodeError::Truncated) => return ReplyKind::Error(ErrorCode::Size),
            Err(DecodeError::UnknownId) => return ReplyKind::Error(ErrorCode::Command),
        };
        // Update-context traffic is not for us
        if msg.is_bootloader() {
            return ReplyKind::Error(ErrorCode::Context);
        }

        match msg.request {
            Request::Ping => ReplyKind::Ok,
            Request::Reset => {
                state.reset();
                ReplyKind::Ok
            }
            Request::DevFlags { mask, set } => {
                ReplyKind::Val16(state.modify_devflags(mask, set))
            }
            Request::AxisUpdate { pos, axis } => {
                if axis as usize >= NUM_AXES {
                    return ReplyKind::Error(ErrorCode::Inval);
                }
                state.axis_pos_update(axis, pos);
                ReplyKind::Ok
            }
            Request::SpindleUpdate { state: spindle } => {
                state.spindle_state_update(spindle == SPINDLE_CW);
                ReplyKind::Ok
            }
            Request::FeedOverride { percent } => {
                state.feed_override_feedback_update(percent);
                ReplyKind::Ok
            }
            Request::AxisEnable { mask } => {
                if mask == 0 {
                    return ReplyKind::Error(ErrorCode::Inval);
                }
                state.set_axis_enable_mask(mask);
                ReplyKind::Ok
            }
            Request::EstopUpdate { asserted } => {
                state.set_estop_state(asserted);
                ReplyKind::Ok
            }
            Request::SetIncrement { increment, index } => {
                if index as usize >= NUM_INCREMENTS {
                    return ReplyKind::Error(ErrorCode::Inval);
                }
                state.set_increment(index, increment);
                ReplyKind::Ok
            }
            Request::EnterBoot { magic, target } => {
                if !ControlMessage::enterboot_magic_ok(&magic) {
                    return ReplyKind::Error(ErrorCode::Inval);
                }
                match McuTarget::from_byte(target) {
                    Some(McuTarget::Cpu) => {
                        // Granted; the transition happens after the reply
                        // has gone out
                        self.supervisor.request_update_mode();
                        ReplyKind::Ok
                    }
                    // The coprocessor is rebooted from the update context
                    _ => ReplyKind::Error(ErrorCode::Context),
                }
            }
            // Already in the application; nothing to leave
            Request::ExitBoot { .. } => ReplyKind::Ok,
            Request::BootWriteBuf { .. }
            | Request::BootFlashPg { .. }
            | Request::BootEepWrite { .. } => ReplyKind::Error(ErrorCode::Command),
        }
    }
}
