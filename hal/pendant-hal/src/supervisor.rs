//! Operating-mode supervision
//!
//! Switching between the application and the update (bootloader) context is
//! an irrevocable control transfer into a different firmware image. The core
//! never performs it; it only asks the supervisor to. On real hardware the
//! request shuts down peripherals and jumps, so from the caller's point of
//! view a granted request never returns control to the old context.

/// Collaborator that carries out mode transitions.
pub trait ModeSupervisor {
    /// Request the jump into the update (bootloader) context.
    ///
    /// The core's contract ends once the transition is initiated.
    fn request_update_mode(&mut self);

    /// Request the jump back into the application context.
    fn request_application_mode(&mut self);
}
