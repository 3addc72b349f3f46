//! Board-agnostic core logic for the CNC pendant firmware
//!
//! This crate contains the protocol and transport machinery of the pendant
//! CPU that does not depend on specific hardware:
//!
//! - Device state behind an interrupt-safe cell ([`devstate`])
//! - The bounded, priority-aware host event queue ([`queue`])
//! - The shared serial transport engine ([`transport`])
//! - The application-context control dispatcher ([`dispatch`])
//! - The update-context dispatcher and flasher ([`update`])
//! - The coprocessor link and its periodic state poll ([`coproc`],
//!   [`statepoll`])
//!
//! Hardware enters only through the `pendant-hal` traits, so everything here
//! runs unchanged in host-side tests against mock collaborators.
//!
//! # Concurrency model
//!
//! A single-threaded cooperative main loop plus a fixed set of interrupt
//! handlers. Everything touched from both sides lives in a
//! `critical_section::Mutex<RefCell<_>>`; the board crate supplies the
//! critical-section implementation (tests use the `std` one).

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod coproc;
pub mod devstate;
pub mod dispatch;
pub mod queue;
pub mod statepoll;
pub mod transport;
pub mod update;

#[cfg(test)]
pub(crate) mod testutil;

pub use devstate::DeviceState;
pub use dispatch::Dispatcher;
pub use queue::EventQueue;
pub use transport::SerialEngine;
pub use update::UpdateDispatcher;
