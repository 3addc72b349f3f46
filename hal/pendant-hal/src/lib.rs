//! Pendant Hardware Abstraction Layer
//!
//! This crate defines the trait seams between the board-agnostic firmware
//! core (`pendant-core`) and the hardware it runs on. Board crates implement
//! these traits on top of the actual peripherals; the core and its host-side
//! tests only ever see the traits.
//!
//! # Traits
//!
//! - [`bus::BusPort`] - the point-to-point serial bus to the coprocessor
//! - [`nvm::ProgramMemory`], [`nvm::Eeprom`] - non-volatile memory programming
//! - [`supervisor::ModeSupervisor`] - application/update mode transitions

#![no_std]
#![deny(unsafe_code)]

pub mod bus;
pub mod nvm;
pub mod supervisor;

// Re-export key traits at crate root for convenience
pub use bus::BusPort;
pub use nvm::{Eeprom, ProgramMemory};
pub use supervisor::ModeSupervisor;
