//! Serial bus abstractions
//!
//! The pendant CPU talks to the button coprocessor over a point-to-point
//! full-duplex serial bus with a chip-select line and an extra busy/ready
//! handshake line driven by the peer.

/// Master side of the coprocessor bus.
///
/// One byte is always clocked out while one is clocked in. The blocking
/// exchange busy-waits on the shift hardware; the bounded wait is acceptable
/// outside interrupt context only.
pub trait BusPort {
    /// Assert or release the peer chip-select line.
    fn select(&mut self, selected: bool);

    /// Clock one byte out and return the byte clocked in.
    ///
    /// Blocks until the hardware finishes the cycle.
    fn exchange(&mut self, tx: u8) -> u8;

    /// Arm the hardware for one byte without waiting for completion.
    ///
    /// The transfer-complete interrupt delivers the received byte to
    /// whoever drives the asynchronous engine.
    fn begin_exchange(&mut self, tx: u8);

    /// State of the peer busy/ready handshake line.
    ///
    /// `true` while the peer cannot accept the next byte.
    fn peer_busy(&self) -> bool;
}
