//! Signed 16.16 fixed-point values
//!
//! Axis positions, jog increments and jog velocities travel on the wire and
//! live in device state as 32-bit fixed-point numbers with 16 fractional
//! bits. Display formatting is not this crate's business; only the arithmetic
//! the core and the codecs need is provided.

use core::ops::{Add, Neg, Sub};

/// Number of fractional bits
pub const FRAC_BITS: u32 = 16;

/// A signed 16.16 fixed-point value
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fixpt(i32);

impl Fixpt {
    /// Zero
    pub const ZERO: Fixpt = Fixpt(0);

    /// Construct from the raw 32-bit representation
    pub const fn from_raw(raw: i32) -> Self {
        Fixpt(raw)
    }

    /// Raw 32-bit representation
    pub const fn to_raw(self) -> i32 {
        self.0
    }

    /// Construct from a whole number
    pub const fn from_int(value: i16) -> Self {
        Fixpt((value as i32) << FRAC_BITS)
    }

    /// Construct from a float, rounding toward the wire convention
    pub fn from_f32(value: f32) -> Self {
        Fixpt((value * ((1u32 << FRAC_BITS) as f32)) as i32 + 1)
    }

    /// Whole part, truncated toward zero
    pub const fn int_part(self) -> i32 {
        let truncated = self.0 >> FRAC_BITS;
        // Arithmetic shift rounds toward negative infinity; correct back
        // toward zero when fractional bits were shifted out
        if self.0 < 0 && self.0 & ((1 << FRAC_BITS) - 1) != 0 {
            truncated + 1
        } else {
            truncated
        }
    }

    /// True for negative values
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value
    pub const fn abs(self) -> Self {
        if self.0 < 0 {
            Fixpt(-self.0)
        } else {
            self
        }
    }

    /// Little-endian wire representation
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Construct from the little-endian wire representation
    pub const fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Fixpt(i32::from_le_bytes(bytes))
    }
}

impl Add for Fixpt {
    type Output = Fixpt;

    fn add(self, rhs: Fixpt) -> Fixpt {
        Fixpt(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Fixpt {
    type Output = Fixpt;

    fn sub(self, rhs: Fixpt) -> Fixpt {
        Fixpt(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for Fixpt {
    type Output = Fixpt;

    fn neg(self) -> Fixpt {
        Fixpt(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_int() {
        assert_eq!(Fixpt::from_int(1).to_raw(), 0x0001_0000);
        assert_eq!(Fixpt::from_int(-2).to_raw(), -0x0002_0000);
        assert_eq!(Fixpt::from_int(100).int_part(), 100);
    }

    #[test]
    fn test_arithmetic() {
        let a = Fixpt::from_int(3);
        let b = Fixpt::from_int(5);
        assert_eq!((a + b).int_part(), 8);
        assert_eq!((a - b).int_part(), -2);
        assert_eq!((-a).int_part(), -3);
        assert_eq!((-a).abs(), a);
    }

    #[test]
    fn test_wire_roundtrip() {
        let v = Fixpt::from_raw(0x1234_5678);
        assert_eq!(Fixpt::from_le_bytes(v.to_le_bytes()), v);
        assert_eq!(v.to_le_bytes(), [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_negative_int_part() {
        // -0.5 truncates toward zero
        let half = Fixpt::from_raw(-(1 << (FRAC_BITS - 1)));
        assert_eq!(half.int_part(), 0);
        assert!(half.is_negative());
        // Exact negative integers have no fractional correction
        assert_eq!(Fixpt::from_int(-1).int_part(), -1);
        assert_eq!(Fixpt::from_int(-2).int_part(), -2);
        // -2.25 truncates to -2
        let v = Fixpt::from_int(-2) - Fixpt::from_raw(1 << (FRAC_BITS - 2));
        assert_eq!(v.int_part(), -2);
    }
}
