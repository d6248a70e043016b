//! Event type bitmask.
//!
//! Each bit of an [`EventMask`] names one event type within an index.  The
//! registry treats every bit as an independent resource: arming a listener
//! that wants three types performs three separate reference-count updates,
//! and each may trigger its own `enable` call.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Largest number of type bits a registry can track.
pub const MAX_TYPES: u32 = u32::BITS;

/// A set of event types, one bit per type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMask(u32);

impl EventMask {
    /// The empty mask.
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask with only type `bit` set.  `bit` must be below [`MAX_TYPES`].
    #[must_use]
    pub const fn bit(bit: u32) -> Self {
        Self(1 << bit)
    }

    /// Mask with the low `types_nr` bits set.
    #[must_use]
    pub const fn all(types_nr: u32) -> Self {
        if types_nr >= MAX_TYPES {
            Self(u32::MAX)
        } else {
            Self((1 << types_nr) - 1)
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every set bit lies below `types_nr`.
    #[must_use]
    pub const fn fits(self, types_nr: u32) -> bool {
        self.0 & !Self::all(types_nr).0 == 0
    }

    /// Number of set bits.
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate the positions of the set bits, lowest first.
    pub fn iter(self) -> Bits {
        Bits(self.0)
    }
}

impl From<u32> for EventMask {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

impl IntoIterator for EventMask {
    type Item = u32;
    type IntoIter = Bits;

    fn into_iter(self) -> Bits {
        self.iter()
    }
}

/// Iterator over the set bit positions of an [`EventMask`].
#[derive(Debug, Clone)]
pub struct Bits(u32);

impl Iterator for Bits {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Bits {}
