//! Semantic types carried by expression nodes and symbols.
//!
//! The optimizer only needs enough of the type system to reason about
//! overlap, signedness and width: kill-set construction treats any two
//! accesses to the same scalar symbol as overlapping, and the
//! induction-variable rewrites must not change a comparison's signedness or
//! overflow behaviour. Aggregates never appear here; the front end has
//! already decomposed them into scalar accesses by the time this crate runs.

use strum::Display;

/// Scalar semantic type of an expression node or symbol.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// Double-precision float.
    F64,
    /// Untyped pointer-sized address.
    Ptr,
    /// No value (statement-position expressions).
    Void,
}

impl Ty {
    /// Returns `true` for the integer types (pointers excluded).
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::U8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
        )
    }

    /// Returns `true` for signed integer types.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns `true` for unsigned integer types.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Bit width of the type, or 0 for [`Ty::Void`].
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 8,
            Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 => 32,
            Self::I64 | Self::U64 | Self::F64 | Self::Ptr => 64,
            Self::Void => 0,
        }
    }

    /// Smallest representable value, as a wide integer. `None` for
    /// non-integer types.
    #[must_use]
    pub const fn min_value(self) -> Option<i128> {
        match self {
            Self::I8 => Some(i8::MIN as i128),
            Self::I16 => Some(i16::MIN as i128),
            Self::I32 => Some(i32::MIN as i128),
            Self::I64 => Some(i64::MIN as i128),
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => Some(0),
            _ => None,
        }
    }

    /// Largest representable value, as a wide integer. `None` for
    /// non-integer types.
    #[must_use]
    pub const fn max_value(self) -> Option<i128> {
        match self {
            Self::I8 => Some(i8::MAX as i128),
            Self::I16 => Some(i16::MAX as i128),
            Self::I32 => Some(i32::MAX as i128),
            Self::I64 => Some(i64::MAX as i128),
            Self::U8 => Some(u8::MAX as i128),
            Self::U16 => Some(u16::MAX as i128),
            Self::U32 => Some(u32::MAX as i128),
            Self::U64 => Some(u64::MAX as i128),
            _ => None,
        }
    }

    /// Returns `true` if `value` is representable in this type.
    #[must_use]
    pub fn can_represent(self, value: i128) -> bool {
        match (self.min_value(), self.max_value()) {
            (Some(min), Some(max)) => value >= min && value <= max,
            _ => false,
        }
    }
}
