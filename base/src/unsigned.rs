//! Unsigned types of the narrow bit widths that the HP 3000 I/O
//! hardware uses: bank numbers, interrupt priorities, device numbers
//! and word counts.  Each type stores its value in the smallest native
//! type that can hold it, and conversions which could lose
//! information are fallible.

use std::fmt::{self, Debug, Display, Formatter, Octal};

use serde::Serialize;

use super::error::ConversionFailed;

#[cfg(test)]
mod tests;

/// This macro implements conversions from native types to Unsigned*Bit
/// which are always possible (e.g. From<u8> for Unsigned12Bit).
macro_rules! from_native_type_to_self {
    ($SelfT:ty, $($from:ty)*) => {
        $(
            impl From<$from> for $SelfT {
                fn from(n: $from) -> Self {
                    Self {
                        bits: n.into(),
                    }
                }
            }
        )*
    }
}

/// This macro implements conversions from Unsigned*Bit to native
/// types which are always possible (e.g. From<Unsigned7Bit> for
/// usize).
macro_rules! from_self_to_native_type {
    ($SelfT:ty, $($to:ty)*) => {
        $(
            impl From<$SelfT> for $to {
                fn from(n: $SelfT) -> $to {
                    // The value range of $SelfT is narrower than that
                    // of its storage type, so this cannot truncate.
                    n.bits as $to
                }
            }
        )*
    }
}

/// This macro implements conversions from Unsigned*Bit to native
/// types where the conversion may not always fit.  For example
/// TryFrom<Unsigned12Bit> for u8.
macro_rules! try_from_self_to_native_type {
    ($SelfT:ty, $($to:ty)*) => {
        $(
            impl TryFrom<$SelfT> for $to {
                type Error = ConversionFailed;
                fn try_from(n: $SelfT) -> Result<$to, ConversionFailed> {
                    <$to>::try_from(n.bits).map_err(|_| ConversionFailed::TooLarge)
                }
            }
        )*
    }
}

/// This macro implements a conversions from native types to
/// Unsigned*Bit where the conversion may not always fit.  For example
/// TryFrom<u16> for Unsigned7Bit.
macro_rules! try_from_native_type_to_self {
    ($SelfT:ty, $InnerT:ty, $($from:ty)*) => {
        $(
            impl TryFrom<$from> for $SelfT {
                type Error = ConversionFailed;
                fn try_from(n: $from) -> Result<Self, ConversionFailed> {
                    let bits: $InnerT = match n.try_into() {
                        Err(_) => {
                            // $InnerT is unsigned, so n < 0 is
                            // always an error case.  For unsigned
                            // sources this comparison is useless
                            // and optimized away.
                            #[allow(unused_comparisons)]
                            if n < 0 {
                                return Err(ConversionFailed::TooSmall);
                            } else {
                                return Err(ConversionFailed::TooLarge);
                            }
                        }
                        Ok(value) if value > Self::VALUE_BITS => {
                            return Err(ConversionFailed::TooLarge);
                        }
                        Ok(value) => value,
                    };
                    Ok(Self { bits })
                }
            }
        )*
    }
}

/// This macro implements the base functionality of the unsigned
/// types.  `SelfT` is the name of the type we are defining, `BITS`
/// is its bit width and `InnerT` is the native type which will store
/// those bits.
macro_rules! unsigned_impl {
    ($SelfT:ty, $BITS:expr, $InnerT:ty) => {
        impl $SelfT {
            const MODULUS: $InnerT = (1 << $BITS);
            const VALUE_BITS: $InnerT = Self::MODULUS - 1;

            pub const MAX: Self = Self {
                bits: Self::MODULUS - 1,
            };

            pub const ZERO: Self = Self { bits: 0 };
            pub const ONE: Self = Self { bits: 1 };
            pub const MIN: Self = Self::ZERO;

            // This will always fail at compile time, so no need to
            // hide it.  It's pub so that it can be used in u12!() and
            // similar.
            pub const fn new<const N: $InnerT>() -> $SelfT {
                type Word = $SelfT;
                struct Helper<const M: $InnerT>;
                impl<const M: $InnerT> Helper<M> {
                    const U: Word = {
                        if M > Word::MAX.bits {
                            panic!("input value is out of range")
                        } else {
                            Word {
                                bits: Word::MAX.bits & M,
                            }
                        }
                    };
                }
                Helper::<N>::U
            }

            /// Keep only the low `BITS` bits of `n`.  This is how
            /// hardware registers narrower than the data path load a
            /// value from it.
            pub const fn truncating_from(n: $InnerT) -> $SelfT {
                Self {
                    bits: n & Self::VALUE_BITS,
                }
            }

            pub const fn is_zero(&self) -> bool {
                self.bits == 0
            }

            pub const fn bits(&self) -> $InnerT {
                self.bits
            }

            pub const fn wrapping_add(self, rhs: $SelfT) -> $SelfT {
                Self {
                    bits: self.bits.wrapping_add(rhs.bits) & Self::VALUE_BITS,
                }
            }

            pub const fn wrapping_sub(self, rhs: $SelfT) -> $SelfT {
                Self {
                    bits: (self.bits + Self::MODULUS).wrapping_sub(rhs.bits) & Self::VALUE_BITS,
                }
            }

            pub fn checked_add(self, rhs: $SelfT) -> Option<$SelfT> {
                match self.bits.checked_add(rhs.bits) {
                    Some(result) => Self::try_from(result).ok(),
                    None => None,
                }
            }

            pub fn checked_sub(self, rhs: $SelfT) -> Option<$SelfT> {
                match self.bits.checked_sub(rhs.bits) {
                    Some(result) => Self::try_from(result).ok(),
                    None => None,
                }
            }

            /// Add one, wrapping at the top of the range.  The flag
            /// in the result is set when the value wrapped around to
            /// zero.
            pub const fn overflowing_increment(self) -> ($SelfT, bool) {
                let next = self.wrapping_add(Self::ONE);
                (next, next.bits == 0)
            }
        }

        impl Default for $SelfT {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl Display for $SelfT {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
                Octal::fmt(&self.bits, f)
            }
        }

        impl Octal for $SelfT {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
                Octal::fmt(&self.bits, f)
            }
        }

        impl Debug for $SelfT {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($SelfT), "{{bits: {:#o}}}"), self.bits)
            }
        }

        impl std::ops::BitAnd<$InnerT> for $SelfT {
            type Output = Self;
            fn bitand(self, mask: $InnerT) -> Self {
                Self {
                    bits: self.bits & mask,
                }
            }
        }
    };
}

/// `Unsigned4Bit` holds a memory bank number (the high part of a
/// physical address) or a multiplexer service request number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Unsigned4Bit {
    pub(crate) bits: u8,
}

/// `Unsigned5Bit` holds an interrupt priority; there are 32 priority
/// levels, 0 being the highest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Unsigned5Bit {
    pub(crate) bits: u8,
}

/// `Unsigned7Bit` holds a device number, the address used by the
/// direct I/O instructions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Unsigned7Bit {
    pub(crate) bits: u8,
}

/// `Unsigned12Bit` holds a channel word count.  Counts are stored as
/// two's complement negative numbers which count up towards zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Unsigned12Bit {
    pub(crate) bits: u16,
}

unsigned_impl!(Unsigned4Bit, 4, u8);
try_from_native_type_to_self!(Unsigned4Bit, u8, u8 u16 u32 u64 usize i8 i16 i32 i64);
from_self_to_native_type!(Unsigned4Bit, u8 u16 u32 u64 usize i8 i16 i32 i64);

unsigned_impl!(Unsigned5Bit, 5, u8);
try_from_native_type_to_self!(Unsigned5Bit, u8, u8 u16 u32 u64 usize i8 i16 i32 i64);
from_self_to_native_type!(Unsigned5Bit, u8 u16 u32 u64 usize i8 i16 i32 i64);

unsigned_impl!(Unsigned7Bit, 7, u8);
try_from_native_type_to_self!(Unsigned7Bit, u8, u8 u16 u32 u64 usize i8 i16 i32 i64);
from_self_to_native_type!(Unsigned7Bit, u8 u16 u32 u64 usize i8 i16 i32 i64);

unsigned_impl!(Unsigned12Bit, 12, u16);
from_native_type_to_self!(Unsigned12Bit, u8);
try_from_native_type_to_self!(Unsigned12Bit, u16, u16 u32 u64 usize i8 i16 i32 i64);
from_self_to_native_type!(Unsigned12Bit, u16 u32 u64 usize i16 i32 i64);
try_from_self_to_native_type!(Unsigned12Bit, u8 i8);

impl From<Unsigned4Bit> for Unsigned5Bit {
    fn from(n: Unsigned4Bit) -> Unsigned5Bit {
        Unsigned5Bit { bits: n.bits }
    }
}

impl From<Unsigned5Bit> for Unsigned7Bit {
    fn from(n: Unsigned5Bit) -> Unsigned7Bit {
        Unsigned7Bit { bits: n.bits }
    }
}

impl From<Unsigned7Bit> for Unsigned12Bit {
    fn from(n: Unsigned7Bit) -> Unsigned12Bit {
        Unsigned12Bit {
            bits: n.bits.into(),
        }
    }
}
