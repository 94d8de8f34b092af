//! The `base` crate defines the HP 3000 I/O related things which are
//! useful both in the simulator and in other associated tools.  The
//! idea is that a tool which only needs to read or write channel
//! programs would depend on the base crate but would not need to
//! depend on the simulator library itself.

mod error;
mod types;
mod unsigned;

pub mod iocw;
pub mod prelude;
pub mod signals;
pub use crate::unsigned::*;

#[macro_export]
macro_rules! u4 {
    ($n:expr) => {
        $crate::prelude::Unsigned4Bit::new::<{ $n }>()
    };
}

#[macro_export]
macro_rules! u5 {
    ($n:expr) => {
        $crate::prelude::Unsigned5Bit::new::<{ $n }>()
    };
}

#[macro_export]
macro_rules! u7 {
    ($n:expr) => {
        $crate::prelude::Unsigned7Bit::new::<{ $n }>()
    };
}

#[macro_export]
macro_rules! u12 {
    ($n:expr) => {
        $crate::prelude::Unsigned12Bit::new::<{ $n }>()
    };
}

#[test]
fn test_u7() {
    use prelude::Unsigned7Bit;
    let m: Unsigned7Bit = u7!(40);
    let n: Unsigned7Bit = Unsigned7Bit::try_from(40_u32).expect("test data should be in range");
    assert_eq!(m, n);
}

#[test]
fn test_u12() {
    use prelude::Unsigned12Bit;
    let p: Unsigned12Bit = u12!(0o7777);
    assert_eq!(p, Unsigned12Bit::MAX);
}
