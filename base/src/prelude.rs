//! The prelude exports the types which are useful in representing
//! things to do with HP 3000 I/O.  Providing this prelude is the main
//! purpose of the base crate.
pub use super::error::*;
pub use super::iocw::{ProgramStep, SioOrder};
pub use super::signals::*;
pub use super::types::*;
pub use super::unsigned::*;
pub use super::{u12, u4, u5, u7};
